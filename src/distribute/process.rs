use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::Duration;

use crate::distribute::pipe::{PipeCommunicator, PipeLink};
use crate::foundation::core::WorkerId;
use crate::foundation::error::{CrossfadeError, CrossfadeResult};

/// Subcommand a worker process is started with.
pub const WORKER_SUBCOMMAND: &str = "worker";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What every worker process needs besides the replicated buffers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerJob {
    pub total_frames: u64,
    /// Root directory the rank namespaces are created under.
    pub output_root: PathBuf,
}

/// How worker ranks are started: `<program> <prefix_args...> worker --rank R --size N ...`.
#[derive(Clone, Debug)]
pub struct ProcessLauncher {
    program: PathBuf,
    prefix_args: Vec<OsString>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    /// Relaunch the running executable.
    pub fn current_exe() -> CrossfadeResult<Self> {
        let exe = std::env::current_exe().map_err(|e| {
            CrossfadeError::execution(format!("cannot locate the running executable: {e}"))
        })?;
        Ok(Self::new(exe))
    }

    /// Arguments placed before the worker subcommand.
    pub fn with_prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    fn command(&self, rank: WorkerId, size: usize, job: &WorkerJob) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .arg(WORKER_SUBCOMMAND)
            .arg("--rank")
            .arg(rank.0.to_string())
            .arg("--size")
            .arg(size.to_string())
            .arg("--frames")
            .arg(job.total_frames.to_string())
            .arg("--out")
            .arg(&job.output_root);
        // stdout carries the protocol; diagnostics go to the inherited stderr.
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }

    /// Start ranks `1..size`. The caller is rank 0.
    #[tracing::instrument(skip(self, job), fields(program = %self.program.display()))]
    pub fn spawn(&self, size: usize, job: &WorkerJob) -> CrossfadeResult<ProcessGroup> {
        let mut group = ProcessGroup {
            size,
            children: Vec::with_capacity(size.saturating_sub(1)),
        };
        for r in 1..size {
            let rank = WorkerId(r);
            let mut child = self.command(rank, size, job).spawn().map_err(|e| {
                CrossfadeError::execution(format!(
                    "failed to spawn worker rank {rank} ('{}'): {e}",
                    self.program.display()
                ))
            })?;
            let stdin = child.stdin.take();
            let stdout = child.stdout.take();
            group.children.push(WorkerProcess {
                rank,
                child,
                stdin,
                stdout,
            });
            tracing::debug!(rank = r, "worker spawned");
        }
        Ok(group)
    }
}

struct WorkerProcess {
    rank: WorkerId,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
}

/// Running worker ranks. Dropping the group kills any rank that has not been waited on.
pub struct ProcessGroup {
    size: usize,
    children: Vec<WorkerProcess>,
}

impl ProcessGroup {
    pub fn size(&self) -> usize {
        self.size
    }

    /// Owner endpoint over the children's stdin/stdout. Can be taken once.
    pub fn communicator(&mut self) -> CrossfadeResult<PipeCommunicator<ChildStdout, ChildStdin>> {
        let mut links = Vec::with_capacity(self.children.len());
        for w in &mut self.children {
            let (Some(writer), Some(reader)) = (w.stdin.take(), w.stdout.take()) else {
                return Err(CrossfadeError::distribution(format!(
                    "rank {}: pipes already taken",
                    w.rank
                )));
            };
            links.push(PipeLink {
                peer: w.rank,
                reader,
                writer,
            });
        }
        PipeCommunicator::owner(self.size, links)
    }

    /// Wait for every rank. The first failure is returned and the remaining ranks are killed.
    pub fn wait_all(mut self) -> CrossfadeResult<()> {
        loop {
            let mut i = 0;
            while i < self.children.len() {
                match self.children[i].child.try_wait() {
                    Ok(Some(status)) if status.success() => {
                        let done = self.children.swap_remove(i);
                        tracing::debug!(rank = done.rank.0, "worker finished");
                    }
                    Ok(Some(status)) => {
                        let failed = self.children.swap_remove(i);
                        return Err(worker_failed(failed.rank, status));
                    }
                    Ok(None) => i += 1,
                    Err(e) => {
                        return Err(CrossfadeError::execution(format!(
                            "failed to wait for rank {}: {e}",
                            self.children[i].rank
                        )));
                    }
                }
            }
            if self.children.is_empty() {
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        kill_all(std::mem::take(&mut self.children));
    }
}

fn kill_all(workers: Vec<WorkerProcess>) {
    for mut w in workers {
        let _ = w.child.kill();
        let _ = w.child.wait();
    }
}

fn worker_failed(rank: WorkerId, status: ExitStatus) -> CrossfadeError {
    CrossfadeError::execution(format!("worker rank {rank} exited with status {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_command_line_is_stable() {
        let launcher = ProcessLauncher::new("crossfade").with_prefix_args(["--quiet"]);
        let job = WorkerJob {
            total_frames: 96,
            output_root: PathBuf::from("frames/distributed"),
        };
        let cmd = launcher.command(WorkerId(2), 4, &job);
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "--quiet",
                "worker",
                "--rank",
                "2",
                "--size",
                "4",
                "--frames",
                "96",
                "--out",
                "frames/distributed"
            ]
        );
    }

    #[test]
    fn spawn_failure_names_the_program() {
        let launcher = ProcessLauncher::new("/nonexistent/crossfade-worker");
        let job = WorkerJob {
            total_frames: 4,
            output_root: PathBuf::from("unused"),
        };
        let err = launcher.spawn(2, &job).err().unwrap();
        assert!(err.to_string().contains("crossfade-worker"), "{err}");
    }
}
