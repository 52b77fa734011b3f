use std::path::Path;
use std::time::Instant;

use crate::backend::{BackendKind, ExecutionBackend, RunStats, render_partition};
use crate::buffer::SourceBuffers;
use crate::distribute::{
    ChannelCommunicator, Communicator, PipeCommunicator, ProcessLauncher, WorkerJob,
    replicate_sources,
};
use crate::foundation::core::WorkerId;
use crate::foundation::error::{CrossfadeError, CrossfadeResult};
use crate::plan::FramePlan;
use crate::sink::{FrameSink, Namespace, PngDirSink};

/// Where distributed ranks run.
#[derive(Clone, Debug)]
pub enum Launch {
    /// One OS thread per rank, each receiving its own copy of the sources over channels.
    Threads,
    /// One child process per rank other than the owner, fed over stdin/stdout pipes.
    Processes(ProcessLauncher),
}

/// One rank per worker. The owner replicates the sources to every rank; after the barrier each
/// rank renders its [`FramePlan`] partition into namespace `rank<N>` without further
/// communication.
#[derive(Clone, Debug)]
pub struct DistributedBackend {
    workers: usize,
    launch: Launch,
}

impl DistributedBackend {
    pub fn new(workers: usize, launch: Launch) -> CrossfadeResult<Self> {
        if workers == 0 {
            return Err(CrossfadeError::validation("distributed 'workers' must be >= 1"));
        }
        Ok(Self { workers, launch })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl ExecutionBackend for DistributedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Distributed
    }

    #[tracing::instrument(skip_all, fields(total_frames = total_frames, workers = self.workers))]
    fn run(
        &self,
        sources: &SourceBuffers,
        total_frames: u64,
        sink: &dyn FrameSink,
    ) -> CrossfadeResult<RunStats> {
        let plan = FramePlan::new(total_frames, self.workers)?;
        match &self.launch {
            Launch::Threads => run_threads(&plan, sources, sink),
            Launch::Processes(launcher) => run_processes(launcher, &plan, sources, sink),
        }
    }
}

/// What one rank did after the barrier.
#[derive(Clone, Copy, Debug)]
pub struct RankOutcome {
    pub rank: WorkerId,
    pub frames_written: u64,
    /// When this rank left the barrier.
    pub released_at: Instant,
}

/// Body of every rank: replicate, wait on the barrier, render this rank's partition.
#[tracing::instrument(skip_all, fields(rank = comm.rank().0))]
pub fn run_rank<C: Communicator + ?Sized>(
    comm: &mut C,
    owned: Option<&SourceBuffers>,
    plan: &FramePlan,
    sink: &dyn FrameSink,
) -> CrossfadeResult<RankOutcome> {
    if comm.size() != plan.worker_count() {
        return Err(CrossfadeError::validation(format!(
            "group has {} ranks but the plan has {} workers",
            comm.size(),
            plan.worker_count()
        )));
    }
    let rank = comm.rank();
    let sources = replicate_sources(comm, owned)?;
    let released_at = Instant::now();
    let partition = plan.partition(rank)?;
    let ns = Namespace::rank(rank);
    let frames_written = render_partition(&sources, plan, partition, &ns, sink)?;
    Ok(RankOutcome {
        rank,
        frames_written,
        released_at,
    })
}

fn run_threads(
    plan: &FramePlan,
    sources: &SourceBuffers,
    sink: &dyn FrameSink,
) -> CrossfadeResult<RunStats> {
    let mut group = ChannelCommunicator::group(plan.worker_count())?;
    let members = group.split_off(1);
    let mut owner = group
        .pop()
        .ok_or_else(|| CrossfadeError::execution("channel group has no owner endpoint"))?;

    std::thread::scope(|scope| -> CrossfadeResult<RunStats> {
        let mut handles = Vec::with_capacity(members.len());
        for mut comm in members {
            let name = format!("crossfade-rank-{}", comm.rank());
            let handle = std::thread::Builder::new()
                .name(name)
                .spawn_scoped(scope, move || run_rank(&mut comm, None, plan, sink))
                .map_err(|e| CrossfadeError::execution(format!("failed to spawn rank: {e}")))?;
            handles.push(handle);
        }

        let owner_res = run_rank(&mut owner, Some(sources), plan, sink);
        // Ranks still blocked in replication observe the hang-up and fail.
        drop(owner);

        let mut written = 0;
        let mut failure = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(outcome)) => written += outcome.frames_written,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "rank failed");
                    failure.get_or_insert(e);
                }
                Err(_) => {
                    failure.get_or_insert(CrossfadeError::execution("rank thread panicked"));
                }
            }
        }

        let owner = owner_res?;
        if let Some(e) = failure {
            return Err(e);
        }
        written += owner.frames_written;
        Ok(RunStats {
            workers: plan.worker_count(),
            frames_written: written,
            compute: owner.released_at.elapsed(),
        })
    })
}

fn run_processes(
    launcher: &ProcessLauncher,
    plan: &FramePlan,
    sources: &SourceBuffers,
    sink: &dyn FrameSink,
) -> CrossfadeResult<RunStats> {
    let root = sink.root_dir().ok_or_else(|| {
        CrossfadeError::validation("process-launched ranks need a directory-backed sink")
    })?;
    let job = WorkerJob {
        total_frames: plan.total_frames(),
        output_root: root.to_path_buf(),
    };

    let mut group = launcher.spawn(plan.worker_count(), &job)?;
    let mut comm = group.communicator()?;
    let owner = run_rank(&mut comm, Some(sources), plan, sink)?;
    drop(comm);
    group.wait_all()?;

    // A child only exits successfully after writing its whole partition.
    let children = (1..plan.worker_count())
        .map(|r| plan.partition(WorkerId(r)).map(|p| p.len_frames()))
        .sum::<CrossfadeResult<u64>>()?;
    Ok(RunStats {
        workers: plan.worker_count(),
        frames_written: owner.frames_written + children,
        compute: owner.released_at.elapsed(),
    })
}

/// Entry point of a worker process started by [`Launch::Processes`].
///
/// Receives the sources from the owner over stdin, acknowledges on stdout, then renders this
/// rank's partition under `output_root`.
pub fn run_worker_process(
    rank: WorkerId,
    size: usize,
    total_frames: u64,
    output_root: &Path,
) -> CrossfadeResult<RankOutcome> {
    let plan = FramePlan::new(total_frames, size)?;
    let reader = std::io::BufReader::new(std::io::stdin());
    let mut comm = PipeCommunicator::member(rank, size, reader, std::io::stdout())?;
    let sink = PngDirSink::new(output_root);
    let outcome = run_rank(&mut comm, None, &plan, &sink)?;
    tracing::info!(
        rank = rank.0,
        frames = outcome.frames_written,
        elapsed_ms = outcome.released_at.elapsed().as_millis() as u64,
        "rank finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Dimensions, ImageBuffer};
    use crate::sink::InMemorySink;

    fn sources() -> SourceBuffers {
        let dims = Dimensions::new(3, 3).unwrap();
        SourceBuffers::from_color(
            ImageBuffer::from_raw(dims, (0..dims.sample_len()).map(|i| (i * 11) as u8).collect())
                .unwrap(),
        )
    }

    #[test]
    fn thread_ranks_write_their_own_partitions() {
        let sink = InMemorySink::new();
        let backend = DistributedBackend::new(3, Launch::Threads).unwrap();
        let stats = backend.run(&sources(), 10, &sink).unwrap();

        assert_eq!(stats.workers, 3);
        assert_eq!(stats.frames_written, 10);
        let frames = sink.frames();
        assert_eq!(frames.len(), 10);
        for c in &frames {
            let expected = match c.index.0 {
                0..=2 => "rank0",
                3..=5 => "rank1",
                _ => "rank2",
            };
            assert_eq!(c.namespace.as_str(), expected);
        }
    }

    #[test]
    fn more_ranks_than_frames_is_fine() {
        let sink = InMemorySink::new();
        let backend = DistributedBackend::new(5, Launch::Threads).unwrap();
        let stats = backend.run(&sources(), 3, &sink).unwrap();
        assert_eq!(stats.frames_written, 3);
        assert_eq!(sink.frames().len(), 3);
    }

    #[test]
    fn processes_require_a_directory_sink() {
        let backend =
            DistributedBackend::new(2, Launch::Processes(ProcessLauncher::new("unused"))).unwrap();
        let err = backend
            .run(&sources(), 4, &InMemorySink::new())
            .unwrap_err();
        assert!(matches!(err, CrossfadeError::Validation(_)), "{err}");
    }

    /// Stand-in worker: `$3` is the rank, since the worker arguments follow `$0`.
    #[cfg(unix)]
    fn scripted(script: &str) -> Launch {
        Launch::Processes(ProcessLauncher::new("sh").with_prefix_args([
            "-c",
            script,
            "crossfade-worker",
        ]))
    }

    #[cfg(unix)]
    const ACK_THEN_DRAIN: &str = r#"printf "\003\00$3\000\000\000"; cat > /dev/null"#;

    #[cfg(unix)]
    #[test]
    fn process_ranks_count_owner_frames_and_child_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PngDirSink::new(dir.path());
        let backend = DistributedBackend::new(3, scripted(ACK_THEN_DRAIN)).unwrap();

        let stats = backend.run(&sources(), 10, &sink).unwrap();
        assert_eq!(stats.frames_written, 10);
        let rank0 = dir.path().join("rank0");
        for f in 0..3 {
            assert!(rank0.join(format!("frame_{f:04}.png")).is_file());
        }
    }

    #[cfg(unix)]
    #[test]
    fn worker_dying_before_replication_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PngDirSink::new(dir.path());
        let backend =
            DistributedBackend::new(3, Launch::Processes(ProcessLauncher::new("false"))).unwrap();

        let err = backend.run(&sources(), 6, &sink).unwrap_err();
        assert!(matches!(err, CrossfadeError::Distribution(_)), "{err}");
        assert!(!dir.path().join("rank0").exists());
    }

    #[cfg(unix)]
    #[test]
    fn worker_exit_status_fails_the_run_and_kills_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PngDirSink::new(dir.path());
        let script = format!(r#"{ACK_THEN_DRAIN}; [ "$3" = 1 ] && exit 3; exec sleep 30"#);
        let backend = DistributedBackend::new(3, scripted(&script)).unwrap();

        let started = Instant::now();
        let err = backend.run(&sources(), 6, &sink).unwrap_err();
        assert!(matches!(err, CrossfadeError::Execution(_)), "{err}");
        assert!(err.to_string().contains("rank 1 exited"), "{err}");
        // The sleeping rank was killed and reaped before `run` returned.
        assert!(started.elapsed() < std::time::Duration::from_secs(20));
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(DistributedBackend::new(0, Launch::Threads).is_err());
    }
}
