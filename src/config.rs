use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::backend::{
    BackendKind, DistributedBackend, ExecutionBackend, Launch, Schedule, SequentialBackend,
    SharedMemoryBackend,
};
use crate::distribute::ProcessLauncher;
use crate::foundation::error::{CrossfadeError, CrossfadeResult};

/// Where distributed ranks other than the owner are started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    /// Child processes started as `<program> worker --rank R ...`. Unless `worker_program` is
    /// set, `<program>` is the running executable, which must then be the `crossfade` binary.
    #[default]
    Processes,
    /// Threads of the owner process, still with one private copy of the sources per rank.
    Threads,
}

/// Everything a benchmark run needs. Loaded from JSON; missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output_root: PathBuf,
    pub total_frames: u64,
    pub backend: BackendKind,
    /// Shared-memory pool size. `None` uses rayon's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    pub schedule: Schedule,
    /// Distributed rank count. `None` uses the machine's available parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Library callers embedding `run` or `compare` in another binary should either set
    /// `worker_program` or use [`LaunchMode::Threads`]; the default re-executes the caller.
    pub launch: LaunchMode,
    /// Executable started for each worker rank. Defaults to the running executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_program: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("images/input_color.png"),
            output_root: PathBuf::from("frames"),
            // 4 s at 24 fps.
            total_frames: 96,
            backend: BackendKind::Sequential,
            threads: None,
            schedule: Schedule::Dynamic,
            workers: None,
            launch: LaunchMode::Processes,
            worker_program: None,
        }
    }
}

impl RunConfig {
    pub fn from_json_file(path: &Path) -> CrossfadeResult<Self> {
        let f = std::fs::File::open(path)
            .with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: RunConfig = serde_json::from_reader(std::io::BufReader::new(f)).map_err(|e| {
            CrossfadeError::validation(format!("config '{}': {e}", path.display()))
        })?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CrossfadeResult<()> {
        if self.total_frames < 2 {
            return Err(CrossfadeError::validation(format!(
                "total_frames must be >= 2, got {}",
                self.total_frames
            )));
        }
        if self.threads == Some(0) {
            return Err(CrossfadeError::validation("threads must be >= 1 when set"));
        }
        if self.workers == Some(0) {
            return Err(CrossfadeError::validation("workers must be >= 1 when set"));
        }
        if self.input.as_os_str().is_empty() {
            return Err(CrossfadeError::validation("input path must be set"));
        }
        Ok(())
    }

    /// Rank count of a distributed run.
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Directory holding `kind`'s namespaces.
    pub fn backend_root(&self, kind: BackendKind) -> PathBuf {
        self.output_root.join(kind.dir_name())
    }

    pub fn create_backend(&self, kind: BackendKind) -> CrossfadeResult<Box<dyn ExecutionBackend>> {
        Ok(match kind {
            BackendKind::Sequential => Box::new(SequentialBackend),
            BackendKind::Shared => Box::new(SharedMemoryBackend::new(self.threads, self.schedule)),
            BackendKind::Distributed => {
                let launch = match self.launch {
                    LaunchMode::Threads => Launch::Threads,
                    LaunchMode::Processes => Launch::Processes(match &self.worker_program {
                        Some(p) => ProcessLauncher::new(p),
                        None => ProcessLauncher::current_exe()?,
                    }),
                };
                Box::new(DistributedBackend::new(self.resolved_workers(), launch)?)
            }
        })
    }
}
