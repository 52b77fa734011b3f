#![forbid(unsafe_code)]

pub mod backend;
pub mod buffer;
pub mod config;
pub mod distribute;
pub mod foundation;
pub mod io;
pub mod pixel;
pub mod plan;
pub mod report;
pub mod run;
pub mod sink;
pub mod verify;

pub use backend::{
    BackendKind, DistributedBackend, ExecutionBackend, Launch, RunStats, Schedule,
    SequentialBackend, SharedMemoryBackend,
};
pub use buffer::{Dimensions, ImageBuffer, SourceBuffers};
pub use config::{LaunchMode, RunConfig};
pub use distribute::{Communicator, ProcessLauncher};
pub use foundation::core::{FrameIndex, FrameRange, WorkerId};
pub use foundation::error::{CrossfadeError, CrossfadeResult};
pub use plan::FramePlan;
pub use report::{ComparisonReport, RunReport};
pub use run::{compare, load_sources, run};
pub use sink::{FrameSink, InMemorySink, Namespace, PngDirSink};
