//! Interchangeable strategies for rendering an animation's frames.
//!
//! Every backend renders the same frames through [`render_partition`]; they differ only in how
//! the frame range is split among workers and where those workers run.

use std::time::Duration;

use crate::buffer::SourceBuffers;
use crate::foundation::core::{FrameIndex, FrameRange};
use crate::foundation::error::{CrossfadeError, CrossfadeResult};
use crate::plan::FramePlan;
use crate::sink::{FrameSink, Namespace};

pub mod distributed;
pub mod sequential;
pub mod shared;

pub use distributed::{DistributedBackend, Launch};
pub use sequential::SequentialBackend;
pub use shared::{Schedule, SharedMemoryBackend};

/// Available execution strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// One worker on the calling thread.
    Sequential,
    /// A rayon thread pool over one address space.
    #[serde(alias = "shared_memory")]
    Shared,
    /// One rank per worker, each holding its own copy of the sources.
    Distributed,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [
        BackendKind::Sequential,
        BackendKind::Shared,
        BackendKind::Distributed,
    ];

    /// Directory the backend's namespaces are created under.
    pub fn dir_name(self) -> &'static str {
        match self {
            BackendKind::Sequential => "sequential",
            BackendKind::Shared => "shared",
            BackendKind::Distributed => "distributed",
        }
    }

    /// Human-readable name used in reports.
    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Sequential => "Sequential",
            BackendKind::Shared => "Shared-memory",
            BackendKind::Distributed => "Distributed",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Counters from one backend run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Workers that took part (threads or ranks).
    pub workers: usize,
    /// Frames handed to the sink.
    pub frames_written: u64,
    /// Wall-clock time of the compute phase, replication excluded.
    pub compute: Duration,
}

/// A strategy for rendering every frame of an animation into a sink.
///
/// Implementations must write each frame of `[0, total_frames)` exactly once, under a namespace
/// no other concurrently running worker uses.
pub trait ExecutionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Render all frames of a `total_frames`-long crossfade between `sources`' color and gray.
    fn run(
        &self,
        sources: &SourceBuffers,
        total_frames: u64,
        sink: &dyn FrameSink,
    ) -> CrossfadeResult<RunStats>;
}

/// Render one frame.
pub fn render_frame(
    sources: &SourceBuffers,
    plan: &FramePlan,
    idx: FrameIndex,
) -> crate::buffer::ImageBuffer {
    sources.blend_frame(plan.progress(idx))
}

/// Render `partition` in increasing frame order into `ns`. Returns the number of frames written.
///
/// Empty partitions write nothing and leave the namespace untouched.
pub fn render_partition(
    sources: &SourceBuffers,
    plan: &FramePlan,
    partition: FrameRange,
    ns: &Namespace,
    sink: &dyn FrameSink,
) -> CrossfadeResult<u64> {
    if partition.end.0 > plan.total_frames() {
        return Err(CrossfadeError::validation(format!(
            "partition {partition} exceeds {} frames",
            plan.total_frames()
        )));
    }
    if partition.is_empty() {
        tracing::debug!(namespace = %ns, "empty partition");
        return Ok(0);
    }
    tracing::debug!(namespace = %ns, %partition, "rendering partition");
    sink.prepare(ns)?;
    for idx in partition.iter() {
        let frame = render_frame(sources, plan, idx);
        sink.write(ns, idx, &frame)?;
    }
    Ok(partition.len_frames())
}

pub(crate) fn build_thread_pool(threads: Option<usize>) -> CrossfadeResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(CrossfadeError::validation(
            "'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("crossfade-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| CrossfadeError::execution(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Dimensions, ImageBuffer};
    use crate::foundation::core::WorkerId;
    use crate::sink::InMemorySink;

    fn sources() -> SourceBuffers {
        SourceBuffers::from_color(
            ImageBuffer::from_raw(Dimensions::new(2, 1).unwrap(), vec![255, 0, 0, 0, 255, 0])
                .unwrap(),
        )
    }

    #[test]
    fn partition_frames_are_written_in_order() {
        let src = sources();
        let plan = FramePlan::new(10, 3).unwrap();
        let sink = InMemorySink::new();
        let ns = Namespace::worker(WorkerId(1));
        let part = plan.partition(WorkerId(1)).unwrap();

        assert_eq!(render_partition(&src, &plan, part, &ns, &sink).unwrap(), 3);
        let idx: Vec<u64> = sink.frames().iter().map(|c| c.index.0).collect();
        assert_eq!(idx, vec![3, 4, 5]);
    }

    #[test]
    fn empty_partition_touches_nothing() {
        let src = sources();
        let plan = FramePlan::new(2, 4).unwrap();
        let sink = InMemorySink::new();
        let ns = Namespace::rank(WorkerId(0));
        let part = plan.partition(WorkerId(0)).unwrap();

        assert_eq!(render_partition(&src, &plan, part, &ns, &sink).unwrap(), 0);
        assert!(sink.namespaces().is_empty());
    }

    #[test]
    fn endpoint_frames_equal_sources() {
        let src = sources();
        let plan = FramePlan::new(3, 1).unwrap();
        assert_eq!(render_frame(&src, &plan, FrameIndex(0)), *src.gray());
        assert_eq!(render_frame(&src, &plan, FrameIndex(2)), *src.color());
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(build_thread_pool(Some(0)).is_err());
    }
}
