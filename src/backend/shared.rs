use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use rayon::prelude::*;

use crate::backend::{
    BackendKind, ExecutionBackend, RunStats, build_thread_pool, render_frame, render_partition,
};
use crate::buffer::SourceBuffers;
use crate::foundation::core::{FrameIndex, WorkerId};
use crate::foundation::error::CrossfadeResult;
use crate::plan::FramePlan;
use crate::sink::{FrameSink, Namespace};

/// How a shared-memory pool divides frames among its threads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// One [`FramePlan`] partition per logical worker; namespace `worker<N>` per partition.
    Static,
    /// Frames are stolen one at a time by whichever pool thread is free; namespace
    /// `worker<N>` per pool thread.
    #[default]
    Dynamic,
}

/// Renders on a rayon pool. Sources are borrowed by every thread; each thread owns only the
/// frame it is currently blending.
#[derive(Clone, Copy, Debug, Default)]
pub struct SharedMemoryBackend {
    threads: Option<usize>,
    schedule: Schedule,
}

impl SharedMemoryBackend {
    /// `threads = None` uses rayon's default pool size.
    pub fn new(threads: Option<usize>, schedule: Schedule) -> Self {
        Self { threads, schedule }
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }
}

impl ExecutionBackend for SharedMemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Shared
    }

    #[tracing::instrument(skip_all, fields(total_frames = total_frames, schedule = ?self.schedule))]
    fn run(
        &self,
        sources: &SourceBuffers,
        total_frames: u64,
        sink: &dyn FrameSink,
    ) -> CrossfadeResult<RunStats> {
        let pool = build_thread_pool(self.threads)?;
        let workers = pool.current_num_threads();
        let plan = FramePlan::new(total_frames, workers)?;
        tracing::debug!(workers, "thread pool ready");

        let started = Instant::now();
        let frames_written = match self.schedule {
            Schedule::Static => pool.install(|| run_static(sources, &plan, sink))?,
            Schedule::Dynamic => pool.install(|| run_dynamic(sources, &plan, sink))?,
        };
        Ok(RunStats {
            workers,
            frames_written,
            compute: started.elapsed(),
        })
    }
}

fn run_static(
    sources: &SourceBuffers,
    plan: &FramePlan,
    sink: &dyn FrameSink,
) -> CrossfadeResult<u64> {
    plan.partitions()
        .into_par_iter()
        .map(|(worker, partition)| {
            render_partition(sources, plan, partition, &Namespace::worker(worker), sink)
        })
        .try_reduce(|| 0, |a, b| Ok(a + b))
}

struct ThreadSlot {
    ns: Namespace,
    prepared: bool,
}

fn run_dynamic(
    sources: &SourceBuffers,
    plan: &FramePlan,
    sink: &dyn FrameSink,
) -> CrossfadeResult<u64> {
    let written = AtomicU64::new(0);
    (0..plan.total_frames())
        .into_par_iter()
        .try_for_each_init(
            || ThreadSlot {
                ns: Namespace::worker(WorkerId(rayon::current_thread_index().unwrap_or(0))),
                prepared: false,
            },
            |slot, f| -> CrossfadeResult<()> {
                if !slot.prepared {
                    sink.prepare(&slot.ns)?;
                    slot.prepared = true;
                }
                let idx = FrameIndex(f);
                let frame = render_frame(sources, plan, idx);
                sink.write(&slot.ns, idx, &frame)?;
                written.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
        )?;
    Ok(written.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Dimensions, ImageBuffer};
    use crate::sink::InMemorySink;

    fn sources() -> SourceBuffers {
        let dims = Dimensions::new(4, 4).unwrap();
        SourceBuffers::from_color(
            ImageBuffer::from_raw(dims, (0..dims.sample_len()).map(|i| (i * 7) as u8).collect())
                .unwrap(),
        )
    }

    fn assert_each_frame_once(sink: &InMemorySink, total: u64) {
        let idx: Vec<u64> = sink.frames().iter().map(|c| c.index.0).collect();
        assert_eq!(idx, (0..total).collect::<Vec<_>>());
    }

    #[test]
    fn static_schedule_uses_one_namespace_per_partition() {
        let sink = InMemorySink::new();
        let stats = SharedMemoryBackend::new(Some(3), Schedule::Static)
            .run(&sources(), 10, &sink)
            .unwrap();

        assert_eq!(stats.workers, 3);
        assert_eq!(stats.frames_written, 10);
        assert_each_frame_once(&sink, 10);
        for c in sink.frames() {
            let expected = match c.index.0 {
                0..=2 => "worker0",
                3..=5 => "worker1",
                _ => "worker2",
            };
            assert_eq!(c.namespace.as_str(), expected);
        }
    }

    #[test]
    fn dynamic_schedule_covers_every_frame_once() {
        let sink = InMemorySink::new();
        let stats = SharedMemoryBackend::new(Some(4), Schedule::Dynamic)
            .run(&sources(), 17, &sink)
            .unwrap();

        assert_eq!(stats.frames_written, 17);
        assert_each_frame_once(&sink, 17);
        assert!(sink.namespaces().len() <= 4);
        for c in sink.frames() {
            assert!(sink.namespaces().contains(&c.namespace));
        }
    }
}
