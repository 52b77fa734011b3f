use std::time::Instant;

use crate::backend::{BackendKind, ExecutionBackend, RunStats, render_partition};
use crate::buffer::SourceBuffers;
use crate::foundation::core::WorkerId;
use crate::foundation::error::CrossfadeResult;
use crate::plan::FramePlan;
use crate::sink::{FrameSink, Namespace};

/// Renders every frame on the calling thread, in increasing index order.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialBackend;

impl ExecutionBackend for SequentialBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sequential
    }

    #[tracing::instrument(skip_all, fields(total_frames = total_frames))]
    fn run(
        &self,
        sources: &SourceBuffers,
        total_frames: u64,
        sink: &dyn FrameSink,
    ) -> CrossfadeResult<RunStats> {
        let plan = FramePlan::new(total_frames, 1)?;
        let started = Instant::now();
        let written = render_partition(
            sources,
            &plan,
            plan.full_range(),
            &Namespace::worker(WorkerId::OWNER),
            sink,
        )?;
        Ok(RunStats {
            workers: 1,
            frames_written: written,
            compute: started.elapsed(),
        })
    }
}
