use crate::foundation::core::{FrameIndex, FrameRange, WorkerId};
use crate::foundation::error::{CrossfadeError, CrossfadeResult};

/// Static block partitioning of an animation across a fixed worker count.
///
/// Every worker but the last owns `total / workers` consecutive frames; the last one also takes
/// the remainder. Per-frame cost is uniform, so no rebalancing happens after the split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FramePlan {
    total_frames: u64,
    worker_count: usize,
}

impl FramePlan {
    /// `total_frames` must be at least 2 so that `total_frames - 1` is a valid divisor.
    pub fn new(total_frames: u64, worker_count: usize) -> CrossfadeResult<Self> {
        if total_frames < 2 {
            return Err(CrossfadeError::validation(format!(
                "total_frames must be >= 2, got {total_frames}"
            )));
        }
        if worker_count == 0 {
            return Err(CrossfadeError::validation("worker_count must be >= 1"));
        }
        Ok(Self {
            total_frames,
            worker_count,
        })
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// The whole animation, `[0, total_frames)`.
    pub fn full_range(&self) -> FrameRange {
        FrameRange {
            start: FrameIndex(0),
            end: FrameIndex(self.total_frames),
        }
    }

    /// Frames owned by `worker`.
    ///
    /// When there are more workers than frames, the workers past the end get an empty range.
    pub fn partition(&self, worker: WorkerId) -> CrossfadeResult<FrameRange> {
        if worker.0 >= self.worker_count {
            return Err(CrossfadeError::validation(format!(
                "worker {} out of range for {} workers",
                worker.0, self.worker_count
            )));
        }
        let base = self.total_frames / self.worker_count as u64;
        let start = (worker.0 as u64).saturating_mul(base);
        if start >= self.total_frames {
            return Ok(FrameRange::empty(FrameIndex(self.total_frames)));
        }
        let end = if worker.0 == self.worker_count - 1 {
            self.total_frames
        } else {
            start + base
        };
        Ok(FrameRange {
            start: FrameIndex(start),
            end: FrameIndex(end),
        })
    }

    /// All partitions in worker order.
    pub fn partitions(&self) -> Vec<(WorkerId, FrameRange)> {
        (0..self.worker_count)
            .map(WorkerId)
            .filter_map(|w| self.partition(w).ok().map(|r| (w, r)))
            .collect()
    }

    /// Interpolation factor for `frame`: `0.0` at the first frame, `1.0` at the last.
    pub fn progress(&self, frame: FrameIndex) -> f32 {
        let denom = (self.total_frames - 1) as f64;
        (frame.0 as f64 / denom) as f32
    }
}

#[cfg(test)]
#[path = "../tests/unit/plan.rs"]
mod tests;
