use crate::foundation::error::{CrossfadeError, CrossfadeResult};

/// Global 0-based frame index in `[0, total_frames)`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

impl std::fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Worker identity in `[0, worker_count)`: a rank for processes, a slot for threads.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct WorkerId(pub usize);

impl WorkerId {
    /// The worker that loads the source image and seeds every other worker.
    pub const OWNER: WorkerId = WorkerId(0);

    pub fn is_owner(self) -> bool {
        self == Self::OWNER
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open frame range `[start, end)`.
///
/// A worker's share of the animation is one of these (its partition).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRange {
    /// Inclusive range start.
    pub start: FrameIndex,
    /// Exclusive range end.
    pub end: FrameIndex, // exclusive
}

impl FrameRange {
    /// Create a validated range with `start <= end`.
    pub fn new(start: FrameIndex, end: FrameIndex) -> CrossfadeResult<Self> {
        if start.0 > end.0 {
            return Err(CrossfadeError::validation("FrameRange start must be <= end"));
        }
        Ok(Self { start, end })
    }

    /// The empty range anchored at `at`.
    pub fn empty(at: FrameIndex) -> Self {
        Self { start: at, end: at }
    }

    /// Number of frames contained in the range.
    pub fn len_frames(self) -> u64 {
        self.end.0.saturating_sub(self.start.0)
    }

    /// Return `true` when the range has no frames.
    pub fn is_empty(self) -> bool {
        self.start.0 >= self.end.0
    }

    /// Return `true` when `f` is inside `[start, end)`.
    pub fn contains(self, f: FrameIndex) -> bool {
        self.start.0 <= f.0 && f.0 < self.end.0
    }

    /// Iterate the frame indices in increasing order.
    pub fn iter(self) -> impl DoubleEndedIterator<Item = FrameIndex> {
        (self.start.0..self.end.0.max(self.start.0)).map(FrameIndex)
    }
}

impl std::fmt::Display for FrameRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start.0, self.end.0)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
