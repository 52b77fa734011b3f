use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::buffer::ImageBuffer;
use crate::foundation::core::{FrameIndex, WorkerId};
use crate::foundation::error::{CrossfadeError, CrossfadeResult};
use crate::io;

/// Per-worker output container. No two concurrently running workers share one, so their writes
/// never collide and need no locking on the filesystem side.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Namespace of a thread or in-process worker.
    pub fn worker(id: WorkerId) -> Self {
        Self(format!("worker{}", id.0))
    }

    /// Namespace of a distributed rank.
    pub fn rank(id: WorkerId) -> Self {
        Self(format!("rank{}", id.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// File name of a frame, keyed by its global index regardless of which worker produced it.
pub fn frame_file_name(idx: FrameIndex) -> String {
    format!("frame_{:04}.png", idx.0)
}

/// Parse a name produced by [`frame_file_name`].
pub fn parse_frame_file_name(name: &str) -> Option<FrameIndex> {
    let digits = name.strip_prefix("frame_")?.strip_suffix(".png")?;
    if digits.len() < 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(FrameIndex)
}

/// Destination for rendered frames.
///
/// Sinks are shared by every worker of a run, so both calls take `&self`. `prepare` is called once
/// per namespace before its first `write` and must tolerate repeated calls.
pub trait FrameSink: Sync {
    /// Make sure `ns` exists.
    fn prepare(&self, ns: &Namespace) -> CrossfadeResult<()>;

    /// Store one frame.
    fn write(&self, ns: &Namespace, idx: FrameIndex, frame: &ImageBuffer) -> CrossfadeResult<()>;

    /// Filesystem root for sinks that other processes can also write into.
    fn root_dir(&self) -> Option<&Path> {
        None
    }
}

/// Writes `<root>/<namespace>/frame_NNNN.png`.
#[derive(Clone, Debug)]
pub struct PngDirSink {
    root: PathBuf,
}

impl PngDirSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frame_path(&self, ns: &Namespace, idx: FrameIndex) -> PathBuf {
        self.root.join(ns.as_str()).join(frame_file_name(idx))
    }
}

impl FrameSink for PngDirSink {
    fn prepare(&self, ns: &Namespace) -> CrossfadeResult<()> {
        io::ensure_dir(&self.root.join(ns.as_str()))
    }

    fn write(&self, ns: &Namespace, idx: FrameIndex, frame: &ImageBuffer) -> CrossfadeResult<()> {
        io::encode_png(&self.frame_path(ns, idx), frame).map_err(|e| match e {
            CrossfadeError::Encode(msg) => CrossfadeError::encode(format!("frame {idx}: {msg}")),
            other => other,
        })
    }

    fn root_dir(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

/// One frame captured by [`InMemorySink`].
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    pub namespace: Namespace,
    pub index: FrameIndex,
    pub frame: ImageBuffer,
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    prepared: Mutex<Vec<Namespace>>,
    frames: Mutex<Vec<CapturedFrame>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured frames sorted by frame index.
    pub fn frames(&self) -> Vec<CapturedFrame> {
        let mut out = match self.frames.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        out.sort_by_key(|c| c.index);
        out
    }

    /// Namespaces prepared so far, sorted and deduplicated.
    pub fn namespaces(&self) -> Vec<Namespace> {
        let mut out = match self.prepared.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        out.sort();
        out.dedup();
        out
    }
}

impl FrameSink for InMemorySink {
    fn prepare(&self, ns: &Namespace) -> CrossfadeResult<()> {
        self.prepared
            .lock()
            .map_err(|_| CrossfadeError::execution("in-memory sink lock poisoned"))?
            .push(ns.clone());
        Ok(())
    }

    fn write(&self, ns: &Namespace, idx: FrameIndex, frame: &ImageBuffer) -> CrossfadeResult<()> {
        let prepared = self
            .prepared
            .lock()
            .map_err(|_| CrossfadeError::execution("in-memory sink lock poisoned"))?
            .contains(ns);
        if !prepared {
            return Err(CrossfadeError::encode(format!(
                "frame {idx}: namespace '{ns}' was not prepared"
            )));
        }
        self.frames
            .lock()
            .map_err(|_| CrossfadeError::execution("in-memory sink lock poisoned"))?
            .push(CapturedFrame {
                namespace: ns.clone(),
                index: idx,
                frame: frame.clone(),
            });
        Ok(())
    }
}
