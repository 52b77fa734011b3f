//! Cross-backend output checks over what the sinks left on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use sha2::Digest as _;

use crate::backend::BackendKind;
use crate::buffer::ImageBuffer;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{CrossfadeError, CrossfadeResult};
use crate::io;
use crate::sink::parse_frame_file_name;

/// SHA-256 of every frame, keyed by global index.
pub type FrameDigests = BTreeMap<FrameIndex, String>;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = sha2::Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Digest of a frame's dimensions and samples. Encoder settings do not affect it.
pub fn frame_digest(frame: &ImageBuffer) -> String {
    let mut bytes = Vec::with_capacity(8 + frame.as_bytes().len());
    bytes.extend_from_slice(&frame.width().to_le_bytes());
    bytes.extend_from_slice(&frame.height().to_le_bytes());
    bytes.extend_from_slice(frame.as_bytes());
    sha256_hex(&bytes)
}

/// Decode every `frame_NNNN.png` in every namespace under `backend_root`.
///
/// Fails unless frames `[0, total_frames)` are each present exactly once across all namespaces.
#[tracing::instrument(skip(backend_root), fields(root = %backend_root.display()))]
pub fn collect_frame_digests(
    backend_root: &Path,
    total_frames: u64,
) -> CrossfadeResult<FrameDigests> {
    let mut seen: BTreeMap<FrameIndex, (PathBuf, String)> = BTreeMap::new();
    for ns_dir in sorted_entries(backend_root)? {
        if !ns_dir.is_dir() {
            continue;
        }
        for file in sorted_entries(&ns_dir)? {
            let Some(idx) = file
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_frame_file_name)
            else {
                continue;
            };
            if idx.0 >= total_frames {
                return Err(CrossfadeError::execution(format!(
                    "'{}' is outside [0, {total_frames})",
                    file.display()
                )));
            }
            if let Some((first, _)) = seen.get(&idx) {
                return Err(CrossfadeError::execution(format!(
                    "frame {idx} written twice: '{}' and '{}'",
                    first.display(),
                    file.display()
                )));
            }
            let digest = frame_digest(&io::decode_rgb8(&file)?);
            seen.insert(idx, (file, digest));
        }
    }

    if let Some(missing) = (0..total_frames)
        .map(FrameIndex)
        .find(|idx| !seen.contains_key(idx))
    {
        return Err(CrossfadeError::execution(format!(
            "frame {missing} missing under '{}' ({} of {total_frames} present)",
            backend_root.display(),
            seen.len()
        )));
    }
    Ok(seen.into_iter().map(|(idx, (_, d))| (idx, d)).collect())
}

/// Returns the number of frames compared. Fails on the first frame whose digests differ.
pub fn compare_digests(
    reference: (BackendKind, &FrameDigests),
    candidate: (BackendKind, &FrameDigests),
) -> CrossfadeResult<u64> {
    let (ref_kind, ref_digests) = reference;
    let (cand_kind, cand_digests) = candidate;
    if ref_digests.len() != cand_digests.len() {
        return Err(CrossfadeError::execution(format!(
            "{ref_kind} produced {} frames but {cand_kind} produced {}",
            ref_digests.len(),
            cand_digests.len()
        )));
    }
    for (idx, expected) in ref_digests {
        match cand_digests.get(idx) {
            Some(got) if got == expected => {}
            Some(_) => {
                return Err(CrossfadeError::execution(format!(
                    "frame {idx} differs between {ref_kind} and {cand_kind}"
                )));
            }
            None => {
                return Err(CrossfadeError::execution(format!(
                    "frame {idx} missing from {cand_kind}"
                )));
            }
        }
    }
    Ok(ref_digests.len() as u64)
}

fn sorted_entries(dir: &Path) -> CrossfadeResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read '{}'", dir.display()))? {
        let entry = entry.with_context(|| format!("read '{}'", dir.display()))?;
        out.push(entry.path());
    }
    out.sort();
    Ok(out)
}
