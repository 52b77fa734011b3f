use std::path::Path;

use anyhow::Context as _;

use crate::backend::{BackendKind, ExecutionBackend};
use crate::buffer::SourceBuffers;
use crate::config::RunConfig;
use crate::foundation::error::CrossfadeResult;
use crate::io;
use crate::report::{ComparisonReport, RunReport};
use crate::sink::PngDirSink;
use crate::verify;

/// Owner-side load: decode the input once and derive its grayscale buffer.
#[tracing::instrument]
pub fn load_sources(path: &Path) -> CrossfadeResult<SourceBuffers> {
    let color = io::decode_rgb8(path)?;
    tracing::info!(width = color.width(), height = color.height(), "source loaded");
    Ok(SourceBuffers::from_color(color))
}

/// Run the configured backend into `<output_root>/<backend>/`.
///
/// Nothing is rendered and no worker is started when the input fails to load.
pub fn run(cfg: &RunConfig) -> CrossfadeResult<RunReport> {
    cfg.validate()?;
    let sources = load_sources(&cfg.input)?;
    let backend = cfg.create_backend(cfg.backend)?;
    run_backend(cfg, backend.as_ref(), &sources)
}

/// Run every backend on the same sources and check that they wrote identical frames.
///
/// Each backend directory is emptied first so frames left by earlier runs do not count.
pub fn compare(cfg: &RunConfig) -> CrossfadeResult<ComparisonReport> {
    cfg.validate()?;
    let sources = load_sources(&cfg.input)?;

    let mut runs = Vec::with_capacity(BackendKind::ALL.len());
    let mut digests = Vec::with_capacity(BackendKind::ALL.len());
    for kind in BackendKind::ALL {
        clear_dir(&cfg.backend_root(kind))?;
        let backend = cfg.create_backend(kind)?;
        runs.push(run_backend(cfg, backend.as_ref(), &sources)?);
        digests.push(verify::collect_frame_digests(
            &cfg.backend_root(kind),
            cfg.total_frames,
        )?);
    }

    let mut frames_compared = 0;
    for (i, kind) in BackendKind::ALL.iter().enumerate().skip(1) {
        frames_compared = verify::compare_digests(
            (BackendKind::ALL[0], &digests[0]),
            (*kind, &digests[i]),
        )?;
    }
    tracing::info!(frames = frames_compared, "backends agree");
    Ok(ComparisonReport {
        runs,
        frames_compared,
    })
}

fn run_backend(
    cfg: &RunConfig,
    backend: &dyn ExecutionBackend,
    sources: &SourceBuffers,
) -> CrossfadeResult<RunReport> {
    let kind = backend.kind();
    let root = cfg.backend_root(kind);
    io::ensure_dir(&root)?;
    let sink = PngDirSink::new(root);

    tracing::info!(backend = %kind, total_frames = cfg.total_frames, "run started");
    let stats = backend.run(sources, cfg.total_frames, &sink)?;
    let report = RunReport::new(kind, stats);
    tracing::info!(
        backend = %kind,
        workers = report.workers,
        frames = report.frames,
        compute_ms = report.compute.as_millis() as u64,
        fps = report.frames_per_second,
        "run finished"
    );
    Ok(report)
}

fn clear_dir(dir: &Path) -> CrossfadeResult<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).with_context(|| format!("clear '{}'", dir.display()))?;
    }
    Ok(())
}
