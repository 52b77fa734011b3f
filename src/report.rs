use std::time::Duration;

use crate::backend::{BackendKind, RunStats};
use crate::foundation::error::{CrossfadeError, CrossfadeResult};

/// Timing of one backend run, reported once by the owner after every worker finished.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RunReport {
    pub backend: BackendKind,
    pub workers: usize,
    pub frames: u64,
    /// Compute phase only; loading and replication are not included.
    #[serde(rename = "compute_seconds", serialize_with = "serialize_secs")]
    pub compute: Duration,
    /// `0.0` when the compute phase was too short to measure.
    pub frames_per_second: f64,
}

impl RunReport {
    pub fn new(backend: BackendKind, stats: RunStats) -> Self {
        Self {
            backend,
            workers: stats.workers,
            frames: stats.frames_written,
            compute: stats.compute,
            frames_per_second: throughput(stats.frames_written, stats.compute),
        }
    }
}

fn throughput(frames: u64, compute: Duration) -> f64 {
    let secs = compute.as_secs_f64();
    if secs > 0.0 { frames as f64 / secs } else { 0.0 }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (P={}): {} frames in {:.3} s",
            self.backend.label(),
            self.workers,
            self.frames,
            self.compute.as_secs_f64()
        )
    }
}

/// Outcome of `compare`: one report per backend plus how many frames matched across all of them.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ComparisonReport {
    pub runs: Vec<RunReport>,
    pub frames_compared: u64,
}

impl std::fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for run in &self.runs {
            writeln!(f, "{run}")?;
        }
        write!(
            f,
            "{} frames identical across {} backends",
            self.frames_compared,
            self.runs.len()
        )
    }
}

pub fn to_json<T: serde::Serialize>(report: &T) -> CrossfadeResult<String> {
    serde_json::to_string_pretty(report)
        .map_err(|e| CrossfadeError::execution(format!("serialize report: {e}")))
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        RunReport::new(
            BackendKind::Shared,
            RunStats {
                workers: 4,
                frames_written: 96,
                compute: Duration::from_millis(1500),
            },
        )
    }

    #[test]
    fn display_is_one_line_summary() {
        assert_eq!(report().to_string(), "Shared-memory (P=4): 96 frames in 1.500 s");
    }

    #[test]
    fn json_uses_seconds() {
        let v: serde_json::Value = serde_json::from_str(&to_json(&report()).unwrap()).unwrap();
        assert_eq!(v["backend"], "shared");
        assert_eq!(v["workers"], 4);
        assert_eq!(v["frames"], 96);
        assert_eq!(v["compute_seconds"], 1.5);
        assert_eq!(v["frames_per_second"], 64.0);
    }

    #[test]
    fn throughput_handles_zero_duration() {
        assert_eq!(report().frames_per_second, 64.0);
        let instant = RunReport::new(
            BackendKind::Sequential,
            RunStats {
                workers: 1,
                frames_written: 96,
                compute: Duration::ZERO,
            },
        );
        assert_eq!(instant.frames_per_second, 0.0);
    }
}
