//! Benchmark result aggregation

use super::AttemptResult;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Per-attempt line of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub index: usize,
    pub latency_ms: f64,
    pub success: bool,
    pub error: Option<String>,
}

/// Spread of successful latencies; all zero when nothing succeeded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub attempts: Vec<AttemptRecord>,
    pub successes: usize,
    pub failures: usize,
    /// Mean latency of successful attempts, 0 when none succeeded
    pub average_ms: f64,
    /// Wall-clock time of the whole run as measured by the caller
    pub total_ms: u64,
    pub stats: LatencyStats,
}

impl BenchmarkReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for attempt in &self.attempts {
            match &attempt.error {
                None => writeln!(f, "Attempt {:>4}: connected in {:.2}ms", attempt.index, attempt.latency_ms)?,
                Some(error) => writeln!(
                    f,
                    "Attempt {:>4}: failed after {:.2}ms ({})",
                    attempt.index, attempt.latency_ms, error
                )?,
            }
        }
        writeln!(
            f,
            "Connected all the threads, Average connect time = {:.2}ms, Total time to connect all threads = {}ms",
            self.average_ms, self.total_ms
        )?;
        write!(
            f,
            "{} attempts, {} succeeded, {} failed (min {:.2}ms, p50 {:.2}ms, p95 {:.2}ms, max {:.2}ms)",
            self.attempts.len(),
            self.successes,
            self.failures,
            self.stats.min_ms,
            self.stats.p50_ms,
            self.stats.p95_ms,
            self.stats.max_ms
        )
    }
}

/// Reduces attempt results to a [`BenchmarkReport`]
pub struct ResultAggregator;

impl ResultAggregator {
    /// Summarize `results`. `elapsed` is the caller-measured wall time of
    /// the whole run; attempts overlap, so it is not a sum of latencies.
    pub fn summarize(results: &[AttemptResult], elapsed: Duration) -> BenchmarkReport {
        let attempts: Vec<AttemptRecord> = results
            .iter()
            .map(|result| AttemptRecord {
                index: result.index,
                latency_ms: result.latency_ms(),
                success: result.is_success(),
                error: result.error().map(ToString::to_string),
            })
            .collect();

        let mut samples: Vec<f64> = attempts
            .iter()
            .filter(|attempt| attempt.success)
            .map(|attempt| attempt.latency_ms)
            .collect();
        samples.sort_by(f64::total_cmp);

        let successes = samples.len();
        let average_ms = if successes == 0 {
            0.0
        } else {
            samples.iter().sum::<f64>() / successes as f64
        };

        BenchmarkReport {
            failures: attempts.len() - successes,
            successes,
            attempts,
            average_ms,
            total_ms: elapsed.as_millis() as u64,
            stats: latency_stats(&samples),
        }
    }
}

fn latency_stats(sorted: &[f64]) -> LatencyStats {
    match (sorted.first(), sorted.last()) {
        (Some(&min_ms), Some(&max_ms)) => LatencyStats {
            min_ms,
            max_ms,
            p50_ms: percentile(sorted, 50.0),
            p95_ms: percentile(sorted, 95.0),
        },
        _ => LatencyStats::default(),
    }
}

/// Nearest-rank percentile of a non-empty sorted slice
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
