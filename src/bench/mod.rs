//! Concurrent connection benchmark
//!
//! `run` fans out `k` independent attempts as separate tasks. Each task
//! waits at a shared start barrier, times exactly one
//! [`ConnectionFactory::open`] call and returns its own result; the
//! engine joins the tasks in spawn order, so result `i` always belongs to
//! attempt `i`. No state is shared between attempts.

pub mod report;

use crate::config::ConnectionParameters;
use crate::connection::{Connection, ConnectionFactory};
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;
use tokio::time::Instant;
use tracing::{debug, debug_span, error, info, warn, Instrument};

pub use report::{AttemptRecord, BenchmarkReport, LatencyStats, ResultAggregator};

/// Outcome of one timed connection attempt
pub struct AttemptResult {
    pub index: usize,
    /// Time from just before `open` to just after it returned
    pub latency: Duration,
    pub outcome: Result<Box<dyn Connection>>,
}

impl AttemptResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }

    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }
}

impl std::fmt::Debug for AttemptResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptResult")
            .field("index", &self.index)
            .field("latency", &self.latency)
            .field("outcome", &self.outcome.as_ref().map(|_| "connected"))
            .finish()
    }
}

pub struct BenchmarkEngine {
    factory: Arc<ConnectionFactory>,
    attempt_timeout: Option<Duration>,
}

impl BenchmarkEngine {
    pub fn new(factory: Arc<ConnectionFactory>) -> Self {
        Self {
            factory,
            attempt_timeout: None,
        }
    }

    /// Bound each attempt. Unbounded by default: a hung connect then
    /// blocks `run` indefinitely.
    pub fn with_attempt_timeout(mut self, attempt_timeout: Option<Duration>) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Run `concurrency` simultaneous attempts and wait for all of them.
    ///
    /// Always returns exactly `concurrency` results, in attempt order.
    pub async fn run(&self, params: &ConnectionParameters, concurrency: usize) -> Vec<AttemptResult> {
        if concurrency == 0 {
            return Vec::new();
        }

        debug!(
            "Starting {} {} attempts against {}",
            concurrency,
            params.pooling(),
            params.endpoint()
        );

        self.factory.reserve(params, concurrency);

        let barrier = Arc::new(Barrier::new(concurrency));
        let handles: Vec<_> = (0..concurrency)
            .map(|index| {
                let factory = Arc::clone(&self.factory);
                let params = params.clone();
                let barrier = Arc::clone(&barrier);
                let timeout = self.attempt_timeout;
                tokio::spawn(
                    async move {
                        barrier.wait().await;
                        timed_attempt(&factory, &params, timeout).await
                    }
                    .instrument(debug_span!("attempt", index)),
                )
            })
            .collect();

        let mut results = Vec::with_capacity(concurrency);
        for (index, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok((latency, outcome)) => AttemptResult {
                    index,
                    latency,
                    outcome,
                },
                Err(e) => AttemptResult {
                    index,
                    latency: Duration::ZERO,
                    outcome: Err(Error::ConnectFailure(format!("Attempt task aborted: {}", e))),
                },
            };

            match &result.outcome {
                Ok(_) => debug!(attempt = index, "Connected in {:.2}ms", result.latency_ms()),
                Err(e) => error!(attempt = index, "Connection attempt failed: {}", e),
            }
            results.push(result);
        }

        let successes = results.iter().filter(|result| result.is_success()).count();
        info!(
            "Finished {} attempts: {} succeeded, {} failed",
            concurrency,
            successes,
            concurrency - successes
        );
        results
    }

    /// Close every live connection held by `results`.
    ///
    /// Returns the number of connections that failed to close cleanly.
    pub async fn release(results: Vec<AttemptResult>) -> usize {
        let closes = results
            .into_iter()
            .filter_map(|result| result.outcome.ok())
            .map(|connection| connection.close());

        let mut failures = 0;
        for outcome in futures::future::join_all(closes).await {
            if let Err(e) = outcome {
                warn!("Failed to close connection: {}", e);
                failures += 1;
            }
        }
        failures
    }
}

async fn timed_attempt(
    factory: &ConnectionFactory,
    params: &ConnectionParameters,
    timeout: Option<Duration>,
) -> (Duration, Result<Box<dyn Connection>>) {
    let start = Instant::now();
    let outcome = match timeout {
        None => factory.open(params).await,
        Some(limit) => match tokio::time::timeout(limit, factory.open(params)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Timeout(format!("No connection after {:?}", limit))),
        },
    };
    (start.elapsed(), outcome)
}
