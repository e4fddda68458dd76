//! # Benchmark Orchestrator
//!
//! Drives the complete lifecycle of one benchmark run:
//!
//! 1. **Validation**: arrival parameters and the descriptor set are checked
//!    before anything is dispatched.
//! 2. **Smoke test**: a single trial request must succeed or the run aborts,
//!    since the remaining requests would fail the same way.
//! 3. **Dispatch**: the remaining descriptors are released by the arrival
//!    scheduler and executed concurrently, bounded by the concurrency
//!    limiter, each wrapped in the retry policy.
//! 4. **Aggregation**: once every dispatch task has been joined, the outcome
//!    set and the measured wall-clock duration are reduced into metrics.
//!
//! A [`CancellationToken`] threads through the scheduler and every dispatch
//! task; cancelling it stops new releases and resolves in-flight slots to
//! failed outcomes so the run still produces a (partial) report.

use crate::error::BenchmarkError;
use crate::executor::{RequestDescriptor, RequestExecutor, RequestOutcome};
use crate::generator::Tokenizer;
use crate::metrics::{self, BenchmarkMetrics, GoodputConfig};
use crate::retry::RetryPolicy;
use crate::scheduler::{pace_requests, ArrivalSpec, ConcurrencyLimiter};
use futures_util::future::join_all;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Parameters controlling one benchmark run.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Arrival process for the paced dispatch phase.
    pub arrival: ArrivalSpec,
    /// Ceiling on simultaneously in-flight requests; `None` is unlimited.
    pub max_concurrency: Option<usize>,
    /// Attempt ceiling per request (initial call included).
    pub max_attempts: usize,
    /// Delay between retry attempts.
    pub retry_delay: Duration,
    /// Percentile points reported for each latency family.
    pub percentiles: Vec<f64>,
    /// SLO thresholds for goodput, when configured.
    pub goodput: Option<GoodputConfig>,
    /// Toggle server-side profiling around the run.
    pub profile: bool,
    /// Service base URL, used for the profile hooks.
    pub base_url: String,
    /// LoRA module names assigned to descriptors round-robin at random.
    pub lora_modules: Vec<String>,
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct BenchmarkRun {
    pub metrics: BenchmarkMetrics,
    pub outcomes: Vec<RequestOutcome>,
    /// Wall-clock duration of the paced dispatch phase, in seconds.
    pub duration_s: f64,
    /// Actual output length per outcome, zero for failures.
    pub output_lens: Vec<usize>,
}

/// Orchestrates a run against one executor.
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
    executor: Arc<dyn RequestExecutor>,
    cancel: CancellationToken,
}

impl BenchmarkRunner {
    pub fn new(config: BenchmarkConfig, executor: Arc<dyn RequestExecutor>) -> Self {
        Self {
            config,
            executor,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts the run when cancelled (e.g. from a ctrl-c handler).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the full benchmark lifecycle.
    ///
    /// The first descriptor is consumed by the smoke test; the remaining ones
    /// are paced through the arrival scheduler. Fails fast with a
    /// [`BenchmarkError`] on invalid configuration or a failed smoke test;
    /// per-request failures afterwards are folded into the outcome set.
    pub async fn run(
        &self,
        mut descriptors: Vec<RequestDescriptor>,
        tokenizer: Option<Arc<dyn Tokenizer>>,
    ) -> Result<BenchmarkRun, BenchmarkError> {
        self.config.arrival.validate()?;
        if descriptors.is_empty() {
            return Err(BenchmarkError::Configuration(
                "no request descriptors to dispatch".to_string(),
            ));
        }

        if !self.config.lora_modules.is_empty() {
            let mut rng = rand::thread_rng();
            for descriptor in &mut descriptors {
                // choose() is only None for an empty slice.
                descriptor.model_override = self
                    .config
                    .lora_modules
                    .choose(&mut rng)
                    .cloned();
            }
        }

        let smoke = descriptors.remove(0);
        self.smoke_test(&smoke).await?;

        if self.config.profile {
            self.toggle_profile("start_profile", &smoke).await;
        }

        info!(
            "dispatching {} requests (rate: {}, burstiness: {}, max concurrency: {})",
            descriptors.len(),
            if self.config.arrival.is_unbounded() {
                "unbounded".to_string()
            } else {
                format!("{}/s", self.config.arrival.rate)
            },
            self.config.arrival.burstiness,
            self.config
                .max_concurrency
                .map_or("unlimited".to_string(), |n| n.to_string()),
        );

        let retry = RetryPolicy::new(
            self.executor.clone(),
            self.config.max_attempts,
            self.config.retry_delay,
        );
        let limiter = ConcurrencyLimiter::new(self.config.max_concurrency);

        let started = Instant::now();
        let mut rx = pace_requests(descriptors, &self.config.arrival, self.cancel.clone())?;

        let mut handles: Vec<JoinHandle<RequestOutcome>> = Vec::new();
        while let Some(descriptor) = rx.recv().await {
            let retry = retry.clone();
            let limiter = limiter.clone();
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        RequestOutcome::failure(descriptor.prompt_len, "benchmark cancelled")
                    }
                    outcome = async {
                        let _permit = limiter.acquire().await;
                        retry.execute(&descriptor).await
                    } => outcome,
                }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    warn!("dispatch task panicked: {}", err);
                    outcomes.push(RequestOutcome::failure(0, format!("task failure: {}", err)));
                }
            }
        }
        let duration_s = started.elapsed().as_secs_f64();

        if self.config.profile {
            self.toggle_profile("stop_profile", &smoke).await;
        }

        let (metrics, output_lens) = metrics::aggregate(
            &outcomes,
            duration_s,
            tokenizer.as_deref(),
            &self.config.percentiles,
            self.config.goodput.as_ref(),
        );

        info!(
            "run finished: {}/{} requests succeeded in {:.2}s",
            metrics.completed,
            outcomes.len(),
            duration_s
        );

        Ok(BenchmarkRun {
            metrics,
            outcomes,
            duration_s,
            output_lens,
        })
    }

    /// Single trial request gating the rest of the run.
    async fn smoke_test(&self, descriptor: &RequestDescriptor) -> Result<(), BenchmarkError> {
        info!("running initial single-request trial");
        match self.executor.execute(descriptor).await {
            Ok(outcome) if outcome.success => Ok(()),
            Ok(outcome) => Err(BenchmarkError::SmokeTest(
                outcome
                    .error
                    .unwrap_or_else(|| "request reported failure".to_string()),
            )),
            Err(err) => Err(BenchmarkError::SmokeTest(err.to_string())),
        }
    }

    /// Fire a profile hook; failures are logged and otherwise ignored.
    async fn toggle_profile(&self, endpoint: &str, descriptor: &RequestDescriptor) {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);
        info!("toggling server-side profiling via {}", url);
        if let Err(err) = self.executor.toggle_profile(&url, descriptor).await {
            warn!("profile hook {} failed: {}", url, err);
        }
    }
}
