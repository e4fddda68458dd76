//! # Metrics Aggregation
//!
//! Reduces the full set of per-request outcomes plus the run duration into a
//! [`BenchmarkMetrics`] record: throughput, goodput, and for each latency
//! family (TTFT, TPOT, ITL, end-to-end) the mean, median, standard deviation
//! and a configurable set of percentiles. All reported latencies are in
//! milliseconds; raw outcome values are in seconds.
//!
//! TPOT handling mirrors the measurement convention for streamed decoding: a
//! request that produced at most one token has a TPOT of exactly zero, which
//! participates in goodput evaluation but is excluded from the distribution
//! used for mean/percentile reporting.

use crate::executor::RequestOutcome;
use crate::generator::Tokenizer;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::warn;

const MILLIS_PER_SECOND: f64 = 1000.0;

/// Latency families that can be reported and gated by SLOs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum MetricKind {
    #[clap(name = "ttft")]
    Ttft,
    #[clap(name = "tpot")]
    Tpot,
    #[clap(name = "itl")]
    Itl,
    #[clap(name = "e2el")]
    E2el,
}

impl MetricKind {
    /// Descriptive heading used in the summary banner.
    pub fn title(&self) -> &'static str {
        match self {
            MetricKind::Ttft => "Time to First Token (TTFT)",
            MetricKind::Tpot => "Time per Output Token (TPOT, excl. first)",
            MetricKind::Itl => "Inter-Token Latency (ITL)",
            MetricKind::E2el => "End-to-End Latency (E2EL)",
        }
    }
}

// Display must round-trip through the clap value parser, so it renders the
// short flag names.
impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Ttft => write!(f, "ttft"),
            MetricKind::Tpot => write!(f, "tpot"),
            MetricKind::Itl => write!(f, "itl"),
            MetricKind::E2el => write!(f, "e2el"),
        }
    }
}

/// A percentile point of a latency distribution, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value_ms: f64,
}

/// Central tendency and percentile statistics for one latency family.
///
/// An empty sample set yields zeros rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean_ms: f64,
    pub median_ms: f64,
    pub std_ms: f64,
    pub percentiles: Vec<PercentileValue>,
}

/// Millisecond SLO thresholds for goodput evaluation.
///
/// A request counts as "good" only when every configured threshold holds
/// simultaneously; unset fields do not constrain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GoodputConfig {
    pub ttft_ms: Option<f64>,
    pub tpot_ms: Option<f64>,
    pub e2el_ms: Option<f64>,
}

impl GoodputConfig {
    pub fn is_empty(&self) -> bool {
        self.ttft_ms.is_none() && self.tpot_ms.is_none() && self.e2el_ms.is_none()
    }
}

/// The statistics record for one benchmark run.
///
/// Derived entirely from the outcome list and the run duration; recomputing
/// from the same inputs reproduces the same values bit for bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMetrics {
    pub completed: usize,
    pub total_input_tokens: usize,
    pub total_output_tokens: usize,
    pub request_throughput: f64,
    pub request_goodput: f64,
    pub output_throughput: f64,
    pub total_token_throughput: f64,
    pub ttft: MetricSummary,
    pub tpot: MetricSummary,
    pub itl: MetricSummary,
    pub e2el: MetricSummary,
}

impl BenchmarkMetrics {
    pub fn summary(&self, kind: MetricKind) -> &MetricSummary {
        match kind {
            MetricKind::Ttft => &self.ttft,
            MetricKind::Tpot => &self.tpot,
            MetricKind::Itl => &self.itl,
            MetricKind::E2el => &self.e2el,
        }
    }
}

/// Aggregate outcomes into a metrics record.
///
/// Returns the record plus the actual output length per outcome (zero for
/// failed requests), in outcome order. Completion order carries no meaning;
/// callers must have joined all dispatch tasks before aggregating.
///
/// The tokenizer is consulted only when the executor could not report an
/// output token count directly; without one, the count falls back to the
/// observed inter-token latencies.
pub fn aggregate(
    outcomes: &[RequestOutcome],
    duration_s: f64,
    tokenizer: Option<&dyn Tokenizer>,
    percentiles: &[f64],
    goodput: Option<&GoodputConfig>,
) -> (BenchmarkMetrics, Vec<usize>) {
    let mut actual_output_lens = Vec::with_capacity(outcomes.len());
    let mut total_input = 0usize;
    let mut completed = 0usize;
    let mut ttfts: Vec<f64> = Vec::new();
    let mut tpots: Vec<f64> = Vec::new();
    let mut all_tpots: Vec<f64> = Vec::new();
    let mut itls: Vec<f64> = Vec::new();
    let mut e2els: Vec<f64> = Vec::new();

    for outcome in outcomes {
        if !outcome.success {
            actual_output_lens.push(0);
            continue;
        }

        let output_len = outcome
            .output_tokens
            .unwrap_or_else(|| estimate_output_tokens(outcome, tokenizer));
        actual_output_lens.push(output_len);
        total_input += outcome.prompt_len;

        let mut tpot = 0.0;
        if output_len > 1 {
            tpot = (outcome.latency - outcome.ttft) / (output_len - 1) as f64;
            tpots.push(tpot);
        }
        // Zero TPOT still gates goodput for single-token responses.
        all_tpots.push(tpot);

        itls.extend_from_slice(&outcome.itl);
        ttfts.push(outcome.ttft);
        e2els.push(outcome.latency);
        completed += 1;
    }

    let good_completed = match goodput {
        Some(config) if !config.is_empty() => {
            count_good_requests(config, &ttfts, &all_tpots, &e2els)
        }
        _ => 0,
    };

    if completed == 0 {
        warn!(
            "all {} requests failed; statistics default to zero (check the \
             benchmark arguments and the endpoint)",
            outcomes.len()
        );
    }

    let total_output: usize = actual_output_lens.iter().sum();
    let safe_duration = if duration_s > 0.0 { duration_s } else { f64::MAX };

    let metrics = BenchmarkMetrics {
        completed,
        total_input_tokens: total_input,
        total_output_tokens: total_output,
        request_throughput: completed as f64 / safe_duration,
        request_goodput: good_completed as f64 / safe_duration,
        output_throughput: total_output as f64 / safe_duration,
        total_token_throughput: (total_input + total_output) as f64 / safe_duration,
        ttft: summarize(&ttfts, percentiles),
        tpot: summarize(&tpots, percentiles),
        itl: summarize(&itls, percentiles),
        e2el: summarize(&e2els, percentiles),
    };

    (metrics, actual_output_lens)
}

/// Count requests meeting *all* configured SLO thresholds.
///
/// The per-request vectors are aligned: index i of each refers to the i-th
/// completed request.
fn count_good_requests(
    config: &GoodputConfig,
    ttfts: &[f64],
    all_tpots: &[f64],
    e2els: &[f64],
) -> usize {
    let mut good = 0;
    for i in 0..ttfts.len() {
        let mut is_good = true;
        if let Some(threshold_ms) = config.ttft_ms {
            is_good &= ttfts[i] <= threshold_ms / MILLIS_PER_SECOND;
        }
        if let Some(threshold_ms) = config.tpot_ms {
            is_good &= all_tpots[i] <= threshold_ms / MILLIS_PER_SECOND;
        }
        if let Some(threshold_ms) = config.e2el_ms {
            is_good &= e2els[i] <= threshold_ms / MILLIS_PER_SECOND;
        }
        if is_good {
            good += 1;
        }
    }
    good
}

/// Estimate the output token count for outcomes where the executor could not
/// report one.
fn estimate_output_tokens(outcome: &RequestOutcome, tokenizer: Option<&dyn Tokenizer>) -> usize {
    match tokenizer {
        Some(tokenizer) => tokenizer.encode(&outcome.generated_text).len(),
        None if outcome.generated_text.is_empty() => 0,
        // One ITL entry per token after the first.
        None => outcome.itl.len() + 1,
    }
}

/// Output (or total-token) throughput normalized by the concurrency cap.
pub fn per_concurrency_throughput(throughput: f64, concurrency: usize) -> f64 {
    if concurrency == 0 {
        0.0
    } else {
        throughput / concurrency as f64
    }
}

/// `completed` as a percentage of `total`; 0 when nothing was dispatched.
pub fn success_rate(completed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64 * 100.0
    }
}

/// Reduce a sample set (seconds) into millisecond statistics.
fn summarize(samples: &[f64], percentiles: &[f64]) -> MetricSummary {
    MetricSummary {
        mean_ms: mean(samples) * MILLIS_PER_SECOND,
        median_ms: median(samples) * MILLIS_PER_SECOND,
        std_ms: std_dev(samples) * MILLIS_PER_SECOND,
        percentiles: percentiles
            .iter()
            .map(|&p| PercentileValue {
                percentile: p,
                value_ms: percentile(samples, p) * MILLIS_PER_SECOND,
            })
            .collect(),
    }
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

fn median(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Population standard deviation.
fn std_dev(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let m = mean(samples);
    let variance = samples.iter().map(|s| (s - m).powi(2)).sum::<f64>() / samples.len() as f64;
    variance.sqrt()
}

/// Nearest-rank percentile over the sorted samples.
fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let index = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}
