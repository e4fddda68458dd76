//! # Report Assembly and Output
//!
//! Folds a finished [`BenchmarkRun`](crate::benchmark::BenchmarkRun) plus the
//! run configuration into a serializable [`BenchmarkReport`]: aggregate
//! metrics, per-request raw arrays for offline analysis, and enough system
//! information to reproduce the run. The report serializes to pretty JSON and
//! also renders as a human-readable summary banner on the log.

use crate::benchmark::{BenchmarkConfig, BenchmarkRun};
use crate::metrics::{self, MetricKind, MetricSummary};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Complete record of one benchmark run.
///
/// `request_rate` is kept as a string so an unbounded rate survives the JSON
/// round trip (`f64::INFINITY` is not representable in JSON numbers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub run_id: String,
    pub date: chrono::DateTime<chrono::Utc>,
    pub backend: String,
    pub model_id: String,
    pub num_prompts: usize,
    pub request_rate: String,
    pub burstiness: f64,
    pub max_concurrency: Option<usize>,
    pub duration_s: f64,

    pub completed: usize,
    pub total_requests: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub failure_rate: f64,

    pub total_input_tokens: usize,
    pub total_output_tokens: usize,
    pub request_throughput: f64,
    pub request_goodput: Option<f64>,
    pub output_throughput: f64,
    pub total_token_throughput: f64,
    pub output_throughput_per_concurrency: Option<f64>,
    pub total_token_throughput_per_concurrency: Option<f64>,

    pub ttft: MetricSummary,
    pub tpot: MetricSummary,
    pub itl: MetricSummary,
    pub e2el: MetricSummary,

    pub input_lens: Vec<usize>,
    pub output_lens: Vec<usize>,
    pub ttfts: Vec<f64>,
    pub itls: Vec<Vec<f64>>,
    pub generated_texts: Vec<String>,
    pub errors: Vec<Option<String>>,

    pub system_info: SystemInfo,
}

/// Host details recorded for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub benchmark_version: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            benchmark_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl BenchmarkReport {
    /// Assemble a report from a finished run.
    ///
    /// `num_prompts` is the originally generated prompt count (the trial
    /// request included), while the per-request arrays cover only the paced
    /// dispatch phase.
    pub fn new(
        backend: impl Into<String>,
        model_id: impl Into<String>,
        config: &BenchmarkConfig,
        run: &BenchmarkRun,
        num_prompts: usize,
    ) -> Self {
        let total = run.outcomes.len();
        let completed = run.metrics.completed;
        let failed = total - completed;

        let request_rate = if config.arrival.is_unbounded() {
            "inf".to_string()
        } else {
            config.arrival.rate.to_string()
        };

        let per_concurrency = |throughput: f64| {
            config
                .max_concurrency
                .map(|n| metrics::per_concurrency_throughput(throughput, n))
        };

        Self {
            run_id: Uuid::new_v4().to_string(),
            date: chrono::Utc::now(),
            backend: backend.into(),
            model_id: model_id.into(),
            num_prompts,
            request_rate,
            burstiness: config.arrival.burstiness,
            max_concurrency: config.max_concurrency,
            duration_s: run.duration_s,
            completed,
            total_requests: total,
            failed,
            success_rate: metrics::success_rate(completed, total),
            failure_rate: metrics::success_rate(failed, total),
            total_input_tokens: run.metrics.total_input_tokens,
            total_output_tokens: run.metrics.total_output_tokens,
            request_throughput: run.metrics.request_throughput,
            request_goodput: config
                .goodput
                .filter(|g| !g.is_empty())
                .map(|_| run.metrics.request_goodput),
            output_throughput: run.metrics.output_throughput,
            total_token_throughput: run.metrics.total_token_throughput,
            output_throughput_per_concurrency: per_concurrency(run.metrics.output_throughput),
            total_token_throughput_per_concurrency: per_concurrency(
                run.metrics.total_token_throughput,
            ),
            ttft: run.metrics.ttft.clone(),
            tpot: run.metrics.tpot.clone(),
            itl: run.metrics.itl.clone(),
            e2el: run.metrics.e2el.clone(),
            input_lens: run.outcomes.iter().map(|o| o.prompt_len).collect(),
            output_lens: run.output_lens.clone(),
            ttfts: run.outcomes.iter().map(|o| o.ttft).collect(),
            itls: run.outcomes.iter().map(|o| o.itl.clone()).collect(),
            generated_texts: run
                .outcomes
                .iter()
                .map(|o| o.generated_text.clone())
                .collect(),
            errors: run.outcomes.iter().map(|o| o.error.clone()).collect(),
            system_info: SystemInfo::collect(),
        }
    }

    /// Write the report as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serializing benchmark report")?;
        std::fs::write(path, json)
            .with_context(|| format!("writing benchmark report to {:?}", path))?;
        info!("results written to {:?}", path);
        Ok(())
    }

    /// Render the summary banner, with percentile blocks for the selected
    /// latency families.
    pub fn log_summary(&self, selected: &[MetricKind]) {
        info!("{:=^60}", " Serving Benchmark Result ");
        info!("{:<42}{:>18}", "Successful requests:", self.completed);
        info!("{:<42}{:>18}", "Failed requests:", self.failed);
        info!(
            "{:<42}{:>18.2}",
            "Benchmark duration (s):", self.duration_s
        );
        info!(
            "{:<42}{:>18}",
            "Total input tokens:", self.total_input_tokens
        );
        info!(
            "{:<42}{:>18}",
            "Total generated tokens:", self.total_output_tokens
        );
        info!(
            "{:<42}{:>18.2}",
            "Request throughput (req/s):", self.request_throughput
        );
        if let Some(goodput) = self.request_goodput {
            info!("{:<42}{:>18.2}", "Request goodput (req/s):", goodput);
        }
        info!(
            "{:<42}{:>18.2}",
            "Output token throughput (tok/s):", self.output_throughput
        );
        info!(
            "{:<42}{:>18.2}",
            "Total token throughput (tok/s):", self.total_token_throughput
        );
        if let Some(per) = self.output_throughput_per_concurrency {
            info!(
                "{:<42}{:>18.2}",
                "Output throughput per concurrency (tok/s):", per
            );
        }

        for kind in selected {
            let summary = self.summary(*kind);
            info!("{:-^60}", format!(" {} ", kind.title()));
            info!("{:<42}{:>18.2}", "Mean (ms):", summary.mean_ms);
            info!("{:<42}{:>18.2}", "Median (ms):", summary.median_ms);
            info!("{:<42}{:>18.2}", "Std (ms):", summary.std_ms);
            for point in &summary.percentiles {
                info!(
                    "{:<42}{:>18.2}",
                    format!("P{} (ms):", point.percentile),
                    point.value_ms
                );
            }
        }
        info!("{:=^60}", "");
    }

    fn summary(&self, kind: MetricKind) -> &MetricSummary {
        match kind {
            MetricKind::Ttft => &self.ttft,
            MetricKind::Tpot => &self.tpot,
            MetricKind::Itl => &self.itl,
            MetricKind::E2el => &self.e2el,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::BenchmarkConfig;
    use crate::executor::RequestOutcome;
    use crate::metrics::aggregate;
    use crate::scheduler::ArrivalSpec;
    use std::time::Duration;

    fn run_fixture() -> BenchmarkRun {
        let outcomes = vec![
            RequestOutcome {
                success: true,
                generated_text: "a b c".to_string(),
                prompt_len: 10,
                output_tokens: Some(3),
                latency: 0.3,
                ttft: 0.1,
                itl: vec![0.1, 0.1],
                error: None,
            },
            RequestOutcome::failure(12, "HTTP error: 500, oops"),
        ];
        let (metrics, output_lens) = aggregate(&outcomes, 2.0, None, &[99.0], None);
        BenchmarkRun {
            metrics,
            outcomes,
            duration_s: 2.0,
            output_lens,
        }
    }

    fn config_fixture(rate: f64) -> BenchmarkConfig {
        BenchmarkConfig {
            arrival: ArrivalSpec {
                rate,
                burstiness: 1.0,
            },
            max_concurrency: Some(4),
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            percentiles: vec![99.0],
            goodput: None,
            profile: false,
            base_url: "http://localhost:8000".to_string(),
            lora_modules: Vec::new(),
        }
    }

    #[test]
    fn test_report_counts_and_rates() {
        let report = BenchmarkReport::new(
            "openai",
            "test-model",
            &config_fixture(5.0),
            &run_fixture(),
            3,
        );
        assert_eq!(report.total_requests, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.success_rate, 50.0);
        assert_eq!(report.failure_rate, 50.0);
        assert_eq!(report.request_rate, "5");
        assert_eq!(report.errors[1].as_deref(), Some("HTTP error: 500, oops"));
        // Per-concurrency throughput divides by the cap.
        assert_eq!(
            report.output_throughput_per_concurrency,
            Some(report.output_throughput / 4.0)
        );
    }

    #[test]
    fn test_unbounded_rate_serializes_as_inf() {
        let mut config = config_fixture(1.0);
        config.arrival = ArrivalSpec::unbounded();
        let report =
            BenchmarkReport::new("openai", "test-model", &config, &run_fixture(), 3);
        assert_eq!(report.request_rate, "inf");

        let json = serde_json::to_string(&report).unwrap();
        let parsed: BenchmarkReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.request_rate, "inf");
    }

    #[test]
    fn test_save_writes_parseable_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = BenchmarkReport::new(
            "openai",
            "test-model",
            &config_fixture(5.0),
            &run_fixture(),
            3,
        );
        report.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: BenchmarkReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.completed, report.completed);
        assert_eq!(parsed.run_id, report.run_id);
        assert_eq!(parsed.output_lens, vec![3, 0]);
    }

    #[test]
    fn test_goodput_omitted_when_not_configured() {
        let report = BenchmarkReport::new(
            "openai",
            "test-model",
            &config_fixture(5.0),
            &run_fixture(),
            3,
        );
        assert!(report.request_goodput.is_none());
    }
}
