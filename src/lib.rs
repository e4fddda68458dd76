//! # LLM Serving Benchmark Library
//!
//! A benchmarking client for streaming LLM text generation services. The
//! library measures per-token latency and aggregate throughput of
//! OpenAI-compatible completion endpoints (vLLM included) under a
//! configurable open-loop workload.
//!
//! ## Measured Metrics
//!
//! - **TTFT**: time to first token, per request
//! - **TPOT**: time per output token after the first
//! - **ITL**: inter-token latency between consecutive stream frames
//! - **E2EL**: end-to-end request latency
//! - **Throughput**: requests, output tokens, and total tokens per second
//! - **Goodput**: requests per second meeting all configured SLO thresholds
//!
//! ## Architecture Overview
//!
//! The library is organized into several key modules:
//!
//! - `generator`: synthetic prompt and request descriptor generation
//! - `scheduler`: Gamma-paced arrival process and concurrency limiting
//! - `executor`: streaming HTTP execution with per-token timing
//! - `retry`: bounded retry policy for transport-level failures
//! - `benchmark`: run orchestration from smoke test to aggregation
//! - `metrics`: statistical reduction of per-request outcomes
//! - `results`: JSON report assembly and summary output
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use llm_benchmark::benchmark::{BenchmarkConfig, BenchmarkRunner};
//! use llm_benchmark::executor::OpenAiExecutor;
//! use llm_benchmark::generator::{sample_random_requests, SyntheticTokenizer};
//! use llm_benchmark::scheduler::ArrivalSpec;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tokenizer = SyntheticTokenizer::default();
//!     let descriptors = sample_random_requests(0, 50, 128, 20, 1.0, &tokenizer)?;
//!
//!     let executor = OpenAiExecutor::new(
//!         reqwest::Client::new(),
//!         "http://localhost:8000/v1/completions",
//!         "test-model",
//!     );
//!     let config = BenchmarkConfig {
//!         arrival: ArrivalSpec { rate: 5.0, burstiness: 1.0 },
//!         max_concurrency: Some(4),
//!         max_attempts: 3,
//!         retry_delay: Duration::from_secs(1),
//!         percentiles: vec![99.0],
//!         goodput: None,
//!         profile: false,
//!         base_url: "http://localhost:8000".to_string(),
//!         lora_modules: Vec::new(),
//!     };
//!
//!     let runner = BenchmarkRunner::new(config, Arc::new(executor));
//!     let run = runner.run(descriptors, Some(Arc::new(tokenizer))).await?;
//!     println!("mean TTFT: {:.2} ms", run.metrics.ttft.mean_ms);
//!     Ok(())
//! }
//! ```

pub mod benchmark;
pub mod cli;
pub mod error;
pub mod executor;
pub mod generator;
pub mod logging;
pub mod metrics;
pub mod results;
pub mod retry;
pub mod scheduler;

pub use benchmark::{BenchmarkConfig, BenchmarkRun, BenchmarkRunner};
pub use cli::{Args, Backend};
pub use error::{BenchmarkError, TransportError};
pub use executor::{OpenAiExecutor, RequestDescriptor, RequestExecutor, RequestOutcome};
pub use generator::{sample_random_requests, SyntheticTokenizer, Tokenizer};
pub use metrics::{BenchmarkMetrics, GoodputConfig, MetricKind, MetricSummary};
pub use results::BenchmarkReport;
pub use retry::RetryPolicy;
pub use scheduler::{ArrivalSpec, ConcurrencyLimiter};

/// The current version of the benchmark client, taken from Cargo.toml and
/// recorded in every report for reproducibility.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Default number of prompts to generate per run.
    pub const NUM_PROMPTS: usize = 20;

    /// Default target input length per prompt, in tokens.
    pub const INPUT_LEN: usize = 50;

    /// Default target output length per request, in tokens.
    pub const OUTPUT_LEN: usize = 1024;

    /// Default number of shared prefix tokens.
    pub const PREFIX_LEN: usize = 0;

    /// Default length range ratio; 1.0 pins sampled lengths to the target.
    pub const RANGE_RATIO: f64 = 1.0;

    /// Default burstiness of the arrival process; 1.0 is a Poisson process.
    pub const BURSTINESS: f64 = 1.0;

    /// Default per-request attempt ceiling, the initial call included.
    pub const MAX_ATTEMPTS: usize = 3;

    /// Default delay between retry attempts.
    pub const RETRY_DELAY: Duration = Duration::from_secs(1);

    /// Default synthetic tokenizer vocabulary size.
    pub const VOCAB_SIZE: u32 = 32000;
}
