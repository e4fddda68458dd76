use crate::benchmark::BenchmarkConfig;
use crate::error::BenchmarkError;
use crate::executor::{OpenAiExecutor, RequestExecutor};
use crate::metrics::{GoodputConfig, MetricKind};
use crate::scheduler::ArrivalSpec;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// LLM Serving Benchmark - measures streaming latency and throughput of
/// OpenAI-compatible text generation endpoints
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Serving backend to benchmark
    #[clap(short = 'b', long, value_enum, default_value_t = Backend::Vllm)]
    pub backend: Backend,

    /// Base URL of the service under test
    #[clap(long, default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Completion endpoint path appended to the base URL
    #[clap(long, default_value = "/v1/completions")]
    pub endpoint: String,

    /// Model identifier sent with every request
    #[clap(short = 'm', long)]
    pub model: String,

    /// Number of prompts to generate (the first one is spent on a trial request)
    #[clap(short = 'n', long, default_value_t = crate::defaults::NUM_PROMPTS)]
    pub num_prompts: usize,

    /// Target input length per prompt, in tokens
    #[clap(long, default_value_t = crate::defaults::INPUT_LEN)]
    pub input_len: usize,

    /// Target output length per request, in tokens
    #[clap(long, default_value_t = crate::defaults::OUTPUT_LEN)]
    pub output_len: usize,

    /// Number of prefix tokens shared by every prompt
    #[clap(long, default_value_t = crate::defaults::PREFIX_LEN)]
    pub prefix_len: usize,

    /// Lower bound of the sampled length range as a fraction of the target
    /// (1.0 pins lengths exactly)
    #[clap(long, default_value_t = crate::defaults::RANGE_RATIO)]
    pub range_ratio: f64,

    /// Request rate in requests per second (omit for back-to-back dispatch)
    #[clap(short = 'r', long)]
    pub request_rate: Option<f64>,

    /// Burstiness factor of the arrival process (1.0 = Poisson)
    #[clap(long, default_value_t = crate::defaults::BURSTINESS)]
    pub burstiness: f64,

    /// Ceiling on simultaneously in-flight requests
    #[clap(short = 'c', long)]
    pub max_concurrency: Option<usize>,

    /// Number of log probabilities to request per generated token
    #[clap(long)]
    pub logprobs: Option<u32>,

    /// Generate this many candidates server-side and return the best
    #[clap(long, default_value_t = 1)]
    pub best_of: u32,

    /// Ask the server to keep generating past end-of-sequence tokens
    #[clap(long, default_value_t = false)]
    pub ignore_eos: bool,

    /// Bearer token attached to every request
    #[clap(long, env = "LLM_BENCHMARK_API_KEY")]
    pub api_key: Option<String>,

    /// LoRA module names assigned to requests at random
    #[clap(long, num_args = 1..)]
    pub lora_modules: Vec<String>,

    /// Percentiles reported for each latency metric
    #[clap(long, default_values_t = vec![99.0])]
    pub percentiles: Vec<f64>,

    /// Latency metrics to include in the summary banner
    #[clap(long, value_enum, default_values_t = vec![MetricKind::Ttft, MetricKind::Tpot, MetricKind::Itl])]
    pub percentile_metrics: Vec<MetricKind>,

    /// Goodput SLOs as metric:millisecond pairs (e.g. ttft:200 tpot:50 e2el:5000)
    #[clap(long, num_args = 1..)]
    pub goodput: Vec<String>,

    /// Toggle server-side profiling around the run
    #[clap(long, default_value_t = false)]
    pub profile: bool,

    /// Per-request deadline (e.g., "30s", "2m"); omit for no deadline
    #[clap(long, value_parser = parse_duration)]
    pub request_timeout: Option<Duration>,

    /// Attempt ceiling per request, the initial call included
    #[clap(long, default_value_t = crate::defaults::MAX_ATTEMPTS)]
    pub max_attempts: usize,

    /// Delay between retry attempts (e.g., "1s", "500ms")
    #[clap(long, value_parser = parse_duration, default_value = "1s")]
    pub retry_delay: Duration,

    /// Output file for the JSON report
    #[clap(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    /// Vocabulary size of the synthetic tokenizer
    #[clap(long, default_value_t = crate::defaults::VOCAB_SIZE)]
    pub vocab_size: u32,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

/// Supported serving backends.
///
/// Both speak the OpenAI completion wire protocol; the variant is recorded in
/// the report and selects the executor construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum Backend {
    /// OpenAI-compatible completion API
    #[clap(name = "openai")]
    Openai,

    /// vLLM serving endpoint (OpenAI-compatible)
    #[clap(name = "vllm")]
    Vllm,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Openai => write!(f, "openai"),
            Backend::Vllm => write!(f, "vllm"),
        }
    }
}

impl Args {
    /// Full URL of the completion endpoint.
    pub fn api_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }

    /// Construct the executor for the selected backend, sharing `client`'s
    /// connection pool across all requests.
    pub fn build_executor(&self, client: reqwest::Client) -> Arc<dyn RequestExecutor> {
        let executor = OpenAiExecutor::new(client, self.api_url(), self.model.clone())
            .with_api_key(self.api_key.clone())
            .with_logprobs(self.logprobs)
            .with_best_of(self.best_of)
            .with_ignore_eos(self.ignore_eos);
        match self.backend {
            Backend::Openai | Backend::Vllm => Arc::new(executor),
        }
    }

    /// Translate the arguments into a run configuration.
    pub fn benchmark_config(&self) -> Result<BenchmarkConfig, BenchmarkError> {
        let arrival = match self.request_rate {
            Some(rate) => ArrivalSpec {
                rate,
                burstiness: self.burstiness,
            },
            None => ArrivalSpec {
                rate: f64::INFINITY,
                burstiness: self.burstiness,
            },
        };
        Ok(BenchmarkConfig {
            arrival,
            max_concurrency: self.max_concurrency,
            max_attempts: self.max_attempts,
            retry_delay: self.retry_delay,
            percentiles: self.percentiles.clone(),
            goodput: parse_goodput(&self.goodput)?,
            profile: self.profile,
            base_url: self.base_url.clone(),
            lora_modules: self.lora_modules.clone(),
        })
    }
}

/// Parse `metric:milliseconds` goodput pairs into a threshold config.
fn parse_goodput(pairs: &[String]) -> Result<Option<GoodputConfig>, BenchmarkError> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut config = GoodputConfig::default();
    for pair in pairs {
        let (name, value) = pair.split_once(':').ok_or_else(|| {
            BenchmarkError::Configuration(format!(
                "goodput entry {:?} is not a metric:milliseconds pair",
                pair
            ))
        })?;
        let threshold: f64 = value.trim().parse().map_err(|_| {
            BenchmarkError::Configuration(format!(
                "goodput threshold {:?} is not a number",
                value
            ))
        })?;
        if threshold < 0.0 {
            return Err(BenchmarkError::Configuration(format!(
                "goodput threshold for {} must be non-negative",
                name
            )));
        }
        match name.trim() {
            "ttft" => config.ttft_ms = Some(threshold),
            "tpot" => config.tpot_ms = Some(threshold),
            "e2el" => config.e2el_ms = Some(threshold),
            other => {
                return Err(BenchmarkError::Configuration(format!(
                    "unknown goodput metric {:?} (expected ttft, tpot, or e2el)",
                    other
                )))
            }
        }
    }
    Ok(Some(config))
}

/// Parse duration from string (e.g., "10s", "5m", "1h")
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;

    let duration = match unit {
        "ms" => Duration::from_millis(num as u64),
        "s" => Duration::from_secs(num as u64),
        "m" => Duration::from_secs((num * 60.0) as u64),
        "h" => Duration::from_secs((num * 3600.0) as u64),
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["llm-benchmark", "--model", "test-model"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
    }

    #[test]
    fn test_defaults() {
        let args = args(&[]);
        assert_eq!(args.backend, Backend::Vllm);
        assert_eq!(args.num_prompts, 20);
        assert_eq!(args.input_len, 50);
        assert_eq!(args.output_len, 1024);
        assert_eq!(args.burstiness, 1.0);
        assert_eq!(args.percentiles, vec![99.0]);
        assert!(args.request_rate.is_none());
        assert_eq!(args.max_attempts, 3);
        assert_eq!(args.retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_api_url_joins_base_and_endpoint() {
        let args = args(&["--base-url", "http://host:9000/", "--endpoint", "v1/completions"]);
        assert_eq!(args.api_url(), "http://host:9000/v1/completions");
    }

    #[test]
    fn test_missing_rate_means_unbounded_arrival() {
        let config = args(&[]).benchmark_config().unwrap();
        assert!(config.arrival.is_unbounded());

        let config = args(&["--request-rate", "5"]).benchmark_config().unwrap();
        assert_eq!(config.arrival.rate, 5.0);
    }

    #[test]
    fn test_parse_goodput_pairs() {
        let config = parse_goodput(&["ttft:200".to_string(), "e2el:5000".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(config.ttft_ms, Some(200.0));
        assert_eq!(config.e2el_ms, Some(5000.0));
        assert!(config.tpot_ms.is_none());
    }

    #[test]
    fn test_parse_goodput_rejects_bad_entries() {
        assert!(parse_goodput(&["ttft=200".to_string()]).is_err());
        assert!(parse_goodput(&["ttft:abc".to_string()]).is_err());
        assert!(parse_goodput(&["ttft:-1".to_string()]).is_err());
        assert!(parse_goodput(&["latency:100".to_string()]).is_err());
        assert!(parse_goodput(&[]).unwrap().is_none());
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(Backend::Openai.to_string(), "openai");
        assert_eq!(Backend::Vllm.to_string(), "vllm");
    }
}
