//! End-to-end benchmark runs against a mock completion endpoint, from
//! workload generation through dispatch to report assembly.

use llm_benchmark::benchmark::{BenchmarkConfig, BenchmarkRunner};
use llm_benchmark::executor::OpenAiExecutor;
use llm_benchmark::generator::{sample_random_requests, SyntheticTokenizer};
use llm_benchmark::results::BenchmarkReport;
use llm_benchmark::scheduler::ArrivalSpec;
use llm_benchmark::Tokenizer;
use std::sync::Arc;
use std::time::Duration;

fn config(base_url: String) -> BenchmarkConfig {
    BenchmarkConfig {
        arrival: ArrivalSpec::unbounded(),
        max_concurrency: Some(4),
        max_attempts: 2,
        retry_delay: Duration::from_millis(10),
        percentiles: vec![50.0, 99.0],
        goodput: None,
        profile: false,
        base_url,
        lora_modules: Vec::new(),
    }
}

async fn streaming_mock(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("POST", "/v1/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_chunked_body(|w| {
            w.write_all(b"data: {\"choices\": [{\"text\": \"one\"}]}\n\n")?;
            w.write_all(b"data: {\"choices\": [{\"text\": \" two\"}]}\n\n")?;
            w.write_all(b"data: {\"choices\": [{\"text\": \" three\"}]}\n\n")?;
            w.write_all(b"data: [DONE]\n\n")
        })
        .expect_at_least(1)
        .create_async()
        .await
}

#[tokio::test]
async fn test_full_run_produces_consistent_metrics() {
    let mut server = mockito::Server::new_async().await;
    let mock = streaming_mock(&mut server).await;

    let tokenizer = SyntheticTokenizer::new(1000);
    let descriptors = sample_random_requests(0, 10, 8, 9, 1.0, &tokenizer).unwrap();

    let executor = OpenAiExecutor::new(
        reqwest::Client::new(),
        format!("{}/v1/completions", server.url()),
        "test-model",
    );
    let config = config(server.url());
    let runner = BenchmarkRunner::new(config.clone(), Arc::new(executor));

    let tokenizer: Arc<dyn Tokenizer> = Arc::new(tokenizer);
    let run = runner.run(descriptors, Some(tokenizer)).await.unwrap();

    mock.assert_async().await;
    // One descriptor went to the trial request, eight were paced.
    assert_eq!(run.outcomes.len(), 8);
    assert_eq!(run.metrics.completed, 8);
    assert_eq!(run.metrics.total_output_tokens, 8 * 3);
    assert!(run.metrics.request_throughput > 0.0);
    assert!(run.metrics.ttft.mean_ms > 0.0);
    assert!(run.duration_s > 0.0);
    for outcome in &run.outcomes {
        assert!(outcome.latency >= outcome.ttft);
        assert_eq!(outcome.itl.len(), 2);
    }

    let report = BenchmarkReport::new("openai", "test-model", &config, &run, 9);
    assert_eq!(report.completed + report.failed, report.total_requests);
    assert_eq!(report.success_rate, 100.0);
    assert_eq!(report.request_rate, "inf");
    assert_eq!(report.output_lens, vec![3; 8]);
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_the_smoke_test() {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let executor = OpenAiExecutor::new(client, "http://127.0.0.1:9/v1/completions", "test-model");
    let runner = BenchmarkRunner::new(config("http://127.0.0.1:9".to_string()), Arc::new(executor));

    let tokenizer = SyntheticTokenizer::new(1000);
    let descriptors = sample_random_requests(0, 10, 8, 3, 1.0, &tokenizer).unwrap();

    let err = runner.run(descriptors, None).await.unwrap_err();
    assert!(err.to_string().starts_with("smoke test failed:"));
}

#[tokio::test]
async fn test_rejecting_endpoint_counts_one_call_per_trial_attempt() {
    let mut server = mockito::Server::new_async().await;
    // A non-2xx answer is definitive: exactly one call, no retries, and the
    // run aborts at the trial request.
    let rejected = server
        .mock("POST", "/v1/completions")
        .with_status(429)
        .with_body("rate limited")
        .expect(1)
        .create_async()
        .await;

    let tokenizer = SyntheticTokenizer::new(1000);
    let descriptors = sample_random_requests(0, 10, 8, 5, 1.0, &tokenizer).unwrap();

    let executor = OpenAiExecutor::new(
        reqwest::Client::new(),
        format!("{}/v1/completions", server.url()),
        "test-model",
    );
    let runner = BenchmarkRunner::new(config(server.url()), Arc::new(executor));
    let err = runner.run(descriptors, None).await.unwrap_err();

    rejected.assert_async().await;
    assert!(err.to_string().contains("429"), "{}", err);
}

#[tokio::test]
async fn test_goodput_thresholds_gate_the_reported_rate() {
    let mut server = mockito::Server::new_async().await;
    let mock = streaming_mock(&mut server).await;

    let tokenizer = SyntheticTokenizer::new(1000);
    let descriptors = sample_random_requests(0, 10, 8, 5, 1.0, &tokenizer).unwrap();

    let executor = OpenAiExecutor::new(
        reqwest::Client::new(),
        format!("{}/v1/completions", server.url()),
        "test-model",
    );
    let mut config = config(server.url());
    config.goodput = Some(llm_benchmark::GoodputConfig {
        ttft_ms: Some(60_000.0),
        tpot_ms: None,
        e2el_ms: Some(60_000.0),
    });
    let runner = BenchmarkRunner::new(config.clone(), Arc::new(executor));
    let run = runner.run(descriptors, None).await.unwrap();

    mock.assert_async().await;
    assert_eq!(run.metrics.completed, 4);
    assert!(run.metrics.request_goodput <= run.metrics.request_throughput);
    // Every local request clears a 60 s threshold.
    assert!((run.metrics.request_goodput - run.metrics.request_throughput).abs() < 1e-9);

    let report = BenchmarkReport::new("openai", "test-model", &config, &run, 5);
    assert_eq!(report.request_goodput, Some(run.metrics.request_goodput));
}
