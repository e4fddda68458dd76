//! # LLM Serving Benchmark - Main Entry Point
//!
//! Command-line front end for the benchmark library. The main function:
//!
//! 1. **Initializes logging**: structured tracing with colorized output
//! 2. **Parses arguments**: backend, workload shape, arrival process, SLOs
//! 3. **Generates the workload**: synthetic prompts via the tokenizer
//! 4. **Runs the benchmark**: smoke test, paced dispatch, aggregation
//! 5. **Reports**: summary banner on the log plus an optional JSON file
//!
//! Ctrl-C cancels the run through the runner's cancellation token; the
//! partial results collected up to that point are still reported.

use anyhow::{Context, Result};
use clap::Parser;
use llm_benchmark::{
    benchmark::BenchmarkRunner,
    cli::Args,
    generator::{sample_random_requests, SyntheticTokenizer},
    logging,
    results::BenchmarkReport,
    Tokenizer,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    info!(
        "starting benchmark against {} ({} backend, model {})",
        args.api_url(),
        args.backend,
        args.model
    );

    let tokenizer: Arc<dyn Tokenizer> = Arc::new(SyntheticTokenizer::new(args.vocab_size));
    let descriptors = sample_random_requests(
        args.prefix_len,
        args.input_len,
        args.output_len,
        args.num_prompts,
        args.range_ratio,
        tokenizer.as_ref(),
    )?;

    let mut client_builder = reqwest::Client::builder();
    if let Some(timeout) = args.request_timeout {
        client_builder = client_builder.timeout(timeout);
    }
    let client = client_builder
        .build()
        .context("building the HTTP client")?;

    let config = args.benchmark_config()?;
    let runner = BenchmarkRunner::new(config.clone(), args.build_executor(client));

    let cancel = runner.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling the benchmark");
            cancel.cancel();
        }
    });

    let run = runner.run(descriptors, Some(tokenizer)).await?;

    let report = BenchmarkReport::new(
        args.backend.to_string(),
        args.model.clone(),
        &config,
        &run,
        args.num_prompts,
    );
    report.log_summary(&args.percentile_metrics);

    if let Some(path) = &args.output_file {
        report.save(path)?;
    }

    Ok(())
}
