//! Integration tests for the streaming executor against a mock
//! OpenAI-compatible completion endpoint.

use llm_benchmark::executor::{OpenAiExecutor, RequestDescriptor, RequestExecutor};
use mockito::Matcher;

fn descriptor() -> RequestDescriptor {
    RequestDescriptor {
        prompt: "tok1 tok2 tok3".to_string(),
        prefix_len: 0,
        prompt_len: 3,
        output_len: 16,
        multimodal: None,
        model_override: None,
    }
}

#[tokio::test]
async fn test_stream_is_reduced_to_tokens_and_timings() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_chunked_body(|w| {
            w.write_all(b"data: {\"choices\": [{\"text\": \"Hello\"}]}\n\n")?;
            w.write_all(b"data: {\"choices\": [{\"text\": \", \"}]}\n\n")?;
            w.write_all(b"data: {\"choices\": [{\"text\": \"world\"}]}\n\n")?;
            w.write_all(b"data: [DONE]\n\n")
        })
        .create_async()
        .await;

    let executor = OpenAiExecutor::new(
        reqwest::Client::new(),
        format!("{}/v1/completions", server.url()),
        "test-model",
    );
    let outcome = executor.execute(&descriptor()).await.unwrap();

    mock.assert_async().await;
    assert!(outcome.success);
    assert_eq!(outcome.generated_text, "Hello, world");
    assert_eq!(outcome.output_tokens, Some(3));
    assert!(outcome.ttft > 0.0);
    assert_eq!(outcome.itl.len(), 2);
    assert!(outcome.latency >= outcome.ttft);
    // Sum of inter-token gaps never exceeds the total latency.
    assert!(outcome.itl.iter().sum::<f64>() <= outcome.latency);
}

#[tokio::test]
async fn test_malformed_fragments_are_skipped_not_fatal() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_chunked_body(|w| {
            w.write_all(b"data: {\"choices\": [{\"text\": \"a\"}]}\n\n")?;
            w.write_all(b"data: {this is not json\n\n")?;
            w.write_all(b"data: {\"choices\": [{\"text\": \"b\"}]}\n\n")?;
            w.write_all(b"data: [DONE]\n\n")
        })
        .create_async()
        .await;

    let executor = OpenAiExecutor::new(
        reqwest::Client::new(),
        format!("{}/v1/completions", server.url()),
        "test-model",
    );
    let outcome = executor.execute(&descriptor()).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.generated_text, "ab");
    assert_eq!(outcome.output_tokens, Some(2));
}

#[tokio::test]
async fn test_non_2xx_is_a_clean_failure_not_a_transport_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/completions")
        .with_status(503)
        .with_body("overloaded")
        .create_async()
        .await;

    let executor = OpenAiExecutor::new(
        reqwest::Client::new(),
        format!("{}/v1/completions", server.url()),
        "test-model",
    );
    let outcome = executor.execute(&descriptor()).await.unwrap();

    assert!(!outcome.success);
    let error = outcome.error.unwrap();
    assert!(error.contains("HTTP error: 503"), "{}", error);
    assert!(error.contains("overloaded"), "{}", error);
}

#[tokio::test]
async fn test_bearer_credential_and_body_fields_are_sent() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/completions")
        .match_header("authorization", "Bearer secret-token")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "test-model",
            "prompt": "tok1 tok2 tok3",
            "max_tokens": 16,
            "stream": true,
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("data: {\"choices\": [{\"text\": \"ok\"}]}\n\ndata: [DONE]\n\n")
        .create_async()
        .await;

    let executor = OpenAiExecutor::new(
        reqwest::Client::new(),
        format!("{}/v1/completions", server.url()),
        "test-model",
    )
    .with_api_key(Some("secret-token".to_string()));
    let outcome = executor.execute(&descriptor()).await.unwrap();

    mock.assert_async().await;
    assert!(outcome.success);
    assert_eq!(outcome.generated_text, "ok");
}

#[tokio::test]
async fn test_connection_refused_is_a_transport_error() {
    // Port 9 (discard) is almost certainly closed locally.
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .unwrap();
    let executor = OpenAiExecutor::new(
        client,
        "http://127.0.0.1:9/v1/completions",
        "test-model",
    );
    assert!(executor.execute(&descriptor()).await.is_err());
}
