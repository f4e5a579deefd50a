use betafeed::llm::remote::RemoteSummarizer;
use betafeed::llm::summarizer::summarize_text;
use betafeed::llm::{SummaryOptions, SummaryProvider, SummaryRequest};
use mockito::Matcher;
use serde_json::json;

fn request(input: &str) -> SummaryRequest {
    SummaryRequest {
        input: input.to_string(),
        min_length: 500,
        max_length: 1500,
    }
}

#[tokio::test]
async fn test_remote_summarizer_with_mock() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "Bearer fake-token")
        .match_body(Matcher::PartialJson(json!({
            "inputs": "Long article content here...",
            "parameters": { "min_length": 500, "max_length": 1500, "do_sample": false },
            "options": { "wait_for_model": true }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"summary_text": "  This is a test summary.  "}]"#)
        .create_async()
        .await;

    let provider = RemoteSummarizer::new(server.url(), Some("fake-token".to_string()));
    let summary = provider
        .summarize(request("Long article content here..."))
        .await
        .expect("summary");

    assert_eq!(summary, "This is a test summary.");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_remote_summarizer_error_handling() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": "Rate limit exceeded"}"#)
        .create_async()
        .await;

    let provider = RemoteSummarizer::new(server.url(), None);
    let err = provider.summarize(request("Test")).await.unwrap_err();
    assert!(err.to_string().contains("429"));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_remote_summarizer_model_loading() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(503)
        .with_body(r#"{"error": "Model is currently loading", "estimated_time": 20.0}"#)
        .create_async()
        .await;

    let provider = RemoteSummarizer::new(server.url(), None);
    let err = provider.summarize(request("Test")).await.unwrap_err();
    assert!(err.to_string().contains("still loading"));
}

#[tokio::test]
async fn test_remote_summarizer_empty_result_is_an_error() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let provider = RemoteSummarizer::new(server.url(), None);
    assert!(provider.summarize(request("Test")).await.is_err());
}

#[tokio::test]
async fn test_remote_summarizer_timeout() {
    let mut server = mockito::Server::new_async().await;

    // Mock slow response
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(std::time::Duration::from_secs(3));
            w.write_all(b"too late")
        })
        .create_async()
        .await;

    let provider = RemoteSummarizer::new(server.url(), None).with_timeout(1);
    let err = provider.summarize(request("Test")).await.unwrap_err();
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_failed_remote_call_falls_back_to_extractive_summary() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let text = "WhatsApp is rolling out a new feature to beta testers today. \
                The update lets users lock individual chats with a passcode. \
                Weather in the valley stayed calm for most of the afternoon.";
    let provider = RemoteSummarizer::new(server.url(), None);
    let summary = summarize_text(Some(&provider), text, &SummaryOptions::default(), 100).await;

    assert!(summary.starts_with("WhatsApp is rolling out a new feature"));
    assert!(summary.contains("lock individual chats"));
    mock.assert_async().await;
}
