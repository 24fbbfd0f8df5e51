//! HTTP contract tests
//!
//! Drive the real `HttpTransport` through `ChatSession` and `TransferManager`
//! against a local mock server and check:
//! - request bodies match the `/api/chat`, `/api/pull` and `/api/delete` formats
//! - NDJSON streams are decoded line by line
//! - error statuses and unreachable servers roll the history back

use std::time::Duration;

use futures::StreamExt;
use oreo_client::{
    ChatOptions, ChatReply, ChatSession, ClientConfig, Error, Message, TransferOutcome,
    TransferProgress,
};
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig::default()
        .with_base_url(server.uri())
        .with_model("llama3")
}

fn ndjson(records: &[serde_json::Value]) -> String {
    records
        .iter()
        .map(|r| format!("{}\n", r))
        .collect::<Vec<_>>()
        .concat()
}

async fn collect_text(reply: ChatReply) -> Result<String, Error> {
    let ChatReply::Streamed(mut stream) = reply else {
        panic!("expected a streamed reply");
    };
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        text.push_str(&delta?);
    }
    Ok(text)
}

// ────────────────────────────────────────────────────────────────────────────
// Chat
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_request_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3",
            "stream": false,
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "Hello"}
            ],
            "options": {"temperature": 0.5, "num_predict": 64, "top_k": 20}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3",
            "message": {"role": "assistant", "content": "Hi there"},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = ChatSession::new(config_for(&server).with_system_prompt("  be brief \n")).unwrap();
    let options = ChatOptions::default()
        .with_temperature(0.5)
        .with_max_tokens(64)
        .with_option("top_k", 20);

    let reply = session.send("Hello", false, &options).await.unwrap();

    let ChatReply::Buffered(response) = reply else {
        panic!("expected a buffered reply");
    };
    assert!(response.done);
    assert_eq!(session.history(Some(1)), vec![Message::assistant("Hi there")]);
}

#[tokio::test]
async fn test_chat_stream_decodes_ndjson() {
    let server = MockServer::start().await;

    let body = ndjson(&[
        json!({"message": {"role": "assistant", "content": "<think>"}, "done": false}),
        json!({"message": {"role": "assistant", "content": "plan"}, "done": false}),
        json!({"message": {"role": "assistant", "content": "</think>Hel"}, "done": false}),
        json!({"message": {"role": "assistant", "content": "lo"}, "done": false}),
        json!({"message": {"role": "assistant", "content": ""}, "done": true}),
    ]);

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .expect(1)
        .mount(&server)
        .await;

    let session = ChatSession::new(config_for(&server)).unwrap();
    let reply = session.send("Hi", true, &ChatOptions::default()).await.unwrap();

    assert_eq!(collect_text(reply).await.unwrap(), "Hello");
    assert_eq!(
        session.history(None),
        vec![Message::user("Hi"), Message::assistant("Hello")]
    );
}

#[tokio::test]
async fn test_chat_stream_malformed_line() {
    let server = MockServer::start().await;

    let body = "{\"message\":{\"content\":\"ok\"}}\nnot json\n";
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let session = ChatSession::new(config_for(&server)).unwrap();
    let reply = session.send("Hi", true, &ChatOptions::default()).await.unwrap();

    let err = collect_text(reply).await.unwrap_err();
    assert!(matches!(err, Error::ResponseParse(_)));
    assert_eq!(session.history(None), vec![Message::user("Hi")]);
}

#[tokio::test]
async fn test_error_status_rolls_back() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "model 'llama3' not found"})),
        )
        .mount(&server)
        .await;

    let session = ChatSession::new(config_for(&server).with_system_prompt("sys")).unwrap();
    let before = session.history(None);

    for stream in [false, true] {
        let err = session
            .send("Hello", stream, &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_rolled_back());
        assert_eq!(err.summary(), "request rejected");
        assert!(err.to_string().contains("404"), "got: {}", err);
        assert_eq!(session.history(None), before);
    }
}

#[tokio::test]
async fn test_unreachable_server_rolls_back() {
    // Grab a free port and release it so nothing is listening there
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = ClientConfig::default()
        .with_base_url(format!("http://127.0.0.1:{}", port))
        .with_connect_timeout(Duration::from_secs(1));
    let session = ChatSession::new(config).unwrap();

    let err = session
        .send("Hello", false, &ChatOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_rolled_back());
    assert_eq!(err.summary(), "cannot reach server");
    assert!(session.history(None).is_empty());
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_slow_server_rolls_back() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": {"role": "assistant", "content": "late"}}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let session = ChatSession::new(
        config_for(&server).with_read_timeout(Duration::from_millis(200)),
    )
    .unwrap();

    let err = session
        .send("Hello", false, &ChatOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_rolled_back());
    assert!(session.history(None).is_empty());
}

// ────────────────────────────────────────────────────────────────────────────
// Model management
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_models() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "llama3:8b", "digest": "365c0bd3c000a25d", "size": 4661224676u64, "modified_at": "2024-05-01T10:00:00Z"},
                {"name": "qwen2.5:7b", "digest": "845dbda0ea48ed74", "size": 4683087332u64, "modified_at": "2024-09-20T08:00:00Z"}
            ]
        })))
        .mount(&server)
        .await;

    let session = ChatSession::new(config_for(&server)).unwrap();
    let models = session.list_models().await.unwrap();

    let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["llama3:8b", "qwen2.5:7b"]);
    assert_eq!(models[0].short_digest(), "365c0bd3c000");
}

#[tokio::test]
async fn test_list_models_empty() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&server)
        .await;

    let session = ChatSession::new(config_for(&server)).unwrap();
    assert!(session.list_models().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_model() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/delete"))
        .and(body_json(json!({"name": "llama3:8b"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/delete"))
        .and(body_json(json!({"name": "missing"})))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let session = ChatSession::new(config_for(&server)).unwrap();

    session.delete_model("llama3:8b").await.unwrap();
    let err = session.delete_model("missing").await.unwrap_err();
    assert!(matches!(err, Error::Delete { .. }));
    assert_eq!(err.summary(), "request rejected");
}

#[tokio::test]
async fn test_pull_reports_progress() {
    let server = MockServer::start().await;

    let body = ndjson(&[
        json!({"status": "pulling manifest"}),
        json!({"status": "pulling 6a0746a1ec1a", "digest": "sha256:6a07", "total": 200, "completed": 50}),
        json!({"status": "pulling 6a0746a1ec1a", "digest": "sha256:6a07", "total": 200, "completed": 200}),
        json!({"status": "success"}),
    ]);

    Mock::given(method("POST"))
        .and(path("/api/pull"))
        .and(body_partial_json(json!({"name": "llama3"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .expect(1)
        .mount(&server)
        .await;

    let session = ChatSession::new(config_for(&server)).unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<TransferProgress>();

    let handle = session.transfers().start("llama3", tx);
    assert_eq!(handle.join().await, TransferOutcome::Completed);

    let mut seen = Vec::new();
    while let Some(progress) = rx.recv().await {
        seen.push(progress);
    }
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[1].percentage, 25.0);
    assert_eq!(seen[4].status, "complete");
    assert_eq!(seen[4].percentage, 100.0);
}

#[tokio::test]
async fn test_pull_error_status_reports_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/pull"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let session = ChatSession::new(config_for(&server)).unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<TransferProgress>();

    let outcome = session.transfers().start("llama3", tx).join().await;

    assert!(matches!(outcome, TransferOutcome::Failed(_)));
    let first = rx.recv().await.unwrap();
    assert_eq!(first.model, "llama3");
    assert!(first.error.is_some());
    assert!(rx.recv().await.is_none());
}
