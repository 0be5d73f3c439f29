//! Integration tests for the HTTP transport against a mock backend.
//!
//! Run with:
//!   cargo test -p valor-chat-core --test http_transport

use std::io::Write;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::mpsc;
use valor_chat_core::{
    decode_stream, stream_turn, AttachmentStaging, CandidateFile, ChatRequest, ChatTransport,
    ClientConfig, ConversationState, HistoryEntry, HttpTransport, ModelConfig, Role,
    TransportError, TurnController, TurnEvent, TurnOutcome, TurnState,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SSE_BODY: &str = "data: Hello\n\ndata: , world\n\ndata: [DONE]\n\n";

fn transport_for(server: &MockServer) -> HttpTransport {
    HttpTransport::new(ClientConfig {
        base_url: server.uri(),
        ..ClientConfig::default()
    })
    .unwrap()
}

fn request(message: &str) -> ChatRequest {
    ChatRequest {
        message: message.to_string(),
        history: Vec::new(),
        files: Vec::new(),
        model: ModelConfig::default(),
    }
}

async fn collect_deltas(transport: &HttpTransport, request: ChatRequest) -> Vec<String> {
    let body = transport.open(request).await.unwrap();
    decode_stream(body)
        .map(|delta| delta.unwrap())
        .collect()
        .await
}

// =============================================================================
// Streaming endpoint
// =============================================================================

#[tokio::test]
async fn stream_body_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(SSE_BODY),
        )
        .expect(1)
        .mount(&server)
        .await;

    let deltas = collect_deltas(&transport_for(&server), request("hi")).await;
    assert_eq!(deltas.concat(), " Hello , world");
}

#[tokio::test]
async fn multipart_carries_every_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .and(body_string_contains("name=\"message\""))
        .and(body_string_contains("name=\"history\""))
        .and(body_string_contains("name=\"model_id\""))
        .and(body_string_contains("Qwen/Qwen2-VL-2B-Instruct"))
        .and(body_string_contains("name=\"quant_4bit\""))
        .and(body_string_contains("name=\"use_cpu\""))
        .and(body_string_contains("name=\"max_image_edge\""))
        .and(body_string_contains("name=\"max_new_tokens\""))
        .respond_with(ResponseTemplate::new(200).set_body_string(SSE_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let mut req = request("describe this");
    req.history = vec![
        HistoryEntry {
            role: Role::User,
            content: "earlier".to_string(),
        },
        HistoryEntry {
            role: Role::Assistant,
            content: "reply".to_string(),
        },
    ];
    req.files = vec![
        CandidateFile::from_bytes("cat.png", "image/png", b"\x89PNG fake".to_vec()).into(),
    ];

    let transport = transport_for(&server);
    let _ = collect_deltas(&transport, req).await;

    let received = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&received[0].body).into_owned();
    assert!(body.contains("describe this"));
    assert!(body.contains(
        r#"[{"role":"user","content":"earlier"},{"role":"assistant","content":"reply"}]"#
    ));
    assert!(body.contains("name=\"files\""));
    assert!(body.contains("filename=\"cat.png\""));
    assert!(body.to_ascii_lowercase().contains("content-type: image/png"));
    assert!(body.contains("PNG fake"));
    assert!(body.contains("1024"));
    assert!(body.contains("512"));
}

#[tokio::test]
async fn error_status_body_becomes_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .respond_with(ResponseTemplate::new(500).set_body_string("CUDA out of memory"))
        .mount(&server)
        .await;

    let err = transport_for(&server).open(request("hi")).await.err().unwrap();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.to_string(), "CUDA out of memory");
}

#[tokio::test]
async fn unreachable_backend_is_connect_error() {
    let transport = HttpTransport::new(ClientConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        ..ClientConfig::default()
    })
    .unwrap();

    let err = transport.open(request("hi")).await.err().unwrap();
    assert!(matches!(err, TransportError::Connect(_)));
    assert!(!err.to_string().is_empty());
}

#[tokio::test]
async fn on_disk_attachment_is_uploaded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .and(body_string_contains("filename=\"report.pdf\""))
        .and(body_string_contains("%PDF-1.4 test"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SSE_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("report.pdf");
    let mut file = std::fs::File::create(&file_path).unwrap();
    file.write_all(b"%PDF-1.4 test").unwrap();

    let mut staging = AttachmentStaging::new();
    assert_eq!(staging.add([CandidateFile::from_path(&file_path)]), 1);

    let mut req = request("");
    req.files = staging.take();
    let deltas = collect_deltas(&transport_for(&server), req).await;
    assert_eq!(deltas.len(), 2);
}

// =============================================================================
// Full turn over HTTP
// =============================================================================

#[tokio::test]
async fn turn_over_http_settles_successfully() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SSE_BODY))
        .mount(&server)
        .await;
    let transport = transport_for(&server);

    let mut conversation = ConversationState::new();
    let mut staging = AttachmentStaging::new();
    let mut turn = TurnController::new();
    let mut input = "hi".to_string();
    let req = turn
        .begin(&mut conversation, &mut input, &mut staging, &ModelConfig::default())
        .unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    stream_turn(&transport, req, tx).await;
    while let Some(event) = rx.recv().await {
        turn.apply(&mut conversation, event);
    }

    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation.last().unwrap().content, " Hello , world");
    assert_eq!(turn.state(), &TurnState::Settled(TurnOutcome::Success));
}

#[tokio::test]
async fn turn_over_http_reports_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/stream"))
        .respond_with(ResponseTemplate::new(500).set_body_string("{\"error\":\"boom\"}"))
        .mount(&server)
        .await;
    let transport = transport_for(&server);

    let mut conversation = ConversationState::new();
    let mut staging = AttachmentStaging::new();
    let mut turn = TurnController::new();
    let mut input = "hi".to_string();
    let req = turn
        .begin(&mut conversation, &mut input, &mut staging, &ModelConfig::default())
        .unwrap();

    let (tx, mut rx) = mpsc::channel(16);
    stream_turn(&transport, req, tx).await;
    let event = rx.recv().await.unwrap();
    assert!(matches!(event, TurnEvent::Rejected(_)));
    turn.apply(&mut conversation, event);

    assert_eq!(
        conversation.last().unwrap().content,
        "Error: {\"error\":\"boom\"}"
    );
    assert!(!turn.is_busy());
}

// =============================================================================
// Non-streaming endpoint and health
// =============================================================================

#[tokio::test]
async fn complete_parses_answer_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "answer": "A cat.",
            "usage": {"prompt_tokens": 40, "completion_tokens": 3, "latency_ms": 812}
        })))
        .mount(&server)
        .await;

    let response = transport_for(&server).complete(request("what?")).await.unwrap();
    assert_eq!(response.answer, "A cat.");
    assert_eq!(response.usage.completion_tokens, 3);
    assert_eq!(response.usage.latency_ms, 812);
}

#[tokio::test]
async fn complete_error_status_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("{\"error\":\"bad image\"}"))
        .mount(&server)
        .await;

    let err = transport_for(&server).complete(request("x")).await.unwrap_err();
    assert_eq!(err.to_string(), "{\"error\":\"bad image\"}");
}

#[tokio::test]
async fn health_reports_ok() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&server)
        .await;

    assert!(transport_for(&server).health().await.unwrap());
}

#[tokio::test]
async fn health_fails_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = transport_for(&server).health().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn health_gives_up_on_stalled_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"ok": true}))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new(ClientConfig {
        base_url: server.uri(),
        health_timeout_seconds: 1,
        ..ClientConfig::default()
    })
    .unwrap();

    let started = Instant::now();
    let err = transport.health().await.unwrap_err();
    assert!(matches!(err, TransportError::Connect(_)));
    assert!(started.elapsed() < Duration::from_secs(10));
}
