use super::*;
use crate::test_support::{
    KeywordEmbedder, RecordingChat, THREE_ROW_CSV, test_config, write_catalog,
};
use serde_json::Value;
use tempfile::TempDir;

struct TestServer {
    base_url: String,
    state: AppState,
    chat: Arc<RecordingChat>,
    embedder: Arc<KeywordEmbedder>,
    temp_dir: TempDir,
}

impl TestServer {
    async fn start(chat: RecordingChat, timeout: Duration, ready: bool) -> Self {
        let temp_dir = TempDir::new().expect("should create temp dir");
        write_catalog(temp_dir.path(), THREE_ROW_CSV);
        let config = test_config(temp_dir.path());

        let embedder = Arc::new(KeywordEmbedder::default());
        let chat = Arc::new(chat);
        let state = AppState::new(config.catalog_path(), timeout);

        if ready {
            let assistant = CourseAssistant::initialize(
                &config,
                Arc::clone(&embedder) as Arc<dyn Embedder>,
                Arc::clone(&chat) as Arc<dyn ChatModel>,
            )
            .await
            .expect("assistant should start");
            state.mark_ready(Arc::new(assistant)).await;
        }

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind test listener");
        let addr = listener.local_addr().expect("should have local addr");
        tokio::spawn(serve_listener(listener, state.clone()));

        Self {
            base_url: format!("http://{}", addr),
            state,
            chat,
            embedder,
            temp_dir,
        }
    }

    async fn ready(chat: RecordingChat) -> Self {
        Self::start(chat, Duration::from_secs(30), true).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn catalog_file(&self) -> PathBuf {
        self.temp_dir.path().join("courses.csv")
    }
}

fn agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .into()
}

async fn post_json(url: String, body: &'static str) -> (u16, Value) {
    tokio::task::spawn_blocking(move || {
        let mut response = agent()
            .post(&url)
            .header("Content-Type", "application/json")
            .send(body)
            .expect("request should complete");
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .expect("body should be readable");
        (status, serde_json::from_str(&text).expect("body should be JSON"))
    })
    .await
    .expect("request task should finish")
}

async fn get_json(url: String) -> (u16, Value) {
    tokio::task::spawn_blocking(move || {
        let mut response = agent().get(&url).call().expect("request should complete");
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .expect("body should be readable");
        (status, serde_json::from_str(&text).expect("body should be JSON"))
    })
    .await
    .expect("request task should finish")
}

#[tokio::test]
async fn health_reports_readiness() {
    let server = TestServer::start(RecordingChat::answering("hi"), Duration::from_secs(30), false)
        .await;

    let (status, body) = get_json(server.url("/health")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["ready"], false);

    let ready = TestServer::ready(RecordingChat::answering("hi")).await;
    let (status, body) = get_json(ready.url("/health")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["ready"], true);
    assert!(ready.state.is_ready().await);
}

#[tokio::test]
async fn chat_before_ready_is_unavailable() {
    let server = TestServer::start(RecordingChat::answering("hi"), Duration::from_secs(30), false)
        .await;

    let (status, body) = post_json(server.url("/chat"), r#"{"message":"Any pottery?"}"#).await;

    assert_eq!(status, 503);
    assert_eq!(body["error"], "RAG system is still initialising, please wait...");
    assert_eq!(server.chat.calls(), 0);
}

#[tokio::test]
async fn chat_answers_question() {
    let server = TestServer::ready(RecordingChat::answering("Try **Moonlit Pottery**")).await;

    let (status, body) = post_json(server.url("/chat"), r#"{"message":"Any pottery?"}"#).await;

    assert_eq!(status, 200);
    assert_eq!(body["response"], "Try **Moonlit Pottery**");
    assert_eq!(server.chat.calls(), 1);
}

#[tokio::test]
async fn api_chat_alias() {
    let server = TestServer::ready(RecordingChat::answering("alias works")).await;

    let (status, body) = post_json(server.url("/api/chat"), r#"{"message":"hello"}"#).await;

    assert_eq!(status, 200);
    assert_eq!(body["response"], "alias works");
}

#[tokio::test]
async fn empty_or_absent_message_is_rejected() {
    let server = TestServer::ready(RecordingChat::answering("hi")).await;
    let embeds_after_ingest = server.embedder.calls();

    for body in [r#"{"message":""}"#, r#"{"message":"   "}"#, "{}", r#"{"message":null}"#] {
        let (status, response) = post_json(server.url("/chat"), body).await;
        assert_eq!(status, 400, "body {body}");
        assert_eq!(response["error"], "No message provided");
    }

    assert_eq!(server.chat.calls(), 0);
    assert_eq!(server.embedder.calls(), embeds_after_ingest);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let server = TestServer::ready(RecordingChat::answering("hi")).await;

    let (status, body) = post_json(server.url("/chat"), "{not json").await;

    assert_eq!(status, 400);
    assert!(body["error"].is_string());
    assert_eq!(server.chat.calls(), 0);
}

#[tokio::test]
async fn provider_failure_hides_detail() {
    let server = TestServer::ready(RecordingChat::failing()).await;

    let (status, body) = post_json(server.url("/chat"), r#"{"message":"hello"}"#).await;

    assert_eq!(status, 500);
    let error = body["error"].as_str().expect("error should be a string");
    assert!(!error.is_empty());
    assert!(!error.contains("sk-secret"));
}

#[tokio::test]
async fn slow_answer_times_out() {
    let server = TestServer::start(
        RecordingChat::slow("too late", Duration::from_secs(2)),
        Duration::from_millis(200),
        true,
    )
    .await;

    let (status, body) = post_json(server.url("/chat"), r#"{"message":"hello"}"#).await;

    assert_eq!(status, 504);
    assert_eq!(body["error"], "Request timeout");
}

#[tokio::test]
async fn courses_mirror_catalog_file() {
    let server = TestServer::ready(RecordingChat::answering("hi")).await;

    let (status, body) = get_json(server.url("/courses")).await;

    assert_eq!(status, 200);
    let rows = body.as_array().expect("courses should be an array");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["ID"], "1");
    assert_eq!(rows[0]["Course Name"], "Moonlit Pottery");
    assert_eq!(rows[2]["Cost"], "£bad");
    let keys: Vec<&str> = rows[0]
        .as_object()
        .expect("row should be an object")
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(keys.len(), 10);
}

#[tokio::test]
async fn courses_are_reread_each_call() {
    let server = TestServer::ready(RecordingChat::answering("hi")).await;
    std::fs::write(
        server.catalog_file(),
        "ID,Course Name,Location\n9,Quiet Knitting,Bath\n",
    )
    .expect("should rewrite catalog");

    let (status, body) = get_json(server.url("/courses")).await;

    assert_eq!(status, 200);
    assert_eq!(body, serde_json::json!([{"ID": "9", "Course Name": "Quiet Knitting", "Location": "Bath"}]));
}

#[tokio::test]
async fn courses_failure_is_server_error() {
    let server = TestServer::ready(RecordingChat::answering("hi")).await;
    std::fs::remove_file(server.catalog_file()).expect("should remove catalog");

    let (status, body) = get_json(server.url("/courses")).await;

    assert_eq!(status, 500);
    assert_eq!(body["error"], "The course catalog could not be read");
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let server = TestServer::ready(RecordingChat::answering("hi")).await;
    let url = server.url("/health");

    let allow_origin = tokio::task::spawn_blocking(move || {
        let response = agent()
            .get(&url)
            .header("Origin", "http://localhost:5173")
            .call()
            .expect("request should complete");
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    })
    .await
    .expect("request task should finish");

    assert_eq!(allow_origin.as_deref(), Some("*"));
}

#[test]
fn error_status_mapping() {
    let cases = [
        (DandoriError::Validation("bad".to_string()), StatusCode::BAD_REQUEST),
        (DandoriError::NotReady, StatusCode::SERVICE_UNAVAILABLE),
        (DandoriError::Timeout(30), StatusCode::GATEWAY_TIMEOUT),
        (DandoriError::Provider("x".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        (DandoriError::Storage("x".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        (DandoriError::Config("x".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
    ];

    for (error, expected) in cases {
        assert_eq!(AppError::from(error).status, expected);
    }
}
