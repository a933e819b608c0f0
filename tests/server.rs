//! End-to-end tests for the `/api/analyze-bill` endpoint.
//!
//! The real router is served on an ephemeral port and driven with `reqwest`.
//! The vision model and the ledger are replaced by a scripted extractor and
//! a [`MemoryStore`], so no test touches the network beyond loopback.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_bill2ledger::server::{self, FailureEnvelope, SuccessEnvelope, ANALYZE_BILL_PATH};
use edgequake_bill2ledger::{
    Category, Completion, Extractor, IngestConfig, IngestError, Ingestor, LedgerStore, MemoryStore,
};
use edgequake_llm::ImageData;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

struct ScriptedExtractor {
    content: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    fn replying(content: &str) -> Arc<Self> {
        Arc::new(Self {
            content: content.to_string(),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, _image: ImageData, _instruction: &str) -> Result<Completion, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Completion {
            content: self.content.clone(),
            prompt_tokens: 850,
            completion_tokens: 35,
        })
    }
}

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// Serve the router on 127.0.0.1:0 and return the endpoint URL.
async fn spawn_app(
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn LedgerStore>,
    config: IngestConfig,
) -> String {
    init_tracing();
    let ingestor = Arc::new(Ingestor::new(extractor, store, config));
    let app = server::router(ingestor, server::DEFAULT_MAX_BODY_BYTES);
    let listener = server::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, app));
    format!("http://{addr}{ANALYZE_BILL_PATH}")
}

fn png_b64() -> String {
    STANDARD.encode([
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D',
        b'R',
    ])
}

fn assert_cors(response: &reqwest::Response) {
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "GET,OPTIONS,POST");
    assert_eq!(headers["access-control-allow-headers"], "Content-Type");
}

#[tokio::test]
async fn preflight_returns_empty_200_with_cors() {
    let extractor = ScriptedExtractor::replying("{}");
    let url = spawn_app(extractor.clone(), Arc::new(MemoryStore::new()), IngestConfig::default()).await;

    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, &url)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(&response);
    assert!(response.text().await.unwrap().is_empty());
    assert_eq!(extractor.calls(), 0);
}

#[tokio::test]
async fn get_reports_active() {
    let extractor = ScriptedExtractor::replying("{}");
    let url = spawn_app(extractor.clone(), Arc::new(MemoryStore::new()), IngestConfig::default()).await;

    let response = reqwest::get(&url).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(&response);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "status": "active" }));
    assert_eq!(extractor.calls(), 0);
}

#[tokio::test]
async fn valid_image_is_recorded() {
    let extractor = ScriptedExtractor::replying(
        r#"{"amount": -42.5, "merchant": "Noodle Bar", "category": "餐饮", "date": "2025-12-21 12:30:00", "note": "lunch"}"#,
    );
    let store = Arc::new(MemoryStore::new());
    let url = spawn_app(extractor, store.clone(), IngestConfig::default()).await;

    let response = reqwest::Client::new()
        .post(&url)
        .json(&json!({ "imageBase64": png_b64() }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_cors(&response);
    let body: SuccessEnvelope = response.json().await.unwrap();
    assert!(body.success);
    assert_eq!(body.message, "bill recorded");
    assert_eq!(body.data.amount, Decimal::new(425, 1));
    assert!(Category::ALL.contains(&body.data.category));
    assert_eq!(body.data.category, Category::Food);
    assert_eq!(body.data.date, "2025-12-21 12:30:00");

    let rows = store.records();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], body.data);
}

#[tokio::test]
async fn fenced_completion_is_parsed() {
    let extractor = ScriptedExtractor::replying(
        "```json\n{\"amount\": \"18\", \"merchant\": \"Metro\", \"category\": \"打车\"}\n```",
    );
    let store = Arc::new(MemoryStore::new());
    let url = spawn_app(extractor, store.clone(), IngestConfig::default()).await;

    let response = reqwest::Client::new()
        .post(&url)
        .json(&json!({ "imageBase64": format!("data:image/png;base64,{}", png_b64()) }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: SuccessEnvelope = response.json().await.unwrap();
    assert_eq!(body.data.category, Category::Transport);
    assert_eq!(body.data.amount, Decimal::from(18));
    assert_eq!(body.data.note, "auto-recorded by AI");
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn missing_image_is_400() {
    let extractor = ScriptedExtractor::replying("{}");
    let store = Arc::new(MemoryStore::new());
    let url = spawn_app(extractor.clone(), store.clone(), IngestConfig::default()).await;

    let response = reqwest::Client::new()
        .post(&url)
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_cors(&response);
    let body: FailureEnvelope = response.json().await.unwrap();
    assert!(!body.success);
    assert!(body.error.contains("imageBase64"), "got: {}", body.error);
    assert_eq!(extractor.calls(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn non_json_body_is_400() {
    let extractor = ScriptedExtractor::replying("{}");
    let url = spawn_app(extractor.clone(), Arc::new(MemoryStore::new()), IngestConfig::default()).await;

    let response = reqwest::Client::new()
        .post(&url)
        .header("content-type", "application/json")
        .body("imageBase64=abc")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: FailureEnvelope = response.json().await.unwrap();
    assert!(!body.success);
    assert_eq!(extractor.calls(), 0);
}

#[tokio::test]
async fn empty_completion_is_500_without_insert() {
    let extractor = ScriptedExtractor::replying("");
    let store = Arc::new(MemoryStore::new());
    let url = spawn_app(extractor.clone(), store.clone(), IngestConfig::default()).await;

    let response = reqwest::Client::new()
        .post(&url)
        .json(&json!({ "imageBase64": png_b64() }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors(&response);
    let body: FailureEnvelope = response.json().await.unwrap();
    assert!(!body.success);
    assert!(body.error.contains("empty completion"), "got: {}", body.error);
    assert_eq!(extractor.calls(), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn slow_inference_is_500_without_insert() {
    let extractor = Arc::new(ScriptedExtractor {
        content: "{}".into(),
        delay: Some(Duration::from_secs(30)),
        calls: AtomicUsize::new(0),
    });
    let store = Arc::new(MemoryStore::new());
    let config = IngestConfig::builder().api_timeout_secs(1).build().unwrap();
    let url = spawn_app(extractor, store.clone(), config).await;

    let response = reqwest::Client::new()
        .post(&url)
        .json(&json!({ "imageBase64": png_b64() }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: FailureEnvelope = response.json().await.unwrap();
    assert!(body.error.contains("timed out"), "got: {}", body.error);
    assert!(store.is_empty());
}

#[tokio::test]
async fn store_rejection_is_500() {
    let extractor = ScriptedExtractor::replying(r#"{"amount": 9.9}"#);
    let store = Arc::new(MemoryStore::rejecting("relation \"transactions\" does not exist"));
    let url = spawn_app(extractor, store, IngestConfig::default()).await;

    let response = reqwest::Client::new()
        .post(&url)
        .json(&json!({ "imageBase64": png_b64() }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: FailureEnvelope = response.json().await.unwrap();
    assert!(body.error.contains("does not exist"), "got: {}", body.error);
}

#[tokio::test]
async fn other_methods_are_405() {
    let extractor = ScriptedExtractor::replying("{}");
    let url = spawn_app(extractor.clone(), Arc::new(MemoryStore::new()), IngestConfig::default()).await;

    let response = reqwest::Client::new().put(&url).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_cors(&response);
    let body: FailureEnvelope = response.json().await.unwrap();
    assert!(!body.success);
    assert!(body.error.contains("PUT"), "got: {}", body.error);
    assert_eq!(extractor.calls(), 0);
}
