//! HTTP surface: a single endpoint in front of [`Ingestor`].
//!
//! | Method    | Response                                              |
//! |-----------|-------------------------------------------------------|
//! | `OPTIONS` | `200`, empty body (pre-flight)                        |
//! | `GET`     | `200 {"status":"active"}`                             |
//! | `POST`    | runs the pipeline, success or failure envelope        |
//! | other     | `405` failure envelope                                |
//!
//! Every response, error paths included, carries the permissive CORS headers.

use crate::error::{Bill2LedgerError, IngestError};
use crate::ingest::Ingestor;
use crate::output::BillRecord;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Path of the ingestion endpoint.
pub const ANALYZE_BILL_PATH: &str = "/api/analyze-bill";

/// Default cap on the request body (base64 inflates a photo by a third).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// `message` of the success envelope.
pub const SUCCESS_MESSAGE: &str = "bill recorded";

const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "GET,OPTIONS,POST";
const ALLOW_HEADERS: &str = "Content-Type";

/// Body of a `POST` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub image_base64: Option<String>,
}

/// `{"success": true, "data": …, "message": "bill recorded"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessEnvelope {
    pub success: bool,
    pub data: BillRecord,
    pub message: String,
}

/// `{"success": false, "error": …}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEnvelope {
    pub success: bool,
    pub error: String,
}

impl FailureEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(FailureEnvelope::new(self.to_string()))).into_response()
    }
}

/// Build the application router.
pub fn router(ingestor: Arc<Ingestor>, max_body_bytes: usize) -> Router {
    let analyze_bill = get(status)
        .post(analyze)
        .options(preflight)
        .fallback(method_not_allowed);

    Router::new()
        .route(ANALYZE_BILL_PATH, analyze_bill)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(ALLOW_ORIGIN),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(ingestor)
}

/// Bind the listener, mapping failure to [`Bill2LedgerError::Bind`].
pub async fn bind(addr: &str) -> Result<TcpListener, Bill2LedgerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| Bill2LedgerError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Serve `app` until Ctrl-C.
pub async fn serve(listener: TcpListener, app: Router) -> Result<(), Bill2LedgerError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}{}", addr, ANALYZE_BILL_PATH);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Bill2LedgerError::Serve)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn status() -> Json<serde_json::Value> {
    Json(json!({ "status": "active" }))
}

async fn analyze(
    State(ingestor): State<Arc<Ingestor>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = IngestError::InvalidBody {
                reason: rejection.body_text(),
            };
            warn!("Rejected request: {}", err);
            return err.into_response();
        }
    };

    match ingestor.ingest(request.image_base64.as_deref()).await {
        Ok(output) => Json(SuccessEnvelope {
            success: true,
            data: output.record,
            message: SUCCESS_MESSAGE.to_string(),
        })
        .into_response(),
        Err(e) => {
            if e.is_client_error() {
                warn!("Rejected request: {}", e);
            } else {
                error!("Ingestion failed: {}", e);
            }
            e.into_response()
        }
    }
}

async fn method_not_allowed(method: Method) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(FailureEnvelope::new(format!(
            "Method {method} not allowed; use {ALLOW_METHODS}"
        ))),
    )
        .into_response()
}
