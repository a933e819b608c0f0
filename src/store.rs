//! Ledger persistence: append one normalised record to the ledger table.
//!
//! [`LedgerStore`] is the seam. [`PostgrestStore`] talks to a Supabase /
//! PostgREST endpoint over HTTPS; [`MemoryStore`] keeps rows in memory for
//! dry runs and tests.
//!
//! Inserts are single-row and never retried. A rejected insert fails the
//! request that produced it and nothing else.

use crate::error::{Bill2LedgerError, IngestError};
use crate::output::BillRecord;
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Append-only sink for ledger records.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert exactly one record.
    ///
    /// Failures are reported as [`IngestError::Persistence`].
    async fn insert(&self, record: &BillRecord) -> Result<(), IngestError>;
}

// ── PostgREST ────────────────────────────────────────────────────────────────

/// Insert rows through the PostgREST API of a Supabase project.
///
/// Every insert is `POST {base}/rest/v1/{table}` with the service key in
/// both the `apikey` and `Authorization` headers and `Prefer: return=minimal`,
/// so a successful insert answers `201` with an empty body.
#[derive(Clone)]
pub struct PostgrestStore {
    client: Client,
    endpoint: Url,
    service_key: String,
    table: String,
}

impl PostgrestStore {
    /// Build a store for `table` on the project at `base_url`.
    ///
    /// # Errors
    /// - [`Bill2LedgerError::InvalidStoreUrl`] if `base_url` is not an
    ///   `http(s)` URL.
    /// - [`Bill2LedgerError::InvalidConfig`] if the key is blank or the table
    ///   name is not a plain identifier.
    /// - [`Bill2LedgerError::StoreClient`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        service_key: impl Into<String>,
        table: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, Bill2LedgerError> {
        let service_key = service_key.into();
        let table = table.into();

        if service_key.trim().is_empty() {
            return Err(Bill2LedgerError::InvalidConfig(
                "ledger store service key is empty".into(),
            ));
        }
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Bill2LedgerError::InvalidConfig(format!(
                "ledger table name must be a plain identifier, got '{table}'"
            )));
        }

        let endpoint = endpoint_url(base_url, &table)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| Bill2LedgerError::StoreClient(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            service_key,
            table,
        })
    }

    /// Full insert URL, e.g. `https://abc.supabase.co/rest/v1/transactions`.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl fmt::Debug for PostgrestStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgrestStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("table", &self.table)
            .field("service_key", &"<redacted>")
            .finish()
    }
}

fn endpoint_url(base_url: &str, table: &str) -> Result<Url, Bill2LedgerError> {
    let invalid = |reason: String| Bill2LedgerError::InvalidStoreUrl {
        url: base_url.to_string(),
        reason,
    };

    let base = Url::parse(base_url.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
    }

    let path = format!("{}/rest/v1/{}", base.path().trim_end_matches('/'), table);
    let mut endpoint = base;
    endpoint.set_path(&path);
    endpoint.set_query(None);
    Ok(endpoint)
}

#[async_trait]
impl LedgerStore for PostgrestStore {
    async fn insert(&self, record: &BillRecord) -> Result<(), IngestError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=minimal")
            .json(&[record])
            .send()
            .await
            .map_err(|e| {
                let detail = if e.is_timeout() {
                    format!("ledger store timed out ({})", self.endpoint)
                } else {
                    format!("ledger store unreachable: {e}")
                };
                warn!("{}", detail);
                IngestError::Persistence {
                    status: None,
                    detail,
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!("Inserted 1 row into '{}' (HTTP {})", self.table, status.as_u16());
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!("Ledger insert rejected: HTTP {} {}", status.as_u16(), body);
        Err(IngestError::Persistence {
            status: Some(status.as_u16()),
            detail: format!("ledger store answered HTTP {}: {}", status.as_u16(), body.trim()),
        })
    }
}

// ── In-memory ────────────────────────────────────────────────────────────────

/// Keeps inserted rows in memory. Used by `--dry-run` and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<BillRecord>>,
    reject_with: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses every insert with `detail`.
    pub fn rejecting(detail: impl Into<String>) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            reject_with: Some(detail.into()),
        }
    }

    /// Snapshot of the rows inserted so far, oldest first.
    pub fn records(&self) -> Vec<BillRecord> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert(&self, record: &BillRecord) -> Result<(), IngestError> {
        if let Some(detail) = &self.reject_with {
            return Err(IngestError::Persistence {
                status: None,
                detail: detail.clone(),
            });
        }
        let mut rows = self.rows.lock().map_err(|_| IngestError::Persistence {
            status: None,
            detail: "in-memory ledger lock poisoned".into(),
        })?;
        rows.push(record.clone());
        Ok(())
    }
}
