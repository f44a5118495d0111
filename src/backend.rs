//! Where CLI viewers get their data from.
//!
//! [`LocalDesk`] opens the store directly; [`RemoteDesk`] calls a running
//! server's `/api/collection` and `/api/review` endpoints. Both apply the
//! same allow-lists: locally from the config, remotely on the server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use review_desk_core::allow_list::AllowList;
use review_desk_core::collection::{load_collection, CollectionRequest};
use review_desk_core::review::{mark_reviewed, ReviewReceipt, ReviewRequest};
use review_desk_core::store::DocumentStore;
use review_desk_core::{DeskError, Document};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[async_trait]
pub trait DeskBackend: Send + Sync {
    /// Short label for logs: `local` or the endpoint URL.
    fn describe(&self) -> String;

    async fn load(&self, request: &CollectionRequest) -> Result<Vec<Document>>;

    async fn review(&self, request: &ReviewRequest) -> Result<ReviewReceipt>;
}

pub struct LocalDesk {
    store: Arc<dyn DocumentStore>,
    read_allow: AllowList,
    review_allow: AllowList,
    full_scan_limit: usize,
}

impl LocalDesk {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            store,
            read_allow: config.collections.read_allow(),
            review_allow: config.collections.review_allow(),
            full_scan_limit: config.collections.full_scan_limit,
        }
    }

    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        Ok(Self::new(Arc::new(SqliteStore::new(pool)), config))
    }
}

#[async_trait]
impl DeskBackend for LocalDesk {
    fn describe(&self) -> String {
        format!("local ({})", self.store.backend())
    }

    async fn load(&self, request: &CollectionRequest) -> Result<Vec<Document>> {
        load_collection(
            self.store.as_ref(),
            &self.read_allow,
            request,
            self.full_scan_limit,
        )
        .await
    }

    async fn review(&self, request: &ReviewRequest) -> Result<ReviewReceipt> {
        mark_reviewed(self.store.as_ref(), &self.review_allow, request).await
    }
}

/// Non-success response from a review-desk server.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    code: String,
}

fn strip(message: &str, prefix: &str) -> String {
    message.strip_prefix(prefix).unwrap_or(message).to_string()
}

/// Rebuilds the domain error a server reported, so callers can match on it.
fn remote_error(status: u16, body: &str) -> anyhow::Error {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(e) => {
            match e.code.as_str() {
                "unauthorized_collection" => {
                    DeskError::UnauthorizedCollection(strip(&e.error, "unauthorized collection: ")).into()
                }
                "bad_request" => {
                    DeskError::InvalidPayload(strip(&e.error, "invalid payload: ")).into()
                }
                "not_found" => DeskError::NotFound(e.error).into(),
                "conflict" => DeskError::Conflict(e.error).into(),
                _ => RemoteError::Status {
                    status,
                    message: e.error,
                }
                .into(),
            }
        }
        Err(_) => RemoteError::Status {
            status,
            message: body.to_string(),
        }
        .into(),
    }
}

pub struct RemoteDesk {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteDesk {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(remote_error(status.as_u16(), &body));
        }
        resp.json::<T>()
            .await
            .context("failed to decode server response")
    }
}

#[async_trait]
impl DeskBackend for RemoteDesk {
    fn describe(&self) -> String {
        self.endpoint.clone()
    }

    async fn load(&self, request: &CollectionRequest) -> Result<Vec<Document>> {
        let url = format!("{}/api/collection", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .query(request)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        Self::decode(resp).await
    }

    async fn review(&self, request: &ReviewRequest) -> Result<ReviewReceipt> {
        let url = format!("{}/api/review", self.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;
        Self::decode(resp).await
    }
}

/// Picks the backend: remote when an endpoint is configured or forced.
pub async fn connect(config: &Config, force_remote: bool) -> Result<Box<dyn DeskBackend>> {
    match (&config.client.endpoint, force_remote) {
        (Some(endpoint), _) => Ok(Box::new(RemoteDesk::new(
            endpoint,
            config.client.timeout_secs,
        )?)),
        (None, true) => anyhow::bail!("--remote requires [client].endpoint in the config"),
        (None, false) => Ok(Box::new(LocalDesk::open(config).await?)),
    }
}
