use std::fmt;

use tracing::debug;

use crate::types::{DidDocument, LogEntry};

/// A client for a PLC directory or mirror.
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("directory error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl DirectoryClient {
    /// Create a new client pointing at the given directory URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Returns the directory URL this client is configured with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch one page of the export stream: up to `count` entries strictly
    /// after `after`, ordered by `createdAt` ascending.
    pub async fn export_page(
        &self,
        after: Option<&str>,
        count: u32,
    ) -> Result<Vec<LogEntry>, ClientError> {
        let mut url = format!("{}/export?count={count}", self.base_url);
        if let Some(after) = after {
            url.push_str("&after=");
            url.push_str(after);
        }

        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(extract_server_error(resp).await);
        }

        let body = resp.text().await?;
        let entries = body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<LogEntry>, _>>()?;

        debug!(count = entries.len(), "fetched export page");
        Ok(entries)
    }

    /// Resolve a DID to its current document.
    pub async fn resolve(&self, did: &str) -> Result<DidDocument, ClientError> {
        let resp = self
            .http
            .get(format!("{}/{did}", self.base_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(extract_server_error(resp).await);
        }
        Ok(resp.json().await?)
    }

    /// Fetch the full stored log for one DID.
    pub async fn audit_log(&self, did: &str) -> Result<Vec<LogEntry>, ClientError> {
        let resp = self
            .http
            .get(format!("{}/export?count=all&did={did}", self.base_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(extract_server_error(resp).await);
        }
        let body = resp.text().await?;
        Ok(body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<LogEntry>, _>>()?)
    }
}

/// Server error response shape: `{"message": "..."}`.
#[derive(serde::Deserialize)]
struct ServerErrorBody {
    message: String,
}

impl fmt::Display for ServerErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

async fn extract_server_error(resp: reqwest::Response) -> ClientError {
    let status = resp.status().as_u16();
    let message = match resp.json::<ServerErrorBody>().await {
        Ok(body) => body.to_string(),
        Err(_) => format!("HTTP {status}"),
    };
    ClientError::Server { status, message }
}
