//! Repository handle proxied through a packrat server.

use crate::error::{RepoError, RepoResult};
use bytes::Bytes;
use packrat_core::{ContentId, ContentInfo};
use packrat_index::IndexError;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, de::DeserializeOwned};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Server status response.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerStatus {
    /// Unique id of the repository behind the server.
    pub unique_id: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// A read-only repository reached over HTTP.
#[derive(Clone)]
pub struct RemoteRepository {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    identity: String,
    status: ServerStatus,
    closed: Arc<AtomicBool>,
}

impl RemoteRepository {
    /// Connect to a server and fetch its status.
    pub async fn connect(base_url: &str, token: Option<&str>, identity: String) -> RepoResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| RepoError::Remote(format!("invalid server URL: {e}")))?;
        let mut remote = Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.map(str::to_string),
            identity,
            status: ServerStatus {
                unique_id: String::new(),
                version: None,
            },
            closed: Arc::new(AtomicBool::new(false)),
        };
        remote.status = remote.send_json(remote.request("/v1/status")?).await?;
        debug!(url = %remote.base_url, unique_id = %remote.status.unique_id, "Connected to server");
        Ok(remote)
    }

    fn request(&self, path: &str) -> RepoResult<reqwest::RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| RepoError::Remote(format!("failed to build API URL: {e}")))?;
        let req = self.http.get(url);
        Ok(match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        })
    }

    async fn execute(&self, req: reqwest::RequestBuilder) -> RepoResult<reqwest::Response> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RepoError::AlreadyClosed);
        }
        Ok(req.send().await?)
    }

    async fn check_status(response: reqwest::Response) -> RepoResult<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RepoError::Remote(format!("API error ({status}): {body}")));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> RepoResult<T> {
        let response = Self::check_status(self.execute(req).await?).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Send a content lookup; 404 maps to the index's not-found error.
    async fn send_content(
        &self,
        id: &ContentId,
        req: reqwest::RequestBuilder,
    ) -> RepoResult<reqwest::Response> {
        let response = self.execute(req).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(IndexError::NotFound(id.to_string()).into());
        }
        Self::check_status(response).await
    }

    pub fn status(&self) -> &ServerStatus {
        &self.status
    }

    pub fn client_identity(&self) -> &str {
        &self.identity
    }

    /// Remote handles never accept writes.
    pub fn is_read_only(&self) -> bool {
        true
    }

    pub async fn content_info(&self, id: &ContentId) -> RepoResult<ContentInfo> {
        let req = self.request(&format!("/v1/contents/{id}"))?;
        let body = self.send_content(id, req).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch a content's bytes and check them against its id.
    pub async fn get_content(&self, id: &ContentId) -> RepoResult<Bytes> {
        let req = self.request(&format!("/v1/contents/{id}/data"))?;
        let data = self.send_content(id, req).await?.bytes().await?;
        id.verify(&data).map_err(|e| {
            RepoError::Index(IndexError::Corrupted {
                content_id: id.to_string(),
                reason: e.to_string(),
            })
        })?;
        Ok(data)
    }

    pub fn close(&self) -> RepoResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(RepoError::AlreadyClosed);
        }
        Ok(())
    }
}
