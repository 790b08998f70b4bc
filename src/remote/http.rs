//! reqwest-backed implementation of the remote traits.
//!
//! One [`HttpRemote`] serves all three backend roles against a single base
//! url:
//!
//! - `POST /execute` and `GET /execute/{task}/stream` for runs,
//! - `GET /storage/manifest` and `GET /storage/chunk` for chunked content,
//!   `POST /storage/flush` for pushing local edits back,
//! - `/workspaces` routes for lifecycle and save history.
//!
//! Non-2xx responses become [`TransportError::Status`] with the remote's
//! body preserved, so failures read the way the remote described them.

use super::config::RemoteConfig;
use super::{
    EventByteStream, ExecutionBackend, Manifest, StorageBackend, TransportError, WorkspaceBackend,
};
use crate::serializer::ExecutionRequest;
use crate::types::{ResourceKey, TaskId, WorkspaceId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// HTTP client for the execution, storage, and workspace collaborators.
#[derive(Clone, Debug)]
pub struct HttpRemote {
    config: RemoteConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SubmitResponse {
    task_id: String,
}

impl HttpRemote {
    /// Build a client, validating the configured base url.
    ///
    /// The underlying client carries no global timeout; per-request
    /// deadlines are applied everywhere except the long-lived event
    /// stream.
    pub fn new(config: RemoteConfig) -> Result<Self, TransportError> {
        let url = config.base_url.trim_end_matches('/').to_string();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TransportError::InvalidBaseUrl {
                url,
                reason: "scheme must be http or https".into(),
            });
        }
        if url.is_empty() || url == "http://" || url == "https://" {
            return Err(TransportError::InvalidBaseUrl {
                url,
                reason: "missing host".into(),
            });
        }
        let client = reqwest::Client::builder().build().map_err(|source| {
            TransportError::Request {
                url: url.clone(),
                source,
            }
        })?;
        Ok(Self {
            config: RemoteConfig {
                base_url: url,
                ..config
            },
            client,
        })
    }

    /// Build a client from `WEFTRUN_BASE_URL` / `WEFTRUN_AUTH_TOKEN`.
    pub fn from_env() -> Result<Self, TransportError> {
        Self::new(RemoteConfig::from_env())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    fn prepare(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.timeout(self.config.request_timeout);
        match &self.config.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        url: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransportError> {
        let response = builder
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;
        ensure_success(url, response).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
    ) -> Result<T, TransportError> {
        let response = self.send(&url, self.prepare(self.client.get(&url))).await?;
        let body = response
            .text()
            .await
            .map_err(|source| TransportError::Request {
                url: url.clone(),
                source,
            })?;
        serde_json::from_str(&body).map_err(|source| TransportError::Decode { url, source })
    }
}

async fn ensure_success(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

#[async_trait]
impl ExecutionBackend for HttpRemote {
    async fn submit(&self, request: &ExecutionRequest) -> Result<TaskId, TransportError> {
        let url = self.endpoint("/execute");
        debug!(
            blocks = request.blocks.len(),
            edges = request.edges.len(),
            "submitting execution request"
        );
        let response = self
            .send(&url, self.prepare(self.client.post(&url)).json(request))
            .await?;
        let body = response
            .text()
            .await
            .map_err(|source| TransportError::Request {
                url: url.clone(),
                source,
            })?;
        let submitted: SubmitResponse = serde_json::from_str(&body)
            .map_err(|source| TransportError::Decode { url, source })?;
        Ok(TaskId::from(submitted.task_id))
    }

    async fn open_stream(&self, task_id: &TaskId) -> Result<EventByteStream, TransportError> {
        let url = self.endpoint(&format!("/execute/{task_id}/stream"));
        debug!(%task_id, "opening run event stream");
        // No request timeout here: the stream stays open for the whole run.
        let builder = match &self.config.auth_token {
            Some(token) => self.client.get(&url).bearer_auth(token),
            None => self.client.get(&url),
        };
        let response = builder
            .header("accept", "text/event-stream")
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.clone(),
                source,
            })?;
        let response = ensure_success(&url, response).await?;
        let stream = response
            .bytes_stream()
            .map(|item| match item {
                Ok(bytes) => Ok(bytes.to_vec()),
                Err(err) => Err(TransportError::StreamInterrupted {
                    reason: err.to_string(),
                }),
            })
            .boxed();
        Ok(stream)
    }
}

#[async_trait]
impl StorageBackend for HttpRemote {
    async fn fetch_manifest(&self, key: &ResourceKey) -> Result<Manifest, TransportError> {
        let url = format!("{}?key={key}", self.endpoint("/storage/manifest"));
        self.get_json(url).await
    }

    async fn fetch_chunk(&self, key: &ResourceKey, name: &str) -> Result<String, TransportError> {
        let url = format!("{}?key={key}/{name}", self.endpoint("/storage/chunk"));
        let response = self.send(&url, self.prepare(self.client.get(&url))).await?;
        response
            .text()
            .await
            .map_err(|source| TransportError::Request { url, source })
    }

    async fn flush_content(
        &self,
        key: &ResourceKey,
        content: &str,
    ) -> Result<(), TransportError> {
        let url = format!("{}?key={key}", self.endpoint("/storage/flush"));
        debug!(%key, bytes = content.len(), "flushing edited content to storage");
        self.send(
            &url,
            self.prepare(self.client.post(&url))
                .header("content-type", "text/plain; charset=utf-8")
                .body(content.to_string()),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WorkspaceBackend for HttpRemote {
    async fn create_workspace(&self, id: &WorkspaceId, title: &str) -> Result<(), TransportError> {
        let url = self.endpoint("/workspaces");
        self.send(
            &url,
            self.prepare(self.client.post(&url))
                .json(&json!({ "id": id, "title": title })),
        )
        .await?;
        Ok(())
    }

    async fn delete_workspace(&self, id: &WorkspaceId) -> Result<(), TransportError> {
        let url = self.endpoint(&format!("/workspaces/{id}"));
        self.send(&url, self.prepare(self.client.delete(&url))).await?;
        Ok(())
    }

    async fn rename_workspace(&self, id: &WorkspaceId, title: &str) -> Result<(), TransportError> {
        let url = self.endpoint(&format!("/workspaces/{id}"));
        self.send(
            &url,
            self.prepare(self.client.patch(&url))
                .json(&json!({ "title": title })),
        )
        .await?;
        Ok(())
    }

    async fn save_history(
        &self,
        id: &WorkspaceId,
        content: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<(), TransportError> {
        let url = self.endpoint(&format!("/workspaces/{id}/history"));
        self.send(
            &url,
            self.prepare(self.client.post(&url)).json(&json!({
                "content": content,
                "captured_at": captured_at.to_rfc3339(),
            })),
        )
        .await?;
        Ok(())
    }
}
