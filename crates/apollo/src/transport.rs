//! Remote transport to the config service.

use crate::types::{ApolloError, ConnectConfig};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use std::fmt;
use url::Url;

/// How a request to the config service completed.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The server reported "not modified".
    Unchanged,
    /// The server returned new content.
    Changed(Bytes),
    /// The request failed before producing usable content.
    Failed(ApolloError),
}

impl FetchOutcome {
    /// Whether the request failed.
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Executes requests against the config service.
#[async_trait]
pub trait RemoteTransport: fmt::Debug + Send + Sync {
    /// Execute `request`, honoring its timeout.
    async fn execute(&self, request: &ConnectConfig) -> FetchOutcome;
}

/// HTTP-based transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for the config service at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ApolloError> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a transport reusing an existing HTTP client.
    pub fn with_client(base_url: &str, http: reqwest::Client) -> Result<Self, ApolloError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ApolloError::InvalidConfig(format!("invalid ip {base_url}: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { base_url, http })
    }

    /// Base URL requests are resolved against.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for a relative request URI.
    pub fn url_for(&self, uri: &str) -> Result<Url, ApolloError> {
        self.base_url
            .join(uri)
            .map_err(|e| ApolloError::Transport(format!("invalid request uri {uri}: {e}")))
    }

    async fn send(&self, request: &ConnectConfig) -> Result<FetchOutcome, ApolloError> {
        let url = self.url_for(&request.uri)?;
        // TODO: sign with `request.secret` (HMAC-SHA1 `Authorization` header) once
        // access-key protected namespaces are needed.
        let resp = self.http.get(url).timeout(request.timeout).send().await?;

        match resp.status() {
            StatusCode::OK => Ok(FetchOutcome::Changed(resp.bytes().await?)),
            StatusCode::NOT_MODIFIED => Ok(FetchOutcome::Unchanged),
            status => {
                Err(ApolloError::Status { status: status.as_u16(), uri: request.uri.clone() })
            }
        }
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn execute(&self, request: &ConnectConfig) -> FetchOutcome {
        self.send(request).await.unwrap_or_else(FetchOutcome::Failed)
    }
}
