//! Outbound request pipeline.
//!
//! [`Transport`] is the single capability the clients depend on: send one
//! request, get back the fully buffered response. Cross-cutting steps such
//! as token injection are layered on by wrapping one transport in another.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AUTHORIZATION, HeaderValue};
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use keeper_core::config::FleetConfig;
use keeper_core::{KeeperError, KeeperResult, TokenIssuer};

/// Sends a request and returns the response with its body collected.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request<Full<Bytes>>) -> KeeperResult<Response<Bytes>>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request<Full<Bytes>>) -> KeeperResult<Response<Bytes>> {
        (**self).send(request).await
    }
}

/// Plain HTTP/1 transport with a uniform per-request timeout.
///
/// The timeout covers connect, request, and body collection. Nothing is
/// retried.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request<Full<Bytes>>) -> KeeperResult<Response<Bytes>> {
        let uri = request.uri().clone();
        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| KeeperError::Transport(format!("{uri}: {e}")))?;
            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| KeeperError::Transport(format!("{uri}: read body: {e}")))?
                .to_bytes();
            Ok::<_, KeeperError>(Response::from_parts(parts, body))
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%uri, timeout = ?self.timeout, "request timed out");
                Err(KeeperError::Timeout(self.timeout))
            }
        }
    }
}

/// Decorates a transport with an `Authorization` header per request.
///
/// A failed token issuance aborts the request before it is sent.
pub struct Authenticated<T> {
    inner: T,
    issuer: Arc<dyn TokenIssuer>,
}

impl<T: Transport> Authenticated<T> {
    pub fn new(inner: T, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self { inner, issuer }
    }
}

#[async_trait]
impl<T: Transport> Transport for Authenticated<T> {
    async fn send(&self, mut request: Request<Full<Bytes>>) -> KeeperResult<Response<Bytes>> {
        let token = self.issuer.token().await?;
        // The orchestration API expects the colon-suffixed scheme.
        let value = HeaderValue::from_str(&format!("Bearer: {token}"))
            .map_err(|e| KeeperError::Token(format!("token is not a valid header value: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, value);
        self.inner.send(request).await
    }
}

/// Token read once from config or the environment.
#[derive(Debug, Clone)]
pub struct StaticTokenIssuer {
    token: String,
}

impl StaticTokenIssuer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Take `fleet.token`, falling back to the variable named by `fleet.token_env`.
    pub fn from_config(config: &FleetConfig) -> Self {
        let token = config
            .token
            .clone()
            .or_else(|| {
                config
                    .token_env
                    .as_deref()
                    .and_then(|name| std::env::var(name).ok())
            })
            .unwrap_or_default();
        Self { token }
    }
}

#[async_trait]
impl TokenIssuer for StaticTokenIssuer {
    async fn token(&self) -> KeeperResult<String> {
        if self.token.is_empty() {
            return Err(KeeperError::Token("no fleet token configured".into()));
        }
        Ok(self.token.clone())
    }
}
