//! HTTP client transport.
//!
//! Calls `POST <uri>/<procedureName>` with the argument as a JSON body;
//! introspection posts to the bare URI. Non-2xx replies are turned into
//! errors carrying the server's code, message and the HTTP status; refused
//! connections are flagged as connectivity failures.

use allserver_common::transport::HttpCodec;
use allserver_common::{codes, AllserverError, CallError, Envelope, Result};
use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use url::Url;

use super::ClientTransport;
use crate::context::ClientCallContext;

/// Request headers for one call.
///
/// Seeded from the transport's default headers; `before` middleware may add
/// or replace entries.
#[derive(Debug, Clone, Default)]
pub struct HttpHeaders(pub HeaderMap);

/// HTTP status of the last response received for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpStatus(pub u16);

pub struct HttpClientTransport {
    uri: String,
    base: Url,
    client: reqwest::Client,
    headers: HeaderMap,
}

impl HttpClientTransport {
    pub fn new(uri: &str) -> Result<Self> {
        let mut base = Url::parse(uri).map_err(|_| AllserverError::InvalidUri(uri.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            uri: uri.to_string(),
            base,
            client: reqwest::Client::new(),
            headers: HeaderMap::new(),
        })
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AllserverError::Transport(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AllserverError::Transport(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// The URL a procedure is served at.
    pub fn procedure_url(&self, procedure_name: &str) -> Url {
        let mut url = self.base.clone();
        let path = format!("{}{}", self.base.path(), procedure_name);
        url.set_path(&path);
        url
    }

    async fn post(&self, ctx: &mut ClientCallContext) -> std::result::Result<Envelope, CallError> {
        let url = self.procedure_url(&ctx.procedure_name);
        let body = serde_json::to_vec(&ctx.arg)?;
        let headers = ctx
            .extensions
            .get::<HttpHeaders>()
            .map(|h| h.0.clone())
            .unwrap_or_else(|| self.headers.clone());

        let response = self
            .client
            .post(url.clone())
            .headers(headers)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let error = CallError::new(e.to_string());
                if e.is_connect() || e.is_timeout() {
                    error.no_net_to_server()
                } else {
                    error
                }
            })?;

        let status = response.status();
        ctx.extensions.insert(HttpStatus(status.as_u16()));

        let text = response.text().await.map_err(|e| {
            CallError::coded(codes::ALLSERVER_RPC_RESPONSE_IS_NOT_TEXT, e.to_string())
                .with_status(status.as_u16())
        })?;

        if !status.is_success() {
            tracing::debug!("{} replied {}: {}", url, status, text);
            return Err(HttpCodec::error_from_response(status.as_u16(), &text));
        }

        let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            CallError::coded(
                codes::ALLSERVER_RPC_RESPONSE_IS_NOT_JSON,
                format!("Response from {} is not JSON: {}", url, e),
            )
            .with_status(status.as_u16())
        })?;

        Envelope::from_value(value).map_err(|_| {
            CallError::coded(
                codes::ALLSERVER_RPC_RESPONSE_IS_NOT_OBJECT,
                format!("Response from {} is not an envelope", url),
            )
            .with_status(status.as_u16())
        })
    }
}

#[async_trait]
impl ClientTransport for HttpClientTransport {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn call(&self, ctx: &mut ClientCallContext) -> std::result::Result<Envelope, CallError> {
        self.post(ctx).await
    }

    async fn introspect(
        &self,
        ctx: &mut ClientCallContext,
    ) -> std::result::Result<Envelope, CallError> {
        ctx.procedure_name.clear();
        self.post(ctx).await
    }

    fn create_call_context(&self, mut ctx: ClientCallContext) -> ClientCallContext {
        ctx.extensions.insert(HttpHeaders(self.headers.clone()));
        ctx
    }
}
