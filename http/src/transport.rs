//! `reqwest` transport implementation

use crate::config::HttpTransportConfig;
use crate::error::HttpError;
use courier_core::environment::{Cancellable, CompletionListener, Transport};
use courier_core::error::TransportError;
use courier_core::response::{Timing, TransportResponse, TransportResult};
use courier_core::wire::WireRequest;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, redirect};
use std::time::Instant;

/// Transport that performs requests with a shared `reqwest` client
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
    config: HttpTransportConfig,
}

impl ReqwestTransport {
    /// Create a transport from COURIER_HTTP_* environment variables
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::ClientBuild`] if the client cannot be built
    pub fn from_env() -> Result<Self, HttpError> {
        Self::new(HttpTransportConfig::from_env())
    }

    /// Create a transport with explicit settings
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::ClientBuild`] if the client cannot be built
    pub fn new(config: HttpTransportConfig) -> Result<Self, HttpError> {
        let policy = if config.follow_redirects {
            redirect::Policy::default()
        } else {
            redirect::Policy::none()
        };
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .redirect(policy)
            .build()
            .map_err(|e| HttpError::ClientBuild(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Settings this transport was built with
    #[must_use]
    pub const fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    /// Perform one exchange
    ///
    /// Any HTTP status is a response; only failures to get one are errors.
    async fn exchange(client: Client, request: WireRequest) -> TransportResult {
        let method = Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let mut builder = client.request(method, request.url);
        for (key, value) in request.headers.iter() {
            builder = builder.header(key, value);
        }
        if let Some(content_type) = request.content_type {
            if !request.headers.contains(CONTENT_TYPE.as_str()) {
                builder = builder.header(CONTENT_TYPE, content_type);
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(map_error)?;
        let headers_at = started.elapsed();

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(key, value)| {
                (
                    key.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await.map_err(map_error)?.to_vec();
        let total = started.elapsed();

        Ok(TransportResponse {
            status,
            headers,
            body,
            timing: Some(Timing {
                request: Some(headers_at),
                response: Some(total.saturating_sub(headers_at)),
                ..Timing::total(total)
            }),
        })
    }
}

fn map_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(error.to_string())
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: WireRequest, listener: CompletionListener) -> Box<dyn Cancellable> {
        let client = self.client.clone();
        tracing::debug!(method = %request.method.as_str(), url = %request.url, "Sending request");
        let task = tokio::spawn(async move {
            let result = Self::exchange(client, request).await;
            match &result {
                Ok(response) => tracing::debug!(status = response.status, "Response received"),
                Err(error) => tracing::debug!(error = %error, "Request failed"),
            }
            listener.complete(result);
        });
        Box::new(task.abort_handle())
    }
}
