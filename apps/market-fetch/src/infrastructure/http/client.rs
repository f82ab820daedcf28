//! HTTP client wrapper with retry logic.

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::error::FetchError;
use crate::application::{Interrupted, RetryingInvoker};
use crate::infrastructure::config::{ConfigError, FetchConfig};

/// HTTP client whose requests are retried on transient failures.
///
/// Non-success responses become [`FetchError::Http`] before classification,
/// so a 503 is retried while a 404 fails on the first attempt.
#[derive(Debug, Clone)]
pub struct RetryingHttpClient {
    client: Client,
    invoker: RetryingInvoker<FetchError>,
}

impl RetryingHttpClient {
    /// Create a client from config.
    ///
    /// Fails when the configuration is invalid or the transport cannot be built.
    pub fn new(config: &FetchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let invoker = RetryingInvoker::new(config.retry.clone())?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self { client, invoker })
    }

    /// Assemble a client from an existing `reqwest` client and invoker.
    #[must_use]
    pub const fn from_parts(client: Client, invoker: RetryingInvoker<FetchError>) -> Self {
        Self { client, invoker }
    }

    /// Attach a retry observer.
    #[must_use]
    pub fn on_retry<F>(mut self, observer: F) -> Self
    where
        F: Fn(u32, &FetchError) + Send + Sync + 'static,
    {
        self.invoker = self.invoker.on_retry(observer);
        self
    }

    /// The invoker driving retries.
    #[must_use]
    pub const fn invoker(&self) -> &RetryingInvoker<FetchError> {
        &self.invoker
    }

    /// GET `url`, returning the first successful response.
    pub async fn fetch(&self, url: &str) -> Result<Response, FetchError> {
        self.fetch_with(|client| client.get(url)).await
    }

    /// Send the request produced by `build`, rebuilt for every attempt.
    pub async fn fetch_with<B>(&self, build: B) -> Result<Response, FetchError>
    where
        B: Fn(&Client) -> RequestBuilder,
    {
        self.invoker
            .invoke(|| send_checked(build(&self.client)))
            .await
    }

    /// Like [`fetch_with`](Self::fetch_with), stopping early when `token` is cancelled.
    pub async fn fetch_until_cancelled<B>(
        &self,
        build: B,
        token: &CancellationToken,
    ) -> Result<Response, Interrupted<FetchError>>
    where
        B: Fn(&Client) -> RequestBuilder,
    {
        self.invoker
            .invoke_until_cancelled(|| send_checked(build(&self.client)), token)
            .await
    }

    /// GET `url` and decode the final successful body as JSON.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        self.fetch_json_with(|client| client.get(url)).await
    }

    /// Send the request produced by `build` and decode the final body as JSON.
    ///
    /// Decoding happens once, after the retry loop; a malformed body is not retried.
    pub async fn fetch_json_with<T, B>(&self, build: B) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        B: Fn(&Client) -> RequestBuilder,
    {
        let response = self.fetch_with(build).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::from_transport(&e))
    }
}

/// Send one request and turn a non-success status into an error.
async fn send_checked(request: RequestBuilder) -> Result<Response, FetchError> {
    let response = request
        .send()
        .await
        .map_err(|e| FetchError::from_transport(&e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    tracing::debug!(
        status = status.as_u16(),
        url = %response.url(),
        "Request returned non-success status"
    );
    Err(FetchError::from_response(response).await)
}
