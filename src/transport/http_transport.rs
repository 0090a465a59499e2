use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::retry_policy::RetryPolicy;
use crate::config::HttpConfig;
use crate::error::{upstream_error_message, SdkError};

/// Response body as a boxed byte-chunk stream, ready for a decoder.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

fn build_reqwest_client(config: &HttpConfig) -> Result<reqwest::Client, SdkError> {
    let pool_idle_timeout = if config.pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.pool_idle_timeout_secs))
    };

    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(config.timeout));

    if let Some(proxy_url) = config.proxy.as_deref() {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| SdkError::Config(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else if !config.use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| SdkError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// HTTP transport for platform requests.
///
/// The pooled client is built lazily on first use and shared by clones of
/// the owning `Arc`.
pub struct HttpTransport {
    config: HttpConfig,
    client: OnceLock<Arc<reqwest::Client>>,
    retry: RetryPolicy,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            config: config.clone(),
            client: OnceLock::new(),
            retry: RetryPolicy::new(config.retry_max_attempts),
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn client(&self) -> Result<Arc<reqwest::Client>, SdkError> {
        if let Some(existing) = self.client.get() {
            return Ok(existing.clone());
        }
        let built = Arc::new(build_reqwest_client(&self.config)?);
        let _ = self.client.set(built.clone());
        Ok(self.client.get().cloned().unwrap_or(built))
    }

    /// Send the request that opens a stream, retrying retriable failures.
    ///
    /// The returned response may still carry a non-success status once the
    /// retry budget is spent; pass it through [`ensure_success`].
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Transport`] when the client cannot be built,
    /// request execution fails, or retries are exhausted.
    pub async fn send_stream(
        &self,
        url: &url::Url,
        headers: &http::HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, SdkError> {
        let client = self.client()?;
        let mut attempt = 0;
        loop {
            let mut request = reqwest::Request::new(http::Method::POST, url.clone());
            *request.headers_mut() = headers.clone();
            *request.body_mut() = Some(reqwest::Body::from(body.clone()));

            match client.execute(request).await {
                Ok(response) => {
                    if self.retry.allows(attempt)
                        && RetryPolicy::should_retry_status(response.status())
                    {
                        let delay = RetryPolicy::status_delay(response.headers(), attempt);
                        tracing::debug!(
                            status = response.status().as_u16(),
                            retry_attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            "retrying platform request after retriable status"
                        );
                        drop(response);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    let message = error_chain_message(&err);
                    if !self.retry.allows(attempt) || !RetryPolicy::should_retry_transport(&message)
                    {
                        return Err(SdkError::Transport(message));
                    }
                    let delay = RetryPolicy::transport_delay(&message, attempt);
                    tracing::debug!(
                        retry_attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "retrying platform request after transport error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Reject non-success responses before any byte reaches a decoder.
///
/// # Errors
///
/// Returns [`SdkError::Upstream`] carrying the status and the platform's
/// error message for any non-2xx status.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SdkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => {
            tracing::debug!(
                status = status.as_u16(),
                error = %error_chain_message(&err),
                "failed to read platform error body"
            );
            String::new()
        }
    };
    let message = upstream_error_message(&body);
    tracing::warn!(status = status.as_u16(), error = %message, "platform rejected request");
    Err(SdkError::Upstream {
        status: status.as_u16(),
        message,
    })
}

/// Render an error with every `source()` cause appended.
///
/// reqwest keeps the I/O cause (refused, reset, timed out) out of its own
/// `Display`, so retry classification needs the whole chain.
pub(crate) fn error_chain_message(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    for cause in std::iter::successors(err.source(), |cause| cause.source()) {
        let cause = cause.to_string();
        if !message.ends_with(&cause) {
            message.push_str(": ");
            message.push_str(&cause);
        }
    }
    message
}

/// Hand a successful response body over as a [`BodyStream`].
#[must_use]
pub fn body_stream(response: reqwest::Response) -> BodyStream {
    response.bytes_stream().boxed()
}
