use std::time::Duration;

use synccoord_core::{AppError, AppResult};

/// Linear-backoff retry policy shared by the HTTP adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRetryPolicy {
    max_attempts: u8,
    retry_backoff_ms: u64,
}

impl Default for HttpRetryPolicy {
    fn default() -> Self {
        Self::new(3, 250)
    }
}

impl HttpRetryPolicy {
    /// Creates a policy; zero attempts is treated as one.
    #[must_use]
    pub fn new(max_attempts: u8, retry_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_backoff_ms: retry_backoff_ms.max(50),
        }
    }

    /// Sends a request, retrying transport errors, 5xx, and 429.
    ///
    /// Other non-success statuses fail immediately with the response body.
    pub(crate) async fn send<F>(
        &self,
        http_client: &reqwest::Client,
        operation: &str,
        mut build: F,
    ) -> AppResult<reqwest::Response>
    where
        F: FnMut(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_u8;
        let mut last_error: Option<String> = None;

        while attempt < self.max_attempts {
            attempt = attempt.saturating_add(1);
            let response = build(http_client).send().await;

            match response {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if is_transient(response.status()) => {
                    last_error = Some(format!(
                        "transient HTTP status {} for {operation}",
                        response.status()
                    ));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
                    return Err(if status == reqwest::StatusCode::NOT_FOUND {
                        AppError::NotFound(format!("{operation} returned {status}: {body}"))
                    } else {
                        AppError::Validation(format!(
                            "{operation} failed with status {status}: {body}"
                        ))
                    });
                }
                Err(error) => {
                    last_error = Some(format!("{operation} transport error: {error}"));
                }
            }

            if attempt < self.max_attempts {
                let delay = self.retry_backoff_ms.saturating_mul(u64::from(attempt));
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(AppError::Unavailable(last_error.unwrap_or_else(|| {
            format!("{operation} exhausted retries")
        })))
    }
}

fn is_transient(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

/// Joins a base URL and a path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
