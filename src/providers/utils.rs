use backoff::ExponentialBackoff;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::traits::ProviderError;

/// Retries rate limits, server errors and transport failures with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(500),
        }
    }

    pub fn should_retry(&self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    pub fn is_retryable_error(&self, err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_request()
    }

    pub fn backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        self.base_delay * (1 << capped)
    }

    /// Total time spent sleeping when every retry is used.
    pub fn retry_budget(&self) -> Duration {
        (1..=self.max_retries).map(|attempt| self.backoff(attempt)).sum()
    }

    /// The same schedule for clients that drive their own retries.
    pub fn exponential_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.backoff(1),
            max_interval: self.backoff(5),
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: Some(self.retry_budget()),
            ..Default::default()
        }
    }

    /// Sends the request built by `build` and decodes a JSON body, retrying
    /// transient failures. `build` is called once per attempt.
    pub async fn send_json<T, F>(&self, label: &str, build: F) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            match build().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<T>().await.map_err(|e| {
                            ProviderError::InvalidResponse(format!("{}: {}", label, e.without_url()))
                        });
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if self.should_retry(status) && attempt < self.max_retries {
                        attempt += 1;
                        log::warn!("{} returned {}, retrying ({}/{})", label, status, attempt, self.max_retries);
                        tokio::time::sleep(self.backoff(attempt)).await;
                        continue;
                    }
                    return Err(ProviderError::Api {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(err) => {
                    if self.is_retryable_error(&err) && attempt < self.max_retries {
                        attempt += 1;
                        log::warn!("{} failed: {}, retrying ({}/{})", label, err, attempt, self.max_retries);
                        tokio::time::sleep(self.backoff(attempt)).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
