//! Report download with bounded retries and exponential backoff.

use std::time::Duration;

use crate::CoreError;
use crate::config::Config;

/// Status and body of a completed HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// The slice of an HTTP client the downloader needs.
///
/// `Err` means the request never produced a response (DNS, connect, timeout,
/// body read). Non-200 statuses come back as `Ok`.
pub trait HttpGet {
    fn fetch(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<HttpResponse, String>>;
}

impl HttpGet for reqwest::Client {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<HttpResponse, String> {
        let resp = self
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Ok(HttpResponse {
                status,
                body: Vec::new(),
            });
        }
        let body = resp.bytes().await.map_err(|e| e.to_string())?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Fetches a URL, retrying any non-200 status or transport error.
pub struct Downloader<C> {
    client: C,
    max_retries: u32,
    backoff_base: Duration,
}

impl<C: HttpGet> Downloader<C> {
    pub fn new(client: C, max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            client,
            max_retries,
            backoff_base,
        }
    }

    pub fn from_config(client: C, config: &Config) -> Self {
        Self::new(
            client,
            config.download.max_retries,
            config.download.backoff_base(),
        )
    }

    /// Wait after failed attempt `attempt` (1-indexed): `base * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }

    /// Download `url`, making at most `max_retries` attempts.
    ///
    /// Only HTTP 200 counts as success. There is no sleep after the last
    /// failed attempt; exhausting every attempt is terminal.
    pub async fn download(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, CoreError> {
        for attempt in 1..=self.max_retries {
            match self.client.fetch(url, timeout).await {
                Ok(resp) if resp.status == 200 => {
                    log::debug!("Downloaded {} bytes on attempt {attempt}", resp.body.len());
                    return Ok(resp.body);
                }
                Ok(resp) => log::warn!("Attempt {attempt}: HTTP {}", resp.status),
                Err(e) => log::warn!("Attempt {attempt}: network error: {e}"),
            }

            if attempt < self.max_retries {
                let wait = self.backoff(attempt);
                log::info!(
                    "Waiting {:.1}s before the next attempt",
                    wait.as_secs_f64()
                );
                tokio::time::sleep(wait).await;
            }
        }

        Err(CoreError::DownloadExhausted {
            retries: self.max_retries,
        })
    }
}
