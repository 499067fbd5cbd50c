// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sends aggregated log batches to the OTLP/HTTP logs route.

use std::io::Write;
use std::time::{Duration, Instant};

use flate2::write::GzEncoder;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::config::{Compression, ExportConfig};
use crate::constants::FLUSH_RETRY_BACKOFF_MS;
use crate::error::CollectorError;
use crate::otlp::OtlpEnvelope;

const ZSTD_COMPRESSION_LEVEL: i32 = 3;

/// How a failed export request is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Up to n attempts, back to back
    Immediate(u64),
    /// Up to n attempts, waiting `attempt * delay_ms` between them
    LinearBackoff(u64, u64),
}

impl RetryStrategy {
    fn attempts(self) -> u64 {
        match self {
            Self::Immediate(attempts) | Self::LinearBackoff(attempts, _) => attempts.max(1),
        }
    }

    fn delay(self, attempt: u64) -> Option<Duration> {
        match self {
            Self::Immediate(_) => None,
            Self::LinearBackoff(_, delay_ms) => {
                Some(Duration::from_millis(delay_ms.saturating_mul(attempt)))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    #[error("export rejected with status {0}")]
    Rejected(u16),

    #[error("export failed after {attempts} attempts: {message}")]
    Exhausted { attempts: u64, message: String },

    #[error("failed to build export request: {0}")]
    Request(String),
}

/// Batches delivered and lost by one flush.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    pub sent: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for FlushOutcome {
    fn add_assign(&mut self, other: Self) {
        self.sent += other.sent;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone)]
pub struct Flusher {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    compression: Compression,
    envelope: OtlpEnvelope,
    retry_strategy: RetryStrategy,
}

impl Flusher {
    /// # Errors
    ///
    /// Returns [`CollectorError::ExportStart`] when a header is not a valid
    /// HTTP header or the HTTP client cannot be built.
    pub fn new(config: &ExportConfig) -> Result<Self, CollectorError> {
        let client = build_client(config.timeout)
            .map_err(|e| CollectorError::ExportStart(format!("HTTP client: {e}")))?;
        let envelope = OtlpEnvelope::new(&config.service_name, &config.resource_attributes)
            .map_err(|e| CollectorError::ExportStart(format!("resource: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| CollectorError::ExportStart(format!("header {key}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| CollectorError::ExportStart(format!("header {key}: {e}")))?;
            headers.insert(name, value);
        }

        Ok(Flusher {
            client,
            url: config.url.clone(),
            headers,
            compression: config.compression,
            envelope,
            retry_strategy: RetryStrategy::LinearBackoff(
                config.retry_count,
                FLUSH_RETRY_BACKOFF_MS,
            ),
        })
    }

    #[must_use]
    pub fn with_retry_strategy(mut self, retry_strategy: RetryStrategy) -> Self {
        self.retry_strategy = retry_strategy;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends every batch concurrently.
    pub async fn flush(&self, batches: Vec<Vec<u8>>) -> FlushOutcome {
        if batches.is_empty() {
            return FlushOutcome::default();
        }
        debug!("OTLP | Flushing {} batches to {}", batches.len(), self.url);

        let mut set = JoinSet::new();
        for batch in batches {
            let req = self.create_request(&batch);
            let retry_strategy = self.retry_strategy;
            set.spawn(async move { Self::send(req, retry_strategy).await });
        }

        let mut outcome = FlushOutcome::default();
        while let Some(result) = set.join_next().await {
            match result {
                Ok(Ok(())) => outcome.sent += 1,
                Ok(Err(e)) => {
                    debug!("OTLP | Batch dropped: {}", e);
                    outcome.failed += 1;
                }
                Err(e) => {
                    error!("OTLP | Failed to join task: {}", e);
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    fn create_request(&self, batch: &[u8]) -> reqwest::RequestBuilder {
        let body = self.envelope.wrap(batch);
        let mut headers = self.headers.clone();
        let body = match compress(self.compression, &body) {
            Ok(Some(compressed)) => {
                if let Some(encoding) = self.compression.content_encoding() {
                    headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
                }
                compressed
            }
            Ok(None) => body,
            Err(e) => {
                warn!("OTLP | Failed to compress batch, sending it uncompressed: {}", e);
                body
            }
        };
        self.client.post(&self.url).headers(headers).body(body)
    }

    async fn send(req: reqwest::RequestBuilder, retry_strategy: RetryStrategy) -> Result<(), FlushError> {
        let max_attempts = retry_strategy.attempts();
        let mut attempts = 0;
        let time = Instant::now();

        loop {
            attempts += 1;
            let Some(cloned_req) = req.try_clone() else {
                return Err(FlushError::Request("request body cannot be cloned".to_string()));
            };

            let failure = match cloned_req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        debug!(
                            "OTLP | Batch accepted with status {} after {} attempts",
                            status, attempts
                        );
                        return Ok(());
                    }
                    if !is_retryable(status) {
                        let body = resp.text().await.unwrap_or_default();
                        error!(
                            "OTLP | Export rejected with status {}, dropping batch: {}",
                            status, body
                        );
                        return Err(FlushError::Rejected(status.as_u16()));
                    }
                    format!("status {status}")
                }
                Err(e) => e.to_string(),
            };

            if attempts >= max_attempts {
                error!(
                    "OTLP | Failed to send request after {} ms and {} attempts: {}",
                    time.elapsed().as_millis(),
                    attempts,
                    failure
                );
                return Err(FlushError::Exhausted {
                    attempts,
                    message: failure,
                });
            }

            debug!("OTLP | Attempt {} failed: {}, retrying", attempts, failure);
            if let Some(delay) = retry_strategy.delay(attempts) {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)))
        .build()
}

/// Compressed payload, or `None` when compression is off.
fn compress(compression: Compression, data: &[u8]) -> std::io::Result<Option<Vec<u8>>> {
    match compression {
        Compression::None => Ok(None),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            encoder.finish().map(Some)
        }
        Compression::Zstd => {
            let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), ZSTD_COMPRESSION_LEVEL)?;
            encoder.write_all(data)?;
            encoder.finish().map(Some)
        }
    }
}
