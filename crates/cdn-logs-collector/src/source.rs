// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Object storage access: listing log objects and reading their lines.

use std::io::Read;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use flate2::read::MultiGzDecoder;
use tracing::debug;

use crate::config::SourceConfig;
use crate::constants::ACCESS_LOG_SUFFIX;
use crate::error::SourceError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: i64,
}

/// Where log objects come from.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Access log objects under `prefix`, modified at or after `since` when set.
    async fn list(
        &self,
        prefix: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ObjectInfo>, SourceError>;

    /// Up to `max_keys` objects under `prefix`, whatever their suffix.
    async fn list_raw(&self, prefix: &str, max_keys: i32) -> Result<Vec<ObjectInfo>, SourceError>;

    /// Raw object body.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, SourceError>;

    /// Checks bucket access. Returns whether `prefix` holds at least one object.
    async fn verify(&self, prefix: &str) -> Result<bool, SourceError>;

    /// Name shown in user facing output.
    fn bucket(&self) -> &str;
}

/// Fetches an object and splits its decoded text into lines.
///
/// # Errors
///
/// Propagates fetch and decompression failures.
pub async fn read_lines<S: ObjectSource + ?Sized>(
    source: &S,
    key: &str,
) -> Result<Vec<String>, SourceError> {
    let body = source.fetch(key).await?;
    let text = decode_body(key, &body)?;
    Ok(text.lines().map(str::to_owned).collect())
}

/// Decodes an object body to text.
///
/// Gzip is only inflated when the key ends in `.gz` and the body carries the
/// gzip magic; some exporters write plain text under a `.gz` key. Invalid
/// UTF-8 is replaced.
///
/// # Errors
///
/// Returns [`SourceError::Decompress`] for a corrupt gzip stream.
pub fn decode_body(key: &str, body: &[u8]) -> Result<String, SourceError> {
    if key.ends_with(".gz") && body.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::with_capacity(body.len() * 4);
        MultiGzDecoder::new(body)
            .read_to_end(&mut inflated)
            .map_err(|e| SourceError::Decompress {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        return Ok(String::from_utf8_lossy(&inflated).into_owned());
    }
    Ok(String::from_utf8_lossy(body).into_owned())
}

/// Whether an object is an access log the collector should read.
#[must_use]
pub fn is_access_log(object: &ObjectInfo, since: Option<DateTime<Utc>>) -> bool {
    object.key.ends_with(ACCESS_LOG_SUFFIX) && since.map_or(true, |s| object.last_modified >= s)
}

/// Maps an error code and HTTP status from object storage onto [`SourceError`].
#[must_use]
pub fn classify(code: Option<&str>, status: Option<u16>, message: String) -> SourceError {
    let lowered = message.to_lowercase();
    let expired_code = matches!(
        code,
        Some("ExpiredToken" | "ExpiredTokenException" | "TokenRefreshRequired")
    );
    if expired_code
        || (lowered.contains("token") && (lowered.contains("expired") || lowered.contains("sso")))
    {
        return SourceError::CredentialsExpired(message);
    }
    let denied_code = matches!(
        code,
        Some(
            "AccessDenied"
                | "InvalidAccessKeyId"
                | "SignatureDoesNotMatch"
                | "AllAccessDisabled"
                | "InvalidToken"
        )
    );
    if denied_code || status == Some(403) {
        return SourceError::AccessDenied(message);
    }
    if matches!(code, Some("NoSuchBucket" | "NoSuchKey" | "NotFound")) || status == Some(404) {
        return SourceError::NotFound(message);
    }
    SourceError::Storage(message)
}

fn map_sdk_error<E>(context: &str, err: &SdkError<E, HttpResponse>) -> SourceError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    classify(
        err.code(),
        status,
        format!("{context}: {}", DisplayErrorContext(err)),
    )
}

fn to_chrono(value: Option<&aws_sdk_s3::primitives::DateTime>) -> DateTime<Utc> {
    value
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or_default()
}

/// [`ObjectSource`] backed by S3 or an S3 compatible store.
#[derive(Debug, Clone)]
pub struct S3Source {
    client: Client,
    bucket: String,
}

impl S3Source {
    /// Resolves credentials and region the way the AWS CLI does.
    pub async fn new(config: &SourceConfig) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        if config.anonymous {
            loader = loader.no_credentials();
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint_url) = &config.endpoint_url {
            debug!("Using S3 endpoint {endpoint_url} with path style addressing");
            builder = builder.endpoint_url(endpoint_url).force_path_style(true);
        }

        S3Source {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        }
    }

    async fn list_all(
        &self,
        prefix: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ObjectInfo>, SourceError> {
        let context = format!("listing s3://{}/{prefix}", self.bucket);
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| map_sdk_error(&context, &e))?;
            for object in page.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                objects.push(ObjectInfo {
                    key: key.to_string(),
                    last_modified: to_chrono(object.last_modified()),
                    size: object.size().unwrap_or_default(),
                });
                if limit.is_some_and(|l| objects.len() >= l) {
                    return Ok(objects);
                }
            }
        }
        Ok(objects)
    }
}

#[async_trait]
impl ObjectSource for S3Source {
    async fn list(
        &self,
        prefix: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ObjectInfo>, SourceError> {
        let objects = self.list_all(prefix, None).await?;
        let total = objects.len();
        let matched: Vec<ObjectInfo> = objects
            .into_iter()
            .filter(|o| is_access_log(o, since))
            .collect();
        debug!(
            "Listed {} objects under {}, {} access logs selected",
            total,
            prefix,
            matched.len()
        );
        Ok(matched)
    }

    async fn list_raw(&self, prefix: &str, max_keys: i32) -> Result<Vec<ObjectInfo>, SourceError> {
        let context = format!("listing s3://{}/{prefix}", self.bucket);
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| map_sdk_error(&context, &e))?;
        Ok(output
            .contents()
            .iter()
            .filter_map(|object| {
                Some(ObjectInfo {
                    key: object.key()?.to_string(),
                    last_modified: to_chrono(object.last_modified()),
                    size: object.size().unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, SourceError> {
        let context = format!("reading s3://{}/{key}", self.bucket);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(&context, &e))?;
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| SourceError::Storage(format!("{context}: {e}")))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn verify(&self, prefix: &str) -> Result<bool, SourceError> {
        let context = format!("accessing s3://{}", self.bucket);
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| map_sdk_error(&context, &e))?;
        let objects = self.list_all(prefix, Some(1)).await?;
        Ok(!objects.is_empty())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
