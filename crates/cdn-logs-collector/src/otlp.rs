// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! OTLP/HTTP JSON log model.
//!
//! Only the subset of `ExportLogsServiceRequest` the collector writes is
//! modelled. Field names follow the protobuf JSON mapping (camelCase, 64 bit
//! integers as decimal strings).

use cdn_log_parser::CdnLogRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{S3_KEY_ATTRIBUTE, SCOPE_NAME};

/// `SEVERITY_NUMBER_INFO`
pub const SEVERITY_NUMBER_INFO: i32 = 9;
pub const SEVERITY_TEXT_INFO: &str = "INFO";

const TIME_LOCAL_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportLogsServiceRequest {
    pub resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLogs {
    pub resource: Resource,
    pub scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeLogs {
    pub scope: InstrumentationScope,
    pub log_records: Vec<LogRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentationScope {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub time_unix_nano: String,
    pub observed_time_unix_nano: String,
    pub severity_number: i32,
    pub severity_text: String,
    pub body: AnyValue,
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

impl KeyValue {
    #[must_use]
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        KeyValue {
            key: key.into(),
            value: AnyValue {
                string_value: value.into(),
            },
        }
    }
}

/// All exported values are strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    pub string_value: String,
}

/// Parses an access log `time_local` value, with or without brackets, to Unix
/// nanoseconds.
///
/// ```
/// use cdn_logs_collector::otlp::parse_timestamp;
///
/// assert_eq!(
///     parse_timestamp("[26/Apr/2019:09:47:40 +0000]"),
///     Some(1_556_272_060_000_000_000)
/// );
/// assert_eq!(parse_timestamp("yesterday"), None);
/// ```
#[must_use]
pub fn parse_timestamp(time_local: &str) -> Option<i64> {
    let value = time_local.trim().trim_start_matches('[').trim_end_matches(']');
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_str(value, TIME_LOCAL_FORMAT)
        .ok()?
        .timestamp_nanos_opt()
}

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

impl LogRecord {
    /// Builds the exported record for one decoded access log line.
    ///
    /// The event time falls back to the current time when `time_local` does not
    /// parse. `observed_nanos` defaults to the current time.
    #[must_use]
    pub fn from_cdn_record(
        record: &CdnLogRecord,
        source_key: &str,
        observed_nanos: Option<i64>,
    ) -> Self {
        let time = parse_timestamp(&record.time_local).unwrap_or_else(now_nanos);
        let observed = observed_nanos.unwrap_or_else(now_nanos);

        let mut attributes: Vec<KeyValue> = record
            .attributes
            .iter()
            .map(|(k, v)| KeyValue::string(k, v))
            .collect();
        if !source_key.is_empty() {
            attributes.push(KeyValue::string(S3_KEY_ATTRIBUTE, source_key));
        }

        LogRecord {
            time_unix_nano: time.to_string(),
            observed_time_unix_nano: observed.to_string(),
            severity_number: SEVERITY_NUMBER_INFO,
            severity_text: SEVERITY_TEXT_INFO.to_string(),
            body: AnyValue {
                string_value: record.raw.clone(),
            },
            attributes,
        }
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.string_value.as_str())
    }
}

/// Request body around a batch of serialized log records.
///
/// The aggregator produces JSON arrays of records; the envelope places such an
/// array inside one resource and one scope without re-parsing it.
#[derive(Debug, Clone)]
pub struct OtlpEnvelope {
    prefix: Vec<u8>,
    suffix: &'static [u8],
}

impl OtlpEnvelope {
    /// # Errors
    ///
    /// Fails only if the resource cannot be serialized.
    pub fn new(
        service_name: &str,
        resource_attributes: &[(String, String)],
    ) -> Result<Self, serde_json::Error> {
        let mut attributes = vec![KeyValue::string("service.name", service_name)];
        attributes.extend(
            resource_attributes
                .iter()
                .map(|(k, v)| KeyValue::string(k, v)),
        );
        let resource = serde_json::to_string(&Resource { attributes })?;
        let scope = serde_json::to_string(&InstrumentationScope {
            name: SCOPE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })?;
        let prefix = format!(
            "{{\"resourceLogs\":[{{\"resource\":{resource},\"scopeLogs\":[{{\"scope\":{scope},\"logRecords\":"
        );
        Ok(OtlpEnvelope {
            prefix: prefix.into_bytes(),
            suffix: b"}]}]}",
        })
    }

    /// Wraps a JSON array of log records into an `ExportLogsServiceRequest`.
    #[must_use]
    pub fn wrap(&self, batch: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.prefix.len() + batch.len() + self.suffix.len());
        body.extend_from_slice(&self.prefix);
        body.extend_from_slice(batch);
        body.extend_from_slice(self.suffix);
        body
    }
}
