// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Bucket the G-Core raw log export writes to.
pub const DEFAULT_BUCKET: &str = "amzn-gcore-logs";

/// Prefixes scanned when none is given.
pub const DEFAULT_PREFIXES: [&str; 2] = ["/gcore/logs/", "/5gemerge/logs/"];

pub const DEFAULT_REGION: &str = "eu-west-1";

/// OTLP/HTTP collector address.
pub const DEFAULT_OTLP_ENDPOINT: &str = "localhost:4318";

pub const DEFAULT_SERVICE_NAME: &str = "cdn-logs-collector";

/// Path appended to the endpoint for log export.
pub const OTLP_LOGS_PATH: &str = "/v1/logs";

/// Instrumentation scope attached to every exported batch.
pub const SCOPE_NAME: &str = "cdn-logs";

/// Only objects with this key suffix are processed.
pub const ACCESS_LOG_SUFFIX: &str = "_access.log.gz";

/// Attribute holding the object key a record was read from.
pub const S3_KEY_ATTRIBUTE: &str = "cdn.s3_key";

// Maximum number of log records in one export request
pub const MAX_BATCH_ENTRIES_SIZE: usize = 1000;

// Maximum uncompressed size of one export request
pub const MAX_CONTENT_SIZE_BYTES: usize = 5 * 1_024 * 1_024;

// Maximum size of a single serialized log record
pub const MAX_LOG_SIZE_BYTES: usize = 1_024 * 1_024;

/// Records queued before the oldest ones are evicted.
pub const MAX_LOG_QUEUE_SIZE: usize = 50_000;

pub const DEFAULT_FLUSH_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_FLUSH_RETRY_COUNT: u64 = 3;

// Delay between retry attempts, multiplied by the attempt number
pub const FLUSH_RETRY_BACKOFF_MS: u64 = 200;

/// Raw keys listed per prefix when nothing matched.
pub const RAW_LISTING_SAMPLE: i32 = 5;
