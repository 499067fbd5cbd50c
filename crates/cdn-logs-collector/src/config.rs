// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Command line and environment configuration.
//!
//! [`Args`] is the raw clap surface; [`Config::from_args`] turns it into a
//! validated [`Config`] the collector runs from.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, ValueEnum};
use tracing::debug;

use crate::constants;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Value of the `Content-Encoding` header, if any.
    #[must_use]
    pub fn content_encoding(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Gzip => Some("gzip"),
            Self::Zstd => Some("zstd"),
        }
    }
}

/// Ship G-Core CDN access logs from S3 to an OTLP/HTTP log endpoint.
#[derive(Debug, Clone, Parser)]
#[command(name = "cdn-logs-collector", version, about)]
#[allow(clippy::struct_excessive_bools)]
pub struct Args {
    /// S3 bucket holding the raw log export
    #[arg(long, env = "CDN_LOGS_BUCKET", default_value = constants::DEFAULT_BUCKET)]
    pub bucket: String,

    /// Key prefix to scan; repeat for several prefixes
    #[arg(long = "prefix", env = "CDN_LOGS_PREFIX")]
    pub prefixes: Vec<String>,

    /// Only process objects modified in the last N minutes
    #[arg(long)]
    pub since_minutes: Option<u64>,

    /// OTLP/HTTP endpoint
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", default_value = constants::DEFAULT_OTLP_ENDPOINT)]
    pub endpoint: String,

    /// Use TLS when the endpoint has no scheme
    #[arg(long)]
    pub no_insecure: bool,

    #[arg(long, env = "OTEL_SERVICE_NAME", default_value = constants::DEFAULT_SERVICE_NAME)]
    pub service_name: String,

    /// Named AWS profile
    #[arg(long, env = "AWS_PROFILE")]
    pub aws_profile: Option<String>,

    #[arg(long, env = "AWS_REGION", default_value = constants::DEFAULT_REGION)]
    pub region: String,

    /// Endpoint URL of an S3 compatible store
    #[arg(long, env = "CDN_LOGS_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Send unsigned requests (public buckets)
    #[arg(long)]
    pub anonymous: bool,

    #[arg(long, value_enum, env = "CDN_LOGS_OTLP_COMPRESSION", default_value_t = Compression::None)]
    pub compression: Compression,

    /// Extra export header as KEY=VALUE; repeatable
    #[arg(long = "header", env = "OTEL_EXPORTER_OTLP_HEADERS", value_delimiter = ',')]
    pub headers: Vec<String>,

    /// Log records per export request
    #[arg(long, default_value_t = constants::MAX_BATCH_ENTRIES_SIZE)]
    pub batch_size: usize,

    #[arg(long, default_value_t = constants::DEFAULT_FLUSH_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Attempts per export request
    #[arg(long, default_value_t = constants::DEFAULT_FLUSH_RETRY_COUNT)]
    pub retries: u64,

    #[arg(long, env = "CDN_LOGS_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Check bucket access and exit
    #[arg(long)]
    pub verify: bool,

    /// List the objects that would be processed
    #[arg(long)]
    pub dry_run: bool,

    /// Print requests carrying CMCD data without exporting
    #[arg(long)]
    pub inspect_cmcd: bool,

    /// Process a single object key
    #[arg(long)]
    pub key: Option<String>,

    #[arg(long, short)]
    pub verbose: bool,

    /// Total objects to process across prefixes
    #[arg(long)]
    pub max_objects: Option<usize>,

    /// Lines read per object
    #[arg(long)]
    pub max_lines_per_file: Option<usize>,
}

/// What a run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Verify,
    DryRun,
    InspectCmcd,
    Export,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub bucket: String,
    pub region: String,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
    pub anonymous: bool,
}

/// Settings handed to the flusher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    /// Full URL of the logs route, e.g. `http://localhost:4318/v1/logs`
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub compression: Compression,
    pub timeout: Duration,
    pub retry_count: u64,
    pub batch_size: usize,
    pub service_name: String,
    pub resource_attributes: Vec<(String, String)>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            url: logs_url(constants::DEFAULT_OTLP_ENDPOINT, true),
            headers: Vec::new(),
            compression: Compression::None,
            timeout: Duration::from_secs(constants::DEFAULT_FLUSH_TIMEOUT_SECS),
            retry_count: constants::DEFAULT_FLUSH_RETRY_COUNT,
            batch_size: constants::MAX_BATCH_ENTRIES_SIZE,
            service_name: constants::DEFAULT_SERVICE_NAME.to_string(),
            resource_attributes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub prefixes: Vec<String>,
    pub since_minutes: Option<u64>,
    pub since: Option<DateTime<Utc>>,
    /// Endpoint as given, used in user facing output
    pub endpoint: String,
    pub export: ExportConfig,
    pub mode: Mode,
    pub key: Option<String>,
    pub verbose: bool,
    pub max_objects: Option<usize>,
    pub max_lines_per_file: Option<usize>,
    pub log_level: String,
}

impl Config {
    /// Builds and validates the run configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is missing or malformed.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let prefixes = if args.prefixes.is_empty() {
            constants::DEFAULT_PREFIXES
                .iter()
                .map(|p| normalize_prefix(p))
                .collect()
        } else {
            args.prefixes.iter().map(|p| normalize_prefix(p)).collect()
        };

        let since = match args.since_minutes {
            Some(minutes) => {
                let minutes = i64::try_from(minutes).map_err(|_| {
                    ConfigError::InvalidConfig(format!("since-minutes out of range: {minutes}"))
                })?;
                let since = TimeDelta::try_minutes(minutes)
                    .and_then(|delta| Utc::now().checked_sub_signed(delta))
                    .ok_or_else(|| {
                        ConfigError::InvalidConfig(format!("since-minutes out of range: {minutes}"))
                    })?;
                Some(since)
            }
            None => None,
        };

        let headers = args
            .headers
            .iter()
            .filter(|h| !h.trim().is_empty())
            .map(|h| parse_header(h))
            .collect::<Result<Vec<_>, _>>()?;

        let mode = if args.verify {
            Mode::Verify
        } else if args.dry_run {
            Mode::DryRun
        } else if args.inspect_cmcd {
            Mode::InspectCmcd
        } else {
            Mode::Export
        };

        let log_level = args
            .log_level
            .clone()
            .unwrap_or_else(|| if args.verbose { "debug" } else { "info" }.to_string())
            .to_lowercase();

        let config = Config {
            source: SourceConfig {
                bucket: args.bucket,
                region: args.region,
                profile: args.aws_profile.filter(|p| !p.is_empty()),
                endpoint_url: args.s3_endpoint.filter(|e| !e.is_empty()),
                anonymous: args.anonymous,
            },
            prefixes,
            since_minutes: args.since_minutes,
            since,
            export: ExportConfig {
                url: logs_url(&args.endpoint, !args.no_insecure),
                headers,
                compression: args.compression,
                timeout: Duration::from_secs(args.timeout_secs),
                retry_count: args.retries,
                batch_size: args.batch_size,
                service_name: args.service_name.clone(),
                resource_attributes: vec![(
                    "service.version".to_string(),
                    env!("CARGO_PKG_VERSION").to_string(),
                )],
            },
            endpoint: args.endpoint,
            mode,
            // a single key always means one object
            max_objects: if args.key.is_some() {
                Some(1)
            } else {
                args.max_objects.filter(|n| *n > 0)
            },
            key: args.key.filter(|k| !k.is_empty()),
            verbose: args.verbose,
            // zero means no limit
            max_lines_per_file: args.max_lines_per_file.filter(|n| *n > 0),
            log_level,
        };
        config.validate()?;
        debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfig`] naming the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.bucket.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "bucket cannot be empty".to_string(),
            ));
        }
        if self.source.region.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "region cannot be empty".to_string(),
            ));
        }
        if self.export.service_name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "service name cannot be empty".to_string(),
            ));
        }
        if self.export.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "batch size must be greater than 0".to_string(),
            ));
        }
        if self.export.batch_size > constants::MAX_LOG_QUEUE_SIZE {
            return Err(ConfigError::InvalidConfig(format!(
                "batch size cannot exceed {} records",
                constants::MAX_LOG_QUEUE_SIZE
            )));
        }
        if self.export.retry_count == 0 {
            return Err(ConfigError::InvalidConfig(
                "retries must be greater than 0".to_string(),
            ));
        }
        if self.export.timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "timeout must be greater than 0".to_string(),
            ));
        }
        if !matches!(
            self.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error" | "off"
        ) {
            return Err(ConfigError::InvalidConfig(format!(
                "invalid log level: {}",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Listing location shown in verbose output, e.g. `s3://bucket/gcore/logs/`.
    #[must_use]
    pub fn display_location(&self) -> String {
        let prefix = self.prefixes.first().map_or("", String::as_str);
        if prefix.starts_with('/') {
            format!("s3://{}{prefix}", self.source.bucket)
        } else {
            format!("s3://{}/{prefix}", self.source.bucket)
        }
    }

    /// Recency description shown in verbose output.
    #[must_use]
    pub fn since_description(&self) -> String {
        match self.since_minutes {
            Some(minutes) => format!("since last {minutes} min"),
            None => "all time".to_string(),
        }
    }
}

/// Appends `/` to a prefix that does not end with one.
#[must_use]
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

/// URL of the logs route for an endpoint given with or without a scheme.
#[must_use]
pub fn logs_url(endpoint: &str, insecure: bool) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    let base = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else if insecure {
        format!("http://{endpoint}")
    } else {
        format!("https://{endpoint}")
    };
    if base.ends_with(constants::OTLP_LOGS_PATH) {
        base
    } else {
        format!("{base}{}", constants::OTLP_LOGS_PATH)
    }
}

/// Parses one `KEY=VALUE` export header.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidHeader`] when there is no `=` or the key is empty.
pub fn parse_header(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(ConfigError::InvalidHeader(raw.to_string())),
    }
}
