// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch job reading G-Core CDN access logs from S3 and exporting each line as
//! an OTLP log record.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod collector;
pub mod config;
pub mod constants;
pub mod error;
pub mod flusher;
pub mod otlp;
pub mod source;

pub use collector::{Collector, RunSummary};
pub use config::{Args, Config};
pub use error::{CollectorError, ConfigError, SourceError};
pub use source::{ObjectInfo, ObjectSource, S3Source};
