// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parser for G-Core CDN raw access logs.
//!
//! ```text
//!   raw line ──> tokenizer ──> record decoder ──> CdnLogRecord
//!                                   │
//!                                   └──> cmcd (query string metrics)
//! ```
//!
//! All functions are pure and never fail: malformed input produces `None` or an
//! empty result, never an error or a panic.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod cmcd;
pub mod record;
pub mod schema;
pub mod tokenizer;

pub use cmcd::CmcdData;
pub use record::{parse_line, Attributes, CdnLogRecord};
