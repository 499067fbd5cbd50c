// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of one access log line into a [`CdnLogRecord`].
//!
//! Decoding is positional first: every token is matched against
//! [`schema::FIELD_NAMES`] by index. On top of that, two content scans recover
//! from column drift between export configurations:
//!
//! - the request line is located by its `METHOD /path PROTOCOL` shape rather
//!   than trusted at its nominal position;
//! - when the request path carries no CMCD, a column holding a raw `CMCD=...`
//!   query string is used instead.
//!
//! Nothing here returns an error. A line is either a record or it is not.

use indexmap::IndexMap;
use tracing::trace;

use crate::cmcd::{self, CmcdData, CMCD_NAMESPACE};
use crate::schema::{self, FIELD_NAMES};
use crate::tokenizer::split_quoted_fields;

/// Lines with fewer fields than this are too malformed to trust.
pub const MIN_FIELDS: usize = 10;

/// Methods recognised when looking for the request line.
pub const HTTP_METHODS: [&str; 7] = ["GET", "HEAD", "POST", "PUT", "DELETE", "OPTIONS", "PATCH"];

/// Keyed attributes of a record: `cdn.<column>` and `cmcd.<key>`.
pub type Attributes = IndexMap<String, String>;

/// One decoded access log line.
///
/// The named fields are convenience copies of commonly used columns, trimmed and
/// empty when the column is missing. `attributes` carries every recognised
/// column plus the CMCD keys and is what gets exported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CdnLogRecord {
    pub raw: String,
    pub remote_addr: String,
    pub time_local: String,
    pub request: String,
    pub method: String,
    pub path: String,
    pub status: String,
    pub body_bytes_sent: String,
    pub http_referer: String,
    pub http_user_agent: String,
    pub bytes_sent: String,
    pub edgename: String,
    pub scheme: String,
    pub host: String,
    pub request_time: String,
    pub upstream_cache_status: String,
    pub geoip_country_code: String,
    pub sent_http_content_type: String,
    pub attributes: Attributes,
}

impl CdnLogRecord {
    /// CMCD attributes of this record, keys still namespaced (`cmcd.br`).
    pub fn cmcd(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .filter(|(k, _)| k.starts_with(CMCD_NAMESPACE))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn has_cmcd(&self) -> bool {
        self.cmcd().next().is_some()
    }
}

/// Parses a single G-Core CDN access log line.
///
/// Returns `None` for blank lines and for lines with fewer than [`MIN_FIELDS`]
/// quoted fields.
///
/// ```
/// use cdn_log_parser::parse_line;
///
/// let line = r#""203.0.113.7" "-" "-" "[26/Apr/2019:09:47:40 +0000]" "GET /vod/seg.m4s?cmcd=ot=v,br=3200 HTTP/1.1" "206" "4096" "-" "player/1.0" "4500" "[ed-ams]" "https""#;
/// let record = parse_line(line).unwrap();
/// assert_eq!(record.time_local, "26/Apr/2019:09:47:40 +0000");
/// assert_eq!(record.method, "GET");
/// assert_eq!(record.attributes["cmcd.br"], "3200");
/// ```
#[must_use]
pub fn parse_line(line: &str) -> Option<CdnLogRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let fields = split_quoted_fields(line);
    if fields.len() < MIN_FIELDS {
        trace!("Skipping line with {} fields", fields.len());
        return None;
    }

    let get = |index: usize| -> String {
        fields
            .get(index)
            .map(|f| f.trim().to_owned())
            .unwrap_or_default()
    };

    let mut attributes = column_attributes(&fields);

    let request = find_request_field(&fields)
        .map(str::to_owned)
        .unwrap_or_else(|| get(schema::REQUEST));
    let (method, path) = parse_request(&request);

    let mut cmcd_data = cmcd::parse_path(&path);
    if cmcd_data.is_empty() {
        if let Some(raw) = find_raw_cmcd_field(&fields) {
            cmcd_data = cmcd::parse_query_string(raw);
        }
    }
    merge_cmcd(&mut attributes, cmcd_data);

    Some(CdnLogRecord {
        raw: line.to_owned(),
        remote_addr: get(schema::REMOTE_ADDR),
        time_local: strip_brackets(&get(schema::TIME_LOCAL)).to_owned(),
        request,
        method,
        path,
        status: get(schema::STATUS),
        body_bytes_sent: get(schema::BODY_BYTES_SENT),
        http_referer: get(schema::HTTP_REFERER),
        http_user_agent: get(schema::HTTP_USER_AGENT),
        bytes_sent: get(schema::BYTES_SENT),
        edgename: strip_brackets(&get(schema::EDGENAME)).to_owned(),
        scheme: get(schema::SCHEME),
        host: get(schema::HOST),
        request_time: get(schema::REQUEST_TIME),
        upstream_cache_status: get(schema::UPSTREAM_CACHE_STATUS),
        geoip_country_code: get(schema::GEOIP_COUNTRY_CODE),
        sent_http_content_type: get(schema::SENT_HTTP_CONTENT_TYPE),
        attributes,
    })
}

/// Splits a request line (`GET /path HTTP/1.1`) into method and path.
///
/// Anything after the path is ignored. A request with a single word yields only a
/// method.
#[must_use]
pub fn parse_request(request: &str) -> (String, String) {
    let mut parts = request.split_whitespace();
    let method = parts.next().unwrap_or_default().to_owned();
    let path = parts.next().unwrap_or_default().to_owned();
    (method, path)
}

/// Finds the first field shaped like `METHOD /path PROTOCOL`, trimmed.
#[must_use]
pub fn find_request_field(fields: &[String]) -> Option<&str> {
    fields
        .iter()
        .map(|f| f.trim())
        .find(|f| looks_like_request(f))
}

fn looks_like_request(field: &str) -> bool {
    HTTP_METHODS.iter().any(|method| {
        field
            .strip_prefix(method)
            .and_then(|rest| rest.strip_prefix(' '))
            .map(str::trim)
            .is_some_and(|rest| rest.contains('/') && rest.contains(char::is_whitespace))
    })
}

/// Finds the first field holding a raw CMCD query string (`CMCD=...`), trimmed.
fn find_raw_cmcd_field(fields: &[String]) -> Option<&str> {
    fields.iter().map(|f| f.trim()).find(|f| {
        f.split_once('=')
            .is_some_and(|(name, _)| name.eq_ignore_ascii_case(cmcd::CMCD_PARAM))
    })
}

fn column_attributes(fields: &[String]) -> Attributes {
    FIELD_NAMES
        .iter()
        .zip(fields)
        .filter(|(name, _)| !schema::is_placeholder(name))
        .map(|(name, value)| {
            let value = value.trim();
            let value = if value.is_empty() {
                schema::EMPTY_COLUMN_VALUE
            } else {
                value
            };
            (schema::attribute_key(name), value.to_owned())
        })
        .collect()
}

/// Empty CMCD values carry no information and are not exported.
fn merge_cmcd(attributes: &mut Attributes, cmcd_data: CmcdData) {
    for (key, value) in cmcd_data {
        if !value.is_empty() {
            attributes.insert(cmcd::attribute_key(&key), value);
        }
    }
}

/// Removes one leading `[` and one trailing `]`.
fn strip_brackets(value: &str) -> &str {
    let value = value.strip_prefix('[').unwrap_or(value);
    value.strip_suffix(']').unwrap_or(value)
}
