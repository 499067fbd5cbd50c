// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! CMCD (Common Media Client Data, CTA-5004) extraction from request query strings.
//!
//! Players send CMCD either as one combined parameter holding a comma separated
//! list (`cmcd=br=3200,bl=12500,ot=v`) or as one parameter per key
//! (`cmcd.br=3200&cmcd.ot=v`). Both forms are accepted and merged. Any key is
//! passed through; the CTA-5004 key set is not enforced.

use std::borrow::Cow;
use std::collections::HashSet;

use indexmap::IndexMap;
use percent_encoding::percent_decode_str;

/// Name of the combined parameter, matched ASCII case-insensitively.
pub const CMCD_PARAM: &str = "cmcd";

/// Prefix of the per-key parameters.
pub const CMCD_PARAM_PREFIX: &str = "cmcd.";

/// Prefix of CMCD attribute keys on a decoded record, e.g. `cmcd.br`.
pub const CMCD_NAMESPACE: &str = "cmcd.";

/// Bare CMCD key to value, in the order keys were first seen.
pub type CmcdData = IndexMap<String, String>;

/// Extracts CMCD pairs from a URL query string (without the leading `?`).
///
/// Combined-form parameters are processed first, then prefixed parameters, so a
/// key present in both forms takes the prefixed value. Malformed pairs are
/// skipped.
///
/// ```
/// use cdn_log_parser::cmcd::parse_query_string;
///
/// let cmcd = parse_query_string("cmcd=br=3200,bl=12500&cmcd.ot=v");
/// assert_eq!(cmcd.get("br").map(String::as_str), Some("3200"));
/// assert_eq!(cmcd.get("bl").map(String::as_str), Some("12500"));
/// assert_eq!(cmcd.get("ot").map(String::as_str), Some("v"));
/// ```
#[must_use]
pub fn parse_query_string(query: &str) -> CmcdData {
    let mut cmcd = CmcdData::new();
    if query.trim().is_empty() {
        return cmcd;
    }

    let params = query_params(query);

    for (name, value) in &params {
        if !name.eq_ignore_ascii_case(CMCD_PARAM) {
            continue;
        }
        for pair in value.split(',') {
            let Some((key, value)) = pair.trim().split_once('=') else {
                continue;
            };
            let key = key.trim();
            if !key.is_empty() {
                cmcd.insert(key.to_owned(), clean_value(value));
            }
        }
    }

    // only the first occurrence of a repeated prefixed parameter counts
    let mut seen: HashSet<&str> = HashSet::new();
    for (name, value) in &params {
        let Some(key) = name.strip_prefix(CMCD_PARAM_PREFIX) else {
            continue;
        };
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        cmcd.insert(key.to_owned(), clean_value(value));
    }

    cmcd
}

/// Extracts CMCD from a request path that may carry a query string.
///
/// `/vod/seg.m4s?cmcd=ot=v,br=3200` yields `ot` and `br`; a path without `?`
/// yields nothing.
#[must_use]
pub fn parse_path(path_with_query: &str) -> CmcdData {
    match path_with_query.split_once('?') {
        Some((_path, query)) => parse_query_string(query),
        None => CmcdData::new(),
    }
}

/// Attribute key of a CMCD key on a decoded record.
#[must_use]
pub fn attribute_key(key: &str) -> String {
    format!("{CMCD_NAMESPACE}{key}")
}

/// Splits a query string into decoded `(name, value)` pairs, skipping segments
/// without `=`.
fn query_params(query: &str) -> Vec<(Cow<'_, str>, Cow<'_, str>)> {
    query
        .split('&')
        .filter_map(|segment| segment.split_once('='))
        .map(|(name, value)| (decode_component(name), decode_component(value)))
        .collect()
}

/// Form-style decoding: `+` is a space, then percent escapes are resolved.
fn decode_component(raw: &str) -> Cow<'_, str> {
    if raw.contains('+') {
        let spaced = raw.replace('+', " ");
        Cow::Owned(percent_decode_str(&spaced).decode_utf8_lossy().into_owned())
    } else {
        percent_decode_str(raw).decode_utf8_lossy()
    }
}

/// Trims a value and strips one layer of surrounding double quotes.
fn clean_value(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].to_owned()
    } else {
        value.to_owned()
    }
}
