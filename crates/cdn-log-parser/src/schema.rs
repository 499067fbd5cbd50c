// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Positional column schema of the G-Core raw log export.
//!
//! See <https://gcore.com/docs/cdn/logs/raw-logs-export-cdn-resource-logs-to-your-storage>.
//! The index of a name is its column position. New columns may be appended by
//! G-Core at any time, and some export configurations drop or move columns, so
//! this table is the expected layout, not a guarantee.

/// Column names in export order. Names starting with `_` mark columns that are
/// always `-` in practice and are not exported as attributes.
pub const FIELD_NAMES: [&str; 50] = [
    "remote_addr",
    "_",
    "remote_user",
    "time_local",
    "request",
    "status",
    "body_bytes_sent",
    "http_referer",
    "http_user_agent",
    "bytes_sent",
    "edgename",
    "scheme",
    "host",
    "request_time",
    "upstream_response_time",
    "request_length",
    "http_range",
    "responding_node",
    "upstream_cache_status",
    "upstream_response_length",
    "upstream_addr",
    "gcdn_api_client_id",
    "gcdn_api_resource_id",
    "uid_got",
    "uid_set",
    "geoip_country_code",
    "geoip_city",
    "shield_type",
    "server_addr",
    "server_port",
    "upstream_status",
    "_2",
    "upstream_connect_time",
    "upstream_header_time",
    "shard_addr",
    "geoip2_data_asnumber",
    "connection",
    "connection_requests",
    "http_traceparent",
    "http_x_forwarded_proto",
    "gcdn_internal_status_code",
    "ssl_cipher",
    "ssl_session_id",
    "ssl_session_reused",
    "sent_http_content_type",
    "tcpinfo_rtt",
    "server_country_code",
    "gcdn_tcpinfo_snd_cwnd",
    "gcdn_tcpinfo_total_retrans",
    "gcdn_rule_id",
];

/// Prefix of every column attribute key.
pub const COLUMN_NAMESPACE: &str = "cdn.";

/// Value stored for a column that is present but empty.
pub const EMPTY_COLUMN_VALUE: &str = "-";

// Positions of the columns surfaced as named fields on a record.
pub const REMOTE_ADDR: usize = 0;
pub const TIME_LOCAL: usize = 3;
pub const REQUEST: usize = 4;
pub const STATUS: usize = 5;
pub const BODY_BYTES_SENT: usize = 6;
pub const HTTP_REFERER: usize = 7;
pub const HTTP_USER_AGENT: usize = 8;
pub const BYTES_SENT: usize = 9;
pub const EDGENAME: usize = 10;
pub const SCHEME: usize = 11;
pub const HOST: usize = 12;
pub const REQUEST_TIME: usize = 13;
pub const UPSTREAM_CACHE_STATUS: usize = 18;
pub const GEOIP_COUNTRY_CODE: usize = 25;
pub const SENT_HTTP_CONTENT_TYPE: usize = 44;

/// Returns true for names that mark an unused column.
#[must_use]
pub fn is_placeholder(name: &str) -> bool {
    name.starts_with('_')
}

/// Position of a column by name, if the schema knows it.
#[must_use]
pub fn position(name: &str) -> Option<usize> {
    FIELD_NAMES.iter().position(|f| *f == name)
}

/// Attribute key of a column, e.g. `cdn.remote_addr`.
#[must_use]
pub fn attribute_key(name: &str) -> String {
    format!("{COLUMN_NAMESPACE}{name}")
}
