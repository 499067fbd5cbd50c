// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Splits a quoted-field access log line into its field values.
//!
//! Every field of the G-Core raw log export is wrapped in double quotes and
//! fields are separated by whitespace:
//!
//! ```text
//! "203.0.113.7" "-" "-" "[26/Apr/2019:09:47:40 +0000]" "GET /a HTTP/1.1" "200" ...
//! ```
//!
//! A backslash inside a field escapes the next character. The scanner works on
//! bytes: the quote and backslash are ASCII, so every slice boundary it takes
//! falls on a UTF-8 character boundary.

const QUOTE: u8 = b'"';
const ESCAPE: u8 = b'\\';
const ESCAPED_QUOTE: &str = "\\\"";

/// Returns the quoted fields of `line` in order.
///
/// Text outside quotes is skipped. An unterminated field runs to the end of the
/// line. A line without quotes yields no fields. This never fails; callers decide
/// whether the number of fields is enough to trust the line.
///
/// ```
/// use cdn_log_parser::tokenizer::split_quoted_fields;
///
/// let fields = split_quoted_fields(r#""a" "b\"c" "d""#);
/// assert_eq!(fields, vec!["a", "b\"c", "d"]);
/// ```
#[must_use]
pub fn split_quoted_fields(line: &str) -> Vec<String> {
    let bytes = line.as_bytes();
    let len = bytes.len();
    let mut fields = Vec::new();
    let mut i = 0;

    while i < len {
        if bytes[i] != QUOTE {
            i += 1;
            continue;
        }

        i += 1;
        let start = i;
        while i < len && bytes[i] != QUOTE {
            if bytes[i] == ESCAPE {
                // keep the escaped byte, it is never a field terminator
                i += 1;
            }
            i += 1;
        }

        // a trailing backslash may step one past the end
        let end = i.min(len);
        fields.push(unescape(&line[start..end]));
        i = end + 1;
    }

    fields
}

/// Only escaped quotes are unescaped, every other escape sequence stays verbatim.
fn unescape(field: &str) -> String {
    if field.contains(ESCAPED_QUOTE) {
        field.replace(ESCAPED_QUOTE, "\"")
    } else {
        field.to_owned()
    }
}
