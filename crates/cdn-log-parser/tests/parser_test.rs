// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use cdn_log_parser::cmcd::{parse_path, parse_query_string};
use cdn_log_parser::parse_line;
use cdn_log_parser::record::MIN_FIELDS;
use cdn_log_parser::schema::FIELD_NAMES;
use cdn_log_parser::tokenizer::split_quoted_fields;
use proptest::prelude::*;

/// A full-width line as written by the G-Core raw log export, one value per column.
fn full_export_line() -> String {
    let values: Vec<String> = FIELD_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| match *name {
            "remote_addr" => "198.51.100.23".to_string(),
            "time_local" => "[23/Feb/2026:23:08:12 +0100]".to_string(),
            "request" => {
                "GET /live/stream_720p/seg_0042.m4s?CMCD=bl%3D21300%2Cbr%3D3200%2Cot%3Dv%2Csid%3D%22abc-123%22 HTTP/1.1"
                    .to_string()
            }
            "status" => "200".to_string(),
            "edgename" => "[ed-hk-11]".to_string(),
            "upstream_cache_status" => "HIT".to_string(),
            "geoip_country_code" => "NL".to_string(),
            "sent_http_content_type" => "video/iso.segment".to_string(),
            "http_referer" => "".to_string(),
            _ => format!("v{i}"),
        })
        .collect();
    values
        .iter()
        .map(|v| format!("\"{v}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn full_width_line_decodes_every_column() {
    let record = parse_line(&full_export_line()).expect("record");

    assert_eq!(record.remote_addr, "198.51.100.23");
    assert_eq!(record.time_local, "23/Feb/2026:23:08:12 +0100");
    assert_eq!(record.method, "GET");
    assert_eq!(record.status, "200");
    assert_eq!(record.edgename, "ed-hk-11");
    assert_eq!(record.upstream_cache_status, "HIT");
    assert_eq!(record.geoip_country_code, "NL");
    assert_eq!(record.sent_http_content_type, "video/iso.segment");

    // 48 named columns plus four CMCD keys
    assert_eq!(record.attributes.len(), 48 + 4);
    assert_eq!(record.attributes["cdn.http_referer"], "-");
    assert_eq!(record.attributes["cdn.gcdn_rule_id"], "v49");
    assert_eq!(record.attributes["cmcd.bl"], "21300");
    assert_eq!(record.attributes["cmcd.sid"], "abc-123");
}

#[test]
fn appended_columns_are_ignored() {
    let line = format!("{} \"future-column\" \"another\"", full_export_line());
    let record = parse_line(&line).expect("record");

    assert_eq!(record.attributes.len(), 48 + 4);
    assert!(record.attributes.values().all(|v| v != "future-column"));
}

#[test]
fn tokenizer_round_trip_example() {
    assert_eq!(
        split_quoted_fields(r#""a" "b\"c" "d""#),
        vec!["a".to_string(), "b\"c".to_string(), "d".to_string()]
    );
}

#[test]
fn metrics_dual_form_merge() {
    let cmcd = parse_query_string("cmcd=br=3200,bl=12500&cmcd.ot=v");
    assert_eq!(cmcd.len(), 3);
    assert_eq!(cmcd["br"], "3200");
    assert_eq!(cmcd["bl"], "12500");
    assert_eq!(cmcd["ot"], "v");
}

#[test]
fn metrics_value_unquoting() {
    assert_eq!(parse_query_string(r#"cmcd.sid="abc-123""#)["sid"], "abc-123");
    assert_eq!(parse_query_string("cmcd.sid=abc-123")["sid"], "abc-123");
}

fn quoted_line(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| format!("\"{}\"", f.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

proptest! {
    #[test]
    fn tokenizer_never_panics(line in any::<String>()) {
        let _ = split_quoted_fields(&line);
    }

    #[test]
    fn decoder_never_panics(line in any::<String>()) {
        let _ = parse_line(&line);
    }

    #[test]
    fn extractor_never_panics(query in any::<String>()) {
        let _ = parse_query_string(&query);
        let _ = parse_path(&query);
    }

    #[test]
    fn decoding_is_idempotent(
        fields in prop::collection::vec(
            prop_oneof![
                "[^\"\\\\]*",
                "(GET|HEAD|POST) /[a-z]{1,8}\\.m4s\\?(cmcd|CMCD|cmcd\\.br)=[a-z0-9=,%]{0,16} HTTP/1\\.1",
                "\\[[0-9]{2}/[A-Z][a-z]{2}/[0-9]{4}:[0-9]{2}:[0-9]{2}:[0-9]{2} \\+0000\\]",
            ],
            MIN_FIELDS..60,
        )
    ) {
        let line = quoted_line(&fields);
        let first = parse_line(&line).unwrap();
        let second = parse_line(&line).unwrap();
        prop_assert_eq!(&first.attributes, &second.attributes);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn quoted_fields_survive_tokenizing(fields in prop::collection::vec("[^\"\\\\]*", 0..20)) {
        let tokens = split_quoted_fields(&quoted_line(&fields));
        prop_assert_eq!(tokens, fields);
    }

    #[test]
    fn short_lines_are_never_records(fields in prop::collection::vec("[ -~]*", 0..MIN_FIELDS)) {
        let cleaned: Vec<String> = fields.iter().map(|f| f.replace(['"', '\\'], "")).collect();
        prop_assert!(parse_line(&quoted_line(&cleaned)).is_none());
    }

    #[test]
    fn escaped_quotes_round_trip(fields in prop::collection::vec("[a-z\" ]{0,12}", 1..15)) {
        let tokens = split_quoted_fields(&quoted_line(&fields));
        prop_assert_eq!(tokens, fields);
    }
}
