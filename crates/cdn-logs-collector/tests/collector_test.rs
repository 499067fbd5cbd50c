// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use cdn_logs_collector::constants::MAX_LOG_QUEUE_SIZE;
use cdn_logs_collector::source::is_access_log;
use cdn_logs_collector::{
    Args, Collector, CollectorError, Config, ObjectInfo, ObjectSource, SourceError,
};
use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use flate2::write::GzEncoder;
use mockito::Matcher;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct MemorySource {
    objects: Vec<(ObjectInfo, Vec<u8>)>,
    denied: bool,
    raw_requests: Mutex<Vec<String>>,
}

impl MemorySource {
    fn with_object(mut self, key: &str, body: Vec<u8>) -> Self {
        let info = ObjectInfo {
            key: key.to_string(),
            last_modified: Utc.with_ymd_and_hms(2026, 2, 23, 12, 0, 0).unwrap(),
            size: i64::try_from(body.len()).unwrap(),
        };
        self.objects.push((info, body));
        self
    }
}

#[async_trait]
impl ObjectSource for MemorySource {
    async fn list(
        &self,
        prefix: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ObjectInfo>, SourceError> {
        if self.denied {
            return Err(SourceError::AccessDenied("listing".to_string()));
        }
        Ok(self
            .objects
            .iter()
            .map(|(info, _)| info.clone())
            .filter(|info| info.key.starts_with(prefix) && is_access_log(info, since))
            .collect())
    }

    async fn list_raw(&self, prefix: &str, max_keys: i32) -> Result<Vec<ObjectInfo>, SourceError> {
        self.raw_requests.lock().unwrap().push(prefix.to_string());
        Ok(self
            .objects
            .iter()
            .map(|(info, _)| info.clone())
            .filter(|info| info.key.starts_with(prefix))
            .take(usize::try_from(max_keys).unwrap())
            .collect())
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, SourceError> {
        self.objects
            .iter()
            .find(|(info, _)| info.key == key)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| SourceError::NotFound(key.to_string()))
    }

    async fn verify(&self, prefix: &str) -> Result<bool, SourceError> {
        if self.denied {
            return Err(SourceError::AccessDenied("head bucket".to_string()));
        }
        Ok(self.objects.iter().any(|(info, _)| info.key.starts_with(prefix)))
    }

    fn bucket(&self) -> &str {
        "test-bucket"
    }
}

fn log_line(path: &str, status: &str) -> String {
    format!(
        r#""198.51.100.7" "-" "-" "[23/Feb/2026:23:08:12 +0100]" "GET {path} HTTP/1.1" "{status}" "5120" "-" "ExoPlayer/2.19" "5400" "[ed-ams-1]" "https" "cdn.example.com""#
    )
}

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn config(extra: &[&str]) -> Config {
    let mut argv = vec![
        "cdn-logs-collector",
        "--bucket",
        "test-bucket",
        "--region",
        "eu-west-1",
        "--prefix",
        "gcore/logs/",
        "--service-name",
        "cdn-logs-test",
        "--compression",
        "none",
    ];
    argv.extend_from_slice(extra);
    Config::from_args(Args::try_parse_from(argv).unwrap()).unwrap()
}

fn two_object_source() -> MemorySource {
    let first = [
        log_line("/live/seg_1.m4s?cmcd=br=3200,bl=12500&cmcd.ot=v", "200"),
        "not a log line".to_string(),
        log_line("/live/seg_2.m4s", "206"),
    ]
    .join("\n");
    let second = log_line("/vod/seg.m4s?CMCD=sid%3D%22abc%22", "200");
    MemorySource::default()
        .with_object("gcore/logs/a_access.log.gz", gzip(&first))
        // written as plain text despite the suffix
        .with_object("gcore/logs/b_access.log.gz", second.into_bytes())
        .with_object("gcore/logs/c_error.log.gz", gzip(&log_line("/x", "500")))
}

fn output(buffer: Vec<u8>) -> String {
    String::from_utf8(buffer).unwrap()
}

#[tokio::test]
async fn export_sends_every_record() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/logs")
        .match_header("content-type", "application/json")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""service.name""#.to_string()),
            Matcher::Regex(r#""cdn.s3_key""#.to_string()),
        ]))
        .with_status(200)
        .expect(2)
        .create_async()
        .await;

    let endpoint = server.url();
    let collector = Collector::new(two_object_source(), config(&["--endpoint", &endpoint]));
    let mut out = Vec::new();
    let summary = collector.run(&mut out).await.unwrap();

    assert_eq!(summary.objects, 2);
    assert_eq!(summary.lines_read, 4);
    assert_eq!(summary.records, 3);
    assert_eq!(summary.records_with_cmcd, 2);
    assert_eq!(summary.batches_sent, 2);
    assert_eq!(summary.batches_failed, 0);
    assert!(output(out).contains(&format!("Emitted 3 log records to {endpoint}")));
    mock.assert_async().await;
}

#[tokio::test]
async fn objects_larger_than_the_queue_are_sent_in_full() {
    let lines = MAX_LOG_QUEUE_SIZE + 500;
    let body = (0..lines)
        .map(|i| log_line(&format!("/live/seg_{i}.m4s"), "200"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut server = mockito::Server::new_async().await;
    // 50 full batches of 1000 plus the remaining 500
    let mock = server
        .mock("POST", "/v1/logs")
        .with_status(200)
        .expect(51)
        .create_async()
        .await;

    let source = MemorySource::default().with_object("gcore/logs/big_access.log", body.into_bytes());
    let endpoint = server.url();
    let collector = Collector::new(
        source,
        config(&["--endpoint", &endpoint, "--batch-size", "1000"]),
    );
    let mut out = Vec::new();
    let summary = collector.run(&mut out).await.unwrap();

    assert_eq!(summary.records, lines);
    assert_eq!(summary.batches_sent, 51);
    assert_eq!(summary.batches_failed, 0);
    assert!(output(out).contains(&format!("Emitted {lines} log records to {endpoint}")));
    mock.assert_async().await;
}

#[tokio::test]
async fn exported_payload_is_otlp_json() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/logs")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(
                r#""key":"service.name","value":\{"stringValue":"cdn-logs-test"\}"#.to_string(),
            ),
            Matcher::Regex(r#""scope":\{"name":"cdn-logs""#.to_string()),
            Matcher::Regex(r#""severityNumber":9,"severityText":"INFO""#.to_string()),
            Matcher::Regex(r#""key":"cmcd.sid","value":\{"stringValue":"abc"\}"#.to_string()),
        ]))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let source = MemorySource::default().with_object(
        "gcore/logs/b_access.log.gz",
        log_line("/vod/seg.m4s?CMCD=sid%3D%22abc%22", "200").into_bytes(),
    );
    let collector = Collector::new(source, config(&["--endpoint", &server.url()]));
    let summary = collector.run(&mut Vec::new()).await.unwrap();

    assert_eq!(summary.records, 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn rejected_batches_are_counted_not_fatal() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/logs")
        .with_status(400)
        .expect(2)
        .create_async()
        .await;

    let collector = Collector::new(
        two_object_source(),
        config(&["--endpoint", &server.url()]),
    );
    let summary = collector.run(&mut Vec::new()).await.unwrap();

    assert_eq!(summary.records, 3);
    assert_eq!(summary.batches_failed, 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn limits_apply_to_objects_and_lines() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/logs")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let collector = Collector::new(
        two_object_source(),
        config(&[
            "--endpoint",
            &server.url(),
            "--max-objects",
            "1",
            "--max-lines-per-file",
            "2",
        ]),
    );
    let summary = collector.run(&mut Vec::new()).await.unwrap();

    assert_eq!(summary.objects, 1);
    // the unparseable second line still counts toward the limit
    assert_eq!(summary.lines_read, 2);
    assert_eq!(summary.records, 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn dry_run_lists_without_reading() {
    let collector = Collector::new(two_object_source(), config(&["--dry-run"]));
    let mut out = Vec::new();
    let summary = collector.run(&mut out).await.unwrap();
    let out = output(out);

    assert_eq!(summary.objects, 2);
    assert_eq!(summary.lines_read, 0);
    assert!(out.contains("Would process: s3://test-bucket/gcore/logs/a_access.log.gz ("));
    assert!(out.contains("Would process: s3://test-bucket/gcore/logs/b_access.log.gz ("));
    assert!(!out.contains("c_error.log.gz"));
}

#[tokio::test]
async fn inspect_prints_cmcd_requests() {
    let collector = Collector::new(two_object_source(), config(&["--inspect-cmcd"]));
    let mut out = Vec::new();
    let summary = collector.run(&mut out).await.unwrap();
    let out = output(out);

    assert_eq!(summary.records_with_cmcd, 2);
    assert!(out.contains(
        "request: GET /live/seg_1.m4s?cmcd=br=3200,bl=12500&cmcd.ot=v HTTP/1.1"
    ));
    assert!(out.contains("CMCD:    cmcd.br=3200 cmcd.bl=12500 cmcd.ot=v"));
    assert!(out.contains("CMCD:    cmcd.sid=abc"));
    assert_eq!(out.matches("---").count(), 2);
    assert!(out.contains("Inspect summary: 2 lines with CMCD out of 3 total (from 2 objects)"));
    assert!(!out.contains("Emitted"));
}

#[tokio::test]
async fn single_key_skips_listing() {
    let collector = Collector::new(
        two_object_source(),
        config(&["--inspect-cmcd", "--key", "gcore/logs/b_access.log.gz", "--verbose"]),
    );
    let mut out = Vec::new();
    let summary = collector.run(&mut out).await.unwrap();
    let out = output(out);

    assert_eq!(summary.objects, 1);
    assert_eq!(summary.records, 1);
    assert!(out.contains("Processing: s3://test-bucket/gcore/logs/b_access.log.gz"));
    assert!(out.contains("  gcore/logs/b_access.log.gz: 1 lines, 1 parsed"));
}

#[tokio::test]
async fn verbose_empty_listing_shows_raw_keys() {
    let source = MemorySource::default()
        .with_object("/gcore/logs/2026/host_access.log.gz", gzip(&log_line("/a", "200")));
    let collector = Collector::new(source, config(&["--inspect-cmcd", "--verbose"]));
    let mut out = Vec::new();
    let summary = collector.run(&mut out).await.unwrap();
    let out = output(out);

    assert_eq!(summary.objects, 0);
    assert!(out.contains("Summary: 0 objects, 0 lines read, 0 log records emitted"));
    assert!(out.contains("Debug: 0 objects matched."));
    assert!(out.contains(r#"key="/gcore/logs/2026/host_access.log.gz""#));
    assert_eq!(
        collector_raw_requests(&collector),
        vec!["gcore/logs/".to_string(), "/gcore/logs/".to_string()]
    );
}

fn collector_raw_requests(collector: &Collector<MemorySource>) -> Vec<String> {
    collector.source().raw_requests.lock().unwrap().clone()
}

#[tokio::test]
async fn cancelled_run_stops_before_next_object() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let collector = Collector::new(two_object_source(), config(&["--inspect-cmcd"]))
        .with_cancellation(cancel);
    let summary = collector.run(&mut Vec::new()).await.unwrap();
    assert_eq!(summary.objects, 0);
}

#[tokio::test]
async fn verify_reports_access() {
    let collector = Collector::new(two_object_source(), config(&["--verify"]));
    let mut out = Vec::new();
    collector.run(&mut out).await.unwrap();
    assert_eq!(
        output(out).trim(),
        "OK: Can access bucket s3://test-bucket (region=eu-west-1). Prefix 'gcore/logs/' has at least one object."
    );
}

#[tokio::test]
async fn access_errors_are_fatal() {
    let source = MemorySource {
        denied: true,
        ..MemorySource::default()
    };
    let collector = Collector::new(source, config(&["--dry-run"]));
    let err = collector.run(&mut Vec::new()).await.unwrap_err();

    assert!(matches!(
        err,
        CollectorError::Source(SourceError::AccessDenied(_))
    ));
    assert_eq!(err.exit_code(), 1);
}
