// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One collector run: select objects, read and decode their lines, then
//! verify, list, inspect or export depending on the configured [`Mode`].
//!
//! Objects are processed one at a time in listing order. In export mode
//! records are queued on the aggregator and sent as soon as a batch is full,
//! so at most one partial batch is pending. Whatever remains of an object is
//! sent before the next object is read.

use std::io::Write;

use cdn_log_parser::{parse_line, CdnLogRecord};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::aggregator::Aggregator;
use crate::config::{Config, Mode};
use crate::constants::{
    DEFAULT_PREFIXES, MAX_CONTENT_SIZE_BYTES, MAX_LOG_SIZE_BYTES, RAW_LISTING_SAMPLE,
};
use crate::error::{CollectorError, SourceError};
use crate::flusher::{FlushOutcome, Flusher};
use crate::otlp::LogRecord;
use crate::source::{read_lines, ObjectInfo, ObjectSource};

/// Counts reported at the end of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub objects: usize,
    pub lines_read: usize,
    /// Lines that decoded into a record
    pub records: usize,
    pub records_with_cmcd: usize,
    pub batches_sent: usize,
    pub batches_failed: usize,
}

struct ExportSink {
    aggregator: Aggregator,
    flusher: Flusher,
}

impl ExportSink {
    async fn push(&mut self, log: String) -> FlushOutcome {
        self.aggregator.add(log);
        if !self.aggregator.has_full_batch() {
            return FlushOutcome::default();
        }
        self.flusher.flush(self.aggregator.take_full_batches()).await
    }

    async fn finish_object(&mut self) -> FlushOutcome {
        self.flusher.flush(self.aggregator.drain_batches()).await
    }
}

pub struct Collector<S> {
    source: S,
    config: Config,
    cancel: CancellationToken,
}

impl<S: ObjectSource> Collector<S> {
    #[must_use]
    pub fn new(source: S, config: Config) -> Self {
        Collector {
            source,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stops the run after the current object once `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs the configured mode, writing user facing output to `out`.
    ///
    /// # Errors
    ///
    /// Object storage failures end the run; export failures are counted in
    /// the summary instead.
    pub async fn run<W: Write>(&self, out: &mut W) -> Result<RunSummary, CollectorError> {
        match self.config.mode {
            Mode::Verify => self.verify(out).await,
            Mode::DryRun => self.dry_run(out).await,
            Mode::InspectCmcd => self.inspect(out).await,
            Mode::Export => self.export(out).await,
        }
    }

    async fn verify<W: Write>(&self, out: &mut W) -> Result<RunSummary, CollectorError> {
        let prefix = self
            .config
            .prefixes
            .first()
            .map_or(DEFAULT_PREFIXES[1], String::as_str);
        let has_objects = self.source.verify(prefix).await?;
        writeln!(
            out,
            "OK: Can access bucket s3://{} (region={}). Prefix '{}' has {}.",
            self.source.bucket(),
            self.config.source.region,
            prefix,
            if has_objects {
                "at least one object"
            } else {
                "no objects yet"
            }
        )?;
        Ok(RunSummary::default())
    }

    async fn dry_run<W: Write>(&self, out: &mut W) -> Result<RunSummary, CollectorError> {
        let objects = self.select_objects().await?;
        for object in &objects {
            writeln!(
                out,
                "Would process: s3://{}/{} ({} bytes)",
                self.source.bucket(),
                object.key,
                object.size
            )?;
        }
        Ok(RunSummary {
            objects: objects.len(),
            ..RunSummary::default()
        })
    }

    async fn inspect<W: Write>(&self, out: &mut W) -> Result<RunSummary, CollectorError> {
        let summary = self.process(out, None).await?;
        writeln!(
            out,
            "Inspect summary: {} lines with CMCD out of {} total (from {} objects)",
            summary.records_with_cmcd, summary.records, summary.objects
        )?;
        Ok(summary)
    }

    async fn export<W: Write>(&self, out: &mut W) -> Result<RunSummary, CollectorError> {
        let flusher = Flusher::new(&self.config.export)?;
        debug!("Exporting log records to {}", flusher.url());

        let mut sink = ExportSink {
            aggregator: Aggregator::new(
                self.config.export.batch_size,
                MAX_CONTENT_SIZE_BYTES,
                MAX_LOG_SIZE_BYTES,
            ),
            flusher,
        };
        let summary = self.process(out, Some(&mut sink)).await?;
        if summary.batches_failed > 0 {
            warn!(
                "{} of {} export requests could not be delivered",
                summary.batches_failed,
                summary.batches_failed + summary.batches_sent
            );
        }
        writeln!(
            out,
            "Emitted {} log records to {}",
            summary.records, self.config.endpoint
        )?;
        Ok(summary)
    }

    /// Objects to read, in listing order, capped at `max_objects` across prefixes.
    async fn select_objects(&self) -> Result<Vec<ObjectInfo>, SourceError> {
        if let Some(key) = &self.config.key {
            return Ok(vec![ObjectInfo {
                key: key.clone(),
                last_modified: Utc::now(),
                size: 0,
            }]);
        }

        let limit = self.config.max_objects.unwrap_or(usize::MAX);
        let mut selected = Vec::new();
        for prefix in &self.config.prefixes {
            if selected.len() >= limit {
                break;
            }
            let objects = self.source.list(prefix, self.config.since).await?;
            let remaining = limit - selected.len();
            selected.extend(objects.into_iter().take(remaining));
        }
        Ok(selected)
    }

    async fn process<W: Write>(
        &self,
        out: &mut W,
        mut sink: Option<&mut ExportSink>,
    ) -> Result<RunSummary, CollectorError> {
        let verbose = self.config.verbose;
        let bucket = self.source.bucket();

        if verbose {
            if let Some(key) = &self.config.key {
                writeln!(out, "Processing: s3://{bucket}/{key}")?;
            } else {
                writeln!(
                    out,
                    "Listing {} ({})...",
                    self.config.display_location(),
                    self.config.since_description()
                )?;
            }
        }

        let objects = self.select_objects().await?;
        let max_lines = self.config.max_lines_per_file.unwrap_or(usize::MAX);
        let mut summary = RunSummary::default();

        for object in &objects {
            if self.cancel.is_cancelled() {
                warn!(
                    "Interrupted, stopping after {} of {} objects",
                    summary.objects,
                    objects.len()
                );
                break;
            }

            let lines = read_lines(&self.source, &object.key).await?;
            let mut line_count = 0;
            let mut parsed_count = 0;
            let mut outcome = FlushOutcome::default();

            for line in lines.iter().take(max_lines) {
                line_count += 1;
                let Some(record) = parse_line(line) else {
                    continue;
                };
                parsed_count += 1;

                if record.has_cmcd() {
                    summary.records_with_cmcd += 1;
                    if sink.is_none() {
                        writeln!(out, "request: {}", record.request)?;
                        writeln!(out, "CMCD:    {}", format_cmcd(&record))?;
                        writeln!(out, "---")?;
                    } else if verbose {
                        writeln!(out, "CMCD: {}", format_cmcd(&record))?;
                    }
                }

                if let Some(sink) = sink.as_deref_mut() {
                    let log = LogRecord::from_cdn_record(&record, &object.key, None);
                    match serde_json::to_string(&log) {
                        Ok(serialized) => outcome += sink.push(serialized).await,
                        Err(e) => warn!("Failed to serialize log record: {}", e),
                    }
                }
            }

            if let Some(sink) = sink.as_deref_mut() {
                outcome += sink.finish_object().await;
                summary.batches_sent += outcome.sent;
                summary.batches_failed += outcome.failed;
            }

            debug!(
                "{}: {} lines, {} records",
                object.key, line_count, parsed_count
            );
            if verbose {
                writeln!(
                    out,
                    "  {}: {} lines, {} parsed",
                    object.key, line_count, parsed_count
                )?;
            }
            summary.lines_read += line_count;
            summary.records += parsed_count;
            summary.objects += 1;
        }

        if verbose {
            writeln!(
                out,
                "Summary: {} objects, {} lines read, {} log records emitted",
                summary.objects,
                summary.lines_read,
                if sink.is_some() { summary.records } else { 0 }
            )?;
            if summary.objects == 0 && self.config.key.is_none() {
                self.describe_empty_listing(out).await?;
            }
        }

        Ok(summary)
    }

    /// Lists a few raw keys per prefix to help spot a wrong prefix or cutoff.
    async fn describe_empty_listing<W: Write>(&self, out: &mut W) -> Result<(), CollectorError> {
        writeln!(
            out,
            "Debug: 0 objects matched. Listing raw keys (no suffix filter) to check prefix/bucket..."
        )?;
        for prefix in &self.config.prefixes {
            let mut raw = self.source.list_raw(prefix, RAW_LISTING_SAMPLE).await?;
            if raw.is_empty() && !prefix.starts_with('/') {
                // some S3 compatible stores keep the leading slash in keys
                raw = self
                    .source
                    .list_raw(&format!("/{prefix}"), RAW_LISTING_SAMPLE)
                    .await?;
            }
            if raw.is_empty() {
                writeln!(out, "  (no keys under prefix {prefix:?})")?;
                continue;
            }
            for object in &raw {
                writeln!(
                    out,
                    "  key={:?}  last_modified={}  size={}",
                    object.key, object.last_modified, object.size
                )?;
            }
            if let Some(since) = self.config.since {
                writeln!(out, "  Cutoff was: last_modified >= {since} (UTC)")?;
            }
        }
        Ok(())
    }
}

fn format_cmcd(record: &CdnLogRecord) -> String {
    record
        .cmcd()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}
