// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching of serialized OTLP log records.
//!
//! Records are queued in arrival order and drained into JSON arrays bounded
//! by entry count and payload size. The queue evicts its oldest record once
//! it holds `MAX_LOG_QUEUE_SIZE` records.

use std::collections::VecDeque;
use tracing::warn;

use crate::constants;

#[derive(Debug, Clone)]
pub struct Aggregator {
    pub(crate) messages: VecDeque<String>,
    pub(crate) max_batch_entries_size: usize,
    pub(crate) max_content_size_bytes: usize,
    pub(crate) max_log_size_bytes: usize,
    pub(crate) max_log_queue_size: usize,
    pub(crate) buffer: Vec<u8>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Aggregator::new(
            constants::MAX_BATCH_ENTRIES_SIZE,
            constants::MAX_CONTENT_SIZE_BYTES,
            constants::MAX_LOG_SIZE_BYTES,
        )
    }
}

impl Aggregator {
    #[must_use]
    pub fn new(
        max_batch_entries_size: usize,
        max_content_size_bytes: usize,
        max_log_size_bytes: usize,
    ) -> Self {
        Aggregator {
            messages: VecDeque::new(),
            max_batch_entries_size,
            max_content_size_bytes,
            max_log_size_bytes,
            max_log_queue_size: constants::MAX_LOG_QUEUE_SIZE,
            buffer: Vec::with_capacity(max_content_size_bytes.min(64 * 1_024)),
        }
    }

    pub fn add(&mut self, log: String) {
        if self.messages.len() >= self.max_log_queue_size {
            self.messages.pop_front();
            warn!(
                "Log aggregator queue full ({} items), dropping oldest log record",
                self.max_log_queue_size
            );
        }
        self.messages.push_back(log);
    }

    pub fn add_batch(&mut self, logs: Vec<String>) {
        for log in logs {
            self.add(log);
        }
    }

    /// Whether enough records are queued to fill a batch by entry count.
    #[must_use]
    pub fn has_full_batch(&self) -> bool {
        self.messages.len() >= self.max_batch_entries_size
    }

    /// Drains batches while a full one is queued, leaving a partial batch behind.
    pub fn take_full_batches(&mut self) -> Vec<Vec<u8>> {
        let mut batches = Vec::new();
        while self.has_full_batch() {
            let batch = self.get_batch();
            if batch.is_empty() {
                break;
            }
            batches.push(batch);
        }
        batches
    }

    /// Drains every queued record.
    pub fn drain_batches(&mut self) -> Vec<Vec<u8>> {
        let mut batches = Vec::new();
        while !self.messages.is_empty() {
            let batch = self.get_batch();
            if !batch.is_empty() {
                batches.push(batch);
            }
        }
        batches
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drains the next batch as a JSON array, or an empty vector when nothing is queued.
    pub fn get_batch(&mut self) -> Vec<u8> {
        self.buffer.extend(b"[");

        for _ in 0..self.max_batch_entries_size {
            let Some(log) = self.messages.pop_front() else {
                break;
            };

            // a record that can never fit a request is dropped rather than
            // blocking the queue
            if log.len() > self.max_log_size_bytes || log.len() + 2 > self.max_content_size_bytes {
                warn!(
                    "Dropping log record of {} bytes, larger than the {} byte limit",
                    log.len(),
                    self.max_log_size_bytes.min(self.max_content_size_bytes)
                );
                continue;
            }

            // +1 for the closing bracket
            if self.buffer.len() + log.len() + 1 > self.max_content_size_bytes {
                self.messages.push_front(log);
                break;
            }

            self.buffer.extend(log.as_bytes());
            self.buffer.extend(b",");
        }

        if self.buffer.len() > 1 {
            // replace the trailing comma
            self.buffer.pop();
            self.buffer.extend(b"]");
        } else {
            self.buffer.clear();
        }
        std::mem::take(&mut self.buffer)
    }
}
