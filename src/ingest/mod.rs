// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Resumable, idempotent tailing of one stream into its sink.
//!
//! One call to [`IncrementalIngestor::ingest`] performs:
//!
//! 1. stat the file (absent means nothing to do)
//! 2. load the cursor and check for rotation or truncation
//! 3. rewind a fixed window behind the saved offset, or start at zero after a rotation
//! 4. read complete lines up to the stat-time size, discarding the first partial line
//! 5. decode, extract, and insert-if-absent every record under its identity
//! 6. checkpoint the cursor every `checkpoint_interval` confirmed records
//! 7. persist the final cursor
//!
//! A failing insert aborts the stream with the cursor left at the last
//! checkpoint, so the cursor never runs ahead of persisted data.

mod reader;

pub use reader::{LineReader, RawLine};

use std::path::Path;
#[cfg(feature = "telemetry")]
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cursor::{FileFingerprint, ResumePlan, RotationReason, StreamCursor, StreamId};
use crate::error::IngestError;
use crate::extract::{ExtractedRecord, Extractor};
use crate::identity::LineIdentity;
use crate::store::{InsertOutcome, SinkKind, Store};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// Bytes re-read behind a saved offset on resume.
pub const REWIND_WINDOW: u64 = 4096;

/// Confirmed records between cursor checkpoints.
pub const CHECKPOINT_INTERVAL: u64 = 100;

/// Tuning for one ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    pub rewind_bytes: u64,
    pub checkpoint_interval: u64,
    /// Parse and extract only; no sink writes, no cursor writes.
    pub dry_run: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            rewind_bytes: REWIND_WINDOW,
            checkpoint_interval: CHECKPOINT_INTERVAL,
            dry_run: false,
        }
    }
}

/// What one ingest did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestSummary {
    pub file_missing: bool,
    /// Nothing past the start offset; the cursor was not touched.
    pub up_to_date: bool,
    #[serde(skip)]
    pub rotation: Option<RotationReason>,
    pub start_offset: u64,
    pub end_offset: u64,
    pub start_line: u64,
    pub end_line: u64,
    /// Lines read past the saved position.
    pub lines_processed: u64,
    pub malformed_lines: u64,
    pub new_records: u64,
    pub duplicates: u64,
    pub checkpoints: u64,
    pub first_time: Option<String>,
    pub last_time: Option<String>,
    /// Reading stopped at a line still being written.
    pub unterminated_tail: bool,
    pub dry_run: bool,
}

impl IngestSummary {
    /// Summary for a source file that does not exist.
    pub fn missing() -> Self {
        Self {
            file_missing: true,
            ..Self::default()
        }
    }

    fn starting(plan: &ResumePlan, dry_run: bool) -> Self {
        Self {
            rotation: plan.rotation,
            start_offset: plan.start_offset,
            end_offset: plan.resume_offset,
            start_line: plan.start_line,
            end_line: plan.start_line,
            dry_run,
            ..Self::default()
        }
    }

    pub fn rotated(&self) -> bool {
        self.rotation.is_some()
    }

    /// Records the sink already confirmed (new plus duplicates).
    pub fn records_seen(&self) -> u64 {
        self.new_records + self.duplicates
    }

    fn observe_time(&mut self, time: Option<&str>) {
        let Some(time) = time else { return };
        if self.first_time.as_deref().map_or(true, |first| time < first) {
            self.first_time = Some(time.to_string());
        }
        if self.last_time.as_deref().map_or(true, |last| time > last) {
            self.last_time = Some(time.to_string());
        }
    }
}

/// Drives the resumable tail of one stream at a time.
pub struct IncrementalIngestor<'s> {
    store: &'s dyn Store,
    options: IngestOptions,
}

impl<'s> IncrementalIngestor<'s> {
    pub fn new(store: &'s dyn Store, options: IngestOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Stat `path` and work out where the next ingest of `stream` will start.
    ///
    /// Returns `None` when the file does not exist.
    pub async fn plan(
        &self,
        stream: StreamId,
        path: &Path,
    ) -> Result<Option<(StreamCursor, FileFingerprint, ResumePlan)>, IngestError> {
        let Some(fingerprint) = FileFingerprint::of(path)
            .await
            .map_err(|e| IngestError::io(path.display().to_string(), e))?
        else {
            return Ok(None);
        };

        let cursor = self
            .store
            .load_cursor(stream)
            .await?
            .unwrap_or_else(|| StreamCursor::new(stream));
        let plan = ResumePlan::compute(&cursor, &fingerprint, self.options.rewind_bytes);

        Ok(Some((cursor, fingerprint, plan)))
    }

    /// Tail `path` from the saved cursor of `stream` into the stream's sink.
    #[instrument(skip(self, extractor), fields(stream = %stream, path = %path.display()))]
    pub async fn ingest<E: Extractor>(
        &self,
        stream: StreamId,
        path: &Path,
        extractor: &E,
    ) -> Result<IngestSummary, IngestError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let path_str = path.display().to_string();
        let Some((mut cursor, fingerprint, plan)) = self.plan(stream, path).await? else {
            warn!("file not found; nothing to ingest");
            return Ok(IngestSummary::missing());
        };

        info!(
            size = fingerprint.size,
            generation = fingerprint.generation,
            saved_offset = cursor.byte_offset,
            "processing stream"
        );

        if let Some(reason) = &plan.rotation {
            info!(%reason, "file rotated; starting from the beginning");
        } else if plan.resume_offset > 0 {
            debug!(
                start_offset = plan.start_offset,
                resume_offset = plan.resume_offset,
                "rewound for safety"
            );
        }

        let mut summary = IngestSummary::starting(&plan, self.options.dry_run);
        if !plan.has_new_data(fingerprint.size) {
            info!("no new data to process");
            summary.up_to_date = true;
            return Ok(summary);
        }

        let sink = SinkKind::for_stream(stream);
        let base_inserted = cursor.records_inserted;
        let mut line_number = plan.start_line;
        let mut since_checkpoint = 0u64;

        let mut reader = LineReader::open(path, plan.start_offset, fingerprint.size)
            .await
            .map_err(|e| IngestError::io(&path_str, e))?;

        while let Some(line) = reader
            .next_line()
            .await
            .map_err(|e| IngestError::io(&path_str, e))?
        {
            if line.start >= plan.resume_offset {
                line_number += 1;
                summary.lines_processed += 1;
            }
            if line.is_blank() {
                continue;
            }

            let decoded: E::Line = match serde_json::from_slice(&line.bytes) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(line = line_number, offset = line.start, error = %e, "skipping malformed line");
                    summary.malformed_lines += 1;
                    continue;
                }
            };

            let identity = LineIdentity::new(fingerprint.generation, line.start, &line.bytes);
            let records = extractor.extract(&decoded);

            for (index, record) in records.iter().enumerate() {
                let id = match record.discriminator() {
                    Some(discriminator) => identity.record_id(discriminator),
                    None => identity.record_id(&format!("r{}", index)),
                };
                summary.observe_time(record.time());

                if self.options.dry_run {
                    summary.new_records += 1;
                    debug!(line = line_number, %id, "would insert (dry run)");
                    continue;
                }

                let document = serde_json::to_value(record)?;
                match self.store.insert_if_absent(sink, &id, &document).await? {
                    InsertOutcome::Inserted => {
                        summary.new_records += 1;
                        debug!(line = line_number, %id, "inserted");
                    }
                    InsertOutcome::Duplicate => {
                        summary.duplicates += 1;
                        debug!(line = line_number, %id, "duplicate skipped");
                    }
                }
            }

            since_checkpoint += records.len() as u64;
            if !self.options.dry_run && since_checkpoint >= self.options.checkpoint_interval {
                cursor.advance(
                    &path_str,
                    &fingerprint,
                    reader.position().max(plan.resume_offset),
                    line_number,
                );
                cursor.records_inserted = base_inserted + summary.new_records;
                self.store.save_cursor(&cursor).await?;
                since_checkpoint = 0;
                summary.checkpoints += 1;
                debug!(offset = cursor.byte_offset, line = line_number, "checkpoint");
            }
        }

        summary.end_offset = reader.position().max(plan.resume_offset);
        summary.end_line = line_number;
        summary.unterminated_tail = reader.hit_unterminated_tail();
        if summary.unterminated_tail {
            debug!(offset = summary.end_offset, "stopped at a line still being written");
        }

        if !self.options.dry_run {
            cursor.advance(&path_str, &fingerprint, summary.end_offset, line_number);
            cursor.records_inserted = base_inserted + summary.new_records;
            cursor.last_total_lines = Some(line_number);
            self.store.save_cursor(&cursor).await?;
        }

        info!(
            lines = summary.lines_processed,
            start_line = summary.start_line,
            end_line = summary.end_line,
            new = summary.new_records,
            duplicates = summary.duplicates,
            malformed = summary.malformed_lines,
            first_time = summary.first_time.as_deref().unwrap_or("-"),
            last_time = summary.last_time.as_deref().unwrap_or("-"),
            dry_run = self.options.dry_run,
            "stream ingested"
        );

        #[cfg(feature = "telemetry")]
        {
            GLOBAL_METRICS.record_operation("ingest.stream", start.elapsed());
            GLOBAL_METRICS.record_stream(
                stream.as_str(),
                summary.new_records,
                summary.duplicates,
                summary.malformed_lines,
            );
        }

        Ok(summary)
    }
}
