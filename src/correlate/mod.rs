// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Span-stream correlation.
//!
//! Producers batch spans, so the prompt span of a trace and the tool
//! invocation spans of the same trace regularly land on different lines.
//! The [`SpanCorrelator`] scans the span stream independently of the tail
//! cursor and folds every span into a [`CorrelationLookup`]:
//!
//! - tool invocations (by attribute presence) into the call table, keyed by
//!   call id;
//! - prompt-bearing spans into the prompt table, keyed by trace id.
//!
//! Both tables are fed from a single read of each line. The tables never
//! depend on one another while being built, so this is equivalent to two
//! separate passes.

mod lookup;
pub mod merge;

pub use lookup::{
    CallEnrichment, CallInfo, CorrelationLookup, LookupDelta, PromptData, ScanPosition,
};

use std::path::{Path, PathBuf};
#[cfg(feature = "telemetry")]
use std::time::Instant;

use tracing::{debug, info};

use crate::cursor::FileFingerprint;
use crate::error::IngestError;
use crate::ingest::LineReader;
use crate::otlp::SpanLine;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// Outcome of one correlation scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub lines: u64,
    pub malformed: u64,
    pub bytes: u64,
    /// Offset just past the last complete line read.
    pub end_offset: u64,
}

/// Builds correlation lookups from the span stream.
pub struct SpanCorrelator {
    path: PathBuf,
}

impl SpanCorrelator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan the whole file into a fresh lookup. A missing file yields empty tables.
    pub async fn build_full(&self) -> Result<CorrelationLookup, IngestError> {
        let mut lookup = CorrelationLookup::new();
        let stats = self.scan_into(&mut lookup, 0).await?;
        info!(
            path = %self.path.display(),
            lines = stats.lines,
            calls = lookup.call_count(),
            prompts = lookup.prompt_count(),
            "built correlation lookup"
        );
        Ok(lookup)
    }

    /// Fold every complete line from `start_offset` to the current end of the file into `lookup`.
    ///
    /// A non-zero start discards the first (possibly partial) line, exactly
    /// like the tail reader does.
    pub async fn scan_into(
        &self,
        lookup: &mut CorrelationLookup,
        start_offset: u64,
    ) -> Result<ScanStats, IngestError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let path_str = self.path.display().to_string();
        let Some(fingerprint) = FileFingerprint::of(&self.path)
            .await
            .map_err(|e| IngestError::io(&path_str, e))?
        else {
            debug!(path = %path_str, "span stream missing; correlation tables stay empty");
            return Ok(ScanStats::default());
        };

        let mut stats = ScanStats {
            end_offset: start_offset,
            ..ScanStats::default()
        };
        if start_offset >= fingerprint.size {
            return Ok(stats);
        }

        let mut reader = LineReader::open(&self.path, start_offset, fingerprint.size)
            .await
            .map_err(|e| IngestError::io(&path_str, e))?;

        while let Some(line) = reader
            .next_line()
            .await
            .map_err(|e| IngestError::io(&path_str, e))?
        {
            stats.lines += 1;
            if line.is_blank() {
                continue;
            }
            match serde_json::from_slice::<SpanLine>(&line.bytes) {
                Ok(decoded) => lookup.observe_line(&decoded),
                Err(e) => {
                    stats.malformed += 1;
                    debug!(offset = line.start, error = %e, "skipping undecodable span line");
                }
            }
        }
        stats.end_offset = reader.position();
        stats.bytes = stats.end_offset.saturating_sub(start_offset);

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("correlate.scan", start.elapsed());

        Ok(stats)
    }
}
