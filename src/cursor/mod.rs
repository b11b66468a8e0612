// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persisted read positions for the append-only streams.
//!
//! A [`StreamCursor`] is the bookmark that makes tailing resumable: the byte
//! offset and line number of the last fully processed line, plus the
//! generation and mtime of the file it was taken against. Cursors are
//! created implicitly as zero values, replaced wholesale at every checkpoint,
//! and deleted only by an explicit reset.

mod fingerprint;
mod rotation;

pub use fingerprint::FileFingerprint;
pub use rotation::{detect_rotation, rewind_start, rotation_reason, ResumePlan, RotationReason};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two logical streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamId {
    Traces,
    Metrics,
}

impl StreamId {
    /// All streams, in processing order.
    pub const ALL: [StreamId; 2] = [StreamId::Traces, StreamId::Metrics];

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::Metrics => "metrics",
        }
    }

    /// Convert from string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "traces" => Some(Self::Traces),
            "metrics" => Some(Self::Metrics),
            _ => None,
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted position of one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamCursor {
    pub stream: StreamId,
    /// Path of the file the cursor was saved against.
    pub file_path: Option<String>,
    /// Byte offset just past the last fully processed line.
    pub byte_offset: u64,
    /// Reporting-only line counter.
    pub line_number: u64,
    /// Physical file generation (inode on unix).
    pub file_generation: Option<u64>,
    pub file_modified_at: Option<DateTime<Utc>>,
    /// Records inserted over the cursor's whole lifetime, carried across rotations.
    pub records_inserted: u64,
    /// Line count at the end of the last completed run.
    pub last_total_lines: Option<u64>,
    pub last_processed_at: Option<DateTime<Utc>>,
}

impl StreamCursor {
    /// The zero cursor used when nothing has been persisted yet.
    pub fn new(stream: StreamId) -> Self {
        Self {
            stream,
            file_path: None,
            byte_offset: 0,
            line_number: 0,
            file_generation: None,
            file_modified_at: None,
            records_inserted: 0,
            last_total_lines: None,
            last_processed_at: None,
        }
    }

    /// Whether this cursor has never been saved.
    pub fn is_fresh(&self) -> bool {
        self.last_processed_at.is_none()
    }

    /// Move the position forward and stamp the file identity.
    pub fn advance(
        &mut self,
        file_path: &str,
        fingerprint: &FileFingerprint,
        byte_offset: u64,
        line_number: u64,
    ) {
        self.file_path = Some(file_path.to_string());
        self.byte_offset = byte_offset;
        self.line_number = line_number;
        self.file_generation = Some(fingerprint.generation);
        self.file_modified_at = fingerprint.modified;
        self.last_processed_at = Some(Utc::now());
    }
}
