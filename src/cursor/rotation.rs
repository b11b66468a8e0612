// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Rotation/truncation detection and resume planning.

use std::fmt;

use super::{FileFingerprint, StreamCursor};

/// Why a saved position no longer applies to the current file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    /// The file was replaced by a new one.
    GenerationChanged { saved: u64, current: u64 },
    /// The file shrank below the saved offset.
    Truncated { saved_offset: u64, current_size: u64 },
}

impl fmt::Display for RotationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GenerationChanged { saved, current } => {
                write!(f, "generation changed from {} to {}", saved, current)
            }
            Self::Truncated {
                saved_offset,
                current_size,
            } => write!(
                f,
                "saved offset {} is beyond current size {}",
                saved_offset, current_size
            ),
        }
    }
}

/// Reason the cursor must be resynced from zero, if any.
pub fn rotation_reason(
    cursor: &StreamCursor,
    current_generation: u64,
    current_size: u64,
) -> Option<RotationReason> {
    if let Some(saved) = cursor.file_generation {
        if saved != current_generation {
            return Some(RotationReason::GenerationChanged {
                saved,
                current: current_generation,
            });
        }
    }

    if cursor.byte_offset > current_size {
        return Some(RotationReason::Truncated {
            saved_offset: cursor.byte_offset,
            current_size,
        });
    }

    None
}

/// True if the generation changed or the saved offset is past the end of the file.
pub fn detect_rotation(cursor: &StreamCursor, current_generation: u64, current_size: u64) -> bool {
    rotation_reason(cursor, current_generation, current_size).is_some()
}

/// Offset to seek to when resuming at `offset`.
///
/// Readers discard the first line after a non-zero seek, so a resume always
/// backs up at least one byte to land on the previous line's newline.
pub fn rewind_start(offset: u64, rewind_bytes: u64) -> u64 {
    offset.saturating_sub(rewind_bytes.max(1))
}

/// Where a run starts reading and how it relates to the saved cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePlan {
    /// Physical offset the reader seeks to.
    pub start_offset: u64,
    /// Saved offset; lines starting before it were processed by an earlier run.
    pub resume_offset: u64,
    /// Line counter value at `resume_offset`.
    pub start_line: u64,
    pub rotation: Option<RotationReason>,
}

impl ResumePlan {
    /// Plan a run against `fingerprint`, rewinding `rewind_bytes` behind the saved offset.
    pub fn compute(cursor: &StreamCursor, fingerprint: &FileFingerprint, rewind_bytes: u64) -> Self {
        match rotation_reason(cursor, fingerprint.generation, fingerprint.size) {
            Some(reason) => Self {
                start_offset: 0,
                resume_offset: 0,
                start_line: 0,
                rotation: Some(reason),
            },
            None => Self {
                start_offset: rewind_start(cursor.byte_offset, rewind_bytes),
                resume_offset: cursor.byte_offset,
                start_line: cursor.line_number,
                rotation: None,
            },
        }
    }

    /// Whether there is anything past `start_offset` in a file of `size` bytes.
    pub fn has_new_data(&self, size: u64) -> bool {
        self.start_offset < size
    }

    pub fn rotated(&self) -> bool {
        self.rotation.is_some()
    }
}
