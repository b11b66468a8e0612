// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Stat-time identity of the file backing a stream.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};

/// Size, generation and mtime of a file at stat time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFingerprint {
    pub size: u64,
    /// Changes when the file is replaced (inode on unix).
    pub generation: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl FileFingerprint {
    /// Stat `path`. A missing file is `Ok(None)`, any other failure is an error.
    pub async fn of(path: &Path) -> io::Result<Option<Self>> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Some(Self {
            size: metadata.len(),
            generation: generation_of(&metadata),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        }))
    }
}

#[cfg(unix)]
fn generation_of(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn generation_of(metadata: &std::fs::Metadata) -> u64 {
    // No stable inode; the creation time changes when the file is replaced.
    metadata
        .created()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
