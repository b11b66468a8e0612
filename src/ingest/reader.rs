// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bounded, newline-delimited reads of an append-only file.

use std::io::{self, SeekFrom};
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader, Take};

/// A complete line together with the offset it starts at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub start: u64,
    /// Raw bytes including the trailing newline.
    pub bytes: Vec<u8>,
}

impl RawLine {
    /// Offset just past the line.
    pub fn end(&self) -> u64 {
        self.start + self.bytes.len() as u64
    }

    /// Whether the line holds nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.bytes.iter().all(u8::is_ascii_whitespace)
    }
}

/// Reads complete lines between a start offset and the size observed at stat time.
///
/// When started at a non-zero offset the first (possibly partial) line is
/// discarded. A trailing chunk without a newline is a write in progress and is
/// never returned; [`LineReader::position`] stays at its start.
pub struct LineReader {
    reader: BufReader<Take<File>>,
    position: u64,
    buf: Vec<u8>,
    unterminated_tail: bool,
}

impl LineReader {
    /// Open `path` and position the reader at `start`, reading no further than `end`.
    pub async fn open(path: &Path, start: u64, end: u64) -> io::Result<Self> {
        let mut file = File::open(path).await?;
        file.seek(SeekFrom::Start(start)).await?;

        let mut reader = Self {
            reader: BufReader::new(file.take(end.saturating_sub(start))),
            position: start,
            buf: Vec::new(),
            unterminated_tail: false,
        };

        if start > 0 {
            let skipped = reader.reader.read_until(b'\n', &mut reader.buf).await?;
            if reader.buf.ends_with(b"\n") {
                reader.position += skipped as u64;
            } else if skipped > 0 {
                reader.unterminated_tail = true;
            }
            tracing::trace!(start, skipped, "discarded partial line after seek");
        }

        Ok(reader)
    }

    /// Next complete line, or `None` at the bound or at an unterminated tail.
    pub async fn next_line(&mut self) -> io::Result<Option<RawLine>> {
        if self.unterminated_tail {
            return Ok(None);
        }

        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        if !self.buf.ends_with(b"\n") {
            self.unterminated_tail = true;
            return Ok(None);
        }

        let line = RawLine {
            start: self.position,
            bytes: std::mem::take(&mut self.buf),
        };
        self.position = line.end();
        Ok(Some(line))
    }

    /// Offset just past the last complete line consumed.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether reading stopped at a line that has not been fully written yet.
    pub fn hit_unterminated_tail(&self) -> bool {
        self.unterminated_tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn collect(reader: &mut LineReader) -> Vec<RawLine> {
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            lines.push(line);
        }
        lines
    }

    fn fixture(content: &[u8]) -> (TempDir, std::path::PathBuf) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stream.jsonl");
        std::fs::write(&path, content).unwrap();
        (temp, path)
    }

    #[tokio::test]
    async fn test_reads_lines_with_offsets() {
        let (_temp, path) = fixture(b"aa\nbbb\n\nc\n");
        let mut reader = LineReader::open(&path, 0, 10).await.unwrap();
        let lines = collect(&mut reader).await;

        let starts: Vec<u64> = lines.iter().map(|l| l.start).collect();
        assert_eq!(starts, vec![0, 3, 7, 8]);
        assert_eq!(lines[1].bytes, b"bbb\n");
        assert!(lines[2].is_blank());
        assert_eq!(reader.position(), 10);
        assert!(!reader.hit_unterminated_tail());
    }

    #[tokio::test]
    async fn test_discards_partial_first_line() {
        let (_temp, path) = fixture(b"aaaa\nbb\ncc\n");
        let mut reader = LineReader::open(&path, 2, 11).await.unwrap();
        let lines = collect(&mut reader).await;

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].start, 5);
        assert_eq!(lines[0].bytes, b"bb\n");
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_not_consumed() {
        let (_temp, path) = fixture(b"one\ntw");
        let mut reader = LineReader::open(&path, 0, 6).await.unwrap();
        let lines = collect(&mut reader).await;

        assert_eq!(lines.len(), 1);
        assert_eq!(reader.position(), 4);
        assert!(reader.hit_unterminated_tail());
    }

    #[tokio::test]
    async fn test_stops_at_stat_time_size() {
        let (_temp, path) = fixture(b"one\ntwo\nthree\n");
        // Only the first 8 bytes existed when the file was stat'ed.
        let mut reader = LineReader::open(&path, 0, 8).await.unwrap();
        let lines = collect(&mut reader).await;

        assert_eq!(lines.len(), 2);
        assert_eq!(reader.position(), 8);
    }

    #[tokio::test]
    async fn test_skip_without_newline_yields_nothing() {
        let (_temp, path) = fixture(b"partial-line-no-newline");
        let mut reader = LineReader::open(&path, 3, 23).await.unwrap();
        assert!(reader.next_line().await.unwrap().is_none());
        assert_eq!(reader.position(), 3);
    }
}
