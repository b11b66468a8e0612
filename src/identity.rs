// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Idempotent record identities.
//!
//! An identity is `{file_generation}:{line_start_offset}:{digest}:{discriminator}`
//! where the digest is the first 12 hex characters of the SHA-256 of the raw
//! line bytes. Re-reading identical bytes at the same position of the same
//! file generation reproduces the identity, so an insert-if-absent upsert
//! makes re-processing a no-op. Edited content or a different position
//! (after rotation) yields a new identity.

use sha2::{Digest, Sha256};

/// Number of hex characters of the content digest kept in the identity.
pub const DIGEST_HEX_LEN: usize = 12;

/// Leading hex characters of the SHA-256 of `raw`.
pub fn content_digest(raw: &[u8]) -> String {
    let hash = format!("{:x}", Sha256::digest(raw));
    hash[..DIGEST_HEX_LEN].to_string()
}

/// The position + content part of an identity, shared by all records of a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIdentity {
    prefix: String,
}

impl LineIdentity {
    /// Build the identity prefix for the line starting at `line_start` in `generation`.
    pub fn new(file_generation: u64, line_start: u64, raw_line: &[u8]) -> Self {
        Self {
            prefix: format!(
                "{}:{}:{}",
                file_generation,
                line_start,
                content_digest(raw_line)
            ),
        }
    }

    /// Finalize the identity of one record of this line.
    pub fn record_id(&self, discriminator: &str) -> String {
        format!("{}:{}", self.prefix, discriminator)
    }

    /// The `{generation}:{offset}:{digest}` prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Full identity of a record in one call.
pub fn identity_of(
    file_generation: u64,
    line_start: u64,
    raw_line: &[u8],
    discriminator: &str,
) -> String {
    LineIdentity::new(file_generation, line_start, raw_line).record_id(discriminator)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &[u8] = b"{\"resourceSpans\":[]}\n";

    #[test]
    fn test_digest_length_and_hex() {
        let digest = content_digest(LINE);
        assert_eq!(digest.len(), DIGEST_HEX_LEN);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_known_digest() {
        // sha256("") = e3b0c44298fc1c149afbf4c8996fb924...
        assert_eq!(content_digest(b""), "e3b0c44298fc");
    }

    #[test]
    fn test_same_position_and_content_is_stable() {
        assert_eq!(identity_of(7, 128, LINE, "c1"), identity_of(7, 128, LINE, "c1"));
    }

    #[test]
    fn test_edited_content_changes_identity() {
        let edited = b"{\"resourceSpans\":[{}]}\n";
        assert_ne!(identity_of(7, 128, LINE, "c1"), identity_of(7, 128, edited, "c1"));
    }

    #[test]
    fn test_other_offset_or_generation_changes_identity() {
        assert_ne!(identity_of(7, 128, LINE, "c1"), identity_of(7, 256, LINE, "c1"));
        assert_ne!(identity_of(7, 128, LINE, "c1"), identity_of(8, 128, LINE, "c1"));
    }

    #[test]
    fn test_discriminator_separates_records_of_a_line() {
        let line = LineIdentity::new(1, 0, LINE);
        assert_ne!(line.record_id("c1"), line.record_id("c2"));
        assert_eq!(line.record_id("r0"), format!("{}:r0", line.prefix()));
    }

    #[test]
    fn test_layout() {
        let id = identity_of(42, 10, b"", "c9");
        assert_eq!(id, "42:10:e3b0c44298fc:c9");
    }
}
