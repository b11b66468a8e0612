// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Record extraction.
//!
//! Extractors are pure: one decoded line plus the correlation lookup in,
//! zero or more immutable records out. Identity, persistence and cursor
//! handling belong to the ingestor.

mod language;
mod metrics;
mod prompt;
mod types;

pub use language::infer_language;
pub use metrics::{is_accepted, MetricsExtractor, ACCEPTED_REPLIES};
pub use prompt::PromptExtractor;
pub use types::{ExtractedRecord, Extractor, MetricsRecord, PromptRecord};
