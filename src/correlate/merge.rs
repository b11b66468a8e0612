// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! "Non-empty wins" field merging.
//!
//! A populated field is never overwritten by an empty or placeholder
//! candidate, and a placeholder is always replaced by a populated one. Among
//! populated candidates the first one seen is kept.

use serde_json::Value;

/// The literal producers and extractors use for an unresolved text field.
pub const UNKNOWN: &str = "unknown";

/// Values that can stand for "nothing known yet".
pub trait Placeholder {
    fn is_placeholder(&self) -> bool;
}

impl Placeholder for String {
    fn is_placeholder(&self) -> bool {
        self.is_empty() || self == UNKNOWN
    }
}

impl Placeholder for i64 {
    fn is_placeholder(&self) -> bool {
        *self == 0
    }
}

impl Placeholder for f64 {
    fn is_placeholder(&self) -> bool {
        *self == 0.0 || self.is_nan()
    }
}

impl Placeholder for Value {
    fn is_placeholder(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

impl<T: Placeholder> Placeholder for Option<T> {
    fn is_placeholder(&self) -> bool {
        self.as_ref().map_or(true, Placeholder::is_placeholder)
    }
}

/// Replace `existing` with `candidate` when only the candidate carries a value.
///
/// Returns whether `existing` changed.
pub fn merge_field<T: Placeholder>(existing: &mut T, candidate: T) -> bool {
    if existing.is_placeholder() && !candidate.is_placeholder() {
        *existing = candidate;
        true
    } else {
        false
    }
}

/// Pick the first non-placeholder text, ignoring the rest.
pub fn first_known<I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    candidates.into_iter().flatten().find(|c| !c.is_placeholder())
}
