//! ISO-8601 timestamps for audit snapshots.
//!
//! Snapshots record when they were taken as a UTC ISO-8601 string with
//! millisecond precision, e.g. `2026-10-18T09:30:00.123Z`. Because every
//! timestamp produced here has the same fixed-width layout, lexicographic
//! order equals chronological order, which is what the snapshot comparison
//! relies on.

use std::fmt::{Display, Formatter};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// The moment a snapshot was taken.
///
/// Stored as the serialized string so snapshots read back from disk compare
/// exactly as they were written, even if another tool produced them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotTimestamp(String);

impl SnapshotTimestamp {
    /// Returns the current UTC time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    /// Wraps an already formatted timestamp string.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the timestamp string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the timestamp carries no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for SnapshotTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
