//! Values generated fresh for every invocation.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// A random identifier and a single captured instant.
///
/// Both timestamp representations are derived from `instant`, so the ISO
/// string and the epoch-millisecond string of one assembly never drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generated {
    /// Random v4 identifier.
    pub id: Uuid,
    /// Instant captured once for this assembly.
    pub instant: DateTime<Utc>,
}

impl Generated {
    /// Generates a new identifier and captures the current time.
    pub fn now() -> Self {
        Self {
            id: Uuid::new_v4(),
            instant: Utc::now(),
        }
    }

    /// Uses a fixed identifier and instant.
    pub fn at(id: Uuid, instant: DateTime<Utc>) -> Self {
        Self { id, instant }
    }

    /// The identifier in hyphenated lowercase form.
    pub fn id(&self) -> String {
        self.id.to_string()
    }

    /// ISO-8601 timestamp with millisecond precision, e.g.
    /// `2020-03-10T00:03:59.428Z`.
    pub fn timestamp(&self) -> String {
        self.instant.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Milliseconds since the Unix epoch, as a string.
    pub fn timestamp_epoch(&self) -> String {
        self.instant.timestamp_millis().to_string()
    }
}

impl Default for Generated {
    fn default() -> Self {
        Self::now()
    }
}
