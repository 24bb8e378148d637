//! Index key values.

use chrono::{DateTime, Utc};
use std::fmt;

/// A value projected out of an entity for indexing or predicate matching.
///
/// The total order is derived: values of the same variant compare by
/// content, values of different variants compare by variant. Indexes are
/// declared with homogeneous keys, so cross-variant ordering only matters
/// as a tiebreak in mixed scans and any total order will do.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexValue {
    /// A plain string value.
    Str(String),
    /// A signed integer value, used for version numbers.
    Int(i64),
    /// A point in time.
    Time(DateTime<Utc>),
    /// An ordinal of a fixed-cardinality enum, used for severities.
    Ordinal(usize),
    /// A `name=value` pair, used for field maps and filter entries.
    Pair(String, String),
}

impl IndexValue {
    /// Creates a string value.
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    /// Creates an integer value.
    pub const fn int(value: i64) -> Self {
        Self::Int(value)
    }

    /// Creates a time value.
    pub const fn time(value: DateTime<Utc>) -> Self {
        Self::Time(value)
    }

    /// Creates an ordinal value.
    pub const fn ordinal(value: usize) -> Self {
        Self::Ordinal(value)
    }

    /// Creates a `name=value` pair.
    pub fn pair(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Pair(name.into(), value.into())
    }

    /// Case-insensitive substring test over the textual renderings.
    ///
    /// This is the `CO` operator primitive: item name search matches on
    /// fragments regardless of case. Non-string values participate via
    /// their display form.
    pub fn contains_text(&self, needle: &IndexValue) -> bool {
        self.to_string()
            .to_uppercase()
            .contains(&needle.to_string().to_uppercase())
    }
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Self::Ordinal(o) => write!(f, "{o}"),
            Self::Pair(name, value) => write!(f, "{name}={value}"),
        }
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<DateTime<Utc>> for IndexValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Time(value)
    }
}
