//! The six-level status scale shared by events and items.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use statusdb_store::IndexValue;
use std::fmt;
use std::str::FromStr;

/// Severity of an event or the computed health of an item.
///
/// Levels are totally ordered from [`BaseStatus::Clear`] (healthy) to
/// [`BaseStatus::Critical`]. Comparisons, `max`, and range queries all
/// follow that order.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum BaseStatus {
    /// No problem.
    #[default]
    Clear,
    /// State cannot be determined.
    Indeterminate,
    /// Informational only.
    Information,
    /// Degraded, not yet service-affecting.
    Warning,
    /// Service-affecting.
    Major,
    /// Most severe.
    Critical,
}

impl BaseStatus {
    /// Number of levels on the scale.
    pub const CARDINALITY: usize = 6;

    /// Every level, in ascending order.
    pub const ALL: [BaseStatus; Self::CARDINALITY] = [
        BaseStatus::Clear,
        BaseStatus::Indeterminate,
        BaseStatus::Information,
        BaseStatus::Warning,
        BaseStatus::Major,
        BaseStatus::Critical,
    ];

    /// Position of this level on the scale, `0..6`.
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Converts an integer to a level, clamping out-of-range input.
    ///
    /// Negative values become [`BaseStatus::Clear`], values above the
    /// scale become [`BaseStatus::Critical`].
    pub const fn from_ordinal(value: i64) -> Self {
        match value {
            i64::MIN..=0 => BaseStatus::Clear,
            1 => BaseStatus::Indeterminate,
            2 => BaseStatus::Information,
            3 => BaseStatus::Warning,
            4 => BaseStatus::Major,
            _ => BaseStatus::Critical,
        }
    }

    /// The canonical uppercase label.
    pub const fn as_str(self) -> &'static str {
        match self {
            BaseStatus::Clear => "CLEAR",
            BaseStatus::Indeterminate => "INDETERMINATE",
            BaseStatus::Information => "INFORMATION",
            BaseStatus::Warning => "WARNING",
            BaseStatus::Major => "MAJOR",
            BaseStatus::Critical => "CRITICAL",
        }
    }

    /// Highest level in `statuses`, or [`BaseStatus::Clear`] when empty.
    pub fn max_of(statuses: impl IntoIterator<Item = BaseStatus>) -> Self {
        statuses
            .into_iter()
            .max()
            .unwrap_or(BaseStatus::Clear)
    }

    /// Lowest level in `statuses`, or `None` when empty.
    pub fn min_of(statuses: impl IntoIterator<Item = BaseStatus>) -> Option<Self> {
        statuses.into_iter().min()
    }
}

impl fmt::Display for BaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseStatus {
    type Err = CoreError;

    /// Parses a decimal ordinal (`"4"`) or a case-insensitive label
    /// (`"major"`, `"MAJOR"`). Ordinals clamp like [`BaseStatus::from_ordinal`].
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = input.parse::<i64>() {
            return Ok(Self::from_ordinal(value));
        }
        match input.to_ascii_uppercase().as_str() {
            "CLEAR" => Ok(BaseStatus::Clear),
            "INDETERMINATE" => Ok(BaseStatus::Indeterminate),
            "INFORMATION" => Ok(BaseStatus::Information),
            "WARNING" => Ok(BaseStatus::Warning),
            "MAJOR" => Ok(BaseStatus::Major),
            "CRITICAL" => Ok(BaseStatus::Critical),
            _ => Err(CoreError::invalid_status(input)),
        }
    }
}

impl From<BaseStatus> for IndexValue {
    fn from(status: BaseStatus) -> Self {
        IndexValue::ordinal(status.ordinal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_order_by_severity() {
        assert!(BaseStatus::Clear < BaseStatus::Indeterminate);
        assert!(BaseStatus::Warning < BaseStatus::Major);
        assert!(BaseStatus::Major < BaseStatus::Critical);
        assert_eq!(BaseStatus::max_of([]), BaseStatus::Clear);
        assert_eq!(
            BaseStatus::max_of([BaseStatus::Warning, BaseStatus::Critical, BaseStatus::Clear]),
            BaseStatus::Critical
        );
        assert_eq!(
            BaseStatus::min_of([BaseStatus::Warning, BaseStatus::Critical]),
            Some(BaseStatus::Warning)
        );
        assert_eq!(BaseStatus::min_of([]), None);
    }

    #[test]
    fn out_of_range_ordinals_clamp() {
        assert_eq!(BaseStatus::from_ordinal(-7), BaseStatus::Clear);
        assert_eq!(BaseStatus::from_ordinal(0), BaseStatus::Clear);
        assert_eq!(BaseStatus::from_ordinal(5), BaseStatus::Critical);
        assert_eq!(BaseStatus::from_ordinal(99), BaseStatus::Critical);
    }

    #[test]
    fn parses_ordinals_and_labels() {
        assert_eq!("4".parse::<BaseStatus>().unwrap(), BaseStatus::Major);
        assert_eq!("-3".parse::<BaseStatus>().unwrap(), BaseStatus::Clear);
        assert_eq!("critical".parse::<BaseStatus>().unwrap(), BaseStatus::Critical);
        assert_eq!("Warning".parse::<BaseStatus>().unwrap(), BaseStatus::Warning);
        assert!("bogus".parse::<BaseStatus>().is_err());
    }

    #[test]
    fn displays_uppercase_labels() {
        for status in BaseStatus::ALL {
            assert_eq!(
                status.to_string().parse::<BaseStatus>().unwrap(),
                status
            );
        }
        assert_eq!(BaseStatus::Major.to_string(), "MAJOR");
    }

    #[test]
    fn serializes_as_uppercase_strings() {
        let json = serde_json::to_string(&BaseStatus::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        let parsed: BaseStatus = serde_json::from_str("\"WARNING\"").unwrap();
        assert_eq!(parsed, BaseStatus::Warning);
    }

    #[test]
    fn converts_to_an_ordinal_index_value() {
        let value: IndexValue = BaseStatus::Major.into();
        assert_eq!(value, IndexValue::ordinal(4));
    }
}
