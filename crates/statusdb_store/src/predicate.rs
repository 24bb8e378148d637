//! Query predicates and their operators.

use crate::error::StoreError;
use crate::value::IndexValue;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a [`Predicate`].
///
/// Entities project a *set* of values per field (field maps and history
/// markers are multi-valued), so every operator is defined against a set:
///
/// - `Eq`, `Ne`, `Lt`, `Gt`, `Ge`, `Co` match when *some* projected value
///   satisfies the comparison,
/// - `Nc` and `Ni` are their universal duals: they match when *no*
///   projected value contains, respectively equals, the operand. An
///   entity with an empty projection therefore matches `Nc`/`Ni` but
///   never the existential operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Some value equals the operand.
    Eq,
    /// Some value differs from the operand.
    Ne,
    /// Some value is strictly less than the operand.
    Lt,
    /// Some value is strictly greater than the operand.
    Gt,
    /// Some value is greater than or equal to the operand.
    Ge,
    /// Some value contains the operand as text, ignoring case.
    Co,
    /// No value contains the operand as text.
    Nc,
    /// No value equals the operand ("not in").
    Ni,
}

impl Operator {
    /// All operators, in dispatch order.
    pub const ALL: [Operator; 8] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Gt,
        Operator::Ge,
        Operator::Co,
        Operator::Nc,
        Operator::Ni,
    ];

    /// The lowercase token used in `op:value` query parameters.
    pub const fn token(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Co => "co",
            Self::Nc => "nc",
            Self::Ni => "ni",
        }
    }

    /// Splits a raw `op:value` query parameter.
    ///
    /// A missing or unrecognized prefix means the whole input is an
    /// equality operand, so `"web01"` and `"eq:web01"` are equivalent.
    pub fn split_param(raw: &str) -> (Operator, &str) {
        if let Some((prefix, rest)) = raw.split_once(':') {
            if let Ok(op) = prefix.parse() {
                return (op, rest);
            }
        }
        (Operator::Eq, raw)
    }
}

impl FromStr for Operator {
    type Err = StoreError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.token().eq_ignore_ascii_case(token))
            .ok_or_else(|| StoreError::invalid_predicate(token, "unknown operator"))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A single field comparison, the leaf of the query front-end's tree.
///
/// Boolean combinations are composed by the caller over the id sets the
/// store returns; the store itself only evaluates leaves (and implicit
/// conjunctions via [`IndexedMap::query`]).
///
/// [`IndexedMap::query`]: crate::IndexedMap::query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Field the comparison applies to.
    pub field: String,
    /// Comparison operator.
    pub op: Operator,
    /// Comparison operand.
    pub value: IndexValue,
}

impl Predicate {
    /// Creates a predicate.
    pub fn new(field: impl Into<String>, op: Operator, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Creates an equality predicate.
    pub fn equal(field: impl Into<String>, value: IndexValue) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    /// Builds a predicate from a raw `op:value` query parameter, treating
    /// the operand as a string value.
    pub fn from_param(field: impl Into<String>, raw: &str) -> Self {
        let (op, operand) = Operator::split_param(raw);
        Self::new(field, op, IndexValue::str(operand))
    }

    /// Evaluates this predicate against an entity's projected value set.
    ///
    /// This is the scan-fallback primitive; the indexed paths must agree
    /// with it exactly.
    pub fn matches(&self, values: &BTreeSet<IndexValue>) -> bool {
        match self.op {
            Operator::Eq => values.contains(&self.value),
            Operator::Ne => values.iter().any(|v| *v != self.value),
            Operator::Lt => values.iter().any(|v| *v < self.value),
            Operator::Gt => values.iter().any(|v| *v > self.value),
            Operator::Ge => values.iter().any(|v| *v >= self.value),
            Operator::Co => values.iter().any(|v| v.contains_text(&self.value)),
            Operator::Nc => !values.iter().any(|v| v.contains_text(&self.value)),
            Operator::Ni => !values.contains(&self.value),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(items: &[IndexValue]) -> BTreeSet<IndexValue> {
        items.iter().cloned().collect()
    }

    #[test]
    fn split_param_with_operator_prefix() {
        assert_eq!(Operator::split_param("ne:web01"), (Operator::Ne, "web01"));
        assert_eq!(Operator::split_param("GT:5"), (Operator::Gt, "5"));
    }

    #[test]
    fn split_param_without_prefix_is_equality() {
        assert_eq!(Operator::split_param("web01"), (Operator::Eq, "web01"));
        // Unknown prefixes are part of the operand, not an error.
        assert_eq!(
            Operator::split_param("http://x"),
            (Operator::Eq, "http://x")
        );
    }

    #[test]
    fn operator_from_str_rejects_unknown_tokens() {
        assert!("xx".parse::<Operator>().is_err());
        assert_eq!("NI".parse::<Operator>().unwrap(), Operator::Ni);
    }

    #[test]
    fn existential_operators_need_a_witness() {
        let pred = Predicate::new("rank", Operator::Gt, IndexValue::int(5));
        assert!(pred.matches(&values(&[IndexValue::int(3), IndexValue::int(7)])));
        assert!(!pred.matches(&values(&[IndexValue::int(3)])));
        assert!(!pred.matches(&values(&[])));
    }

    #[test]
    fn ne_needs_a_differing_witness() {
        let pred = Predicate::new("source", Operator::Ne, IndexValue::str("zbx"));
        assert!(pred.matches(&values(&[IndexValue::str("prom")])));
        assert!(!pred.matches(&values(&[IndexValue::str("zbx")])));
        assert!(!pred.matches(&values(&[])));
    }

    #[test]
    fn universal_operators_hold_on_empty_sets() {
        let ni = Predicate::new("fromHistory", Operator::Ni, IndexValue::str("node1"));
        assert!(ni.matches(&values(&[])));
        assert!(ni.matches(&values(&[IndexValue::str("node10")])));
        assert!(!ni.matches(&values(&[
            IndexValue::str("node1"),
            IndexValue::str("node2")
        ])));

        let nc = Predicate::new("name", Operator::Nc, IndexValue::str("db"));
        assert!(nc.matches(&values(&[])));
        assert!(nc.matches(&values(&[IndexValue::str("web")])));
        assert!(!nc.matches(&values(&[IndexValue::str("primary DB")])));
    }

    #[test]
    fn ni_uses_exact_equality_not_substring() {
        // "node1" is a prefix of "node10"; membership must not confuse them.
        let pred = Predicate::new("fromHistory", Operator::Ni, IndexValue::str("node1"));
        assert!(pred.matches(&values(&[IndexValue::str("node10")])));
        assert!(!pred.matches(&values(&[IndexValue::str("node1")])));
    }

    #[test]
    fn from_param_builds_string_predicates() {
        let pred = Predicate::from_param("node", "co:web");
        assert_eq!(pred.op, Operator::Co);
        assert_eq!(pred.value, IndexValue::str("web"));
        assert!(pred.matches(&values(&[IndexValue::str("WEB01")])));
    }
}
