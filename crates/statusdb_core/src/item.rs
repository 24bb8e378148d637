//! Items: the monitored hierarchy and its correlation rules.

use crate::aggregate::AggregateEventsStatus;
use crate::entity::{pairs_of, Entity, Meta};
use crate::status::BaseStatus;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use statusdb_store::IndexValue;
use std::collections::{BTreeMap, BTreeSet};

/// Primary key of an [`Item`].
pub type ItemId = String;

fn indeterminate() -> BaseStatus {
    BaseStatus::Indeterminate
}

/// How a rule combines child statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleType {
    /// Count children at or above the threshold.
    Default,
    /// Compare the share of such children against a percentage.
    Cluster,
}

/// A threshold rule deriving a parent's status from its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRule {
    /// Status the rule reports when it fires and
    /// [`ItemRule::using_result_status`] is set.
    #[serde(default = "indeterminate")]
    pub result_status: BaseStatus,

    /// Whether a firing rule reports `result_status` instead of a
    /// status derived from the children themselves.
    #[serde(default)]
    pub using_result_status: bool,

    /// Minimum child status that counts towards the rule.
    #[serde(default)]
    pub status_threshold: BaseStatus,

    /// How many qualifying children (or what percentage, for
    /// [`RuleType::Cluster`]) make the rule fire.
    #[serde(default)]
    pub value_threshold: i64,

    /// Combination strategy.
    #[serde(rename = "type")]
    pub rule_type: RuleType,
}

impl ItemRule {
    /// Creates a rule with default thresholds.
    pub const fn new(rule_type: RuleType) -> Self {
        Self {
            result_status: BaseStatus::Indeterminate,
            using_result_status: false,
            status_threshold: BaseStatus::Clear,
            value_threshold: 0,
            rule_type,
        }
    }

    /// Sets the reported status and marks it as authoritative.
    #[must_use]
    pub const fn result_status(mut self, status: BaseStatus) -> Self {
        self.result_status = status;
        self.using_result_status = true;
        self
    }

    /// Sets the minimum qualifying child status.
    #[must_use]
    pub const fn status_threshold(mut self, threshold: BaseStatus) -> Self {
        self.status_threshold = threshold;
        self
    }

    /// Sets the firing threshold (count, or percentage for cluster rules).
    #[must_use]
    pub const fn value_threshold(mut self, threshold: i64) -> Self {
        self.value_threshold = threshold;
        self
    }

    /// Evaluates the rule against the statuses of live children.
    ///
    /// `live` holds the statuses of children that exist and are not
    /// deleted; `declared` is the size of the item's child set, which
    /// cluster rules use as their percentage denominator so that
    /// missing children count against the group.
    pub fn evaluate(&self, live: &[BaseStatus], declared: usize) -> BaseStatus {
        let qualifying: Vec<BaseStatus> = live
            .iter()
            .copied()
            .filter(|status| *status >= self.status_threshold)
            .collect();
        match self.rule_type {
            RuleType::Default => {
                if qualifying.len() as i64 >= self.value_threshold {
                    if self.using_result_status {
                        self.result_status
                    } else {
                        BaseStatus::max_of(qualifying)
                    }
                } else {
                    BaseStatus::Clear
                }
            }
            RuleType::Cluster => {
                if declared == 0 {
                    return BaseStatus::Clear;
                }
                let percent = (100 * qualifying.len() / declared) as i64;
                if percent >= self.value_threshold {
                    if self.using_result_status {
                        self.result_status
                    } else {
                        BaseStatus::min_of(qualifying).unwrap_or(BaseStatus::Clear)
                    }
                } else {
                    BaseStatus::Clear
                }
            }
        }
    }
}

/// A field-match rule deciding which events attach to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFilter {
    /// Status a matching event contributes when
    /// [`ItemFilter::using_result_status`] is set.
    #[serde(default = "indeterminate")]
    pub result_status: BaseStatus,

    /// Whether matches contribute `result_status` instead of the
    /// event's own status.
    #[serde(default)]
    pub using_result_status: bool,

    /// Field values an event must carry, all of them, to match.
    pub equal_fields: BTreeMap<String, String>,
}

impl ItemFilter {
    /// Creates a filter with no required fields.
    pub const fn new() -> Self {
        Self {
            result_status: BaseStatus::Indeterminate,
            using_result_status: false,
            equal_fields: BTreeMap::new(),
        }
    }

    /// Requires `key=value` on matching events.
    #[must_use]
    pub fn equal_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.equal_fields.insert(key.into(), value.into());
        self
    }

    /// Sets the contributed status and marks it as authoritative.
    #[must_use]
    pub const fn result_status(mut self, status: BaseStatus) -> Self {
        self.result_status = status;
        self.using_result_status = true;
        self
    }

    /// Whether every required field is present in `fields` with the
    /// expected value.
    pub fn matches(&self, fields: &BTreeMap<String, String>) -> bool {
        self.equal_fields
            .iter()
            .all(|(key, value)| fields.get(key) == Some(value))
    }

    /// The `key=value` index projection of the required fields.
    pub(crate) fn pair_values(&self) -> BTreeSet<IndexValue> {
        pairs_of(&self.equal_fields)
    }
}

impl Default for ItemFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// A node in the monitored hierarchy.
///
/// `status` and `events_status` are derived by the engine; incoming
/// revisions may carry them (replication does) but local writers never
/// set them directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Identifier, referenced by parents' child sets.
    pub id: ItemId,

    /// Shared entity metadata.
    #[serde(flatten)]
    pub meta: Meta,

    /// Display name; queryable with the `CO` operator.
    #[serde(default)]
    pub name: String,

    /// Computed health, see the engine's recompute pipeline.
    #[serde(default)]
    pub status: BaseStatus,

    /// Named threshold rules over child statuses.
    #[serde(default)]
    pub rules: BTreeMap<String, ItemRule>,

    /// Named event filters, tried in name order; first match wins.
    #[serde(default)]
    pub filters: BTreeMap<String, ItemFilter>,

    /// Ids of child items. References, not ownership: a child's
    /// lifecycle is independent of its parents.
    #[serde(default)]
    pub children: BTreeSet<ItemId>,

    /// Events currently attached to this item.
    #[serde(default)]
    pub events_status: AggregateEventsStatus,
}

impl Item {
    /// Creates an empty item from `source` with `source_key`.
    pub fn new(
        id: impl Into<ItemId>,
        source: impl Into<String>,
        source_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            meta: Meta::new(source, source_key),
            name: String::new(),
            status: BaseStatus::Clear,
            rules: BTreeMap::new(),
            filters: BTreeMap::new(),
            children: BTreeSet::new(),
            events_status: AggregateEventsStatus::default(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a named rule.
    #[must_use]
    pub fn rule(mut self, name: impl Into<String>, rule: ItemRule) -> Self {
        self.rules.insert(name.into(), rule);
        self
    }

    /// Adds a named filter.
    #[must_use]
    pub fn filter(mut self, name: impl Into<String>, filter: ItemFilter) -> Self {
        self.filters.insert(name.into(), filter);
        self
    }

    /// Declares a child item by id.
    #[must_use]
    pub fn child(mut self, id: impl Into<ItemId>) -> Self {
        self.children.insert(id.into());
        self
    }

    /// Adds a metadata field.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.fields.insert(key.into(), value.into());
        self
    }

    /// Marks the incoming item as deleted.
    #[must_use]
    pub fn deleted(mut self) -> Self {
        self.meta.deleted_on = Some(Utc::now());
        self
    }

    /// First filter, in name order, satisfied by `fields`.
    pub fn find_matching_filter(&self, fields: &BTreeMap<String, String>) -> Option<&ItemFilter> {
        self.filters.values().find(|filter| filter.matches(fields))
    }

    /// Union of every filter's required-field pairs, for the
    /// candidate-item index.
    pub(crate) fn filter_pair_values(&self) -> BTreeSet<IndexValue> {
        self.filters
            .values()
            .flat_map(ItemFilter::pair_values)
            .collect()
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    fn same_content(&self, incoming: &Self) -> bool {
        self.meta.same_content(&incoming.meta)
            && self.name == incoming.name
            && self.rules == incoming.rules
            && self.filters == incoming.filters
            && self.children == incoming.children
    }
}
