//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random entities that hold the
//! invariants producers are expected to honor.

use proptest::prelude::*;
use statusdb_core::{BaseStatus, Event, EventType, Item, ItemFilter, ItemRule, RuleType};
use std::collections::BTreeMap;

/// Strategy over every status level.
pub fn status_strategy() -> impl Strategy<Value = BaseStatus> {
    prop::sample::select(BaseStatus::ALL.to_vec())
}

/// Strategy over every event kind.
pub fn event_type_strategy() -> impl Strategy<Value = EventType> {
    prop::sample::select(vec![
        EventType::Notset,
        EventType::Problem,
        EventType::Resolution,
        EventType::Information,
    ])
}

/// Strategy for entity ids.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,14}").expect("valid regex")
}

/// Strategy for the field maps producers attach to entities.
pub fn fields_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,8}").expect("valid regex"),
        prop::string::string_regex("[a-z0-9]{1,8}").expect("valid regex"),
        0..4,
    )
}

/// Strategy for events, keyed by their generated id.
pub fn event_strategy() -> impl Strategy<Value = Event> {
    (
        id_strategy(),
        event_type_strategy(),
        status_strategy(),
        fields_strategy(),
    )
        .prop_map(|(id, kind, status, fields)| {
            let mut event = Event::new(id.clone(), "gen", id)
                .event_type(kind)
                .status(status);
            for (key, value) in fields {
                event = event.field(key, value);
            }
            event
        })
}

/// Strategy for rules with small thresholds.
pub fn rule_strategy() -> impl Strategy<Value = ItemRule> {
    (
        prop::sample::select(vec![RuleType::Default, RuleType::Cluster]),
        status_strategy(),
        status_strategy(),
        0..100i64,
        any::<bool>(),
    )
        .prop_map(|(rule_type, threshold, result, value, use_result)| {
            let mut rule = ItemRule::new(rule_type)
                .status_threshold(threshold)
                .value_threshold(value);
            if use_result {
                rule = rule.result_status(result);
            }
            rule
        })
}

/// Strategy for filters over generated field maps.
pub fn filter_strategy() -> impl Strategy<Value = ItemFilter> {
    (fields_strategy(), status_strategy(), any::<bool>()).prop_map(
        |(fields, result, use_result)| {
            let mut filter = ItemFilter::new();
            for (key, value) in fields {
                filter = filter.equal_field(key, value);
            }
            if use_result {
                filter = filter.result_status(result);
            }
            filter
        },
    )
}

/// Strategy for items carrying generated filters, rules, and children.
pub fn item_strategy() -> impl Strategy<Value = Item> {
    (
        id_strategy(),
        prop::collection::btree_map(
            prop::string::string_regex("[a-z]{1,6}").expect("valid regex"),
            filter_strategy(),
            0..3,
        ),
        prop::collection::btree_map(
            prop::string::string_regex("[a-z]{1,6}").expect("valid regex"),
            rule_strategy(),
            0..3,
        ),
        prop::collection::btree_set(id_strategy(), 0..4),
    )
        .prop_map(|(id, filters, rules, children)| {
            let mut item = Item::new(id.clone(), "gen", id).name("generated");
            for (name, filter) in filters {
                item = item.filter(name, filter);
            }
            for (name, rule) in rules {
                item = item.rule(name, rule);
            }
            for child in children {
                item = item.child(child);
            }
            item
        })
}
