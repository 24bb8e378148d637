//! Integration tests for the correlation engine.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use statusdb_core::{BaseStatus, Event, Item, ItemRule, RuleType};
use statusdb_testkit::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn stored(engine: &TestEngine, id: &str) -> Arc<Item> {
    engine
        .items()
        .find_by_id(&id.to_owned())
        .expect("item should exist")
}

#[test]
fn a_failure_cascades_to_the_business_service() {
    let engine = TestEngine::new();
    engine.add_or_update_item(host_item("web-01")).unwrap();
    engine.add_or_update_item(host_item("db-01")).unwrap();
    engine
        .add_or_update_item(group_item("shop", &["web-01", "db-01"]))
        .unwrap();
    engine
        .add_or_update_item(group_item("business", &["shop"]))
        .unwrap();
    engine.settle();

    engine
        .add_or_update_event(host_event("e1", "web-01", BaseStatus::Critical))
        .unwrap();
    engine.settle();
    assert_eq!(stored(&engine, "web-01").status, BaseStatus::Critical);
    assert_eq!(stored(&engine, "shop").status, BaseStatus::Critical);
    assert_eq!(stored(&engine, "business").status, BaseStatus::Critical);

    // the problem resolves; the grace window keeps the chain red for now
    engine.delete_event(&"e1".to_owned()).unwrap();
    engine.settle();
    assert_eq!(stored(&engine, "web-01").status, BaseStatus::Critical);
    assert_eq!(stored(&engine, "business").status, BaseStatus::Critical);

    // but the event no longer counts as active anywhere in the subtree
    assert!(engine.find_subtree_events(&"business".to_owned()).is_empty());
}

#[test]
fn cluster_rule_tracks_the_degraded_share() {
    let engine = TestEngine::new();
    for host in ["web-01", "web-02", "web-03", "web-04"] {
        engine.add_or_update_item(host_item(host)).unwrap();
    }
    let cluster = group_item("web", &["web-01", "web-02", "web-03", "web-04"]).rule(
        "half-degraded",
        ItemRule::new(RuleType::Cluster)
            .status_threshold(BaseStatus::Warning)
            .value_threshold(50),
    );
    engine.add_or_update_item(cluster).unwrap();

    engine
        .add_or_update_event(host_event("e1", "web-01", BaseStatus::Warning))
        .unwrap();
    engine.settle();
    // one of four hosts degraded: below the 50 percent threshold
    assert_eq!(stored(&engine, "web").status, BaseStatus::Clear);

    engine
        .add_or_update_event(host_event("e2", "web-02", BaseStatus::Major))
        .unwrap();
    engine.settle();
    // two of four: the rule fires with the mildest qualifying status
    assert_eq!(stored(&engine, "web").status, BaseStatus::Warning);
}

#[test]
fn producer_reconciliation_detaches_dropped_events() {
    let engine = TestEngine::instant();
    engine.add_or_update_item(host_item("web-01")).unwrap();
    engine
        .add_or_update_event(host_event("e1", "web-01", BaseStatus::Major))
        .unwrap();
    engine
        .add_or_update_event(host_event("e2", "web-01", BaseStatus::Critical))
        .unwrap();
    let foreign = Event::new("e3", "nagios", "e3")
        .status(BaseStatus::Warning)
        .field("host", "web-01");
    engine.add_or_update_event(foreign).unwrap();
    engine.settle();
    assert_eq!(stored(&engine, "web-01").status, BaseStatus::Critical);

    let keep = BTreeSet::from(["e2".to_owned()]);
    let swept = engine
        .delete_events_by_source_and_source_key_not("probe", &keep)
        .unwrap();
    assert_eq!(swept.len(), 1);
    engine.settle();
    assert_eq!(stored(&engine, "web-01").status, BaseStatus::Critical);

    let swept = engine
        .delete_events_by_source_and_source_key_not("probe", &BTreeSet::new())
        .unwrap();
    assert_eq!(swept.len(), 1);
    engine.settle();
    // only the nagios event is left standing
    assert_eq!(stored(&engine, "web-01").status, BaseStatus::Warning);
}

#[test]
fn nodes_converge_by_version_pull() {
    let node1 = TestEngine::new();
    let node2 = TestEngine::with_config(test_config().node_name("node2"));

    node1.add_or_update_item(host_item("web-01")).unwrap();
    node1
        .add_or_update_item(group_item("shop", &["web-01"]))
        .unwrap();
    node1
        .add_or_update_event(host_event("e1", "web-01", BaseStatus::Major))
        .unwrap();
    node1
        .add_or_update_event(host_event("e2", "web-01", BaseStatus::Warning))
        .unwrap();
    node1.settle();

    let mut item_cursor = 0;
    loop {
        let batch = node1
            .items()
            .replication_slice(item_cursor, "node2", Some(2))
            .unwrap();
        if batch.is_empty() {
            break;
        }
        for row in batch {
            item_cursor = item_cursor.max(row.meta.version);
            node2.add_or_update_item((*row).clone()).unwrap();
        }
    }
    let mut event_cursor = 0;
    loop {
        let batch = node1
            .events()
            .replication_slice(event_cursor, "node2", Some(2))
            .unwrap();
        if batch.is_empty() {
            break;
        }
        for row in batch {
            event_cursor = event_cursor.max(row.meta.version);
            node2.add_or_update_event((*row).clone()).unwrap();
        }
    }
    node2.settle();

    assert_eq!(node2.events().len(), 2);
    assert_eq!(stored(&node2, "web-01").status, BaseStatus::Major);
    assert_eq!(stored(&node2, "shop").status, BaseStatus::Major);

    // node2's copies carry both nodes in from_history: nothing echoes back
    let echo = node2.events().replication_slice(0, "node1", None).unwrap();
    assert!(echo.is_empty());

    // a deletion travels the same way
    node1.delete_event(&"e2".to_owned()).unwrap();
    node1.settle();
    let batch = node1
        .events()
        .replication_slice(event_cursor, "node2", None)
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert!(batch[0].meta.is_deleted());
    for row in batch {
        node2.add_or_update_event((*row).clone()).unwrap();
    }
    node2.settle();
    assert!(node2
        .events()
        .find_by_id(&"e2".to_owned())
        .unwrap()
        .meta
        .is_deleted());
}

#[test]
fn tombstones_purge_without_resurrection() {
    let engine = TestEngine::instant();
    engine.add_or_update_item(host_item("web-01")).unwrap();
    engine
        .add_or_update_event(host_event("e1", "web-01", BaseStatus::Critical))
        .unwrap();
    engine.settle();
    engine.delete_event(&"e1".to_owned()).unwrap();
    engine.delete_item(&"web-01".to_owned()).unwrap();
    engine.settle();

    let future = Utc::now() + Duration::seconds(301);
    engine.run_maintenance(future).unwrap();
    engine.settle();
    assert!(engine.events().find_by_id(&"e1".to_owned()).is_none());
    assert!(engine.items().find_by_id(&"web-01".to_owned()).is_none());
    assert!(engine.events().is_empty());
    assert!(engine.items().is_empty());

    // a later sweep finds nothing to bring back
    engine
        .run_maintenance(future + Duration::seconds(60))
        .unwrap();
    engine.settle();
    assert!(engine.events().is_empty());
    assert!(engine.items().is_empty());
}

#[test]
fn change_feed_reports_engine_writes() {
    let engine = TestEngine::instant();
    engine.add_or_update_item(host_item("web-01")).unwrap();
    engine
        .add_or_update_event(host_event("e1", "web-01", BaseStatus::Major))
        .unwrap();
    engine.settle();

    let mut item_ids = BTreeSet::new();
    engine.items().poll_changes(|batch| {
        for notice in batch {
            item_ids.insert(notice.id);
        }
    });
    assert!(item_ids.contains("web-01"));

    let mut event_ids = BTreeSet::new();
    engine.events().poll_changes(|batch| {
        for notice in batch {
            event_ids.insert(notice.id);
        }
    });
    assert!(event_ids.contains("e1"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn item_status_is_the_max_of_active_events(
        statuses in prop::collection::vec(status_strategy(), 1..8),
    ) {
        let engine = TestEngine::new();
        engine.add_or_update_item(host_item("web-01")).unwrap();
        for (index, status) in statuses.iter().enumerate() {
            engine
                .add_or_update_event(host_event(&format!("e{index}"), "web-01", *status))
                .unwrap();
        }
        engine.settle();

        let expected = statuses.iter().copied().max().unwrap_or(BaseStatus::Clear);
        prop_assert_eq!(stored(&engine, "web-01").status, expected);
    }

    #[test]
    fn replays_never_bump_versions(
        statuses in prop::collection::vec(status_strategy(), 1..5),
    ) {
        let engine = TestEngine::new();
        engine.add_or_update_item(host_item("web-01")).unwrap();
        for (index, status) in statuses.iter().enumerate() {
            engine
                .add_or_update_event(host_event(&format!("e{index}"), "web-01", *status))
                .unwrap();
        }
        engine.settle();
        let item_version = stored(&engine, "web-01").meta.version;

        for (index, status) in statuses.iter().enumerate() {
            let replay = engine
                .add_or_update_event(host_event(&format!("e{index}"), "web-01", *status))
                .unwrap();
            prop_assert!(replay.is_none());
        }
        engine.settle();
        prop_assert_eq!(stored(&engine, "web-01").meta.version, item_version);
    }
}
