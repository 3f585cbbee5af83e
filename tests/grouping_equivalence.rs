//! Property test: the incremental single-event grouping path and the full
//! rebuild path segment any event sequence identically.

use layerscope::{
    CapturedEvent, EventId, EventSource, GroupingConfig, GroupingEngine, GroupingMode, Timestamp,
};
use proptest::prelude::*;

const NAMES: [&str; 6] = [
    "gtm.js",
    "page_view",
    "click",
    "gtm.load",
    "purchase",
    "scroll_depth",
];

fn make_event(name: &str, ts: i64, index: u64) -> CapturedEvent {
    CapturedEvent {
        id: EventId(format!("{}-{}", ts, index)),
        timestamp: Timestamp(ts),
        name: name.to_string(),
        payload: serde_json::json!({"event": name}),
        source: EventSource::live("dataLayer"),
        raw_push: serde_json::json!({"event": name}),
        sequence_index: index,
        group_id: None,
    }
}

/// Sequences of (name index, gap before the event in ms). Gaps straddle the
/// 500ms window both ways, and a third of the names hit the "gtm" trigger.
fn event_sequences() -> impl Strategy<Value = Vec<(usize, i64)>> {
    prop::collection::vec((0usize..NAMES.len(), 0i64..1500), 0..40)
}

fn config_for(trigger_mode: bool) -> GroupingConfig {
    GroupingConfig {
        enabled: true,
        mode: if trigger_mode {
            GroupingMode::TriggerEvent
        } else {
            GroupingMode::TimeWindow
        },
        time_window_ms: 500,
        trigger_event_names: vec!["gtm".to_string()],
    }
}

proptest! {
    #[test]
    fn incremental_equals_rebuild(seq in event_sequences(), trigger_mode in any::<bool>()) {
        let mut ts = 0i64;
        let mut events = Vec::with_capacity(seq.len());
        for (index, (name, gap)) in seq.iter().enumerate() {
            ts += gap;
            events.push(make_event(NAMES[*name], ts, index as u64));
        }

        let mut rebuild_engine = GroupingEngine::new(config_for(trigger_mode));
        let rebuilt = rebuild_engine.rebuild_groups(&events);

        let mut incremental_engine = GroupingEngine::new(config_for(trigger_mode));
        for event in &events {
            let mut event = event.clone();
            incremental_engine.add_event(&mut event);
        }

        prop_assert_eq!(rebuilt, incremental_engine.groups());
    }

    #[test]
    fn rebuild_partitions_the_sequence(seq in event_sequences(), trigger_mode in any::<bool>()) {
        let mut ts = 0i64;
        let mut events = Vec::with_capacity(seq.len());
        for (index, (name, gap)) in seq.iter().enumerate() {
            ts += gap;
            events.push(make_event(NAMES[*name], ts, index as u64));
        }

        let mut engine = GroupingEngine::new(config_for(trigger_mode));
        let groups = engine.rebuild_groups(&events);

        // Every event lands in exactly one group, and flattening the
        // newest-first groups reproduces the reversed input order.
        let flattened: Vec<&EventId> = groups
            .iter()
            .flat_map(|g| g.events.iter().map(|e| &e.id))
            .collect();
        let expected: Vec<&EventId> = events.iter().rev().map(|e| &e.id).collect();
        prop_assert_eq!(flattened, expected);

        for group in &groups {
            prop_assert!(!group.events.is_empty());
            prop_assert_eq!(&group.id, &layerscope::GroupId::from_first_member(
                &group.events.last().unwrap().id,
            ));
            prop_assert!(group.start_time <= group.end_time);
        }
    }
}
