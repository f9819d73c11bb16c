use super::*;
use serde_json::json;

fn meta(identity: &str, session_ref: &str) -> SessionMeta {
    SessionMeta::new(session_ref, identity, 1_700_000_000)
}

fn state_of(entries: &[(&str, Vec<SessionMeta>)]) -> PresenceState {
    entries
        .iter()
        .map(|(identity, metas)| {
            (
                identity.to_string(),
                PresenceEntry {
                    metas: metas.clone(),
                },
            )
        })
        .collect()
}

#[test]
fn test_two_sessions_for_one_identity() {
    let mut tracker = PresenceTracker::new();
    let map = tracker.sync_state(state_of(&[(
        "alice",
        vec![meta("alice", "ref-1"), meta("alice", "ref-2")],
    )]));

    assert_eq!(map.len(), 1);
    assert_eq!(map.get("alice").unwrap().len(), 2);

    let rows = tracker.rows("alice");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.is_self));
    assert_eq!(rows[0].session_ref, "ref-1");
    assert_eq!(rows[1].session_ref, "ref-2");
}

#[test]
fn test_rows_tag_self_by_identity_not_session() {
    let mut tracker = PresenceTracker::new();
    tracker.sync_state(state_of(&[
        ("alice", vec![meta("alice", "ref-1")]),
        ("bob", vec![meta("bob", "ref-2"), meta("bob", "ref-3")]),
    ]));

    let rows = tracker.rows("bob");
    assert_eq!(rows.len(), 3);
    let own: Vec<&PresenceRow> = rows.iter().filter(|row| row.is_self).collect();
    assert_eq!(own.len(), 2);
    assert!(own.iter().all(|row| row.identity == "bob"));
}

#[test]
fn test_state_drops_identities_with_no_sessions() {
    let mut tracker = PresenceTracker::new();
    let map = tracker.sync_state(state_of(&[
        ("alice", vec![]),
        ("bob", vec![meta("bob", "ref-2")]),
    ]));

    assert!(!map.contains("alice"));
    assert!(map.contains("bob"));
}

#[test]
fn test_diff_join_keeps_existing_sessions_first() {
    let mut tracker = PresenceTracker::new();
    tracker.sync_state(state_of(&[("alice", vec![meta("alice", "ref-1")])]));

    let mut diff = PresenceDiff::default();
    diff.joins.insert(
        "alice".to_string(),
        PresenceEntry {
            metas: vec![meta("alice", "ref-2")],
        },
    );
    let map = tracker.sync_diff(diff).unwrap();

    let refs: Vec<&str> = map
        .get("alice")
        .unwrap()
        .iter()
        .map(|m| m.session_ref.as_str())
        .collect();
    assert_eq!(refs, vec!["ref-1", "ref-2"]);
}

#[test]
fn test_diff_leave_removes_identity_when_last_session_goes() {
    let mut tracker = PresenceTracker::new();
    tracker.sync_state(state_of(&[
        ("alice", vec![meta("alice", "ref-1"), meta("alice", "ref-2")]),
        ("bob", vec![meta("bob", "ref-3")]),
    ]));

    let mut diff = PresenceDiff::default();
    diff.leaves.insert(
        "alice".to_string(),
        PresenceEntry {
            metas: vec![meta("alice", "ref-1")],
        },
    );
    diff.leaves.insert(
        "bob".to_string(),
        PresenceEntry {
            metas: vec![meta("bob", "ref-3")],
        },
    );
    let map = tracker.sync_diff(diff).unwrap();

    assert_eq!(map.get("alice").unwrap().len(), 1);
    assert!(!map.contains("bob"));
    assert!(map.iter().all(|(_, sessions)| !sessions.is_empty()));
}

#[test]
fn test_diff_before_state_is_buffered_then_replayed() {
    let mut tracker = PresenceTracker::new();

    let mut diff = PresenceDiff::default();
    diff.joins.insert(
        "carol".to_string(),
        PresenceEntry {
            metas: vec![meta("carol", "ref-9")],
        },
    );
    assert!(tracker.sync_diff(diff).is_none());
    assert!(tracker.list().is_empty());

    let map = tracker.sync_state(state_of(&[("alice", vec![meta("alice", "ref-1")])]));
    assert!(map.contains("alice"));
    assert!(map.contains("carol"));
}

#[test]
fn test_diffs_before_state_keep_only_the_newest() {
    let mut table = PresenceTable::new();
    let mut tracker = PresenceTracker::with_max_pending(2);

    for identity in ["carol", "dave", "erin"] {
        assert!(tracker.sync_diff(table.track(meta(identity, identity))).is_none());
    }

    let map = tracker.sync_state(PresenceState::new());
    assert!(!map.contains("carol"));
    assert!(map.contains("dave"));
    assert!(map.contains("erin"));
}

#[test]
fn test_reset_requires_new_state() {
    let mut tracker = PresenceTracker::new();
    tracker.sync_state(state_of(&[("alice", vec![meta("alice", "ref-1")])]));
    tracker.reset();

    assert!(!tracker.is_synced());
    // Old mirror stays visible until the next state
    assert!(tracker.list().contains("alice"));
}

#[test]
fn test_table_track_and_untrack_produce_diffs() {
    let mut table = PresenceTable::new();

    let join = table.track(meta("alice", "ref-1"));
    assert_eq!(join.joins.get("alice").unwrap().metas.len(), 1);
    assert!(join.leaves.is_empty());

    table.track(meta("alice", "ref-2"));
    assert_eq!(table.sessions("alice").len(), 2);
    assert_eq!(table.session_count(), 2);

    let leave = table.untrack("alice", "ref-1").unwrap();
    assert_eq!(leave.leaves.get("alice").unwrap().metas[0].session_ref, "ref-1");

    table.untrack("alice", "ref-2").unwrap();
    assert!(table.state().is_empty());
    assert!(table.untrack("alice", "ref-2").is_none());
}

#[test]
fn test_tracker_follows_table_diffs() {
    let mut table = PresenceTable::new();
    let mut tracker = PresenceTracker::new();

    table.track(meta("alice", "ref-1"));
    tracker.sync_state(table.state());

    tracker.sync_diff(table.track(meta("bob", "ref-2")));
    tracker.sync_diff(table.track(meta("alice", "ref-3")));
    tracker.sync_diff(table.untrack("alice", "ref-1").unwrap());

    let expected = PresenceMap::project(
        table
            .state()
            .iter()
            .map(|(identity, entry)| (identity, &entry.metas))
            .collect::<Vec<_>>(),
    );
    assert_eq!(tracker.list(), expected);
}

#[test]
fn test_session_meta_wire_names() {
    let value = json!({
        "phx_ref": "F1a2",
        "user_name": "alice",
        "online_at": 1700000000,
        "device": "tablet"
    });

    let meta: SessionMeta = serde_json::from_value(value.clone()).unwrap();
    assert_eq!(meta.session_ref, "F1a2");
    assert_eq!(meta.identity, "alice");
    assert_eq!(meta.extra.get("device"), Some(&json!("tablet")));
    assert_eq!(serde_json::to_value(&meta).unwrap(), value);
}
