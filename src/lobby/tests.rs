use super::*;
use crate::presence::{PresenceDiff, PresenceEntry, PresenceState, SessionMeta};
use crate::protocol::UserInfo;
use std::cell::RefCell;

#[derive(Default)]
struct RecordingPusher {
    pushed: RefCell<Vec<ClientEvent>>,
}

impl Pusher for RecordingPusher {
    fn push(&self, event: ClientEvent) -> Result<(), ChannelError> {
        self.pushed.borrow_mut().push(event);
        Ok(())
    }
}

fn state_with(identity: &str, refs: &[&str]) -> PresenceState {
    let mut state = PresenceState::new();
    state.insert(
        identity.to_string(),
        PresenceEntry {
            metas: refs
                .iter()
                .map(|r| SessionMeta::new(*r, identity, 1_700_000_000))
                .collect(),
        },
    );
    state
}

#[test]
fn test_user_info_sets_identity() {
    let mut lobby = LobbyView::new(5);
    let update = lobby.handle(ServerEvent::UserInfo(UserInfo {
        user_name: "alice".to_string(),
    }));

    assert_eq!(update, LobbyUpdate::Identity("alice".to_string()));
    assert_eq!(lobby.user_name(), Some("alice"));
}

#[test]
fn test_presence_rows_mark_own_sessions() {
    let mut lobby = LobbyView::new(5);
    lobby.handle(ServerEvent::UserInfo(UserInfo {
        user_name: "alice".to_string(),
    }));

    let mut state = state_with("alice", &["ref-1", "ref-2"]);
    state.extend(state_with("bob", &["ref-3"]));
    lobby.handle(ServerEvent::PresenceState(state));

    let rows = lobby.rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().filter(|row| row.is_self).count(), 2);
    assert_eq!(lobby.presence().get("alice").unwrap().len(), 2);
}

#[test]
fn test_diff_before_state_after_rejoin_is_pending() {
    let mut lobby = LobbyView::new(5);
    lobby.handle(ServerEvent::PresenceState(state_with("alice", &["ref-1"])));
    lobby.joined();

    let diff = PresenceDiff {
        joins: state_with("bob", &["ref-2"]),
        leaves: PresenceState::new(),
    };
    assert_eq!(
        lobby.handle(ServerEvent::PresenceDiff(diff)),
        LobbyUpdate::PresencePending
    );

    match lobby.handle(ServerEvent::PresenceState(state_with("carol", &["ref-3"]))) {
        LobbyUpdate::Presence(map) => {
            assert!(map.contains("bob"));
            assert!(map.contains("carol"));
            assert!(!map.contains("alice"));
        }
        other => panic!("Expected presence, got {:?}", other),
    }
}

#[test]
fn test_notifications_fill_bounded_feed() {
    let mut lobby = LobbyView::new(5);
    for i in 0..7 {
        lobby.handle(ServerEvent::Notification(Notification::new(
            format!("n{}", i),
            i,
        )));
    }

    assert_eq!(lobby.feed().len(), 5);
    assert_eq!(lobby.feed().iter().next().unwrap().body, "n2");
}

#[test]
fn test_pushes_are_annotated_with_sender() {
    let mut lobby = LobbyView::new(5);
    lobby.handle(ServerEvent::UserInfo(UserInfo {
        user_name: "alice".to_string(),
    }));
    let pusher = RecordingPusher::default();

    lobby.notify_others(&pusher).unwrap();
    lobby.notify_all(&pusher).unwrap();
    lobby.notify_direct(&pusher, "bob").unwrap();

    let pushed = pusher.pushed.borrow();
    assert_eq!(
        pushed[0],
        ClientEvent::NotifyOthers(NotifyPayload {
            body: "Message from alice".to_string()
        })
    );
    assert_eq!(
        pushed[1],
        ClientEvent::NotifyAll(NotifyPayload {
            body: "Message from alice".to_string()
        })
    );
    assert_eq!(
        pushed[2],
        ClientEvent::NotifyDirect(DirectPayload {
            body: "Message to bob from alice".to_string(),
            recipient: "bob".to_string(),
        })
    );
}

#[test]
fn test_roster_events_are_ignored() {
    let mut lobby = LobbyView::new(5);
    let update = lobby.handle(ServerEvent::Hydrate(crate::protocol::HydratePayload {
        entities: vec![],
        message_id: "m1".to_string(),
    }));
    assert_eq!(update, LobbyUpdate::Ignored);
}
