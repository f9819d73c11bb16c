// End-to-end: real server on an ephemeral port, real client sockets.

use rostersync::{
    api::{create_roster_router, create_ws_router, RosterAppState, WsAppState},
    channel::Socket,
    client::{LobbySession, RosterSession},
    config::TopicsConfig,
    entity::{EntityId, Superhero},
    lobby::LobbyUpdate,
    server::{AckLedger, LobbyHub, RosterEngine},
    sync::Applied,
};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    roster: Arc<RosterEngine>,
    acks: Arc<AckLedger>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start(entries: Vec<Superhero>) -> Self {
        let roster = Arc::new(RosterEngine::with_entries(entries, 256));
        let lobby = Arc::new(LobbyHub::new(64));
        let acks = Arc::new(AckLedger::new());

        let ws_state = Arc::new(WsAppState {
            roster: Arc::clone(&roster),
            lobby: Arc::clone(&lobby),
            acks: Arc::clone(&acks),
            topics: TopicsConfig::default(),
            socket_token: None,
        });
        let app = create_ws_router(ws_state).merge(create_roster_router(RosterAppState {
            roster: Arc::clone(&roster),
            lobby,
            acks: Arc::clone(&acks),
        }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            roster,
            acks,
            handle,
        }
    }

    async fn connect(&self, user_name: &str) -> Socket {
        let url = format!("ws://{}/socket/websocket", self.addr);
        Socket::connect(&url, &[("user_name", user_name)], Duration::from_secs(30))
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn within<F: Future>(future: F) -> F::Output {
    timeout(WAIT, future).await.expect("timed out")
}

/// Read lobby updates until one matches
async fn wait_for<P>(session: &mut LobbySession, mut matches: P) -> LobbyUpdate
where
    P: FnMut(&LobbyUpdate) -> bool,
{
    within(async {
        loop {
            let update = session.next().await.expect("lobby closed");
            if matches(&update) {
                return update;
            }
        }
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_roster_hydrate_then_mutations_with_acks() {
    let server = TestServer::start(vec![Superhero::new(1, "Bruce", "Gotham", "money")]).await;
    let socket = server.connect("alice").await;

    let mut session = within(RosterSession::join(
        &socket,
        &TopicsConfig::default().roster,
        json!({}),
        16,
    ))
    .await
    .unwrap();

    let roster = within(session.hydrated()).await.unwrap();
    assert_eq!(roster.len(), 1);

    server
        .roster
        .create(Superhero::new(2, "Diana", "Themyscira", "strength"))
        .unwrap();
    server
        .roster
        .update(Superhero::new(1, "Batman", "Gotham", "gadgets"))
        .unwrap();
    server.roster.delete(&EntityId::Int(2)).unwrap();

    assert_eq!(within(session.next()).await, Some(Ok(Applied::Appended)));
    assert_eq!(within(session.next()).await, Some(Ok(Applied::Replaced)));
    assert_eq!(within(session.next()).await, Some(Ok(Applied::Removed)));
    assert_eq!(session.roster().to_vec(), server.roster.list());

    // Snapshot plus three mutations, all acknowledged
    within(async {
        while server.acks.acknowledged_total() < 4 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_topic_is_refused() {
    let server = TestServer::start(vec![]).await;
    let socket = server.connect("alice").await;

    let refused = within(RosterSession::join(&socket, "villains:lobby", json!({}), 16)).await;
    assert!(refused.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_presence_and_notifications_between_two_users() {
    let server = TestServer::start(vec![]).await;
    let lobby_topic = TopicsConfig::default().lobby;

    let alice_socket = server.connect("alice").await;
    let mut alice = within(LobbySession::join(&alice_socket, &lobby_topic, json!({}), 5))
        .await
        .unwrap();
    wait_for(&mut alice, |u| matches!(u, LobbyUpdate::Identity(name) if name == "alice")).await;

    let bob_socket = server.connect("bob").await;
    let mut bob = within(LobbySession::join(&bob_socket, &lobby_topic, json!({}), 5))
        .await
        .unwrap();
    wait_for(&mut bob, |u| matches!(u, LobbyUpdate::Identity(_))).await;

    // Alice sees bob arrive
    wait_for(&mut alice, |u| matches!(u, LobbyUpdate::Presence(map) if map.contains("bob"))).await;
    let rows = alice.view().rows();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|row| row.identity == "alice" && row.is_self));
    assert!(rows.iter().any(|row| row.identity == "bob" && !row.is_self));

    // Broadcast to others: alice receives, bob does not
    bob.notify_others().unwrap();
    let update = wait_for(&mut alice, |u| matches!(u, LobbyUpdate::Notification(_))).await;
    assert!(matches!(update, LobbyUpdate::Notification(n) if n.body == "Message from bob"));

    // Direct message to alice
    bob.notify_direct("alice").unwrap();
    let update = wait_for(&mut alice, |u| matches!(u, LobbyUpdate::Notification(_))).await;
    assert!(matches!(update, LobbyUpdate::Notification(n) if n.body == "Message to alice from bob"));

    // Broadcast to all: bob's first notification is his own
    bob.notify_all().unwrap();
    let update = wait_for(&mut bob, |u| matches!(u, LobbyUpdate::Notification(_))).await;
    assert!(matches!(update, LobbyUpdate::Notification(n) if n.body == "Message from bob"));

    // Bob disconnects; alice sees him leave
    drop(bob);
    drop(bob_socket);
    wait_for(&mut alice, |u| matches!(u, LobbyUpdate::Presence(map) if !map.contains("bob"))).await;
}
