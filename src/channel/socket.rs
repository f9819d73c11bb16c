use super::{ChannelError, Pusher};
use crate::protocol::{
    decode_payload, ClientEvent, Frame, ReplyPayload, ReplyStatus, ServerEvent, HEARTBEAT,
    PHX_JOIN, PHX_LEAVE, PHX_REPLY, SOCKET_TOPIC,
};
use anyhow::{Context, Result};
use dashmap::DashMap;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Inbound route for one topic
struct Route {
    id: u64,
    tx: mpsc::UnboundedSender<Frame>,
}

type Routes = Arc<DashMap<String, Route>>;

/// One physical connection carrying any number of topic subscriptions.
///
/// Dropping the socket stops its reader, writer and heartbeat tasks; every
/// subscription created from it then observes end-of-stream.
pub struct Socket {
    outbound: mpsc::UnboundedSender<Frame>,
    routes: Routes,
    refs: Arc<AtomicU64>,
    join_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl Socket {
    /// Open a WebSocket to `url` with `params` appended as query string.
    pub async fn connect(
        url: &str,
        params: &[(&str, &str)],
        heartbeat_interval: Duration,
    ) -> Result<Self> {
        let endpoint = endpoint_url(url, params);
        info!(url = %url, "Connecting socket");

        let (stream, _) = tokio_tungstenite::connect_async(endpoint.as_str())
            .await
            .with_context(|| format!("Failed to connect to '{}'", url))?;
        let (sink, stream) = stream.split();

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let mut socket = Self::detached(outbound);

        socket.tasks.push(tokio::spawn(write_loop(sink, outbound_rx)));
        socket
            .tasks
            .push(tokio::spawn(read_loop(stream, Arc::clone(&socket.routes))));
        if !heartbeat_interval.is_zero() {
            socket.tasks.push(tokio::spawn(heartbeat_loop(
                socket.outbound.clone(),
                Arc::clone(&socket.refs),
                heartbeat_interval,
            )));
        }

        Ok(socket)
    }

    /// Socket with no I/O tasks: frames pushed go to `outbound`, inbound
    /// frames are fed through [`Socket::deliver`].
    pub(crate) fn detached(outbound: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            outbound,
            routes: Arc::new(DashMap::new()),
            refs: Arc::new(AtomicU64::new(1)),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            tasks: Vec::new(),
        }
    }

    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }

    /// Create the subscription handle for `topic`. Nothing is sent until
    /// [`Subscription::join`].
    pub fn channel(&self, topic: impl Into<String>, params: Value) -> Subscription {
        let topic = topic.into();
        let (tx, inbound) = mpsc::unbounded_channel();
        let route_id = self.refs.fetch_add(1, Ordering::Relaxed);

        if self
            .routes
            .insert(topic.clone(), Route { id: route_id, tx })
            .is_some()
        {
            warn!(topic = %topic, "Replacing existing subscription for topic");
        }

        Subscription {
            topic,
            params,
            state: JoinState::Closed,
            join_ref: None,
            route_id,
            outbound: self.outbound.clone(),
            inbound,
            routes: Arc::clone(&self.routes),
            refs: Arc::clone(&self.refs),
            join_timeout: self.join_timeout,
            backlog: VecDeque::new(),
        }
    }

    /// Route an inbound frame to its topic's subscription
    pub(crate) fn deliver(&self, frame: Frame) {
        dispatch(&self.routes, frame);
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.routes.clear();
    }
}

/// Join lifecycle of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Closed,
    Joining,
    Joined,
    /// `phx_leave` sent; frames already queued can still be drained and
    /// acknowledged
    Leaving,
}

/// Explicitly owned handle on one topic.
///
/// Events come out of [`Subscription::next_event`] strictly in delivery
/// order. Dropping the handle leaves the topic and unregisters its route.
pub struct Subscription {
    topic: String,
    params: Value,
    state: JoinState,
    join_ref: Option<String>,
    route_id: u64,
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: mpsc::UnboundedReceiver<Frame>,
    routes: Routes,
    refs: Arc<AtomicU64>,
    join_timeout: Duration,

    /// Frames that arrived while waiting for the join reply
    backlog: VecDeque<Frame>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    /// Send `phx_join` and wait for the reply.
    ///
    /// Returns the server's `ok` response, or `JoinRefused` with its reason.
    pub async fn join(&mut self) -> Result<Value, ChannelError> {
        if matches!(self.state, JoinState::Joining | JoinState::Joined) {
            return Err(ChannelError::AlreadyJoined);
        }

        let join_ref = self.next_ref();
        self.join_ref = Some(join_ref.clone());
        self.backlog.clear();
        self.state = JoinState::Joining;

        let frame = Frame::new(&self.topic, PHX_JOIN, self.params.clone())
            .with_ref(join_ref.clone())
            .with_join_ref(Some(join_ref.clone()));
        if self.outbound.send(frame).is_err() {
            self.state = JoinState::Closed;
            return Err(ChannelError::Closed);
        }
        debug!(topic = %self.topic, join_ref = %join_ref, "Joining topic");

        match timeout(self.join_timeout, self.await_join_reply(&join_ref)).await {
            Ok(Ok(response)) => {
                self.state = JoinState::Joined;
                info!(topic = %self.topic, "Joined topic");
                Ok(response)
            }
            Ok(Err(e)) => {
                self.state = JoinState::Closed;
                warn!(topic = %self.topic, error = %e, "Join failed");
                Err(e)
            }
            Err(_) => {
                self.state = JoinState::Closed;
                warn!(topic = %self.topic, "Join timed out");
                Err(ChannelError::JoinTimeout)
            }
        }
    }

    async fn await_join_reply(&mut self, join_ref: &str) -> Result<Value, ChannelError> {
        loop {
            let frame = self.inbound.recv().await.ok_or(ChannelError::Closed)?;

            if frame.event == PHX_REPLY && frame.msg_ref.as_deref() == Some(join_ref) {
                let reply: ReplyPayload = decode_payload(PHX_REPLY, frame.payload)?;
                return match reply.status {
                    ReplyStatus::Ok => Ok(reply.response),
                    ReplyStatus::Error => Err(ChannelError::JoinRefused(reply.response)),
                };
            }

            self.backlog.push_back(frame);
        }
    }

    /// Next decoded event for this topic, or `None` once the socket is gone.
    ///
    /// Frames tagged with an earlier join's ref and replies to pushes are
    /// skipped. `phx_close`/`phx_error` are returned and mark the handle
    /// closed.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        loop {
            let frame = match self.backlog.pop_front() {
                Some(frame) => frame,
                None if self.state == JoinState::Leaving => match self.inbound.try_recv() {
                    Ok(frame) => frame,
                    Err(_) => {
                        debug!(topic = %self.topic, "Drained after leave");
                        self.state = JoinState::Closed;
                        return None;
                    }
                },
                None => match self.inbound.recv().await {
                    Some(frame) => frame,
                    None => {
                        self.state = JoinState::Closed;
                        return None;
                    }
                },
            };

            if let Some(event) = self.accept(frame) {
                return Some(event);
            }
        }
    }

    fn accept(&mut self, frame: Frame) -> Option<ServerEvent> {
        if frame.join_ref.is_some() && frame.join_ref != self.join_ref {
            trace!(topic = %self.topic, event = %frame.event, "Skipping frame from earlier join");
            return None;
        }
        if frame.event == PHX_REPLY {
            trace!(topic = %self.topic, "Skipping push reply");
            return None;
        }

        match ServerEvent::from_frame(frame) {
            Ok(event) => {
                if matches!(event, ServerEvent::Close | ServerEvent::Error) {
                    info!(topic = %self.topic, event = event.event_name(), "Topic closed by server");
                    self.state = JoinState::Closed;
                }
                Some(event)
            }
            Err(e) => {
                warn!(topic = %self.topic, error = %e, "Dropping undecodable event");
                None
            }
        }
    }

    /// Send `phx_leave`. Events already queued can still be drained with
    /// [`Subscription::next_event`], which returns `None` once they are
    /// used up; pushes keep working until then.
    pub fn leave(&mut self) {
        if !matches!(self.state, JoinState::Joining | JoinState::Joined) {
            return;
        }

        let frame = Frame::new(&self.topic, PHX_LEAVE, json!({}))
            .with_ref(self.next_ref())
            .with_join_ref(self.join_ref.clone());
        if self.outbound.send(frame).is_err() {
            debug!(topic = %self.topic, "Socket gone before leave");
        }

        self.state = JoinState::Leaving;
        info!(topic = %self.topic, "Left topic");
    }

    fn next_ref(&self) -> String {
        self.refs.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

impl Pusher for Subscription {
    fn push(&self, event: ClientEvent) -> Result<(), ChannelError> {
        if !matches!(self.state, JoinState::Joined | JoinState::Leaving) {
            return Err(ChannelError::NotJoined);
        }

        let frame = event
            .to_frame(&self.topic)?
            .with_ref(self.next_ref())
            .with_join_ref(self.join_ref.clone());

        self.outbound.send(frame).map_err(|_| ChannelError::Closed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.leave();
        let route_id = self.route_id;
        self.routes.remove_if(&self.topic, |_, route| route.id == route_id);
    }
}

fn dispatch(routes: &DashMap<String, Route>, frame: Frame) {
    if frame.topic == SOCKET_TOPIC {
        trace!(event = %frame.event, "Socket-level frame");
        return;
    }

    match routes.get(&frame.topic) {
        Some(route) => {
            if route.tx.send(frame).is_err() {
                debug!("Subscription dropped its receiver");
            }
        }
        None => debug!(topic = %frame.topic, event = %frame.event, "No subscription for topic"),
    }
}

fn endpoint_url(url: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    let query: Vec<String> = params
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect();
    let separator = if url.contains('?') { '&' } else { '?' };

    format!("{}{}{}", url, separator, query.join("&"))
}

async fn read_loop<S, E>(mut stream: S, routes: Routes)
where
    S: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match Frame::from_json(text.as_str()) {
                Ok(frame) => dispatch(&routes, frame),
                Err(e) => warn!(error = %e, "Dropping undecodable frame"),
            },
            Ok(Message::Close(_)) => {
                info!("Socket closed by server");
                break;
            }
            Ok(_) => {
                // Ping/pong handled by tungstenite, binary unused
            }
            Err(e) => {
                warn!(error = %e, "Socket read error");
                break;
            }
        }
    }

    routes.clear();
}

async fn write_loop<S>(mut sink: S, outbound: mpsc::UnboundedReceiver<Frame>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut frames = UnboundedReceiverStream::new(outbound);

    while let Some(frame) = frames.next().await {
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode frame");
                continue;
            }
        };

        if let Err(e) = sink.send(Message::text(text)).await {
            warn!(error = %e, "Socket write error");
            break;
        }
    }

    let _ = sink.close().await;
}

async fn heartbeat_loop(
    outbound: mpsc::UnboundedSender<Frame>,
    refs: Arc<AtomicU64>,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let frame = Frame::new(SOCKET_TOPIC, HEARTBEAT, json!({}))
            .with_ref(refs.fetch_add(1, Ordering::Relaxed).to_string());
        if outbound.send(frame).is_err() {
            break;
        }
    }
}
