use serde::{Deserialize, Deserializer, Serialize};
use std::collections::VecDeque;


/// Default number of notices kept by a feed
pub const DEFAULT_FEED_WINDOW: usize = 5;

/// A broadcast notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub body: String,

    /// Unix seconds. Accepted as a number or a numeric string.
    #[serde(deserialize_with = "timestamp_from_number_or_string")]
    pub timestamp: i64,
}

impl Notification {
    pub fn new(body: impl Into<String>, timestamp: i64) -> Self {
        Self {
            body: body.into(),
            timestamp,
        }
    }

    /// Stamp a notice with the current time
    pub fn now(body: impl Into<String>) -> Self {
        Self::new(body, chrono::Utc::now().timestamp())
    }
}

fn timestamp_from_number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(ts) => Ok(ts),
        Raw::Text(ts) => ts.trim().parse::<i64>().map_err(serde::de::Error::custom),
    }
}

/// Bounded, append-only view of the most recent notices.
///
/// Ordering is arrival order; a notice with an older timestamp still goes
/// to the tail. The oldest entry is evicted in the same call that pushes
/// past the window.
#[derive(Debug, Clone)]
pub struct NotificationFeed {
    window: usize,
    entries: VecDeque<Notification>,
}

impl NotificationFeed {
    /// A window of zero is treated as one.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            entries: VecDeque::with_capacity(window),
        }
    }

    pub fn push(&mut self, notification: Notification) {
        self.entries.push_back(notification);
        while self.entries.len() > self.window {
            self.entries.pop_front();
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&Notification> {
        self.entries.back()
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_WINDOW)
    }
}
