//! Pub/Sub Channel Registry
//!
//! Maps channel names and channel patterns to the sessions subscribed to
//! them. Publishing pushes a message into each subscriber's inbox; the
//! subscriber reads it from its own session at its own pace, independent
//! of command execution.
//!
//! ```text
//!   PUBLISH news hi
//!        │
//!        ├──> channels["news"]  ──> inbox(session 3), inbox(session 7)
//!        └──> patterns["n*"]    ──> inbox(session 5)
//! ```

use crate::pattern::Pattern;
use crate::reply::Reply;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::trace;

/// Identifies a session across the server.
pub type SessionId = u64;

/// Where messages for one session are delivered.
pub type MessageSink = mpsc::UnboundedSender<PubSubMessage>;

/// A message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct PubSubMessage {
    /// The pattern that matched, for pattern subscriptions
    pub pattern: Option<Bytes>,
    pub channel: Bytes,
    pub data: Bytes,
}

impl PubSubMessage {
    /// The push reply a subscriber sees: `message channel data`, or
    /// `pmessage pattern channel data` for pattern subscriptions.
    pub fn to_reply(&self) -> Reply {
        match &self.pattern {
            Some(pattern) => Reply::array(vec![
                Reply::bulk("pmessage"),
                Reply::Bulk(pattern.clone()),
                Reply::Bulk(self.channel.clone()),
                Reply::Bulk(self.data.clone()),
            ]),
            None => Reply::array(vec![
                Reply::bulk("message"),
                Reply::Bulk(self.channel.clone()),
                Reply::Bulk(self.data.clone()),
            ]),
        }
    }
}

#[derive(Debug)]
struct Subscriber {
    session: SessionId,
    sink: MessageSink,
}

/// Subscriptions of every session attached to one server.
#[derive(Debug, Default)]
pub struct PubSubRegistry {
    channels: HashMap<Bytes, Vec<Subscriber>>,
    patterns: HashMap<Bytes, (Pattern, Vec<Subscriber>)>,
}

fn add_subscriber(list: &mut Vec<Subscriber>, session: SessionId, sink: &MessageSink) -> bool {
    if list.iter().any(|s| s.session == session) {
        return false;
    }
    list.push(Subscriber {
        session,
        sink: sink.clone(),
    });
    true
}

fn remove_subscriber(list: &mut Vec<Subscriber>, session: SessionId) -> bool {
    let before = list.len();
    list.retain(|s| s.session != session);
    list.len() != before
}

impl PubSubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the session was not yet subscribed.
    pub fn subscribe(&mut self, channel: Bytes, session: SessionId, sink: &MessageSink) -> bool {
        add_subscriber(self.channels.entry(channel).or_default(), session, sink)
    }

    pub fn unsubscribe(&mut self, channel: &[u8], session: SessionId) -> bool {
        let Some(list) = self.channels.get_mut(channel) else {
            return false;
        };
        let removed = remove_subscriber(list, session);
        if list.is_empty() {
            self.channels.remove(channel);
        }
        removed
    }

    pub fn psubscribe(&mut self, pattern: Bytes, session: SessionId, sink: &MessageSink) -> bool {
        let (_, list) = self
            .patterns
            .entry(pattern.clone())
            .or_insert_with(|| (Pattern::compile(&pattern), Vec::new()));
        add_subscriber(list, session, sink)
    }

    pub fn punsubscribe(&mut self, pattern: &[u8], session: SessionId) -> bool {
        let Some((_, list)) = self.patterns.get_mut(pattern) else {
            return false;
        };
        let removed = remove_subscriber(list, session);
        if list.is_empty() {
            self.patterns.remove(pattern);
        }
        removed
    }

    /// Drops every subscription a session holds.
    pub fn remove_session(&mut self, session: SessionId) {
        self.channels.retain(|_, list| {
            remove_subscriber(list, session);
            !list.is_empty()
        });
        self.patterns.retain(|_, (_, list)| {
            remove_subscriber(list, session);
            !list.is_empty()
        });
    }

    /// Delivers a message to every direct and pattern subscriber.
    ///
    /// # Returns
    ///
    /// The number of deliveries that reached a live inbox.
    pub fn publish(&mut self, channel: &Bytes, data: &Bytes) -> usize {
        let mut delivered = 0;

        if let Some(list) = self.channels.get(channel.as_ref()) {
            for sub in list {
                let msg = PubSubMessage {
                    pattern: None,
                    channel: channel.clone(),
                    data: data.clone(),
                };
                if sub.sink.send(msg).is_ok() {
                    delivered += 1;
                }
            }
        }

        for (raw, (pattern, list)) in &self.patterns {
            if !pattern.matches(channel) {
                continue;
            }
            for sub in list {
                let msg = PubSubMessage {
                    pattern: Some(raw.clone()),
                    channel: channel.clone(),
                    data: data.clone(),
                };
                if sub.sink.send(msg).is_ok() {
                    delivered += 1;
                }
            }
        }

        trace!(channel = %String::from_utf8_lossy(channel), delivered, "Message published");
        delivered
    }

    /// Number of channels with at least one subscriber.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_publish_reaches_channel_and_pattern() {
        let mut reg = PubSubRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        assert!(reg.subscribe(b("news"), 1, &tx1));
        assert!(!reg.subscribe(b("news"), 1, &tx1));
        assert!(reg.psubscribe(b("n*"), 2, &tx2));

        assert_eq!(reg.publish(&b("news"), &b("hi")), 2);
        assert_eq!(reg.publish(&b("other"), &b("hi")), 0);

        let msg = rx1.try_recv().unwrap();
        assert_eq!(
            msg.to_reply(),
            Reply::bulk_array(["message", "news", "hi"])
        );
        let msg = rx2.try_recv().unwrap();
        assert_eq!(msg.pattern, Some(b("n*")));
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_remove_session_cleans_up() {
        let mut reg = PubSubRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        reg.subscribe(b("a"), 1, &tx);
        reg.subscribe(b("b"), 1, &tx);
        reg.psubscribe(b("*"), 1, &tx);
        reg.remove_session(1);
        assert_eq!(reg.channel_count(), 0);
        assert_eq!(reg.pattern_count(), 0);
        assert_eq!(reg.publish(&b("a"), &b("x")), 0);
    }

    #[test]
    fn test_closed_inbox_not_counted() {
        let mut reg = PubSubRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        reg.subscribe(b("a"), 1, &tx);
        drop(rx);
        assert_eq!(reg.publish(&b("a"), &b("x")), 0);
    }
}
