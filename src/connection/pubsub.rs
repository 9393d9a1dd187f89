// src/connection/pubsub.rs

//! Client-side pub/sub: recognition of unsolicited push frames, the
//! per-connection subscription registry, and the `Subscriber` stream.

use crate::core::{BerylError, RespFrame};
use bytes::Bytes;
use dashmap::DashMap;
use futures::Stream;
use futures::stream::{self, SelectAll};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

/// Whether a registration targets a channel name or a glob pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubscriptionKind {
    Channel,
    Pattern,
}

/// One message pushed by the server to a subscribed channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    /// The channel the message was published to.
    pub channel: Bytes,
    /// The message payload.
    pub payload: Bytes,
    /// For pattern subscriptions, the pattern that matched `channel`.
    pub pattern: Option<Bytes>,
}

impl PushMessage {
    /// Recognizes a push frame.
    ///
    /// Returns `Ok(None)` for frames that are not pushes (they belong to the
    /// reply pipeline), `Ok(Some(_))` for `message`/`pmessage` arrays, and an
    /// error for a push-tagged array with the wrong shape.
    pub(crate) fn from_frame(frame: &RespFrame) -> Result<Option<PushMessage>, BerylError> {
        let RespFrame::Array(items) = frame else {
            return Ok(None);
        };
        let Some(RespFrame::BulkString(kind)) = items.first() else {
            return Ok(None);
        };

        match (kind.as_ref(), items.len()) {
            (b"message", 3) => Ok(Some(PushMessage {
                channel: push_element(&items[1])?,
                payload: push_element(&items[2])?,
                pattern: None,
            })),
            (b"pmessage", 4) => Ok(Some(PushMessage {
                pattern: Some(push_element(&items[1])?),
                channel: push_element(&items[2])?,
                payload: push_element(&items[3])?,
            })),
            (b"message" | b"pmessage", n) => Err(BerylError::Protocol(format!(
                "push frame with {n} elements"
            ))),
            _ => Ok(None),
        }
    }
}

/// True for the per-channel confirmation frames the server sends in reply to
/// (p)subscribe/(p)unsubscribe commands.
pub(crate) fn is_subscription_ack(frame: &RespFrame) -> bool {
    let RespFrame::Array(items) = frame else {
        return false;
    };
    matches!(
        items.first(),
        Some(RespFrame::BulkString(kind))
            if matches!(
                kind.as_ref(),
                b"subscribe" | b"unsubscribe" | b"psubscribe" | b"punsubscribe"
            )
    )
}

/// The per-connection subscription registry.
///
/// Maps channel names (and, separately, patterns) to broadcast senders. The
/// read loop dispatches every push through here; each registered subscriber
/// receives its own copy. `DashMap` keeps registration (handle side) and
/// dispatch (read-loop side) lock-free with respect to each other.
#[derive(Debug)]
pub(crate) struct Subscriptions {
    channels: DashMap<Bytes, broadcast::Sender<PushMessage>>,
    patterns: DashMap<Bytes, broadcast::Sender<PushMessage>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Subscriptions {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            patterns: DashMap::new(),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    fn map_for(&self, kind: SubscriptionKind) -> &DashMap<Bytes, broadcast::Sender<PushMessage>> {
        match kind {
            SubscriptionKind::Channel => &self.channels,
            SubscriptionKind::Pattern => &self.patterns,
        }
    }

    /// Registers a receiver for every name, creating broadcast channels as
    /// needed. Registration happens before the subscribe command is written,
    /// so no push for these names can be missed once the server confirms.
    pub(crate) fn register(
        &self,
        kind: SubscriptionKind,
        names: &[Bytes],
    ) -> Result<Vec<broadcast::Receiver<PushMessage>>, BerylError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BerylError::SubscriptionClosed);
        }
        let map = self.map_for(kind);
        Ok(names
            .iter()
            .map(|name| {
                map.entry(name.clone())
                    .or_insert_with(|| broadcast::channel(self.capacity).0)
                    .value()
                    .subscribe()
            })
            .collect())
    }

    /// Drops the senders for the given names, ending their subscriber streams.
    pub(crate) fn remove(&self, kind: SubscriptionKind, names: &[Bytes]) {
        let map = self.map_for(kind);
        for name in names {
            map.remove(name);
        }
    }

    /// Routes one push to its channel or pattern subscribers.
    pub(crate) fn dispatch(&self, message: PushMessage) {
        let (map, key) = match &message.pattern {
            Some(pattern) => (&self.patterns, pattern.clone()),
            None => (&self.channels, message.channel.clone()),
        };
        let delivered = match map.get(&key) {
            Some(sender) => sender.send(message).unwrap_or(0),
            None => 0,
        };
        if delivered == 0 {
            debug!(
                channel = %String::from_utf8_lossy(&key),
                "push with no local subscriber"
            );
        }
    }

    /// Tears down every subscription. Dropping the senders ends all
    /// `Subscriber` streams without an error item.
    pub(crate) fn clear(&self) {
        self.closed.store(true, Ordering::Release);
        self.channels.clear();
        self.patterns.clear();
    }
}

/// An infinite stream of [`PushMessage`]s for one `subscribe`/`psubscribe`
/// call. The stream ends (yields `None`) when the subscription is removed or
/// the connection closes; it never yields an error.
pub struct Subscriber {
    inner: SelectAll<BroadcastStream<PushMessage>>,
}

impl Subscriber {
    pub(crate) fn new(receivers: Vec<broadcast::Receiver<PushMessage>>) -> Self {
        Self {
            inner: stream::select_all(receivers.into_iter().map(BroadcastStream::new)),
        }
    }
}

impl Stream for Subscriber {
    type Item = PushMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(message))) => return Poll::Ready(Some(message)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    // Delivery resumes at the oldest retained message.
                    warn!(skipped, "subscriber lagged behind, skipping messages");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").finish_non_exhaustive()
    }
}

/// Extracts the bytes of a push-frame element.
fn push_element(frame: &RespFrame) -> Result<Bytes, BerylError> {
    match frame {
        RespFrame::BulkString(b) => Ok(b.clone()),
        other => Err(BerylError::Protocol(format!(
            "non-bulk element in push frame: {other:?}"
        ))),
    }
}
