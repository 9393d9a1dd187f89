// src/connection/actor.rs

//! The task that owns a connection's socket.
//!
//! All writes, the pending-reply queue, and push routing live on this one
//! task. RESP carries no request identifier, so replies are matched to
//! requests purely by order: the oldest pending slot gets the next
//! non-push frame. Single ownership is what makes that FIFO matching (and
//! non-interleaved frame writes) correct without locking.

use super::pubsub::{PushMessage, Subscriptions, is_subscription_ack};
use crate::core::{BerylError, RespCodec, RespFrame};
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// A request from a `Connection` handle to the actor.
pub(crate) enum ActorRequest {
    /// Write one command frame and enqueue one pending-reply slot.
    Command {
        frame: RespFrame,
        reply: oneshot::Sender<Result<RespFrame, BerylError>>,
    },
    /// Write a batch of frames back-to-back with a single flush, enqueuing
    /// one pending slot per frame. No reply is awaited before the last
    /// frame has been written.
    Pipeline {
        frames: Vec<RespFrame>,
        replies: Vec<oneshot::Sender<Result<RespFrame, BerylError>>>,
    },
    /// Write a (p)subscribe/(p)unsubscribe command. The server confirms once
    /// per named channel but the request occupies a single pending slot, so
    /// the actor must absorb `extra_acks` extra confirmation frames.
    Subscribe {
        frame: RespFrame,
        extra_acks: usize,
        reply: oneshot::Sender<Result<RespFrame, BerylError>>,
    },
    /// Tear the connection down, failing everything outstanding.
    Close,
}

/// One unresolved request slot, owned by the actor until its reply arrives
/// or the connection dies.
struct PendingRequest {
    reply: oneshot::Sender<Result<RespFrame, BerylError>>,
    extra_acks: usize,
}

/// Drives one socket: see the module docs.
pub(crate) struct ConnectionActor {
    framed: Framed<TcpStream, RespCodec>,
    requests: mpsc::Receiver<ActorRequest>,
    pending: VecDeque<PendingRequest>,
    subscriptions: Arc<Subscriptions>,
    /// Confirmation frames still owed to already-resolved subscribe requests.
    absorb_acks: usize,
}

impl ConnectionActor {
    pub(crate) fn new(
        socket: TcpStream,
        requests: mpsc::Receiver<ActorRequest>,
        subscriptions: Arc<Subscriptions>,
    ) -> Self {
        Self {
            framed: Framed::new(socket, RespCodec),
            requests,
            pending: VecDeque::new(),
            subscriptions,
            absorb_acks: 0,
        }
    }

    /// Runs until the connection closes, then resolves every leftover pending
    /// request with `ConnectionClosed` and ends all subscriber streams. No
    /// caller is ever left awaiting a slot that can no longer be filled.
    pub(crate) async fn run(mut self) {
        match self.drive().await {
            Ok(()) => debug!("connection task shutting down"),
            Err(e) if is_normal_disconnect(&e) => {
                debug!("connection closed by peer: {e}");
            }
            Err(e) => warn!("connection failed: {e}"),
        }

        while let Some(pending) = self.pending.pop_front() {
            let _ = pending.reply.send(Err(BerylError::ConnectionClosed));
        }
        self.subscriptions.clear();
    }

    async fn drive(&mut self) -> Result<(), BerylError> {
        loop {
            tokio::select! {
                request = self.requests.recv() => {
                    match request {
                        Some(ActorRequest::Close) | None => return Ok(()),
                        Some(request) => self.handle_request(request).await?,
                    }
                }
                frame = self.framed.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            debug!(?frame, "received frame");
                            self.handle_frame(frame)?;
                        }
                        Some(Err(e)) => return Err(e),
                        None => return Err(BerylError::ConnectionClosed),
                    }
                }
            }
        }
    }

    /// Writes the request's frame(s). Pending slots are enqueued before the
    /// write so a failed write still resolves them during teardown.
    async fn handle_request(&mut self, request: ActorRequest) -> Result<(), BerylError> {
        match request {
            ActorRequest::Command { frame, reply } => {
                self.pending.push_back(PendingRequest {
                    reply,
                    extra_acks: 0,
                });
                self.framed.send(frame).await
            }
            ActorRequest::Pipeline { frames, replies } => {
                for reply in replies {
                    self.pending.push_back(PendingRequest {
                        reply,
                        extra_acks: 0,
                    });
                }
                for frame in frames {
                    self.framed.feed(frame).await?;
                }
                self.framed.flush().await
            }
            ActorRequest::Subscribe {
                frame,
                extra_acks,
                reply,
            } => {
                self.pending.push_back(PendingRequest { reply, extra_acks });
                self.framed.send(frame).await
            }
            ActorRequest::Close => unreachable!("Close is handled by the select loop"),
        }
    }

    /// Routes one decoded frame: pushes go to the subscription registry,
    /// surplus subscribe confirmations are absorbed, and everything else
    /// resolves the oldest pending request, in send order.
    fn handle_frame(&mut self, frame: RespFrame) -> Result<(), BerylError> {
        if let Some(push) = PushMessage::from_frame(&frame)? {
            self.subscriptions.dispatch(push);
            return Ok(());
        }

        if self.absorb_acks > 0 && is_subscription_ack(&frame) {
            self.absorb_acks -= 1;
            return Ok(());
        }

        let Some(pending) = self.pending.pop_front() else {
            return Err(BerylError::Protocol(
                "reply received with no pending request".to_string(),
            ));
        };
        self.absorb_acks += pending.extra_acks;
        // The caller may have dropped its future; the reply is then discarded.
        let _ = pending.reply.send(Ok(frame));
        Ok(())
    }
}

/// Helper function to check for non-critical disconnection errors.
fn is_normal_disconnect(e: &BerylError) -> bool {
    match e {
        BerylError::ConnectionClosed => true,
        BerylError::Io(arc_err) => matches!(
            arc_err.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionAborted
        ),
        _ => false,
    }
}
