// src/connection/pipeline.rs

//! Command batching: accumulate locally, write in one burst, read in order.

use super::Connection;
use super::actor::ActorRequest;
use crate::core::{BerylError, Command, RespFrame};
use tokio::sync::oneshot;

/// A batch of commands that is written in a single burst.
///
/// `enqueue` only accumulates; nothing touches the socket until `execute`,
/// which writes every frame before the first reply is awaited, collapsing
/// N round trips into one. Replies come back in enqueue order.
///
/// Error replies stay in the result vector as [`RespFrame::Error`] elements:
/// one failed command does not disturb its batch siblings.
#[derive(Debug)]
pub struct Pipeline {
    connection: Connection,
    commands: Vec<Command>,
}

impl Pipeline {
    pub(crate) fn new(connection: Connection) -> Self {
        Self {
            connection,
            commands: Vec::new(),
        }
    }

    /// Adds a command to the batch without sending anything.
    pub fn enqueue(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Number of commands accumulated so far.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Sends the whole batch and resolves once every reply has arrived.
    ///
    /// The result preserves enqueue order. An empty batch resolves
    /// immediately without touching the connection.
    pub async fn execute(self) -> Result<Vec<RespFrame>, BerylError> {
        if self.commands.is_empty() {
            return Ok(Vec::new());
        }

        let count = self.commands.len();
        let mut senders = Vec::with_capacity(count);
        let mut receivers = Vec::with_capacity(count);
        for _ in 0..count {
            let (tx, rx) = oneshot::channel();
            senders.push(tx);
            receivers.push(rx);
        }

        let frames = self.commands.into_iter().map(RespFrame::from).collect();
        self.connection
            .submit(ActorRequest::Pipeline {
                frames,
                replies: senders,
            })
            .await?;

        let mut replies = Vec::with_capacity(count);
        for receiver in receivers {
            let reply = receiver
                .await
                .map_err(|_| BerylError::ConnectionClosed)??;
            replies.push(reply);
        }
        Ok(replies)
    }
}
