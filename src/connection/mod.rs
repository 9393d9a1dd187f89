// src/connection/mod.rs

//! Manages the lifecycle of a single multiplexed client connection: command
//! writes, FIFO reply matching, pub/sub demultiplexing, and teardown.

// Declare the sub-modules of the `connection` module.
mod actor;
mod pipeline;
mod pubsub;

// Publicly re-export the primary types from the sub-modules, hiding the
// internal file structure from the rest of the crate.
pub use pipeline::Pipeline;
pub use pubsub::{PushMessage, Subscriber};

use crate::config::ConnectionConfig;
use crate::core::{BerylError, Command, RespFrame, ToArg};
use crate::tx::{ControlStatements, StatementConnection, TransactionError};
use actor::{ActorRequest, ConnectionActor};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use pubsub::{SubscriptionKind, Subscriptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info};

/// A handle to one multiplexed connection.
///
/// Cheap to clone; every clone talks to the same socket through the same
/// owner task, so replies keep their strict send-order matching no matter
/// how many tasks send concurrently. Dropping the last handle (and the last
/// [`Subscriber`]) shuts the connection down.
#[derive(Debug, Clone)]
pub struct Connection {
    requests: mpsc::Sender<ActorRequest>,
    subscriptions: Arc<Subscriptions>,
    transaction_active: Arc<AtomicBool>,
}

impl Connection {
    /// Opens a TCP connection, spawns its owner task, and authenticates if
    /// the configuration carries a password.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, BerylError> {
        config.validate()?;

        let socket = timeout(config.connect_timeout, TcpStream::connect(config.addr()))
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connecting to {} timed out", config.addr()),
                )
            })??;
        socket.set_nodelay(true)?;

        let subscriptions = Arc::new(Subscriptions::new(config.subscription_capacity));
        let (requests, mailbox) = mpsc::channel(config.mailbox_capacity);
        tokio::spawn(ConnectionActor::new(socket, mailbox, subscriptions.clone()).run());

        let connection = Self {
            requests,
            subscriptions,
            transaction_active: Arc::new(AtomicBool::new(false)),
        };
        info!(addr = %config.addr(), "connection established");

        if let Some(password) = &config.password {
            connection
                .send(Command::new("AUTH").arg(password.as_str()))
                .await?;
        }

        Ok(connection)
    }

    /// Sends one command and resolves with its reply.
    ///
    /// Returns as soon as the command is queued; awaiting the returned future
    /// suspends until the matching reply arrives. A server error reply fails
    /// this request with [`BerylError::Server`] and leaves the connection
    /// usable.
    pub async fn send(&self, command: Command) -> Result<RespFrame, BerylError> {
        match self.send_raw(command).await? {
            RespFrame::Error(message) => Err(BerylError::Server(message)),
            frame => Ok(frame),
        }
    }

    /// Like [`send`](Self::send), but yields error replies as
    /// [`RespFrame::Error`] values instead of failing the future.
    pub async fn send_raw(&self, command: Command) -> Result<RespFrame, BerylError> {
        let (reply, receiver) = oneshot::channel();
        self.submit(ActorRequest::Command {
            frame: command.into(),
            reply,
        })
        .await?;
        receiver.await.map_err(|_| BerylError::ConnectionClosed)?
    }

    /// Starts an empty command batch. See [`Pipeline`].
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.clone())
    }

    /// Subscribes to the given channels and returns the stream of their
    /// messages.
    ///
    /// The subscribe confirmation travels through the ordinary reply
    /// pipeline; every message published afterwards is routed to the
    /// returned [`Subscriber`] by channel name. Messages published before
    /// the server confirms are not replayed.
    pub async fn subscribe<I, A>(&self, channels: I) -> Result<Subscriber, BerylError>
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        self.register_subscription("SUBSCRIBE", SubscriptionKind::Channel, channels)
            .await
    }

    /// Subscribes to glob-style patterns; matches arrive as
    /// [`PushMessage`]s with `pattern` set.
    pub async fn psubscribe<I, A>(&self, patterns: I) -> Result<Subscriber, BerylError>
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        self.register_subscription("PSUBSCRIBE", SubscriptionKind::Pattern, patterns)
            .await
    }

    /// Unsubscribes from channels and ends their subscriber streams.
    pub async fn unsubscribe<I, A>(&self, channels: I) -> Result<(), BerylError>
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        self.remove_subscription("UNSUBSCRIBE", SubscriptionKind::Channel, channels)
            .await
    }

    /// Unsubscribes from patterns and ends their subscriber streams.
    pub async fn punsubscribe<I, A>(&self, patterns: I) -> Result<(), BerylError>
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        self.remove_subscription("PUNSUBSCRIBE", SubscriptionKind::Pattern, patterns)
            .await
    }

    /// Runs `body` inside a begin/commit-or-rollback block on this
    /// connection (MULTI/EXEC/DISCARD). Only one transaction may be active
    /// per connection; a second attempt fails at the begin step.
    pub async fn transaction<F>(&self, body: F) -> Result<(), TransactionError>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<(), BerylError>> + Send,
    {
        if self.transaction_active.swap(true, Ordering::AcqRel) {
            return Err(TransactionError::Begin(BerylError::InvalidState(
                "a transaction is already active on this connection".to_string(),
            )));
        }
        let mut connection = self.clone();
        let result = crate::tx::execute(&mut connection, body).await;
        self.transaction_active.store(false, Ordering::Release);
        result
    }

    /// Closes the connection. Every outstanding request fails with
    /// [`BerylError::ConnectionClosed`] and every subscriber stream ends.
    pub async fn close(&self) {
        let _ = self.requests.send(ActorRequest::Close).await;
    }

    /// Hands a request to the owner task.
    pub(crate) async fn submit(&self, request: ActorRequest) -> Result<(), BerylError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| BerylError::ConnectionClosed)
    }

    async fn register_subscription<I, A>(
        &self,
        command_name: &str,
        kind: SubscriptionKind,
        names: I,
    ) -> Result<Subscriber, BerylError>
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        let names = collect_names(command_name, names)?;
        let receivers = self.subscriptions.register(kind, &names)?;

        match self
            .request_subscription(command_name, &names)
            .await
        {
            Ok(_confirmation) => Ok(Subscriber::new(receivers)),
            Err(e) => {
                // Roll the registration back so no dead entries linger.
                self.subscriptions.remove(kind, &names);
                Err(e)
            }
        }
    }

    async fn remove_subscription<I, A>(
        &self,
        command_name: &str,
        kind: SubscriptionKind,
        names: I,
    ) -> Result<(), BerylError>
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        let names = collect_names(command_name, names)?;
        self.request_subscription(command_name, &names).await?;
        self.subscriptions.remove(kind, &names);
        Ok(())
    }

    /// Sends a subscription-control command occupying one pending slot; the
    /// owner task absorbs the per-channel confirmations beyond the first.
    async fn request_subscription(
        &self,
        command_name: &str,
        names: &[Bytes],
    ) -> Result<RespFrame, BerylError> {
        let command = Command::new(command_name).args(names.iter());
        let (reply, receiver) = oneshot::channel();
        self.submit(ActorRequest::Subscribe {
            frame: command.into(),
            extra_acks: names.len() - 1,
            reply,
        })
        .await?;

        match receiver.await.map_err(|_| BerylError::ConnectionClosed)?? {
            RespFrame::Error(message) => Err(BerylError::Server(message)),
            confirmation => {
                debug!(command = command_name, ?confirmation, "subscription updated");
                Ok(confirmation)
            }
        }
    }
}

/// The generic transaction capability, using RESP transaction control
/// commands as the three control statements. Statements are split on
/// whitespace into command arguments.
#[async_trait]
impl StatementConnection for Connection {
    async fn run_statement(&mut self, statement: &str) -> Result<(), BerylError> {
        let mut parts = statement.split_ascii_whitespace();
        let Some(name) = parts.next() else {
            return Err(BerylError::InvalidState("empty statement".to_string()));
        };
        let command = Command::new(name).args(parts);
        self.send(command).await.map(|_| ())
    }

    fn control_statements(&self) -> ControlStatements {
        ControlStatements {
            begin: "MULTI",
            commit: "EXEC",
            rollback: "DISCARD",
        }
    }
}

fn collect_names<I, A>(command_name: &str, names: I) -> Result<Vec<Bytes>, BerylError>
where
    I: IntoIterator<Item = A>,
    A: ToArg,
{
    let names: Vec<Bytes> = names.into_iter().map(|name| name.to_arg()).collect();
    if names.is_empty() {
        return Err(BerylError::InvalidState(format!(
            "{command_name} requires at least one name"
        )));
    }
    Ok(names)
}
