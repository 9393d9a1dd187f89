// src/client.rs

//! A typed facade over [`Connection`] for the common commands.

use crate::config::ConnectionConfig;
use crate::connection::{Connection, Pipeline, Subscriber};
use crate::core::{BerylError, Command, RespFrame, ToArg};
use crate::tx::TransactionError;
use bytes::Bytes;
use futures::future::BoxFuture;

/// A client for a Redis-compatible server.
///
/// Thin typed wrappers over [`Connection::send`]; anything not covered here
/// can be sent through [`Client::connection`] with a raw [`Command`].
#[derive(Debug, Clone)]
pub struct Client {
    connection: Connection,
}

impl Client {
    /// Connects using the given configuration.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, BerylError> {
        Ok(Self {
            connection: Connection::connect(config).await?,
        })
    }

    /// The underlying connection, for raw commands and subscriptions.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// PING: checks the server is responsive.
    pub async fn ping(&self) -> Result<(), BerylError> {
        let reply = self.connection.send(Command::new("PING")).await?;
        match reply.as_str() {
            Some("PONG") => Ok(()),
            _ => Err(unexpected("PING", &reply)),
        }
    }

    /// GET key. `None` when the key does not exist.
    pub async fn get(&self, key: impl ToArg) -> Result<Option<Bytes>, BerylError> {
        let reply = self.connection.send(Command::new("GET").arg(key)).await?;
        match reply {
            RespFrame::BulkString(value) => Ok(Some(value)),
            RespFrame::Null => Ok(None),
            other => Err(unexpected("GET", &other)),
        }
    }

    /// SET key value.
    pub async fn set(&self, key: impl ToArg, value: impl ToArg) -> Result<(), BerylError> {
        let reply = self
            .connection
            .send(Command::new("SET").arg(key).arg(value))
            .await?;
        match reply.as_str() {
            Some("OK") => Ok(()),
            _ => Err(unexpected("SET", &reply)),
        }
    }

    /// DEL key [key ...]: returns the number of keys removed.
    pub async fn del<I, A>(&self, keys: I) -> Result<i64, BerylError>
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        self.int_command(Command::new("DEL").args(keys), "DEL").await
    }

    /// EXISTS key [key ...]: returns how many of the keys exist.
    pub async fn exists<I, A>(&self, keys: I) -> Result<i64, BerylError>
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        self.int_command(Command::new("EXISTS").args(keys), "EXISTS")
            .await
    }

    /// INCR key: returns the incremented value.
    pub async fn incr(&self, key: impl ToArg) -> Result<i64, BerylError> {
        self.int_command(Command::new("INCR").arg(key), "INCR").await
    }

    /// PUBLISH channel message: returns the number of subscribers that
    /// received the message.
    pub async fn publish(
        &self,
        channel: impl ToArg,
        message: impl ToArg,
    ) -> Result<i64, BerylError> {
        self.int_command(
            Command::new("PUBLISH").arg(channel).arg(message),
            "PUBLISH",
        )
        .await
    }

    /// Subscribes to channels. See [`Connection::subscribe`].
    pub async fn subscribe<I, A>(&self, channels: I) -> Result<Subscriber, BerylError>
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        self.connection.subscribe(channels).await
    }

    /// Subscribes to patterns. See [`Connection::psubscribe`].
    pub async fn psubscribe<I, A>(&self, patterns: I) -> Result<Subscriber, BerylError>
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        self.connection.psubscribe(patterns).await
    }

    /// Starts a command batch. See [`Pipeline`].
    pub fn pipeline(&self) -> Pipeline {
        self.connection.pipeline()
    }

    /// Runs `body` inside a MULTI/EXEC block. See [`Connection::transaction`].
    pub async fn transaction<F>(&self, body: F) -> Result<(), TransactionError>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<(), BerylError>> + Send,
    {
        self.connection.transaction(body).await
    }

    /// Closes the underlying connection.
    pub async fn close(&self) {
        self.connection.close().await;
    }

    async fn int_command(&self, command: Command, name: &str) -> Result<i64, BerylError> {
        let reply = self.connection.send(command).await?;
        reply.as_int().ok_or_else(|| unexpected(name, &reply))
    }
}

fn unexpected(command: &str, reply: &RespFrame) -> BerylError {
    BerylError::UnexpectedReply(format!("{command} returned {reply:?}"))
}
