// src/config.rs

//! Connection configuration and validation.

use crate::core::BerylError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_mailbox_capacity() -> usize {
    256
}

fn default_subscription_capacity() -> usize {
    128
}

/// Settings for a single client connection.
///
/// Serde derives let hosts embed this in their own configuration files;
/// every field has a default so a bare `{}` section works.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Server hostname or IP address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Password sent via `AUTH` immediately after connecting, if set.
    #[serde(default)]
    pub password: Option<String>,

    /// Maximum time to wait for the TCP connection to be established.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Capacity of the request channel between handles and the connection task.
    /// Senders are backpressured once this many requests are queued unwritten.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Per-channel buffer for pub/sub deliveries. A subscriber that falls
    /// further behind than this skips the gap instead of stalling the reader.
    #[serde(default = "default_subscription_capacity")]
    pub subscription_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
            connect_timeout: default_connect_timeout(),
            mailbox_capacity: default_mailbox_capacity(),
            subscription_capacity: default_subscription_capacity(),
        }
    }
}

impl ConnectionConfig {
    /// Shorthand for connecting to `host:port` with default settings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// The `host:port` string used for `TcpStream::connect`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checks the configuration for values that cannot work.
    pub fn validate(&self) -> Result<(), BerylError> {
        if self.host.is_empty() {
            return Err(BerylError::InvalidConfig("host must not be empty".into()));
        }
        if self.mailbox_capacity == 0 {
            return Err(BerylError::InvalidConfig(
                "mailbox_capacity must be at least 1".into(),
            ));
        }
        if self.subscription_capacity == 0 {
            return Err(BerylError::InvalidConfig(
                "subscription_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
