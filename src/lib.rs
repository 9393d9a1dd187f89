// src/lib.rs

pub mod client;
pub mod config;
pub mod connection;
pub mod core;
pub mod tx;

// Re-export
pub use crate::client::Client;
pub use crate::config::ConnectionConfig;
pub use crate::connection::{Connection, Pipeline, PushMessage, Subscriber};
pub use crate::core::{BerylError, Command, RespFrame};
