// src/core/mod.rs

//! The central module containing the core data structures of the client.

pub mod errors;
pub mod protocol;

pub use errors::BerylError;
pub use protocol::{Command, RespCodec, RespFrame, ToArg};
