// src/core/protocol/command.rs

//! The client-side command representation: an ordered list of byte-string
//! arguments, where argument 0 is the command name.

use super::RespFrame;
use bytes::Bytes;

/// Conversion into a command argument.
///
/// Borrowed inputs are copied into a fresh `Bytes`; owned `Bytes`, `String`
/// and `Vec<u8>` move without copying.
pub trait ToArg {
    fn to_arg(&self) -> Bytes;
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

impl ToArg for &Bytes {
    fn to_arg(&self) -> Bytes {
        (*self).clone()
    }
}

impl ToArg for &str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for &[u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<const N: usize> ToArg for &[u8; N] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(&self[..])
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for i64 {
    fn to_arg(&self) -> Bytes {
        let mut buf = itoa::Buffer::new();
        Bytes::copy_from_slice(buf.format(*self).as_bytes())
    }
}

impl ToArg for u64 {
    fn to_arg(&self) -> Bytes {
        let mut buf = itoa::Buffer::new();
        Bytes::copy_from_slice(buf.format(*self).as_bytes())
    }
}

/// A single command to be sent to the server.
///
/// Immutable once built; its wire encoding is a pure function of the
/// argument list (an array of bulk strings).
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Starts a command with its name as argument 0.
    pub fn new(name: impl ToArg) -> Self {
        Self {
            args: vec![name.to_arg()],
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl ToArg) -> Self {
        self.args.push(arg.to_arg());
        self
    }

    /// Appends every argument in the iterator, in order.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        self.args.extend(args.into_iter().map(|a| a.to_arg()));
        self
    }

    /// The command name (argument 0).
    pub fn name(&self) -> &Bytes {
        &self.args[0]
    }

    /// Total argument count, command name included.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Consumes the command, yielding its arguments.
    pub fn into_args(self) -> Vec<Bytes> {
        self.args
    }
}

/// A command goes on the wire as an array of bulk strings.
impl From<Command> for RespFrame {
    fn from(command: Command) -> Self {
        RespFrame::Array(
            command
                .into_args()
                .into_iter()
                .map(RespFrame::BulkString)
                .collect(),
        )
    }
}
