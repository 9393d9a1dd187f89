// src/tx/mod.rs

//! A generic begin/run/commit-or-rollback executor.
//!
//! Works over anything that can run ordered statements, not just this
//! crate's [`Connection`](crate::connection::Connection): the control
//! statements are plain statements issued through the same capability the
//! transaction body uses.

use crate::core::BerylError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// The three control statements that delimit a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlStatements {
    pub begin: &'static str,
    pub commit: &'static str,
    pub rollback: &'static str,
}

impl Default for ControlStatements {
    fn default() -> Self {
        Self {
            begin: "BEGIN TRANSACTION",
            commit: "COMMIT TRANSACTION",
            rollback: "ROLLBACK TRANSACTION",
        }
    }
}

/// The capability a connection must expose to host transactions: run one
/// statement to completion, reporting success or failure.
#[async_trait]
pub trait StatementConnection: Send {
    async fn run_statement(&mut self, statement: &str) -> Result<(), BerylError>;

    /// The control statements this connection understands.
    fn control_statements(&self) -> ControlStatements {
        ControlStatements::default()
    }
}

/// The lifecycle token of one transaction. Transitions are strictly linear:
/// `Idle → Begun → {Committed, RolledBack, Failed}`; no state is revisited.
/// `RolledBack` is a clean rollback after a body failure; `Failed` means the
/// connection could not be returned to a known state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Begun,
    Committed,
    RolledBack,
    Failed,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Idle => "idle",
            TransactionState::Begun => "begun",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled-back",
            TransactionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a transaction failed. `Rollback` is the composite case: the body
/// failed *and* the rollback failed, and both causes are preserved.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("failed to begin transaction: {0}")]
    Begin(BerylError),

    #[error("transaction rolled back: {0}")]
    Body(BerylError),

    #[error("failed to commit transaction: {0}")]
    Commit(BerylError),

    #[error("transaction body failed ({cause}) and rollback failed ({rollback})")]
    Rollback {
        cause: BerylError,
        rollback: BerylError,
    },
}

impl TransactionError {
    /// The error that started the failure. For the composite rollback case
    /// this is the body's error, never the rollback's.
    pub fn cause(&self) -> &BerylError {
        match self {
            TransactionError::Begin(e)
            | TransactionError::Body(e)
            | TransactionError::Commit(e) => e,
            TransactionError::Rollback { cause, .. } => cause,
        }
    }
}

/// Runs `body` inside a transaction on `conn`.
///
/// Begin is sent first; if it fails the body never runs and nothing is
/// rolled back. A successful body is committed. A failed body is rolled
/// back, and the body's error is what the caller sees, unless the rollback
/// itself also fails, in which case both errors are surfaced together.
pub async fn execute<C, F>(conn: &mut C, body: F) -> Result<(), TransactionError>
where
    C: StatementConnection,
    F: for<'c> FnOnce(&'c mut C) -> BoxFuture<'c, Result<(), BerylError>> + Send,
{
    let control = conn.control_statements();
    let mut state = TransactionState::Idle;
    debug!(state = %state, statement = control.begin, "starting transaction");

    conn.run_statement(control.begin)
        .await
        .map_err(TransactionError::Begin)?;
    state = TransactionState::Begun;
    debug!(state = %state, "transaction begun");

    match body(&mut *conn).await {
        Ok(()) => match conn.run_statement(control.commit).await {
            Ok(()) => {
                state = TransactionState::Committed;
                debug!(state = %state, "transaction committed");
                Ok(())
            }
            Err(commit_err) => {
                state = TransactionState::Failed;
                warn!(state = %state, error = %commit_err, "commit failed");
                Err(TransactionError::Commit(commit_err))
            }
        },
        Err(cause) => match conn.run_statement(control.rollback).await {
            Ok(()) => {
                state = TransactionState::RolledBack;
                debug!(state = %state, error = %cause, "transaction rolled back");
                Err(TransactionError::Body(cause))
            }
            Err(rollback) => {
                state = TransactionState::Failed;
                warn!(
                    state = %state,
                    body_error = %cause,
                    rollback_error = %rollback,
                    "rollback failed after body failure"
                );
                Err(TransactionError::Rollback { cause, rollback })
            }
        },
    }
}
