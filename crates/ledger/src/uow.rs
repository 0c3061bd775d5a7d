//! Unit-of-work abstraction
//!
//! Within one logical settlement the sequence {debit-or-credit wallet, append
//! transaction, append receipt, update subscription state} must be applied as
//! a single atomic unit when the data store supports it. Deployments that
//! can't afford multi-statement transactions run in a best-effort sequential
//! mode without rollback. The mode is selected once at startup from
//! configuration, not re-detected per request.

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::error::{LedgerError, LedgerResult};

/// How ledger writes are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyMode {
    /// Real database transactions; partial writes are never observable.
    Atomic,
    /// Sequential writes without rollback. An explicit, acknowledged weaker
    /// consistency mode for constrained deployments, not a bug.
    BestEffortSequential,
}

impl ConsistencyMode {
    pub fn from_config(atomic_writes: bool) -> Self {
        if atomic_writes {
            ConsistencyMode::Atomic
        } else {
            ConsistencyMode::BestEffortSequential
        }
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, ConsistencyMode::Atomic)
    }
}

/// Factory for units of work over the shared pool.
#[derive(Clone)]
pub struct UnitOfWork {
    pool: PgPool,
    mode: ConsistencyMode,
}

impl UnitOfWork {
    pub fn new(pool: PgPool, mode: ConsistencyMode) -> Self {
        if !mode.is_atomic() {
            tracing::warn!(
                "Ledger running in BEST-EFFORT mode: settlements are sequential writes \
                 without rollback; a crash mid-settlement can leave a partial ledger write"
            );
        }
        Self { pool, mode }
    }

    pub fn mode(&self) -> ConsistencyMode {
        self.mode
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Start a unit of work. In atomic mode this opens a transaction; in
    /// best-effort mode it checks out a plain connection and `commit` is a
    /// no-op.
    pub async fn begin(&self) -> LedgerResult<UowHandle> {
        match self.mode {
            ConsistencyMode::Atomic => {
                let tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| LedgerError::TransactionAbort(e.to_string()))?;
                Ok(UowHandle::Atomic(tx))
            }
            ConsistencyMode::BestEffortSequential => {
                let conn = self.pool.acquire().await?;
                Ok(UowHandle::BestEffort(conn))
            }
        }
    }
}

/// A live unit of work. Dropping an atomic handle without committing rolls
/// the transaction back; a best-effort handle has nothing to undo.
pub enum UowHandle {
    Atomic(Transaction<'static, Postgres>),
    BestEffort(PoolConnection<Postgres>),
}

impl UowHandle {
    /// The connection every write inside this unit of work must use.
    pub fn conn(&mut self) -> &mut PgConnection {
        match self {
            UowHandle::Atomic(tx) => &mut *tx,
            UowHandle::BestEffort(conn) => &mut *conn,
        }
    }

    pub async fn commit(self) -> LedgerResult<()> {
        match self {
            UowHandle::Atomic(tx) => tx
                .commit()
                .await
                .map_err(|e| LedgerError::TransactionAbort(e.to_string())),
            UowHandle::BestEffort(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_selection_from_config() {
        assert_eq!(ConsistencyMode::from_config(true), ConsistencyMode::Atomic);
        assert_eq!(
            ConsistencyMode::from_config(false),
            ConsistencyMode::BestEffortSequential
        );
        assert!(ConsistencyMode::Atomic.is_atomic());
        assert!(!ConsistencyMode::BestEffortSequential.is_atomic());
    }
}
