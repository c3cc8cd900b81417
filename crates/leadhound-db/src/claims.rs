//! Cross-process execution claims built on Postgres session advisory locks.
//!
//! A claim holds two locks on one dedicated connection: the run's own lock
//! (single `bigint` key space, keyed by `runs.id`) and one of a fixed number
//! of execution slots (two-`int` key space). Every process sharing the
//! database competes for the same slots, so the slot count bounds runs in
//! flight across the whole deployment. Locks die with the session, so a
//! crashed process never leaves a run claimed.

use sqlx::{pool::PoolConnection, PgPool, Postgres};

use crate::DbError;

/// First key of the two-`int` slot locks.
const SLOT_LOCK_CLASS: i32 = 0x4C48_0001;

/// Result of [`try_claim_execution`].
#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(ExecutionClaim),
    /// Another session holds the run's lock.
    RunBusy,
    /// Every execution slot is taken.
    AtCapacity,
}

/// Locks held while one run executes. Call [`ExecutionClaim::release`] when
/// done; a claim dropped without release closes its connection instead.
pub struct ExecutionClaim {
    conn: Option<PoolConnection<Postgres>>,
    run_id: i64,
    slot: i32,
}

impl ExecutionClaim {
    #[must_use]
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    #[must_use]
    pub fn slot(&self) -> i32 {
        self.slot
    }

    /// Unlocks the slot and the run and returns the connection to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlx`] if the unlock fails. The connection is then
    /// closed, which releases the locks anyway.
    pub async fn release(mut self) -> Result<(), DbError> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let unlocked = async {
            sqlx::query("SELECT pg_advisory_unlock($1, $2)")
                .bind(SLOT_LOCK_CLASS)
                .bind(self.slot)
                .execute(&mut *conn)
                .await?;
            sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(self.run_id)
                .execute(&mut *conn)
                .await?;
            Ok::<(), sqlx::Error>(())
        }
        .await;

        if let Err(e) = unlocked {
            drop(conn.detach());
            return Err(e.into());
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExecutionClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionClaim")
            .field("run_id", &self.run_id)
            .field("slot", &self.slot)
            .field("held", &self.conn.is_some())
            .finish()
    }
}

impl Drop for ExecutionClaim {
    fn drop(&mut self) {
        // Returning a connection that still holds session locks to the pool
        // would leak them to the next borrower.
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}

/// Tries to claim `run_id` and one of `slots` execution slots without
/// waiting.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if no connection can be acquired or a lock query
/// fails.
pub async fn try_claim_execution(
    pool: &PgPool,
    run_id: i64,
    slots: u32,
) -> Result<ClaimOutcome, DbError> {
    let mut conn = pool.acquire().await?;

    match lock_run_and_slot(&mut conn, run_id, slots).await {
        Ok(LockAttempt::Held(slot)) => Ok(ClaimOutcome::Claimed(ExecutionClaim {
            conn: Some(conn),
            run_id,
            slot,
        })),
        Ok(LockAttempt::RunBusy) => Ok(ClaimOutcome::RunBusy),
        Ok(LockAttempt::NoSlot) => Ok(ClaimOutcome::AtCapacity),
        Err(e) => {
            // The session may hold the run lock; closing it is the only safe
            // way back.
            drop(conn.detach());
            Err(e.into())
        }
    }
}

/// Only `Held` leaves locks behind on the session.
enum LockAttempt {
    Held(i32),
    RunBusy,
    NoSlot,
}

async fn lock_run_and_slot(
    conn: &mut PoolConnection<Postgres>,
    run_id: i64,
    slots: u32,
) -> Result<LockAttempt, sqlx::Error> {
    let run_locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
        .bind(run_id)
        .fetch_one(&mut **conn)
        .await?;
    if !run_locked {
        return Ok(LockAttempt::RunBusy);
    }

    let slot_count = i32::try_from(slots.max(1)).unwrap_or(i32::MAX);
    for slot in 0..slot_count {
        let slot_locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1, $2)")
            .bind(SLOT_LOCK_CLASS)
            .bind(slot)
            .fetch_one(&mut **conn)
            .await?;
        if slot_locked {
            return Ok(LockAttempt::Held(slot));
        }
    }

    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(run_id)
        .execute(&mut **conn)
        .await?;
    Ok(LockAttempt::NoSlot)
}
