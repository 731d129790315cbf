//! Repository for the `queue_locks` table: a heartbeat-leased mutex keyed
//! by queue item, safe for concurrent claimers.
//!
//! Acquisition is insert-if-absent; takeover of a stale lease is a
//! compare-and-swap on the observed heartbeat, so two takeover attempts
//! can never both succeed. Staleness is always evaluated against the
//! database clock to keep multiple workers in agreement.

use atelier_core::queue::LEASE_TIMEOUT_SECS;
use atelier_core::recovery::{self, LeaseState, ProcessingItem};
use atelier_core::types::DbId;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::lock::QueueLock;
use crate::models::status::{GenerationStatus, QueueItemStatus};

/// Column list for `queue_locks` queries.
const COLUMNS: &str = "id, queue_item_id, locked_at, heartbeat_at";

/// Provides lease operations for queue item locks.
pub struct QueueLockRepo;

impl QueueLockRepo {
    /// Try to take the lease on a queue item.
    ///
    /// Returns the new lease on success. Returns `None` when another
    /// holder has a fresh lease, or when the insert and the stale-takeover
    /// CAS both lose their race.
    pub async fn acquire(
        pool: &PgPool,
        queue_item_id: DbId,
    ) -> Result<Option<QueueLock>, sqlx::Error> {
        let query = format!(
            "INSERT INTO queue_locks (id, queue_item_id, locked_at, heartbeat_at) \
             VALUES ($1, $2, NOW(), NOW()) \
             ON CONFLICT (queue_item_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, QueueLock>(&query)
            .bind(Uuid::new_v4())
            .bind(queue_item_id)
            .fetch_optional(pool)
            .await?;

        if let Some(lock) = inserted {
            return Ok(Some(lock));
        }

        // A row exists. Read it and, if its heartbeat has gone stale, take
        // it over conditionally on the exact heartbeat we observed.
        let query = format!("SELECT {COLUMNS} FROM queue_locks WHERE queue_item_id = $1");
        let existing = sqlx::query_as::<_, QueueLock>(&query)
            .bind(queue_item_id)
            .fetch_optional(pool)
            .await?;

        let Some(existing) = existing else {
            // Released between our insert and read; the next acquire wins it.
            return Ok(None);
        };

        if !recovery::is_stale(existing.heartbeat_at, Utc::now()) {
            return Ok(None);
        }

        let query = format!(
            "UPDATE queue_locks \
             SET id = $1, locked_at = NOW(), heartbeat_at = NOW() \
             WHERE queue_item_id = $2 AND heartbeat_at = $3 \
             RETURNING {COLUMNS}"
        );
        let taken = sqlx::query_as::<_, QueueLock>(&query)
            .bind(Uuid::new_v4())
            .bind(queue_item_id)
            .bind(existing.heartbeat_at)
            .fetch_optional(pool)
            .await?;

        if taken.is_some() {
            tracing::warn!(
                queue_item_id,
                stale_heartbeat = %existing.heartbeat_at,
                "Took over stale lease",
            );
        }

        Ok(taken)
    }

    /// Renew the heartbeat on a held lease. Returns `false` when the lease
    /// no longer exists or was taken over (the token no longer matches).
    pub async fn heartbeat(pool: &PgPool, lock_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE queue_locks SET heartbeat_at = NOW() WHERE id = $1")
            .bind(lock_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Release a lease by its token.
    pub async fn release(pool: &PgPool, lock_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM queue_locks WHERE id = $1")
            .bind(lock_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Release whatever lease exists on a queue item.
    pub async fn release_for_item(pool: &PgPool, queue_item_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM queue_locks WHERE queue_item_id = $1")
            .bind(queue_item_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Whether a fresh lease currently exists on the item.
    pub async fn is_item_locked(pool: &PgPool, queue_item_id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS( \
                 SELECT 1 FROM queue_locks \
                 WHERE queue_item_id = $1 \
                   AND heartbeat_at >= NOW() - ($2 * INTERVAL '1 second') \
             )",
        )
        .bind(queue_item_id)
        .bind(LEASE_TIMEOUT_SECS)
        .fetch_one(pool)
        .await
    }

    /// Count of fresh leases.
    pub async fn active_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_locks \
             WHERE heartbeat_at >= NOW() - ($1 * INTERVAL '1 second')",
        )
        .bind(LEASE_TIMEOUT_SECS)
        .fetch_one(pool)
        .await
    }

    /// Crash-recovery sweep, run once at worker startup.
    ///
    /// Loads every `processing` item and its lease, asks
    /// [`atelier_core::recovery::plan_recovery`] what a crashed worker left
    /// behind, and applies the plan in one transaction: abandoned items go
    /// back to `queued` with `started_at` cleared, their generations (if
    /// `generating`) go back to `pending`, and the dead leases are deleted.
    /// Returns the number of items reset.
    pub async fn reset_stale_processing(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let processing: Vec<(DbId, Option<DbId>)> = sqlx::query_as(
            "SELECT id, generation_id FROM queue_items WHERE status_id = $1",
        )
        .bind(QueueItemStatus::Processing.id())
        .fetch_all(pool)
        .await?;

        let leases: Vec<LeaseState> = sqlx::query_as::<_, (DbId, chrono::DateTime<Utc>)>(
            "SELECT queue_item_id, heartbeat_at FROM queue_locks",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(queue_item_id, heartbeat_at)| LeaseState {
            queue_item_id,
            heartbeat_at,
        })
        .collect();

        let items: Vec<ProcessingItem> = processing
            .into_iter()
            .map(|(item_id, generation_id)| ProcessingItem {
                item_id,
                generation_id,
            })
            .collect();

        let plan = recovery::plan_recovery(&items, &leases, Utc::now());
        if plan.reset_item_ids.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;

        let reset = sqlx::query(
            "UPDATE queue_items \
             SET status_id = $2, started_at = NULL \
             WHERE id = ANY($1) AND status_id = $3",
        )
        .bind(&plan.reset_item_ids)
        .bind(QueueItemStatus::Queued.id())
        .bind(QueueItemStatus::Processing.id())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if !plan.reset_generation_ids.is_empty() {
            sqlx::query(
                "UPDATE generations \
                 SET status_id = $2 \
                 WHERE id = ANY($1) AND status_id = $3",
            )
            .bind(&plan.reset_generation_ids)
            .bind(GenerationStatus::Pending.id())
            .bind(GenerationStatus::Generating.id())
            .execute(&mut *tx)
            .await?;
        }

        if !plan.delete_lease_item_ids.is_empty() {
            sqlx::query("DELETE FROM queue_locks WHERE queue_item_id = ANY($1)")
                .bind(&plan.delete_lease_item_ids)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(reset, "Recovered abandoned processing items");
        Ok(reset)
    }

    /// Delete every stale lease without touching queue item status.
    pub async fn cleanup_stale(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM queue_locks \
             WHERE heartbeat_at < NOW() - ($1 * INTERVAL '1 second')",
        )
        .bind(LEASE_TIMEOUT_SECS)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
