//! Repository for the `queue_items` table.
//!
//! Status transitions are forward-only and guarded in SQL, so a row that
//! was cancelled (deleted) or already moved on is never resurrected: the
//! caller sees `rows_affected == 0` and discards its result instead.

use atelier_core::queue::{MAX_CONCURRENT, RETAINED_TERMINAL_ITEMS};
use atelier_core::types::DbId;
use sqlx::PgPool;

use crate::models::queue::{EnqueueItem, QueueItem, QueueStatus};
use crate::models::status::{GenerationStatus, QueueItemStatus};

/// Column list for `queue_items` queries.
const COLUMNS: &str = "\
    id, prompt_json, generation_id, status_id, created_at, started_at, \
    completed_at, reference_photo_ids, inline_reference_paths, \
    google_search, safety_override";

/// Cancellation errors surfaced to the producer.
#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    #[error("queue item {0} not found")]
    NotFound(DbId),

    #[error("queue item {id} is already {status}")]
    InvalidState { id: DbId, status: &'static str },

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Provides CRUD and accounting operations for queue items.
pub struct QueueRepo;

impl QueueRepo {
    /// Enqueue a new unit of work with status `queued`.
    ///
    /// The prompt payload is stored opaquely; nothing about its contents
    /// is validated here.
    pub async fn enqueue(pool: &PgPool, input: &EnqueueItem) -> Result<QueueItem, sqlx::Error> {
        let query = format!(
            "INSERT INTO queue_items \
                 (prompt_json, generation_id, status_id, reference_photo_ids, \
                  inline_reference_paths, google_search, safety_override) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, QueueItem>(&query)
            .bind(&input.prompt_json)
            .bind(input.generation_id)
            .bind(QueueItemStatus::Queued.id())
            .bind(&input.reference_photo_ids)
            .bind(&input.inline_reference_paths)
            .bind(input.google_search)
            .bind(input.safety_override)
            .fetch_one(pool)
            .await
    }

    /// Find a queue item by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<QueueItem>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM queue_items WHERE id = $1");
        sqlx::query_as::<_, QueueItem>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Active/queued counts, plus the position of `item_id` when given.
    ///
    /// Position is the 1-based rank of a queued item among queued items by
    /// enqueue time (ties resolved by insertion order), `0` for an item
    /// already processing, and absent for terminal or unknown items.
    pub async fn status(
        pool: &PgPool,
        item_id: Option<DbId>,
    ) -> Result<QueueStatus, sqlx::Error> {
        let (active, queued): (i64, i64) = sqlx::query_as(
            "SELECT \
                 COUNT(*) FILTER (WHERE status_id = $1), \
                 COUNT(*) FILTER (WHERE status_id = $2) \
             FROM queue_items",
        )
        .bind(QueueItemStatus::Processing.id())
        .bind(QueueItemStatus::Queued.id())
        .fetch_one(pool)
        .await?;

        let position = match item_id {
            Some(id) => Self::position_of(pool, id).await?,
            None => None,
        };

        Ok(QueueStatus {
            active,
            queued,
            position,
        })
    }

    /// Rank of one item; see [`Self::status`].
    async fn position_of(pool: &PgPool, id: DbId) -> Result<Option<i64>, sqlx::Error> {
        let item = Self::find_by_id(pool, id).await?;
        let Some(item) = item else {
            return Ok(None);
        };

        match QueueItemStatus::from_id(item.status_id) {
            Some(QueueItemStatus::Queued) => {
                let rank: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM queue_items \
                     WHERE status_id = $1 AND created_at <= $2",
                )
                .bind(QueueItemStatus::Queued.id())
                .bind(item.created_at)
                .fetch_one(pool)
                .await?;
                Ok(Some(rank))
            }
            Some(QueueItemStatus::Processing) => Ok(Some(0)),
            _ => Ok(None),
        }
    }

    /// The oldest queued item, but only while the concurrency cap allows
    /// another item to start.
    ///
    /// This is a plain read: the count and the select happen in one
    /// statement, but nothing is reserved. Claiming safety across workers
    /// comes from the lease acquired immediately afterwards.
    pub async fn next_eligible(pool: &PgPool) -> Result<Option<QueueItem>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM queue_items \
             WHERE status_id = $1 \
               AND (SELECT COUNT(*) FROM queue_items WHERE status_id = $2) < $3 \
             ORDER BY created_at ASC, id ASC \
             LIMIT 1"
        );
        sqlx::query_as::<_, QueueItem>(&query)
            .bind(QueueItemStatus::Queued.id())
            .bind(QueueItemStatus::Processing.id())
            .bind(MAX_CONCURRENT)
            .fetch_optional(pool)
            .await
    }

    /// Move a queued item into `processing`, stamping `started_at`.
    ///
    /// Returns `false` when the item is no longer queued (cancelled, or
    /// claimed and moved on by someone else); callers must then drop it.
    pub async fn mark_processing(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE queue_items \
             SET status_id = $2, started_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(QueueItemStatus::Processing.id())
        .bind(QueueItemStatus::Queued.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a processing item into `completed`, stamping `completed_at`.
    pub async fn mark_completed(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        Self::mark_terminal(pool, id, QueueItemStatus::Completed).await
    }

    /// Move a processing item into `failed`, stamping `completed_at`.
    pub async fn mark_failed(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        Self::mark_terminal(pool, id, QueueItemStatus::Failed).await
    }

    async fn mark_terminal(
        pool: &PgPool,
        id: DbId,
        status: QueueItemStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE queue_items \
             SET status_id = $2, completed_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(status.id())
        .bind(QueueItemStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel a queued or processing item.
    ///
    /// In one transaction: releases any lease, fails the linked generation
    /// (if it has not already finished), and deletes the queue row. The row
    /// is removed outright rather than marked failed.
    pub async fn cancel(pool: &PgPool, id: DbId) -> Result<(), CancelError> {
        let mut tx = pool.begin().await?;

        let row: Option<(i16, Option<DbId>)> = sqlx::query_as(
            "SELECT status_id, generation_id FROM queue_items WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((status_id, generation_id)) = row else {
            return Err(CancelError::NotFound(id));
        };

        if let Some(status) = QueueItemStatus::from_id(status_id) {
            if status.is_terminal() {
                return Err(CancelError::InvalidState {
                    id,
                    status: status.label(),
                });
            }
        }

        sqlx::query("DELETE FROM queue_locks WHERE queue_item_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if let Some(generation_id) = generation_id {
            sqlx::query(
                "UPDATE generations \
                 SET status_id = $2, error_message = $3, completed_at = NOW() \
                 WHERE id = $1 AND status_id IN ($4, $5)",
            )
            .bind(generation_id)
            .bind(GenerationStatus::Failed.id())
            .bind("Cancelled by user")
            .bind(GenerationStatus::Pending.id())
            .bind(GenerationStatus::Generating.id())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM queue_items WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(item_id = id, "Queue item cancelled");
        Ok(())
    }

    /// Retention housekeeping: delete terminal rows beyond the most recent
    /// [`RETAINED_TERMINAL_ITEMS`] by completion time. Returns the number
    /// of rows removed. Best-effort; callers log failures and move on.
    pub async fn cleanup(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM queue_items \
             WHERE status_id IN ($1, $2) \
               AND id NOT IN ( \
                   SELECT id FROM queue_items \
                   WHERE status_id IN ($1, $2) \
                   ORDER BY completed_at DESC NULLS LAST \
                   LIMIT $3 \
               )",
        )
        .bind(QueueItemStatus::Completed.id())
        .bind(QueueItemStatus::Failed.id())
        .bind(RETAINED_TERMINAL_ITEMS)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
