//! Heartbeat lease model.

use atelier_core::types::{DbId, Timestamp};
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `queue_locks` table: a time-bounded claim of exclusive
/// ownership over one queue item, renewed by heartbeat.
#[derive(Debug, Clone, FromRow)]
pub struct QueueLock {
    /// Lease token. A takeover writes a fresh token, so a previous holder
    /// can no longer heartbeat or release the row.
    pub id: Uuid,
    pub queue_item_id: DbId,
    pub locked_at: Timestamp,
    pub heartbeat_at: Timestamp,
}
