//! Queue entity models and DTOs.

use atelier_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `queue_items` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueItem {
    pub id: DbId,
    /// Opaque composed prompt payload; never interpreted by the queue.
    pub prompt_json: serde_json::Value,
    pub generation_id: Option<DbId>,
    pub status_id: StatusId,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    /// Ordered reference photo IDs; order decides the compositing source.
    pub reference_photo_ids: Vec<DbId>,
    /// Producer-supplied file paths, stored untouched.
    pub inline_reference_paths: Vec<String>,
    pub google_search: bool,
    pub safety_override: bool,
}

/// DTO for enqueuing a new unit of work.
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueItem {
    pub prompt_json: serde_json::Value,
    pub generation_id: Option<DbId>,
    #[serde(default)]
    pub reference_photo_ids: Vec<DbId>,
    #[serde(default)]
    pub inline_reference_paths: Vec<String>,
    #[serde(default)]
    pub google_search: bool,
    #[serde(default)]
    pub safety_override: bool,
}

impl EnqueueItem {
    /// An enqueue request with every option absent/false.
    pub fn new(prompt_json: serde_json::Value, generation_id: Option<DbId>) -> Self {
        Self {
            prompt_json,
            generation_id,
            reference_photo_ids: Vec::new(),
            inline_reference_paths: Vec::new(),
            google_search: false,
            safety_override: false,
        }
    }
}

/// Snapshot returned by the status/position query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Items currently `processing`.
    pub active: i64,
    /// Items currently `queued`.
    pub queued: i64,
    /// 1-based rank for a queued item, 0 for a processing item,
    /// absent otherwise.
    pub position: Option<i64>,
}
