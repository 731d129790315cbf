//! Reference photo model.

use atelier_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `reference_photos` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReferencePhoto {
    pub id: DbId,
    pub image_path: String,
    pub mime_type: String,
    pub created_at: Timestamp,
}
