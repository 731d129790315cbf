//! Repository for the `reference_photos` table.

use atelier_core::types::DbId;
use sqlx::PgPool;

use crate::models::reference::ReferencePhoto;

/// Column list for `reference_photos` queries.
const COLUMNS: &str = "id, image_path, mime_type, created_at";

/// Provides lookups for uploaded reference photos.
pub struct ReferencePhotoRepo;

impl ReferencePhotoRepo {
    /// Register an uploaded reference photo.
    pub async fn create(
        pool: &PgPool,
        image_path: &str,
        mime_type: &str,
    ) -> Result<ReferencePhoto, sqlx::Error> {
        let query = format!(
            "INSERT INTO reference_photos (image_path, mime_type) \
             VALUES ($1, $2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ReferencePhoto>(&query)
            .bind(image_path)
            .bind(mime_type)
            .fetch_one(pool)
            .await
    }

    /// Fetch photos by ID, preserving the order of `ids`.
    ///
    /// Unknown IDs are silently absent from the result; the caller treats
    /// a missing reference as a per-reference load failure.
    pub async fn find_by_ids(
        pool: &PgPool,
        ids: &[DbId],
    ) -> Result<Vec<ReferencePhoto>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT {COLUMNS} FROM reference_photos \
             WHERE id = ANY($1) \
             ORDER BY array_position($1, id)"
        );
        sqlx::query_as::<_, ReferencePhoto>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }
}
