//! Repository for the `generations` table.
//!
//! Terminal updates are guarded on the current status, so a cancelled
//! generation is never overwritten by a late pipeline result: the update
//! affects zero rows and the caller discards the outcome.

use atelier_core::types::DbId;
use sqlx::PgPool;

use crate::models::generation::{CompleteGeneration, Generation};
use crate::models::status::GenerationStatus;

/// Column list for `generations` queries.
const COLUMNS: &str = "\
    id, status_id, prompt_json, image_path, pre_swap_image_path, \
    error_message, api_response_text, used_fallback, face_swap_failed, \
    created_at, completed_at";

/// Provides update operations on generation outcome records.
pub struct GenerationRepo;

impl GenerationRepo {
    /// Create a pending generation record for a prompt.
    pub async fn create(
        pool: &PgPool,
        prompt_json: &serde_json::Value,
    ) -> Result<Generation, sqlx::Error> {
        let query = format!(
            "INSERT INTO generations (status_id, prompt_json) \
             VALUES ($1, $2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Generation>(&query)
            .bind(GenerationStatus::Pending.id())
            .bind(prompt_json)
            .fetch_one(pool)
            .await
    }

    /// Find a generation by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Generation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generations WHERE id = $1");
        sqlx::query_as::<_, Generation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move a pending generation into `generating`.
    pub async fn mark_generating(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations SET status_id = $2 WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(GenerationStatus::Generating.id())
        .bind(GenerationStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a successful outcome: final image path, response text, and
    /// the fallback flags, stamping `completed_at`.
    ///
    /// Returns `false` when the generation already reached a terminal
    /// state (e.g. cancellation failed it first) and nothing was written.
    pub async fn mark_completed(
        pool: &PgPool,
        id: DbId,
        outcome: &CompleteGeneration,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations \
             SET status_id = $2, image_path = $3, pre_swap_image_path = $4, \
                 api_response_text = $5, used_fallback = $6, \
                 face_swap_failed = $7, completed_at = NOW() \
             WHERE id = $1 AND status_id IN ($8, $9)",
        )
        .bind(id)
        .bind(GenerationStatus::Completed.id())
        .bind(&outcome.image_path)
        .bind(&outcome.pre_swap_image_path)
        .bind(&outcome.api_response_text)
        .bind(outcome.used_fallback)
        .bind(outcome.face_swap_failed)
        .bind(GenerationStatus::Pending.id())
        .bind(GenerationStatus::Generating.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a failed outcome with the error message and any raw text the
    /// service returned, stamping `completed_at`.
    pub async fn mark_failed(
        pool: &PgPool,
        id: DbId,
        error_message: &str,
        api_response_text: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations \
             SET status_id = $2, error_message = $3, api_response_text = $4, \
                 completed_at = NOW() \
             WHERE id = $1 AND status_id IN ($5, $6)",
        )
        .bind(id)
        .bind(GenerationStatus::Failed.id())
        .bind(error_message)
        .bind(api_response_text)
        .bind(GenerationStatus::Pending.id())
        .bind(GenerationStatus::Generating.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
