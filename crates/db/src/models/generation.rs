//! Generation record models and the pipeline's update DTOs.

use atelier_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `generations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Generation {
    pub id: DbId,
    pub status_id: StatusId,
    pub prompt_json: serde_json::Value,
    pub image_path: Option<String>,
    /// The uncomposited base image, kept when compositing succeeded.
    pub pre_swap_image_path: Option<String>,
    pub error_message: Option<String>,
    pub api_response_text: Option<String>,
    pub used_fallback: bool,
    pub face_swap_failed: bool,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Fields the pipeline writes when a generation completes successfully.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteGeneration {
    pub image_path: String,
    pub pre_swap_image_path: Option<String>,
    pub api_response_text: Option<String>,
    pub used_fallback: bool,
    pub face_swap_failed: bool,
}
