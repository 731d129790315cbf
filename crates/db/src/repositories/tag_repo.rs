//! Repository for the `tags` and `generation_tags` tables.

use atelier_core::types::DbId;
use sqlx::PgPool;

use crate::models::tag::Tag;

/// Column list for `tags` queries.
const COLUMNS: &str = "id, name, created_at";

/// Provides tag CRUD and generation-tag associations.
pub struct TagRepo;

impl TagRepo {
    /// Create a tag or return the existing one with the same normalized
    /// name. Uses `ON CONFLICT` for idempotent creation.
    pub async fn create_or_get(pool: &PgPool, name: &str) -> Result<Tag, sqlx::Error> {
        let normalized = normalize_tag_name(name);
        let query = format!(
            "INSERT INTO tags (name) VALUES ($1) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Tag>(&query)
            .bind(&normalized)
            .fetch_one(pool)
            .await
    }

    /// Associate a tag with a generation. Idempotent.
    pub async fn attach_to_generation(
        pool: &PgPool,
        generation_id: DbId,
        tag_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO generation_tags (generation_id, tag_id) \
             VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(generation_id)
        .bind(tag_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// List the tags attached to a generation, alphabetically.
    pub async fn list_for_generation(
        pool: &PgPool,
        generation_id: DbId,
    ) -> Result<Vec<Tag>, sqlx::Error> {
        let query = format!(
            "SELECT t.id, t.name, t.created_at FROM tags t \
             JOIN generation_tags gt ON gt.tag_id = t.id \
             WHERE gt.generation_id = $1 \
             ORDER BY t.name"
        );
        sqlx::query_as::<_, Tag>(&query)
            .bind(generation_id)
            .fetch_all(pool)
            .await
    }
}

/// Lowercase, trim, and collapse inner whitespace to single hyphens.
pub fn normalize_tag_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_lowercases_and_hyphenates() {
        assert_eq!(normalize_tag_name("  Golden Hour "), "golden-hour");
        assert_eq!(normalize_tag_name("studio"), "studio");
        assert_eq!(normalize_tag_name("Film   Noir"), "film-noir");
    }
}
