//! Best-effort tag derivation from the composed prompt.
//!
//! Short string values in the prompt object (and one level of arrays)
//! become tags on the finished generation. The pipeline swallows any
//! error from here; tagging never fails an item.

use std::collections::BTreeSet;

use atelier_core::types::DbId;
use atelier_db::repositories::tag_repo::{normalize_tag_name, TagRepo};
use serde_json::Value;
use sqlx::PgPool;

/// Free text longer than this is prose, not a tag.
const MAX_TAG_SOURCE_LEN: usize = 48;

/// Derive tags from the prompt and attach them to the generation.
/// Returns the number of tags attached.
pub async fn create_tags_for_generation(
    pool: &PgPool,
    generation_id: DbId,
    prompt_json: &Value,
) -> Result<u32, sqlx::Error> {
    let mut attached = 0;
    for name in candidate_tag_names(prompt_json) {
        let tag = TagRepo::create_or_get(pool, &name).await?;
        TagRepo::attach_to_generation(pool, generation_id, tag.id).await?;
        attached += 1;
    }
    Ok(attached)
}

/// Collect normalized, deduplicated tag candidates from the prompt object.
fn candidate_tag_names(prompt_json: &Value) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let Some(obj) = prompt_json.as_object() else {
        return names;
    };

    for value in obj.values() {
        match value {
            Value::String(s) => push_candidate(&mut names, s),
            Value::Array(items) => {
                for item in items {
                    if let Value::String(s) = item {
                        push_candidate(&mut names, s);
                    }
                }
            }
            _ => {}
        }
    }
    names
}

fn push_candidate(names: &mut BTreeSet<String>, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_TAG_SOURCE_LEN {
        return;
    }
    names.insert(normalize_tag_name(trimmed));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collects_short_strings_and_array_items() {
        let prompt = json!({
            "style": "Film Noir",
            "subjects": ["Detective", "Rainy Street"],
            "seed": 42,
            "description": "a".repeat(200),
        });

        let names = candidate_tag_names(&prompt);
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["detective", "film-noir", "rainy-street"]
        );
    }

    #[test]
    fn non_object_prompt_yields_nothing() {
        assert!(candidate_tag_names(&json!("just a string")).is_empty());
        assert!(candidate_tag_names(&json!(null)).is_empty());
    }

    #[test]
    fn duplicate_values_collapse_after_normalization() {
        let prompt = json!({
            "a": "Golden Hour",
            "b": "golden hour",
        });
        assert_eq!(candidate_tag_names(&prompt).len(), 1);
    }
}
