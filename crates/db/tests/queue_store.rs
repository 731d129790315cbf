//! Integration tests for the queue store: enqueue, accounting, status
//! transitions, cancellation, and retention cleanup.

use assert_matches::assert_matches;
use atelier_db::models::queue::EnqueueItem;
use atelier_db::models::status::{GenerationStatus, QueueItemStatus};
use atelier_db::repositories::{CancelError, GenerationRepo, QueueLockRepo, QueueRepo};
use serde_json::json;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_item(label: &str) -> EnqueueItem {
    EnqueueItem::new(json!({ "style": label }), None)
}

async fn enqueue_processing(pool: &PgPool, label: &str) -> i64 {
    let item = QueueRepo::enqueue(pool, &new_item(label)).await.unwrap();
    assert!(QueueRepo::mark_processing(pool, item.id).await.unwrap());
    item.id
}

// ---------------------------------------------------------------------------
// Enqueue
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn enqueue_defaults(pool: PgPool) {
    let item = QueueRepo::enqueue(&pool, &new_item("noir")).await.unwrap();

    assert_eq!(item.status_id, QueueItemStatus::Queued.id());
    assert_eq!(item.prompt_json, json!({ "style": "noir" }));
    assert!(item.generation_id.is_none());
    assert!(item.started_at.is_none());
    assert!(item.completed_at.is_none());
    assert!(item.reference_photo_ids.is_empty());
    assert!(item.inline_reference_paths.is_empty());
    assert!(!item.google_search);
    assert!(!item.safety_override);
}

#[sqlx::test(migrations = "./migrations")]
async fn enqueue_stores_options(pool: PgPool) {
    let input = EnqueueItem {
        prompt_json: json!({}),
        generation_id: None,
        reference_photo_ids: vec![7, 3],
        inline_reference_paths: vec!["uploads/a.png".into()],
        google_search: true,
        safety_override: true,
    };
    // Reference IDs are opaque at enqueue time; nothing validates them.
    let item = QueueRepo::enqueue(&pool, &input).await.unwrap();

    assert_eq!(item.reference_photo_ids, vec![7, 3]);
    assert_eq!(item.inline_reference_paths, vec!["uploads/a.png"]);
    assert!(item.google_search);
    assert!(item.safety_override);
}

// ---------------------------------------------------------------------------
// Status and position
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn position_ranks_by_enqueue_time(pool: PgPool) {
    let first = QueueRepo::enqueue(&pool, &new_item("a")).await.unwrap();
    let second = QueueRepo::enqueue(&pool, &new_item("b")).await.unwrap();
    let third = QueueRepo::enqueue(&pool, &new_item("c")).await.unwrap();

    let status = QueueRepo::status(&pool, Some(first.id)).await.unwrap();
    assert_eq!(status.active, 0);
    assert_eq!(status.queued, 3);
    assert_eq!(status.position, Some(1));

    let status = QueueRepo::status(&pool, Some(second.id)).await.unwrap();
    assert_eq!(status.position, Some(2));
    let status = QueueRepo::status(&pool, Some(third.id)).await.unwrap();
    assert_eq!(status.position, Some(3));
}

#[sqlx::test(migrations = "./migrations")]
async fn enqueuing_does_not_shift_earlier_positions(pool: PgPool) {
    let first = QueueRepo::enqueue(&pool, &new_item("a")).await.unwrap();
    let before = QueueRepo::status(&pool, Some(first.id)).await.unwrap();

    QueueRepo::enqueue(&pool, &new_item("b")).await.unwrap();
    let after = QueueRepo::status(&pool, Some(first.id)).await.unwrap();

    assert_eq!(before.position, after.position);
}

#[sqlx::test(migrations = "./migrations")]
async fn position_zero_when_processing_absent_when_terminal(pool: PgPool) {
    let item = QueueRepo::enqueue(&pool, &new_item("a")).await.unwrap();
    assert!(QueueRepo::mark_processing(&pool, item.id).await.unwrap());

    let status = QueueRepo::status(&pool, Some(item.id)).await.unwrap();
    assert_eq!(status.active, 1);
    assert_eq!(status.position, Some(0));

    assert!(QueueRepo::mark_completed(&pool, item.id).await.unwrap());
    let status = QueueRepo::status(&pool, Some(item.id)).await.unwrap();
    assert_eq!(status.position, None);

    let status = QueueRepo::status(&pool, Some(999_999)).await.unwrap();
    assert_eq!(status.position, None);
}

// ---------------------------------------------------------------------------
// Claim eligibility and the concurrency cap
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn next_eligible_returns_oldest_queued(pool: PgPool) {
    let first = QueueRepo::enqueue(&pool, &new_item("a")).await.unwrap();
    QueueRepo::enqueue(&pool, &new_item("b")).await.unwrap();

    let next = QueueRepo::next_eligible(&pool).await.unwrap().unwrap();
    assert_eq!(next.id, first.id);
}

#[sqlx::test(migrations = "./migrations")]
async fn next_eligible_blocked_at_concurrency_cap(pool: PgPool) {
    for i in 0..5 {
        enqueue_processing(&pool, &format!("active-{i}")).await;
    }
    let waiting = QueueRepo::enqueue(&pool, &new_item("waiting")).await.unwrap();

    assert!(QueueRepo::next_eligible(&pool).await.unwrap().is_none());

    // Finishing one active item frees a slot.
    let status = QueueRepo::status(&pool, None).await.unwrap();
    let any_active: i64 = sqlx::query_scalar(
        "SELECT id FROM queue_items WHERE status_id = $1 LIMIT 1",
    )
    .bind(QueueItemStatus::Processing.id())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status.active, 5);
    assert!(QueueRepo::mark_completed(&pool, any_active).await.unwrap());

    let next = QueueRepo::next_eligible(&pool).await.unwrap().unwrap();
    assert_eq!(next.id, waiting.id);
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn transitions_stamp_timestamps_once(pool: PgPool) {
    let item = QueueRepo::enqueue(&pool, &new_item("a")).await.unwrap();

    assert!(QueueRepo::mark_processing(&pool, item.id).await.unwrap());
    let processing = QueueRepo::find_by_id(&pool, item.id).await.unwrap().unwrap();
    assert_eq!(processing.status_id, QueueItemStatus::Processing.id());
    assert!(processing.started_at.is_some());
    assert!(processing.completed_at.is_none());

    assert!(QueueRepo::mark_completed(&pool, item.id).await.unwrap());
    let completed = QueueRepo::find_by_id(&pool, item.id).await.unwrap().unwrap();
    assert_eq!(completed.status_id, QueueItemStatus::Completed.id());
    assert_eq!(completed.started_at, processing.started_at);
    assert!(completed.completed_at.is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn transitions_are_forward_only(pool: PgPool) {
    let item = QueueRepo::enqueue(&pool, &new_item("a")).await.unwrap();

    // Not processing yet: terminal transitions are refused.
    assert!(!QueueRepo::mark_completed(&pool, item.id).await.unwrap());
    assert!(!QueueRepo::mark_failed(&pool, item.id).await.unwrap());

    assert!(QueueRepo::mark_processing(&pool, item.id).await.unwrap());
    assert!(QueueRepo::mark_failed(&pool, item.id).await.unwrap());

    // Terminal is terminal.
    assert!(!QueueRepo::mark_processing(&pool, item.id).await.unwrap());
    assert!(!QueueRepo::mark_completed(&pool, item.id).await.unwrap());
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn cancel_removes_row_and_fails_generation(pool: PgPool) {
    let generation = GenerationRepo::create(&pool, &json!({})).await.unwrap();
    let item = QueueRepo::enqueue(
        &pool,
        &EnqueueItem::new(json!({}), Some(generation.id)),
    )
    .await
    .unwrap();

    QueueRepo::cancel(&pool, item.id).await.unwrap();

    assert!(QueueRepo::find_by_id(&pool, item.id).await.unwrap().is_none());
    let generation = GenerationRepo::find_by_id(&pool, generation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(generation.status_id, GenerationStatus::Failed.id());
    assert_eq!(generation.error_message.as_deref(), Some("Cancelled by user"));
    assert!(generation.completed_at.is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn cancel_processing_item_releases_lease(pool: PgPool) {
    let item = QueueRepo::enqueue(&pool, &new_item("a")).await.unwrap();
    QueueLockRepo::acquire(&pool, item.id).await.unwrap().unwrap();
    assert!(QueueRepo::mark_processing(&pool, item.id).await.unwrap());

    QueueRepo::cancel(&pool, item.id).await.unwrap();

    assert!(!QueueLockRepo::is_item_locked(&pool, item.id).await.unwrap());
    assert!(QueueRepo::find_by_id(&pool, item.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn cancel_rejects_terminal_and_unknown_items(pool: PgPool) {
    let item = QueueRepo::enqueue(&pool, &new_item("a")).await.unwrap();
    assert!(QueueRepo::mark_processing(&pool, item.id).await.unwrap());
    assert!(QueueRepo::mark_completed(&pool, item.id).await.unwrap());

    let err = QueueRepo::cancel(&pool, item.id).await.unwrap_err();
    assert_matches!(
        err,
        CancelError::InvalidState {
            status: "completed",
            ..
        }
    );
    // Nothing was mutated.
    assert!(QueueRepo::find_by_id(&pool, item.id).await.unwrap().is_some());

    let err = QueueRepo::cancel(&pool, 424_242).await.unwrap_err();
    assert_matches!(err, CancelError::NotFound(424_242));
}

// ---------------------------------------------------------------------------
// Retention cleanup
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn cleanup_keeps_most_recent_terminal_rows(pool: PgPool) {
    for i in 0..103 {
        let id = enqueue_processing(&pool, &format!("old-{i}")).await;
        assert!(QueueRepo::mark_completed(&pool, id).await.unwrap());
    }
    // One live item that must survive regardless of age.
    let live = QueueRepo::enqueue(&pool, &new_item("live")).await.unwrap();

    let removed = QueueRepo::cleanup(&pool).await.unwrap();
    assert_eq!(removed, 3);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_items")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 101);
    assert!(QueueRepo::find_by_id(&pool, live.id).await.unwrap().is_some());
}
