//! The generation pipeline: claims queue items one at a time and drives
//! each to a terminal state.
//!
//! Claiming is sequential within a process; the global concurrency cap
//! and the heartbeat lease taken right after the claim are what keep
//! multiple worker processes from fighting over one item. Per-item
//! failures are converted to `failed` outcomes here so the drain loop
//! itself never dies.

use std::sync::Arc;
use std::time::Duration;

use atelier_core::fallback::{self, AttemptStrategy, FallbackFlags, SwapOutcome};
use atelier_core::queue::HEARTBEAT_INTERVAL_SECS;
use atelier_db::models::generation::CompleteGeneration;
use atelier_db::models::queue::QueueItem;
use atelier_db::repositories::{GenerationRepo, QueueLockRepo, QueueRepo, ReferencePhotoRepo};
use atelier_genai::{GenAiError, GenerateOptions, GenerationService, ImagePayload};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::storage::{mime_type_for_path, ImageStore, StorageError};
use crate::tagging;

/// Errors while processing a single queue item. Each one is terminal for
/// that item only.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error("generation failed: {0}")]
    Service(#[from] GenAiError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PipelineError {
    /// Raw service response text worth persisting with the failure.
    fn response_text(&self) -> Option<&str> {
        match self {
            Self::Service(e) => e.response_text(),
            _ => None,
        }
    }
}

/// How one claimed item ended.
enum ItemOutcome {
    Completed,
    /// The item vanished (cancelled) between claim and start; nothing
    /// was done.
    Skipped,
}

/// Executes claimed queue items against the generation service.
pub struct GenerationPipeline {
    pool: PgPool,
    service: Arc<dyn GenerationService>,
    images: Arc<dyn ImageStore>,
}

impl GenerationPipeline {
    pub fn new(
        pool: PgPool,
        service: Arc<dyn GenerationService>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            pool,
            service,
            images,
        }
    }

    /// Drain the queue: claim and process items until none are eligible
    /// (queue empty or concurrency cap reached). Returns the number of
    /// items this call drove to a terminal state.
    pub async fn process_queue(&self) -> Result<u32, sqlx::Error> {
        let mut processed = 0;

        loop {
            let Some(item) = QueueRepo::next_eligible(&self.pool).await? else {
                break;
            };

            let Some(lease) = QueueLockRepo::acquire(&self.pool, item.id).await? else {
                // Another worker holds the lease; its heartbeat keeps it
                // alive, so leave the item to that worker.
                tracing::debug!(item_id = item.id, "Lease contended; ending drain");
                break;
            };

            let heartbeat = LeaseHeartbeat::spawn(self.pool.clone(), lease.id);
            self.process_item(&item).await;
            heartbeat.stop().await;

            if let Err(e) = QueueLockRepo::release(&self.pool, lease.id).await {
                tracing::warn!(item_id = item.id, error = %e, "Failed to release lease");
            }

            processed += 1;
        }

        Ok(processed)
    }

    /// Process one claimed item, converting any error into a terminal
    /// `failed` outcome.
    async fn process_item(&self, item: &QueueItem) {
        match self.run_item(item).await {
            Ok(ItemOutcome::Completed) => {
                tracing::info!(item_id = item.id, "Queue item completed");
            }
            Ok(ItemOutcome::Skipped) => {
                tracing::info!(item_id = item.id, "Queue item vanished before start; skipped");
            }
            Err(e) => {
                tracing::error!(item_id = item.id, error = %e, "Queue item failed");
                self.record_failure(item, &e).await;
            }
        }
    }

    async fn run_item(&self, item: &QueueItem) -> Result<ItemOutcome, PipelineError> {
        if !QueueRepo::mark_processing(&self.pool, item.id).await? {
            return Ok(ItemOutcome::Skipped);
        }
        if let Some(generation_id) = item.generation_id {
            GenerationRepo::mark_generating(&self.pool, generation_id).await?;
        }

        let references = self.load_references(item).await?;
        let mut last_error: Option<GenAiError> = None;

        for strategy in fallback::plan(!references.is_empty()) {
            match strategy {
                AttemptStrategy::WithReferences => {
                    let opts = GenerateOptions {
                        reference_images: references.clone(),
                        google_search: item.google_search,
                        safety_override: item.safety_override,
                        ..Default::default()
                    };
                    match self.service.generate(&item.prompt_json, &opts).await {
                        Ok(outcome) => {
                            let Some(image) = outcome.images.into_iter().next() else {
                                last_error = Some(GenAiError::NoImage {
                                    response_text: outcome.text_response,
                                });
                                continue;
                            };
                            return self
                                .finish_success(
                                    item,
                                    image,
                                    None,
                                    outcome.text_response,
                                    fallback::flags_for(*strategy, SwapOutcome::NotAttempted),
                                )
                                .await;
                        }
                        Err(e) => {
                            tracing::warn!(
                                item_id = item.id,
                                error = %e,
                                "Primary generation attempt failed",
                            );
                            last_error = Some(e);
                        }
                    }
                }
                AttemptStrategy::WithoutReferencesThenSwap => {
                    let opts = GenerateOptions {
                        google_search: item.google_search,
                        safety_override: item.safety_override,
                        ..Default::default()
                    };
                    let base = match self.service.generate(&item.prompt_json, &opts).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::warn!(
                                item_id = item.id,
                                error = %e,
                                "Reference-less retry failed; no fallback image",
                            );
                            last_error = Some(e);
                            continue;
                        }
                    };
                    let text_response = base.text_response.clone();
                    let Some(base_image) = base.images.into_iter().next() else {
                        last_error = Some(GenAiError::NoImage {
                            response_text: text_response,
                        });
                        continue;
                    };

                    match self.service.face_swap(&base_image, &references[0]).await {
                        Ok(swap) => {
                            return self
                                .finish_success(
                                    item,
                                    swap.image,
                                    Some(base_image),
                                    text_response,
                                    fallback::flags_for(*strategy, SwapOutcome::Succeeded),
                                )
                                .await;
                        }
                        Err(e) => {
                            // A usable base image exists; degrade rather
                            // than fail the item.
                            tracing::warn!(
                                item_id = item.id,
                                error = %e,
                                "Face compositing failed; keeping base image",
                            );
                            return self
                                .finish_success(
                                    item,
                                    base_image,
                                    None,
                                    text_response,
                                    fallback::flags_for(*strategy, SwapOutcome::Failed),
                                )
                                .await;
                        }
                    }
                }
            }
        }

        Err(last_error
            .map(PipelineError::from)
            .unwrap_or_else(|| {
                PipelineError::Service(GenAiError::NoImage {
                    response_text: None,
                })
            }))
    }

    /// Load reference images: registered photos first (in request order),
    /// then any inline paths. Each individual failure is logged and the
    /// reference skipped.
    async fn load_references(&self, item: &QueueItem) -> Result<Vec<ImagePayload>, PipelineError> {
        let mut loaded = Vec::new();

        if !item.reference_photo_ids.is_empty() {
            let photos =
                ReferencePhotoRepo::find_by_ids(&self.pool, &item.reference_photo_ids).await?;
            for photo in photos {
                match tokio::fs::read(&photo.image_path).await {
                    Ok(bytes) => loaded.push(ImagePayload::new(bytes, photo.mime_type)),
                    Err(e) => tracing::warn!(
                        item_id = item.id,
                        photo_id = photo.id,
                        path = %photo.image_path,
                        error = %e,
                        "Skipping unreadable reference photo",
                    ),
                }
            }
        }

        for path in &item.inline_reference_paths {
            match tokio::fs::read(path).await {
                Ok(bytes) => loaded.push(ImagePayload::new(bytes, mime_type_for_path(path))),
                Err(e) => tracing::warn!(
                    item_id = item.id,
                    path = %path,
                    error = %e,
                    "Skipping unreadable inline reference",
                ),
            }
        }

        Ok(loaded)
    }

    /// Persist the final image (and the pre-swap base when compositing
    /// succeeded), complete the generation record, derive tags, and close
    /// out the queue item.
    async fn finish_success(
        &self,
        item: &QueueItem,
        image: ImagePayload,
        pre_swap: Option<ImagePayload>,
        text_response: Option<String>,
        flags: FallbackFlags,
    ) -> Result<ItemOutcome, PipelineError> {
        let image_path = self.images.save(&image.bytes, &image.mime_type).await?;
        let pre_swap_image_path = match &pre_swap {
            Some(base) => Some(self.images.save(&base.bytes, &base.mime_type).await?),
            None => None,
        };

        if let Some(generation_id) = item.generation_id {
            let outcome = CompleteGeneration {
                image_path,
                pre_swap_image_path,
                api_response_text: text_response,
                used_fallback: flags.used_fallback,
                face_swap_failed: flags.face_swap_failed,
            };
            let written =
                GenerationRepo::mark_completed(&self.pool, generation_id, &outcome).await?;
            if written {
                if let Err(e) =
                    tagging::create_tags_for_generation(&self.pool, generation_id, &item.prompt_json)
                        .await
                {
                    tracing::warn!(
                        generation_id,
                        error = %e,
                        "Tag derivation failed; continuing",
                    );
                }
            } else {
                // Cancelled while the call was in flight; the result is
                // simply discarded.
                tracing::info!(generation_id, "Generation already terminal; outcome discarded");
            }
        }

        QueueRepo::mark_completed(&self.pool, item.id).await?;
        Ok(ItemOutcome::Completed)
    }

    /// Best-effort terminal bookkeeping for a failed item; bookkeeping
    /// errors are logged, never propagated.
    async fn record_failure(&self, item: &QueueItem, error: &PipelineError) {
        if let Some(generation_id) = item.generation_id {
            if let Err(e) = GenerationRepo::mark_failed(
                &self.pool,
                generation_id,
                &error.to_string(),
                error.response_text(),
            )
            .await
            {
                tracing::error!(
                    generation_id,
                    error = %e,
                    "Failed to record generation failure",
                );
            }
        }
        if let Err(e) = QueueRepo::mark_failed(&self.pool, item.id).await {
            tracing::error!(item_id = item.id, error = %e, "Failed to mark queue item failed");
        }
    }
}

/// Background renewal of a held lease, stopped when the item settles.
struct LeaseHeartbeat {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl LeaseHeartbeat {
    fn spawn(pool: PgPool, lock_id: Uuid) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
            // The first tick completes immediately; the lease was just
            // stamped by acquire, so skip it.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        match QueueLockRepo::heartbeat(&pool, lock_id).await {
                            Ok(true) => {}
                            Ok(false) => {
                                tracing::warn!(
                                    %lock_id,
                                    "Lease gone during heartbeat; stopping renewal",
                                );
                                break;
                            }
                            Err(e) => {
                                tracing::warn!(%lock_id, error = %e, "Lease heartbeat failed");
                            }
                        }
                    }
                }
            }
        });
        Self { cancel, handle }
    }

    async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}
