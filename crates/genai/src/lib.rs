//! Boundary to the external image-generation service.
//!
//! [`GenerationService`] is the seam the pipeline programs against;
//! [`HttpGenerationService`] is the production implementation over the
//! service's REST API. Tests substitute their own scripted impls.

mod http;
mod types;

pub use http::HttpGenerationService;
pub use types::{
    FaceSwapOutcome, GenAiError, GenerateOptions, GenerateOutcome, ImagePayload,
    DEFAULT_ASPECT_RATIO, DEFAULT_IMAGE_SIZE,
};

use serde_json::Value;

/// The remote generation service, reduced to the two calls the pipeline
/// makes. Both are slow and may fail; neither is retried at this layer.
#[async_trait::async_trait]
pub trait GenerationService: Send + Sync {
    /// Generate images for a composed prompt.
    async fn generate(
        &self,
        prompt: &Value,
        opts: &GenerateOptions,
    ) -> Result<GenerateOutcome, GenAiError>;

    /// Transfer facial identity from `reference` onto `base`.
    async fn face_swap(
        &self,
        base: &ImagePayload,
        reference: &ImagePayload,
    ) -> Result<FaceSwapOutcome, GenAiError>;
}
