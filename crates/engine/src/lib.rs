//! Queue execution engine: the per-process worker loop and the
//! generation pipeline it drives, plus the image-store seam and the
//! best-effort tag deriver.

pub mod pipeline;
pub mod storage;
pub mod tagging;
pub mod worker;

pub use pipeline::{GenerationPipeline, PipelineError};
pub use storage::{ImageStore, LocalImageStore, StorageError};
pub use worker::QueueWorker;
