//! Pure domain logic for the generation queue: shared types, tuning
//! constants, the fallback-cascade plan, and the crash-recovery sweep
//! decision. No I/O lives here.

pub mod fallback;
pub mod queue;
pub mod recovery;
pub mod types;
