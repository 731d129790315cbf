//! Fallback-cascade plan and outcome bookkeeping.
//!
//! The pipeline evaluates an ordered list of attempt strategies instead of
//! nesting conditionals, so the `used_fallback` / `face_swap_failed` flags
//! stay auditable and testable without any I/O.

/// One strategy in the attempt sequence for a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStrategy {
    /// Primary attempt: the prompt plus every successfully loaded
    /// reference image.
    WithReferences,
    /// Degraded retry after a failed primary: the same prompt with no
    /// reference images. If it yields a base image, identity is restored
    /// by compositing the first loaded reference onto it.
    WithoutReferencesThenSwap,
}

/// Outcome of the compositing step, when one was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// No compositing was attempted (primary attempt succeeded, or no
    /// reference was available).
    NotAttempted,
    /// The composited image is the final result.
    Succeeded,
    /// Compositing failed; the uncomposited base image is the final result.
    Failed,
}

/// Flags recorded on the generation record once the cascade settles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FallbackFlags {
    /// The final image came from the reference-less retry rather than the
    /// primary attempt.
    pub used_fallback: bool,
    /// Compositing was attempted and failed, so the final image does not
    /// carry the reference identity.
    pub face_swap_failed: bool,
}

/// The ordered attempt sequence for an item.
///
/// Without references there is nothing to fall back to: the primary
/// attempt is the only one. With at least one loaded reference, a failed
/// primary is retried reference-free, followed by the compositing step.
pub fn plan(has_references: bool) -> &'static [AttemptStrategy] {
    if has_references {
        &[
            AttemptStrategy::WithReferences,
            AttemptStrategy::WithoutReferencesThenSwap,
        ]
    } else {
        &[AttemptStrategy::WithReferences]
    }
}

/// Compute the generation flags for a result produced by `strategy`.
///
/// Both flags are set together on the compositing-failed path: a result
/// with `used_fallback` and no `face_swap_failed` is guaranteed to carry
/// the composited identity.
pub fn flags_for(strategy: AttemptStrategy, swap: SwapOutcome) -> FallbackFlags {
    match strategy {
        AttemptStrategy::WithReferences => FallbackFlags::default(),
        AttemptStrategy::WithoutReferencesThenSwap => FallbackFlags {
            used_fallback: true,
            face_swap_failed: swap == SwapOutcome::Failed,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_references_yields_single_attempt() {
        assert_eq!(plan(false), &[AttemptStrategy::WithReferences]);
    }

    #[test]
    fn references_yield_primary_then_swap_retry() {
        assert_eq!(
            plan(true),
            &[
                AttemptStrategy::WithReferences,
                AttemptStrategy::WithoutReferencesThenSwap,
            ]
        );
    }

    #[test]
    fn primary_success_sets_no_flags() {
        let flags = flags_for(AttemptStrategy::WithReferences, SwapOutcome::NotAttempted);
        assert_eq!(flags, FallbackFlags::default());
    }

    #[test]
    fn fallback_with_successful_swap_sets_used_fallback_only() {
        let flags = flags_for(
            AttemptStrategy::WithoutReferencesThenSwap,
            SwapOutcome::Succeeded,
        );
        assert!(flags.used_fallback);
        assert!(!flags.face_swap_failed);
    }

    #[test]
    fn fallback_with_failed_swap_sets_both_flags() {
        let flags = flags_for(
            AttemptStrategy::WithoutReferencesThenSwap,
            SwapOutcome::Failed,
        );
        assert!(flags.used_fallback);
        assert!(flags.face_swap_failed);
    }
}
