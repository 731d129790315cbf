//! Crash-recovery sweep decision.
//!
//! The sweep itself runs inside one database transaction; the decision of
//! *what* to reset is a pure function over the processing rows, their
//! leases, and an injected clock, so it can be tested without touching a
//! database or waiting out real timeouts.

use chrono::Duration;

use crate::queue::LEASE_TIMEOUT_SECS;
use crate::types::{DbId, Timestamp};

/// A queue item currently in `processing`, as seen by the sweep.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingItem {
    pub item_id: DbId,
    /// Linked generation record, if the producer created one.
    pub generation_id: Option<DbId>,
}

/// The lease on a queue item, as seen by the sweep.
#[derive(Debug, Clone, Copy)]
pub struct LeaseState {
    pub queue_item_id: DbId,
    pub heartbeat_at: Timestamp,
}

/// What the recovery sweep should do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryPlan {
    /// Items to move back to `queued` with `started_at` cleared. Their
    /// generations, if still `generating`, go back to `pending`.
    pub reset_item_ids: Vec<DbId>,
    /// Generations to reset alongside their items.
    pub reset_generation_ids: Vec<DbId>,
    /// Lease rows to delete (stale, or orphaned by a dead item).
    pub delete_lease_item_ids: Vec<DbId>,
}

/// Whether a lease heartbeat is past the staleness cutoff at `now`.
pub fn is_stale(heartbeat_at: Timestamp, now: Timestamp) -> bool {
    heartbeat_at < now - Duration::seconds(LEASE_TIMEOUT_SECS)
}

/// Decide which processing items a crashed worker left behind.
///
/// An item is reset when its lease heartbeat is stale, or when it has no
/// lease row at all (the crash happened before the first heartbeat was
/// ever written). Items with a fresh lease are left alone: their worker
/// is still alive.
pub fn plan_recovery(
    processing: &[ProcessingItem],
    leases: &[LeaseState],
    now: Timestamp,
) -> RecoveryPlan {
    let mut plan = RecoveryPlan::default();

    for item in processing {
        let lease = leases.iter().find(|l| l.queue_item_id == item.item_id);
        let abandoned = match lease {
            Some(lease) => is_stale(lease.heartbeat_at, now),
            None => true,
        };
        if !abandoned {
            continue;
        }

        plan.reset_item_ids.push(item.item_id);
        if let Some(generation_id) = item.generation_id {
            plan.reset_generation_ids.push(generation_id);
        }
        if lease.is_some() {
            plan.delete_lease_item_ids.push(item.item_id);
        }
    }

    plan
}
