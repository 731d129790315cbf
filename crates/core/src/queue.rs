//! Queue and lease tuning constants.
//!
//! Shared by the repositories and the worker loop so that the claim cap,
//! lease timing, and retention all agree on one set of numbers.

/// Maximum number of queue items allowed in `processing` at once,
/// counted globally across all worker processes.
pub const MAX_CONCURRENT: i64 = 5;

/// A lease whose heartbeat is older than this is considered stale and
/// eligible for takeover or the startup recovery sweep.
pub const LEASE_TIMEOUT_SECS: i64 = 300;

/// How often a worker renews the heartbeat on a lease it holds.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Safety-net drain interval for the worker loop. Event-driven wakes
/// from the enqueue path normally fire much sooner.
pub const DRAIN_INTERVAL_SECS: u64 = 10;

/// How many terminal (completed/failed) queue rows the retention
/// cleanup keeps, most recent first by completion time.
pub const RETAINED_TERMINAL_ITEMS: i64 = 100;
