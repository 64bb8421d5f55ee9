// crates/rollout-core/src/core/clock.rs
// ============================================================================
// Module: Rollout Clock
// Description: Clock abstraction and timestamp helpers.
// Purpose: Keep wall-clock reads at the edges so lifecycle logic stays replayable.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Rollout records carry `OffsetDateTime` values serialized as RFC 3339. The
//! orchestration engine and storage backends never call `now_utc` directly;
//! they ask an injected [`Clock`], which lets tests pin time precisely.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::OffsetDateTime;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock implementation of [`Clock`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock pinned to a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    /// Instant returned by every call.
    instant: OffsetDateTime,
}

impl FixedClock {
    /// Creates a clock that always returns `instant`.
    #[must_use]
    pub const fn new(instant: OffsetDateTime) -> Self {
        Self { instant }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.instant
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns milliseconds since the Unix epoch for audit records.
#[must_use]
pub fn unix_millis(instant: OffsetDateTime) -> i64 {
    i64::try_from(instant.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}
