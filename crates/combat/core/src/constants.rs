//! Engine-wide timing and selection constants.

/// Interval of the scheduler tick loop, in seconds.
pub const PROCESSOR_TICK: f64 = 0.25;

/// Safety margin added to effective casting time, absorbs input latency.
pub const ABILITY_CASTING_SAFETY: f64 = 0.14;

/// Safety margin added to effective recovery time.
pub const ABILITY_RECOVERY_SAFETY: f64 = 0.22;

/// Safety margin added to effective reuse time.
pub const ABILITY_REUSE_SAFETY: f64 = 0.2;

/// Width of the priority band considered alongside the max-priority ability.
pub const PRIORITY_SELECTION_MARGIN: i64 = 50;

/// Margin for priority adjustments applied to ability variants.
pub const PRIORITY_ADJUSTMENT_MARGIN: i64 = 10;

/// Floor for the reuse component of the general-preference score; keeps
/// very-long-recharge abilities from dominating the ranking.
pub const READYUP_MIN_PERIOD: f64 = 80.0;

/// Consecutive tick failures tolerated before the scheduler stops.
pub const MAX_ERROR_COUNT: u32 = 5;

/// Fraction of the casting window within which an interrupt still rolls
/// back the recorded cast.
pub const INTERRUPT_CASTING_THRESHOLD: f64 = 0.8;

/// Duration attributed to permanent buffs in preference scoring.
pub const PERMANENT_DURATION_SCORE: f64 = 50.0;
