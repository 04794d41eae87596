//! Numerical tolerances and protocol bounds shared across the crate.

/// Amplitudes with modulus at or below this value are treated as zero.
pub const AMPLITUDE_TOLERANCE: f64 = 1e-12;

/// Allowed deviation of the squared norm from 1.0.
pub const NORM_TOLERANCE: f64 = 1e-9;

/// A measurement outcome whose probability is within this distance of 0 or 1
/// is treated as certain and no randomness is drawn.
pub const CERTAINTY_TOLERANCE: f64 = 1e-9;

/// Carriers are addressed by bit position in a `u64` basis label.
pub const MAX_CARRIERS: usize = 64;

/// Deepest tree the controller accepts.
pub const MAX_TREE_HEIGHT: u32 = 16;

/// Distillation tries per rail below which a single failed check would be fatal.
pub const MIN_DISTILLATION_ATTEMPTS: u32 = 2;
