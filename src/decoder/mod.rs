// src/decoder/mod.rs

//! Syndrome decoding.
//!
//! The decoder is a pure table from a routing step's conservation syndrome
//! and combined flag to a decision. Only the hook signature (conservation
//! intact, flag raised) is correctable. Erasure and violation always abort:
//! lost or duplicated excitation cannot be reconstructed from what remains.

use crate::core::{DualRailCell, QramError};
use crate::router::{Branch, BranchFlags, FlagOutcome};
use crate::simulation::Register;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a conservation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Syndrome {
    /// Exactly one excitation where one is expected.
    Valid,
    /// Too few excitations.
    Erasure,
    /// Too many excitations.
    Violation,
}

impl Syndrome {
    pub fn is_valid(self) -> bool {
        self == Syndrome::Valid
    }
}

impl fmt::Display for Syndrome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Syndrome::Valid => write!(f, "valid"),
            Syndrome::Erasure => write!(f, "erasure"),
            Syndrome::Violation => write!(f, "violation"),
        }
    }
}

/// Corrective operator chosen by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Correction {
    /// Logical phase flip: Z on `rail0` of the cell that received the data.
    LogicalPhase,
}

impl Correction {
    /// Applies the correction to `cell`. Every correction is its own inverse.
    pub fn apply(&self, register: &mut Register, cell: &DualRailCell) -> Result<(), QramError> {
        match self {
            Correction::LogicalPhase => register.logical_phase_flip(cell),
        }
    }
}

/// Why a query attempt was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortReason {
    Erasure,
    Violation,
    AddressInvalid,
    TransportFailure,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Erasure => write!(f, "erasure"),
            AbortReason::Violation => write!(f, "violation"),
            AbortReason::AddressInvalid => write!(f, "address-invalid"),
            AbortReason::TransportFailure => write!(f, "transport-failure"),
        }
    }
}

/// What the controller should do after a routing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Continue,
    Correct(Correction),
    Abort(AbortReason),
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Continue => write!(f, "continue"),
            Decision::Correct(Correction::LogicalPhase) => write!(f, "correct(Z_L)"),
            Decision::Abort(reason) => write!(f, "abort({})", reason),
        }
    }
}

/// Maps `(syndrome, flag)` to a decision.
///
/// | syndrome  | flag   | decision                  |
/// |-----------|--------|---------------------------|
/// | Valid     | clear  | `Continue`                |
/// | Valid     | raised | `Correct(LogicalPhase)`   |
/// | Erasure   | any    | `Abort(Erasure)`          |
/// | Violation | any    | `Abort(Violation)`        |
pub fn decode(syndrome: Syndrome, flag: FlagOutcome) -> Decision {
    match (syndrome, flag) {
        (Syndrome::Valid, FlagOutcome::Clear) => Decision::Continue,
        (Syndrome::Valid, FlagOutcome::Raised) => Decision::Correct(Correction::LogicalPhase),
        (Syndrome::Erasure, _) => Decision::Abort(AbortReason::Erasure),
        (Syndrome::Violation, _) => Decision::Abort(AbortReason::Violation),
    }
}

/// [`decode`] for a step whose routed branch is known classically.
///
/// A flag raised only in the idle window cannot have disturbed the data, so
/// it does not ask for a correction. A raised flag in the routed window is
/// still corrected: it cannot be told apart from a fault on the flag carrier
/// alone.
pub fn decode_routed(syndrome: Syndrome, flags: &BranchFlags, routed: Branch) -> Decision {
    match decode(syndrome, flags.combined()) {
        Decision::Correct(_) if !flags.get(routed).is_raised() => Decision::Continue,
        decision => decision,
    }
}

/// Stateless handle over [`decode`], for callers that hold their protocol
/// components as values.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyndromeDecoder;

impl SyndromeDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, syndrome: Syndrome, flag: FlagOutcome) -> Decision {
        decode(syndrome, flag)
    }

    pub fn decode_routed(&self, syndrome: Syndrome, flags: &BranchFlags, routed: Branch) -> Decision {
        decode_routed(syndrome, flags, routed)
    }
}
