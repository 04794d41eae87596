// src/operations/mod.rs

//! Gate-level operations on the carriers of a register.
//!
//! Routing and transport are expressed as ordered lists of these operations
//! (see [`Circuit`](crate::circuits::Circuit)). Measurements carry a record
//! key so the executing code can read their outcomes back, and checkpoints
//! mark the places where a fault plan may act.

use crate::core::QubitId;
use crate::faults::FaultSite;

/// A single step of a routing or transport circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Bit flip (Pauli X).
    Flip { target: QubitId },

    /// Phase flip (Pauli Z): `-1` on the active component.
    PhaseFlip { target: QubitId },

    /// Hadamard on one carrier. Used by link transport only.
    Hadamard { target: QubitId },

    /// Controlled bit flip.
    Cnot { control: QubitId, target: QubitId },

    /// Controlled phase flip: `-1` when both carriers are active.
    Cz { control: QubitId, target: QubitId },

    /// Double-conditioned bit flip. On its own this copies an excitation; it
    /// only moves one when wrapped by the CNOTs of [`Operation::ControlledSwap`].
    Toffoli { controls: [QubitId; 2], target: QubitId },

    /// Exchanges `a` and `b` when `control` is active (Fredkin).
    ControlledSwap { control: QubitId, a: QubitId, b: QubitId },

    /// Hadamard restricted to the single-excitation subspace of a cell.
    /// `|01> -> (|01> + |10>)/sqrt2`, `|10> -> (|01> - |10>)/sqrt2`, where the
    /// left digit is `rail0`. `|00>` and `|11>` are untouched.
    LogicalHadamard { rail0: QubitId, rail1: QubitId },

    /// Measure and return the carrier to inactive.
    Reset { target: QubitId },

    /// Projective measurement recorded under `key`.
    Measure { target: QubitId, key: String },

    /// Excitation-number measurement over `targets`, recorded under `key`.
    /// Only the total is revealed, not which carriers are active.
    MeasureExcitations { targets: Vec<QubitId>, key: String },

    /// No physical effect. Marks where scheduled faults are injected.
    Checkpoint { site: FaultSite },
}

impl Operation {
    /// Returns every carrier named by the operation.
    pub fn involved_qubits(&self) -> Vec<QubitId> {
        match self {
            Operation::Flip { target }
            | Operation::PhaseFlip { target }
            | Operation::Hadamard { target }
            | Operation::Reset { target }
            | Operation::Measure { target, .. } => vec![*target],
            Operation::Cnot { control, target } | Operation::Cz { control, target } => vec![*control, *target],
            Operation::Toffoli { controls, target } => vec![controls[0], controls[1], *target],
            Operation::ControlledSwap { control, a, b } => vec![*control, *a, *b],
            Operation::LogicalHadamard { rail0, rail1 } => vec![*rail0, *rail1],
            Operation::MeasureExcitations { targets, .. } => targets.clone(),
            Operation::Checkpoint { .. } => Vec::new(),
        }
    }

    /// Expands composite operations into the primitives the register applies.
    ///
    /// A controlled swap is realised as copy-plus-uncompute:
    /// `CNOT(b -> a)`, `Toffoli(control, a -> b)`, `CNOT(b -> a)`.
    pub fn decompose(&self) -> Vec<Operation> {
        match self {
            Operation::ControlledSwap { control, a, b } => vec![
                Operation::Cnot { control: *b, target: *a },
                Operation::Toffoli { controls: [*control, *a], target: *b },
                Operation::Cnot { control: *b, target: *a },
            ],
            other => vec![other.clone()],
        }
    }

    /// True for operations that collapse (part of) the state.
    pub fn is_measurement(&self) -> bool {
        matches!(
            self,
            Operation::Reset { .. } | Operation::Measure { .. } | Operation::MeasureExcitations { .. }
        )
    }
}
