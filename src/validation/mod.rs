// src/validation/mod.rs

//! Conservation and normalisation checks on registers and cells.

use crate::core::constants::NORM_TOLERANCE;
use crate::core::{AmplitudeState, DualRailCell, QramError, QubitId};
use crate::simulation::Register;

/// Checks if the state is normalized (sum of squared amplitudes ≈ 1.0).
///
/// # Arguments
/// * `state` - The `AmplitudeState` to check.
/// * `tolerance` - Allowed deviation from 1.0. Defaults to `NORM_TOLERANCE`.
///
/// # Returns
/// * `Ok(())` if normalized within tolerance.
/// * `Err(QramError::Incoherence)` otherwise.
pub fn check_normalization(state: &AmplitudeState, tolerance: Option<f64>) -> Result<(), QramError> {
    let effective_tolerance = tolerance.unwrap_or(NORM_TOLERANCE);
    let norm_sq = state.norm_sqr();
    if (norm_sq - 1.0).abs() > effective_tolerance {
        Err(QramError::Incoherence {
            message: format!(
                "State normalization failed. Sum(|c_i|^2) = {} (Deviation > {})",
                norm_sq, effective_tolerance
            ),
        })
    } else {
        Ok(())
    }
}

/// Checks that `cell` holds exactly one excitation in every branch.
pub fn check_conservation(register: &Register, cell: &DualRailCell) -> Result<(), QramError> {
    match register.definite_excitations(&cell.qubits()) {
        Some(1) => Ok(()),
        Some(n) => Err(QramError::Incoherence {
            message: format!("{} holds {} excitations", cell, n),
        }),
        None => Err(QramError::Incoherence {
            message: format!("{} has an indefinite excitation number", cell),
        }),
    }
}

/// True if every carrier in `qubits` is inactive in every branch.
pub fn is_cleared(register: &Register, qubits: &[QubitId]) -> bool {
    register.definite_excitations(qubits) == Some(0)
}

/// Normalization plus conservation of every listed cell.
pub fn validate_register(register: &Register, cells: &[&DualRailCell]) -> Result<(), QramError> {
    check_normalization(register.state(), None)?;
    for cell in cells {
        check_conservation(register, cell)?;
    }
    Ok(())
}
