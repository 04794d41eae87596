// src/simulation/mod.rs

//! Executes `drqram::circuits::Circuit` against a [`Register`].
//! This module contains the `Simulator` entry point and the `Register`
//! engine that owns and evolves the amplitude state.

mod results;
pub mod engine;

// Re-export the main public interface types
pub use engine::Register;
pub use results::MeasurementRecord;

use crate::circuits::Circuit;
use crate::core::QramError;
use crate::faults::FaultSite;
use crate::operations::Operation;

/// Runs circuits operation by operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct Simulator;

impl Simulator {
    pub fn new() -> Self {
        Self
    }

    /// Executes every operation of `circuit` in order on `register`.
    ///
    /// Measurements are recorded under their key. At every
    /// `Operation::Checkpoint` the `on_checkpoint` hook is called with the
    /// register, which is where fault plans act.
    ///
    /// # Returns
    /// * `Ok(MeasurementRecord)` with one entry per measurement key.
    /// * `Err(QramError)` if an operation names an unallocated carrier, is
    ///   malformed, or the hook fails.
    pub fn execute<F>(
        &self,
        circuit: &Circuit,
        register: &mut Register,
        mut on_checkpoint: F,
    ) -> Result<MeasurementRecord, QramError>
    where
        F: FnMut(FaultSite, &mut Register) -> Result<(), QramError>,
    {
        let mut record = MeasurementRecord::new();
        for op in circuit.operations() {
            match op {
                Operation::Checkpoint { site } => on_checkpoint(*site, register)?,
                Operation::Reset { target } => register.reset(*target)?,
                Operation::Measure { target, key } => {
                    let outcome = register.measure(*target)?;
                    record.record(key, u32::from(outcome));
                }
                Operation::MeasureExcitations { targets, key } => {
                    let count = register.measure_excitations(targets)?;
                    record.record(key, count);
                }
                _ => register.apply_operation(op)?,
            }
        }
        Ok(record)
    }

    /// Executes `circuit` with no checkpoint hook.
    pub fn run(&self, circuit: &Circuit, register: &mut Register) -> Result<MeasurementRecord, QramError> {
        self.execute(circuit, register, |_, _| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuits::CircuitBuilder;
    use crate::core::{LogicalBit, Rail};

    #[test]
    fn test_measurements_recorded_by_key() -> Result<(), QramError> {
        let mut reg = Register::new(3);
        let cell = reg.prepare_cell(LogicalBit::One)?;
        let circuit = CircuitBuilder::new()
            .add_op(Operation::MeasureExcitations { targets: cell.qubits().to_vec(), key: "cell".to_string() })
            .add_op(Operation::Measure { target: cell.rail0(), key: "r0".to_string() })
            .add_op(Operation::Measure { target: cell.rail1(), key: "r1".to_string() })
            .build();

        let record = Simulator::new().run(&circuit, &mut reg)?;
        assert_eq!(record.get("cell"), Some(1));
        assert_eq!(record.get("r0"), Some(1));
        assert_eq!(record.get("r1"), Some(0));
        assert_eq!(record.get("missing"), None);
        Ok(())
    }

    #[test]
    fn test_checkpoint_hook_sees_register() -> Result<(), QramError> {
        let mut reg = Register::new(0);
        let cell = reg.prepare_cell(LogicalBit::Zero)?;
        let rail1 = cell.rail(Rail::Rail1);
        let circuit = CircuitBuilder::new()
            .add_op(Operation::Checkpoint { site: FaultSite::AfterRouting })
            .add_op(Operation::Measure { target: rail1, key: "r1".to_string() })
            .build();

        let mut visited = Vec::new();
        let record = Simulator::new().execute(&circuit, &mut reg, |site, r| {
            visited.push(site);
            r.flip(rail1)
        })?;
        assert_eq!(visited, vec![FaultSite::AfterRouting]);
        assert_eq!(record.get("r1"), Some(0), "hook flip must be visible to later operations");
        Ok(())
    }

    #[test]
    fn test_unknown_carrier_is_rejected() {
        let mut reg = Register::new(0);
        let circuit = CircuitBuilder::new()
            .add_op(Operation::Flip { target: crate::core::QubitId(9) })
            .build();
        assert!(matches!(
            Simulator::new().run(&circuit, &mut reg),
            Err(QramError::UnknownQubit(_))
        ));
    }
}
