// src/simulation/engine.rs
use crate::core::constants::{CERTAINTY_TOLERANCE, MAX_CARRIERS, NORM_TOLERANCE};
use crate::core::{AmplitudeState, CellReading, DualRailCell, LogicalBit, QramError, QubitId};
use crate::operations::Operation;
use num_complex::Complex;
use num_traits::One;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use std::f64::consts::FRAC_1_SQRT_2;
use std::fmt;

/// The physical substrate of one query: a sparse amplitude state over up to
/// 64 carriers, a record of which carriers are allocated, and a seeded random
/// source for measurement outcomes.
///
/// Each in-flight query owns exactly one register. Nothing in it is shared
/// between queries.
pub struct Register {
    state: AmplitudeState,
    /// Bit `k` set when `QubitId(k)` is allocated.
    live: u64,
    rng: StdRng,
}

impl Register {
    /// Creates an empty register. All carriers start inactive.
    pub fn new(seed: u64) -> Self {
        Self {
            state: AmplitudeState::ground(),
            live: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Read-only view of the amplitude state.
    pub fn state(&self) -> &AmplitudeState {
        &self.state
    }

    /// Number of allocated carriers.
    pub fn live_carriers(&self) -> usize {
        self.live.count_ones() as usize
    }

    pub fn is_live(&self, qubit: QubitId) -> bool {
        (qubit.0 as usize) < MAX_CARRIERS && self.live & qubit.mask() != 0
    }

    // --- Allocation ---

    /// Allocates the lowest free carrier. It is inactive in every branch.
    pub fn allocate(&mut self) -> Result<QubitId, QramError> {
        let free = !self.live;
        if free == 0 {
            return Err(QramError::RegisterExhausted { max: MAX_CARRIERS });
        }
        let qubit = QubitId(free.trailing_zeros());
        self.live |= qubit.mask();
        Ok(qubit)
    }

    /// Allocates a cleared cell (both rails inactive).
    pub fn allocate_cell(&mut self) -> Result<DualRailCell, QramError> {
        let rail0 = self.allocate()?;
        let rail1 = self.allocate()?;
        Ok(DualRailCell::new(rail0, rail1))
    }

    /// Allocates a cell and prepares it in `value` (`|01>` for 0, `|10>` for 1).
    pub fn prepare_cell(&mut self, value: LogicalBit) -> Result<DualRailCell, QramError> {
        let cell = self.allocate_cell()?;
        self.flip(cell.rail(value.active_rail()))?;
        Ok(cell)
    }

    /// Returns a carrier to the free pool. It must be inactive in every branch.
    pub fn release(&mut self, qubit: QubitId) -> Result<(), QramError> {
        self.check_live(qubit)?;
        if self.state.iter().any(|(label, _)| label & qubit.mask() != 0) {
            return Err(QramError::InvalidOperation {
                message: format!("cannot release {}: carrier is not inactive", qubit),
            });
        }
        self.live &= !qubit.mask();
        Ok(())
    }

    /// Measures a carrier, resets it and releases it. Returns the outcome.
    pub fn retire(&mut self, qubit: QubitId) -> Result<u8, QramError> {
        let outcome = self.measure(qubit)?;
        if outcome == 1 {
            self.flip(qubit)?;
        }
        self.release(qubit)?;
        Ok(outcome)
    }

    /// Measures both rails of a cell out and frees them.
    pub fn retire_cell(&mut self, cell: DualRailCell) -> Result<CellReading, QramError> {
        let rail0 = self.retire(cell.rail0())?;
        let rail1 = self.retire(cell.rail1())?;
        Ok(CellReading::from_rails(rail0 == 1, rail1 == 1))
    }

    // --- Unitary operations ---

    /// Applies a single non-measurement operation.
    pub fn apply_operation(&mut self, op: &Operation) -> Result<(), QramError> {
        for qubit in op.involved_qubits() {
            self.check_live(qubit)?;
        }
        match op {
            Operation::Flip { target } => {
                let m = target.mask();
                self.state.permute(|k| (k ^ m, Complex::one()));
            }
            Operation::PhaseFlip { target } => {
                let m = target.mask();
                self.state.permute(|k| (k, if k & m != 0 { -Complex::one() } else { Complex::one() }));
            }
            Operation::Hadamard { target } => {
                let m = target.mask();
                let s = Complex::new(FRAC_1_SQRT_2, 0.0);
                self.state.transform(|k| {
                    if k & m == 0 { vec![(k, s), (k | m, s)] } else { vec![(k & !m, s), (k, -s)] }
                });
            }
            Operation::Cnot { control, target } => {
                Self::check_distinct(&[*control, *target])?;
                let (c, t) = (control.mask(), target.mask());
                self.state.permute(|k| (if k & c != 0 { k ^ t } else { k }, Complex::one()));
            }
            Operation::Cz { control, target } => {
                Self::check_distinct(&[*control, *target])?;
                let both = control.mask() | target.mask();
                self.state.permute(|k| (k, if k & both == both { -Complex::one() } else { Complex::one() }));
            }
            Operation::Toffoli { controls, target } => {
                Self::check_distinct(&[controls[0], controls[1], *target])?;
                let c = controls[0].mask() | controls[1].mask();
                let t = target.mask();
                self.state.permute(|k| (if k & c == c { k ^ t } else { k }, Complex::one()));
            }
            Operation::ControlledSwap { control, a, b } => {
                Self::check_distinct(&[*control, *a, *b])?;
                for step in op.decompose() {
                    self.apply_operation(&step)?;
                }
            }
            Operation::LogicalHadamard { rail0, rail1 } => {
                Self::check_distinct(&[*rail0, *rail1])?;
                let (r0, r1) = (rail0.mask(), rail1.mask());
                let s = Complex::new(FRAC_1_SQRT_2, 0.0);
                self.state.transform(|k| {
                    let rest = k & !(r0 | r1);
                    match (k & r0 != 0, k & r1 != 0) {
                        // logical 0 -> (|0_L> + |1_L>)/sqrt2
                        (false, true) => vec![(rest | r1, s), (rest | r0, s)],
                        // logical 1 -> (|0_L> - |1_L>)/sqrt2
                        (true, false) => vec![(rest | r1, s), (rest | r0, -s)],
                        _ => vec![(k, Complex::one())],
                    }
                });
            }
            Operation::Reset { .. }
            | Operation::Measure { .. }
            | Operation::MeasureExcitations { .. } => {
                return Err(QramError::InvalidOperation {
                    message: "measurements must go through the measurement methods".to_string(),
                });
            }
            Operation::Checkpoint { .. } => {}
        }
        Ok(())
    }

    pub fn flip(&mut self, target: QubitId) -> Result<(), QramError> {
        self.apply_operation(&Operation::Flip { target })
    }

    pub fn phase_flip(&mut self, target: QubitId) -> Result<(), QramError> {
        self.apply_operation(&Operation::PhaseFlip { target })
    }

    pub fn controlled_phase_flip(&mut self, control: QubitId, target: QubitId) -> Result<(), QramError> {
        self.apply_operation(&Operation::Cz { control, target })
    }

    /// Logical X: exchanges the rails of `cell`.
    pub fn logical_flip(&mut self, cell: &DualRailCell) -> Result<(), QramError> {
        self.apply_operation(&Operation::Cnot { control: cell.rail0(), target: cell.rail1() })?;
        self.apply_operation(&Operation::Cnot { control: cell.rail1(), target: cell.rail0() })?;
        self.apply_operation(&Operation::Cnot { control: cell.rail0(), target: cell.rail1() })
    }

    /// Logical Z: phase flip on `rail0`, the logical-one rail.
    pub fn logical_phase_flip(&mut self, cell: &DualRailCell) -> Result<(), QramError> {
        self.phase_flip(cell.rail0())
    }

    pub fn logical_hadamard(&mut self, cell: &DualRailCell) -> Result<(), QramError> {
        self.apply_operation(&Operation::LogicalHadamard { rail0: cell.rail0(), rail1: cell.rail1() })
    }

    /// Relaxation of `target` as a quantum jump: the active component loses
    /// its excitation and the inactive component is discarded.
    ///
    /// Returns `false` and leaves the state untouched when `target` is
    /// inactive in every branch, since no jump can occur.
    pub fn relax(&mut self, target: QubitId) -> Result<bool, QramError> {
        self.check_live(target)?;
        let m = target.mask();
        if !self.state.iter().any(|(k, _)| k & m != 0) {
            return Ok(false);
        }
        self.state.project(|k| k & m != 0);
        self.state.permute(|k| (k & !m, Complex::one()));
        self.state.renormalize();
        Ok(true)
    }

    // --- Measurements ---

    /// Projective measurement of one carrier.
    pub fn measure(&mut self, target: QubitId) -> Result<u8, QramError> {
        self.check_live(target)?;
        let m = target.mask();
        let p_one: f64 = self.state.iter().filter(|(k, _)| k & m != 0).map(|(_, a)| a.norm_sqr()).sum();
        let outcome = self.sample_binary(p_one);
        let kept = self.state.project(|k| (k & m != 0) == (outcome == 1));
        self.finish_projection(kept)?;
        Ok(outcome)
    }

    /// Measures and re-initialises a carrier to inactive.
    pub fn reset(&mut self, target: QubitId) -> Result<(), QramError> {
        if self.measure(target)? == 1 {
            self.flip(target)?;
        }
        Ok(())
    }

    /// Measures the total number of active carriers in `targets` without
    /// revealing which ones are active.
    pub fn measure_excitations(&mut self, targets: &[QubitId]) -> Result<u32, QramError> {
        let mask = self.mask_of(targets)?;
        let mut weights: Vec<(u32, f64)> = Vec::new();
        for (label, amp) in self.state.iter() {
            let count = (label & mask).count_ones();
            match weights.iter_mut().find(|(c, _)| *c == count) {
                Some(entry) => entry.1 += amp.norm_sqr(),
                None => weights.push((count, amp.norm_sqr())),
            }
        }
        weights.sort_by_key(|(c, _)| *c);
        let count = self.sample_weighted(&weights)?;
        let kept = self.state.project(|k| (k & mask).count_ones() == count);
        self.finish_projection(kept)?;
        Ok(count)
    }

    /// Excitation number of `targets` if it is the same in every branch.
    /// This inspects the simulation without measuring.
    pub fn definite_excitations(&self, targets: &[QubitId]) -> Option<u32> {
        let mask = targets
            .iter()
            .filter(|q| self.is_live(**q))
            .fold(0u64, |acc, q| acc | q.mask());
        let mut counts = self.state.iter().map(|(k, _)| (k & mask).count_ones());
        let first = counts.next()?;
        counts.all(|c| c == first).then_some(first)
    }

    /// Overwrites the state. Used by tests to seed arbitrary superpositions.
    #[cfg(test)]
    pub(crate) fn set_state(&mut self, state: AmplitudeState) {
        self.state = state;
    }

    // --- Helpers ---

    fn check_live(&self, qubit: QubitId) -> Result<(), QramError> {
        if self.is_live(qubit) { Ok(()) } else { Err(QramError::UnknownQubit(qubit)) }
    }

    fn check_distinct(qubits: &[QubitId]) -> Result<(), QramError> {
        for (i, a) in qubits.iter().enumerate() {
            if qubits[i + 1..].contains(a) {
                return Err(QramError::InvalidOperation {
                    message: format!("carrier {} used twice in one gate", a),
                });
            }
        }
        Ok(())
    }

    fn mask_of(&self, targets: &[QubitId]) -> Result<u64, QramError> {
        let mut mask = 0u64;
        for q in targets {
            self.check_live(*q)?;
            mask |= q.mask();
        }
        Ok(mask)
    }

    fn sample_binary(&mut self, p_one: f64) -> u8 {
        if p_one <= CERTAINTY_TOLERANCE {
            0
        } else if p_one >= 1.0 - CERTAINTY_TOLERANCE {
            1
        } else if self.rng.random::<f64>() < p_one {
            1
        } else {
            0
        }
    }

    fn sample_weighted(&mut self, weights: &[(u32, f64)]) -> Result<u32, QramError> {
        let certain = weights.iter().find(|(_, w)| *w >= 1.0 - CERTAINTY_TOLERANCE);
        if let Some((count, _)) = certain {
            return Ok(*count);
        }
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        let mut sample = self.rng.random::<f64>() * total;
        for (count, weight) in weights {
            if sample < *weight {
                return Ok(*count);
            }
            sample -= weight;
        }
        weights.last().map(|(c, _)| *c).ok_or_else(|| QramError::Incoherence {
            message: "measurement over an empty state".to_string(),
        })
    }

    fn finish_projection(&mut self, kept: f64) -> Result<(), QramError> {
        if kept <= NORM_TOLERANCE {
            return Err(QramError::Incoherence {
                message: format!("projection kept negligible weight {:.3e}", kept),
            });
        }
        self.state.renormalize();
        Ok(())
    }
}

impl fmt::Debug for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Register")
            .field("live", &self.live_carriers())
            .field("state", &format_args!("{}", self.state))
            .finish()
    }
}
