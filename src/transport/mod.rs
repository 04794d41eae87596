// src/transport/mod.rs

//! Verified link transport between tree levels.
//!
//! Each rail of the bus is teleported over its own entangled pair. Pairs come
//! from the destination node's [`PairPool`] and are distilled 2-for-1 with a
//! bilateral parity check before use. After both teleports the delivered
//! cell's excitation number is checked; anything other than one excitation
//! means the bus content is gone and the transfer fails.

use crate::core::constants::MIN_DISTILLATION_ATTEMPTS;
use crate::core::{DualRailCell, NodeId, QramError, QubitId, Rail, TransportFailureCause};
use crate::faults::{Carrier, CarrierMap, FaultPlan, FaultSite};
use crate::operations::Operation;
use crate::simulation::Register;
use serde::{Deserialize, Serialize};

/// Accounting of one node's entangled-pair resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Raw pairs handed out, including those sacrificed by distillation.
    pub raw_pairs: u64,
    /// Distillation attempts that failed their parity check.
    pub distillation_failures: u64,
    /// Cells delivered that passed the arrival check.
    pub deliveries: u64,
    /// Transfers that failed.
    pub failures: u64,
}

/// Source of raw `|Phi+>` pairs for links into one node.
#[derive(Debug)]
pub struct PairPool {
    node: NodeId,
    stats: PoolStats,
}

/// Two halves of an entangled pair. The source half stays on the sending
/// side, the target half becomes the delivered rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pair {
    source: QubitId,
    target: QubitId,
}

impl PairPool {
    pub fn new(node: NodeId) -> Self {
        Self { node, stats: PoolStats::default() }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Allocates two carriers and entangles them into `|Phi+>`.
    fn prepare(&mut self, register: &mut Register) -> Result<Pair, QramError> {
        let source = register.allocate()?;
        let target = register.allocate()?;
        register.apply_operation(&Operation::Hadamard { target: source })?;
        register.apply_operation(&Operation::Cnot { control: source, target })?;
        self.stats.raw_pairs += 1;
        Ok(Pair { source, target })
    }
}

/// Moves a bus cell into a node over distilled entangled pairs.
#[derive(Debug, Clone, Copy)]
pub struct LinkTransport {
    rounds: u32,
    attempts: u32,
}

impl LinkTransport {
    /// `rounds` distillation rounds per rail (each doubles the raw pairs
    /// used), at most `attempts` tries per rail before giving up. `attempts`
    /// is raised to [`MIN_DISTILLATION_ATTEMPTS`] if lower.
    pub fn new(rounds: u32, attempts: u32) -> Self {
        Self { rounds, attempts: attempts.max(MIN_DISTILLATION_ATTEMPTS) }
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Transfers `bus` into the node owning `pool` and returns the delivered
    /// cell.
    ///
    /// # Errors
    /// `QramError::TransportFailure` when a rail cannot be distilled within
    /// the attempt bound or when the arrival check fails. The bus content is
    /// destroyed in both cases.
    pub fn transfer(
        &self,
        register: &mut Register,
        faults: &mut FaultPlan,
        depth: u32,
        bus: DualRailCell,
        pool: &mut PairPool,
    ) -> Result<DualRailCell, QramError> {
        let node = pool.node();
        let mut carriers = CarrierMap::new();
        carriers.bind_cell(Carrier::Bus, &bus);

        let mut pairs = Vec::with_capacity(2);
        for rail in Rail::BOTH {
            let pair = match self.verified_pair(register, faults, depth, rail, pool) {
                Ok(pair) => pair,
                Err(err) => {
                    pool.stats.failures += 1;
                    for pair in pairs {
                        retire_pair(register, pair)?;
                    }
                    let reading = register.retire_cell(bus)?;
                    tracing::warn!(depth, %node, %reading, "bus destroyed after failed distillation");
                    return Err(err);
                }
            };
            carriers.bind(Carrier::PairSource(rail), pair.source);
            carriers.bind(Carrier::PairTarget(rail), pair.target);
            pairs.push(pair);
        }

        faults.fire(depth, FaultSite::BeforeTeleport, register, &carriers)?;
        for (rail, pair) in Rail::BOTH.into_iter().zip(&pairs) {
            teleport(register, bus.rail(rail), *pair)?;
        }
        let delivered = DualRailCell::new(pairs[0].target, pairs[1].target);

        carriers.bind_cell(Carrier::Arrival, &delivered);
        faults.fire(depth, FaultSite::AfterTeleport, register, &carriers)?;

        let excitations = register.measure_excitations(&delivered.qubits())?;
        if excitations != 1 {
            let reading = register.retire_cell(delivered)?;
            pool.stats.failures += 1;
            tracing::warn!(depth, %node, excitations, %reading, "arrival check failed");
            return Err(QramError::TransportFailure {
                node,
                cause: TransportFailureCause::ArrivalCheck { excitations },
            });
        }
        pool.stats.deliveries += 1;
        tracing::debug!(depth, %node, raw_pairs = pool.stats.raw_pairs, "bus delivered");
        Ok(delivered)
    }

    /// Distills one pair for `rail`, retrying with fresh pairs up to the
    /// attempt bound.
    fn verified_pair(
        &self,
        register: &mut Register,
        faults: &mut FaultPlan,
        depth: u32,
        rail: Rail,
        pool: &mut PairPool,
    ) -> Result<Pair, QramError> {
        for attempt in 1..=self.attempts {
            if let Some(pair) = self.distill(register, faults, depth, rail, pool, self.rounds)? {
                return Ok(pair);
            }
            pool.stats.distillation_failures += 1;
            tracing::warn!(depth, node = %pool.node(), %rail, attempt, "distillation failed");
        }
        Err(QramError::TransportFailure {
            node: pool.node(),
            cause: TransportFailureCause::DistillationExhausted { attempts: self.attempts },
        })
    }

    /// Produces a pair that has survived `rounds` levels of 2-for-1
    /// distillation, or `None` if any parity check failed. Failed pairs are
    /// retired.
    fn distill(
        &self,
        register: &mut Register,
        faults: &mut FaultPlan,
        depth: u32,
        rail: Rail,
        pool: &mut PairPool,
        rounds: u32,
    ) -> Result<Option<Pair>, QramError> {
        if rounds == 0 {
            let pair = pool.prepare(register)?;
            let mut carriers = CarrierMap::new();
            carriers.bind(Carrier::PairSource(rail), pair.source);
            carriers.bind(Carrier::PairTarget(rail), pair.target);
            faults.fire(depth, FaultSite::PairPreparation(rail), register, &carriers)?;
            return Ok(Some(pair));
        }
        let Some(kept) = self.distill(register, faults, depth, rail, pool, rounds - 1)? else {
            return Ok(None);
        };
        let Some(sacrificed) = self.distill(register, faults, depth, rail, pool, rounds - 1)? else {
            retire_pair(register, kept)?;
            return Ok(None);
        };

        // Bilateral CNOT: the sacrificed pair picks up the parity of both.
        register.apply_operation(&Operation::Cnot { control: kept.source, target: sacrificed.source })?;
        register.apply_operation(&Operation::Cnot { control: kept.target, target: sacrificed.target })?;
        let source_bit = register.retire(sacrificed.source)?;
        let target_bit = register.retire(sacrificed.target)?;
        if source_bit != target_bit {
            retire_pair(register, kept)?;
            return Ok(None);
        }
        Ok(Some(kept))
    }
}

/// Teleports the state of `data` onto `pair.target` and retires `data` and
/// `pair.source`.
fn teleport(register: &mut Register, data: QubitId, pair: Pair) -> Result<(), QramError> {
    register.apply_operation(&Operation::Cnot { control: data, target: pair.source })?;
    register.apply_operation(&Operation::Hadamard { target: data })?;
    let m1 = register.retire(data)?;
    let m2 = register.retire(pair.source)?;
    if m2 == 1 {
        register.flip(pair.target)?;
    }
    if m1 == 1 {
        register.phase_flip(pair.target)?;
    }
    Ok(())
}

fn retire_pair(register: &mut Register, pair: Pair) -> Result<(), QramError> {
    register.retire(pair.source)?;
    register.retire(pair.target)?;
    Ok(())
}
