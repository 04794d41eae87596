// src/controller/mod.rs

//! Tree traversal and retry policy.
//!
//! The [`QueryController`] walks one address from the root to a leaf: per
//! level it transports the bus into the current node, routes it with that
//! level's address bit and lets the decoder classify the step. It is the only
//! place where an attempt is abandoned and restarted.

use crate::config::{QramConfig, ReadoutMode};
use crate::core::{CellReading, DualRailCell, LogicalBit, NodeId, QramError};
use crate::decoder::{AbortReason, Correction, Decision, Syndrome, SyndromeDecoder};
use crate::faults::FaultPlan;
use crate::router::{Branch, FlagOutcome, FlaggedRouter, RouteOutcome};
use crate::simulation::Register;
use crate::transport::LinkTransport;
use crate::tree::QramTree;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One routing step (or failed transfer) as seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Zero-based attempt this step belongs to.
    pub attempt: u32,
    pub depth: u32,
    pub node: NodeId,
    /// `None` when the step never reached the router.
    pub syndrome: Option<Syndrome>,
    pub flag: Option<FlagOutcome>,
    pub decision: Decision,
}

/// Classical record of a finished query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub address: Vec<u8>,
    pub success: bool,
    /// Leaf the bus reached on the successful attempt.
    pub leaf: Option<u64>,
    pub leaf_value: Option<LogicalBit>,
    /// Dominant abort reason when the query failed.
    pub abort_reason: Option<AbortReason>,
    /// Restarts performed, not counting the first attempt.
    pub retries_used: u32,
    pub corrections_applied: u32,
    /// Bus readout of the last attempt that reached a leaf.
    pub final_reading: Option<CellReading>,
    pub trace: Vec<StepRecord>,
}

/// Per-query bookkeeping, owned by the controller for the query's lifetime.
#[derive(Debug, Clone)]
pub struct QueryState {
    node: NodeId,
    address: Vec<LogicalBit>,
    pending: Vec<Correction>,
    attempt: u32,
    aborts: Vec<AbortReason>,
}

impl QueryState {
    fn new(address: Vec<LogicalBit>) -> Self {
        Self { node: NodeId::ROOT, address, pending: Vec::new(), attempt: 0, aborts: Vec::new() }
    }

    /// Resets position and pending corrections for attempt `attempt`.
    fn restart(&mut self, attempt: u32) {
        self.node = NodeId::ROOT;
        self.pending.clear();
        self.attempt = attempt;
    }

    fn advance(&mut self, branch: Branch) {
        self.node = branch.child(self.node);
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn depth(&self) -> u32 {
        self.node.level
    }

    /// Address bits not yet consumed.
    pub fn remaining_bits(&self) -> &[LogicalBit] {
        &self.address[(self.node.level as usize).min(self.address.len())..]
    }

    pub fn pending_corrections(&self) -> &[Correction] {
        &self.pending
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn abort_history(&self) -> &[AbortReason] {
        &self.aborts
    }

    /// Most frequent abort reason; ties go to the one seen most recently.
    pub fn dominant_abort(&self) -> Option<AbortReason> {
        self.aborts
            .iter()
            .map(|reason| {
                let count = self.aborts.iter().filter(|r| *r == reason).count();
                let last = self.aborts.iter().rposition(|r| r == reason).unwrap_or(0);
                (count, last, *reason)
            })
            .max_by_key(|(count, last, _)| (*count, *last))
            .map(|(_, _, reason)| reason)
    }
}

enum Attempt {
    Completed { leaf: u64, reading: CellReading, corrections: u32 },
    Aborted(AbortReason),
}

/// Drives queries against one tree.
#[derive(Debug)]
pub struct QueryController {
    config: QramConfig,
    tree: QramTree,
    router: FlaggedRouter,
    decoder: SyndromeDecoder,
    transport: LinkTransport,
}

impl QueryController {
    pub fn new(config: QramConfig, tree: QramTree) -> Result<Self, QramError> {
        config.validate()?;
        if config.tree_height != tree.height() {
            return Err(QramError::InvalidConfig {
                message: format!(
                    "configured tree_height {} does not match tree of height {}",
                    config.tree_height,
                    tree.height()
                ),
            });
        }
        let transport = LinkTransport::new(config.distillation_rounds, config.distillation_attempts);
        Ok(Self { config, tree, router: FlaggedRouter::new(), decoder: SyndromeDecoder::new(), transport })
    }

    pub fn config(&self) -> &QramConfig {
        &self.config
    }

    pub fn tree(&self) -> &QramTree {
        &self.tree
    }

    /// Allocates the bus in logical zero, or `|+>_L` for phase-oracle readout.
    pub fn initialize(&self, register: &mut Register) -> Result<DualRailCell, QramError> {
        let bus = register.prepare_cell(LogicalBit::Zero)?;
        if self.config.readout == ReadoutMode::PhaseOracle {
            register.logical_hadamard(&bus)?;
        }
        Ok(bus)
    }

    /// Moves the bus into `node`, holding the node's pair pool for the transfer.
    pub fn transport(
        &self,
        register: &mut Register,
        faults: &mut FaultPlan,
        depth: u32,
        bus: DualRailCell,
        node: NodeId,
    ) -> Result<DualRailCell, QramError> {
        let mut pool = self.tree.lock_pool(node)?;
        self.transport.transfer(register, faults, depth, bus, &mut pool)
    }

    /// Routes the bus at `node` with address cell `addr`, holding the node's
    /// flag for the step. Fresh cleared destinations are allocated here.
    pub fn route(
        &self,
        register: &mut Register,
        faults: &mut FaultPlan,
        depth: u32,
        node: NodeId,
        addr: &DualRailCell,
        bus: DualRailCell,
    ) -> Result<RouteOutcome, QramError> {
        let left = register.allocate_cell()?;
        let right = register.allocate_cell()?;
        let mut flag = self.tree.lock_flag(node)?;
        self.router.route(register, faults, depth, addr, bus, left, right, &mut flag)
    }

    pub fn decode(&self, syndrome: Syndrome, flag: FlagOutcome) -> Decision {
        self.decoder.decode(syndrome, flag)
    }

    /// Looks up `address` (most significant bit first) with no injected faults.
    pub fn query(&self, address: &[u8]) -> Result<QueryResult, QramError> {
        self.query_with_faults(address, &mut FaultPlan::none())
    }

    /// Looks up `address` while `faults` fires its scheduled faults.
    ///
    /// Detected faults never surface as `Err`: they abort the attempt and the
    /// query restarts from the root on a fresh register until the retry
    /// budget is spent. `Err` is reserved for malformed queries and
    /// simulation errors.
    pub fn query_with_faults(&self, address: &[u8], faults: &mut FaultPlan) -> Result<QueryResult, QramError> {
        let bits = self.parse_address(address)?;
        let mut state = QueryState::new(bits);
        let mut trace = Vec::new();
        let mut final_reading = None;

        for attempt in 0..=self.config.retry_budget {
            state.restart(attempt);
            match self.run_attempt(&mut state, faults, &mut trace)? {
                Attempt::Completed { leaf, reading, corrections } => {
                    final_reading = Some(reading);
                    match reading {
                        CellReading::Logical(value) => {
                            tracing::info!(?address, leaf, %value, attempt, corrections, "query completed");
                            return Ok(QueryResult {
                                address: address.to_vec(),
                                success: true,
                                leaf: Some(leaf),
                                leaf_value: Some(value),
                                abort_reason: None,
                                retries_used: attempt,
                                corrections_applied: corrections,
                                final_reading,
                                trace,
                            });
                        }
                        CellReading::Erasure => state.aborts.push(AbortReason::Erasure),
                        CellReading::Violation => state.aborts.push(AbortReason::Violation),
                    }
                    tracing::warn!(attempt, %reading, "leaf readout was not a logical value");
                }
                Attempt::Aborted(reason) => {
                    tracing::warn!(attempt, %reason, depth = state.depth(), "query attempt aborted");
                    state.aborts.push(reason);
                }
            }
        }

        let abort_reason = state.dominant_abort();
        tracing::warn!(?address, retries = self.config.retry_budget, reason = ?abort_reason, "retry budget exhausted");
        Ok(QueryResult {
            address: address.to_vec(),
            success: false,
            leaf: None,
            leaf_value: None,
            abort_reason,
            retries_used: self.config.retry_budget,
            corrections_applied: 0,
            final_reading,
            trace,
        })
    }

    /// Runs independent fault-free queries in parallel. Results come back in
    /// input order and match what sequential [`query`](Self::query) calls
    /// return.
    pub fn run_batch(&self, addresses: &[Vec<u8>]) -> Vec<Result<QueryResult, QramError>> {
        addresses.par_iter().map(|address| self.query(address)).collect()
    }

    fn run_attempt(
        &self,
        state: &mut QueryState,
        faults: &mut FaultPlan,
        trace: &mut Vec<StepRecord>,
    ) -> Result<Attempt, QramError> {
        let mut register = Register::new(self.attempt_seed(&state.address, state.attempt));
        let mut bus = self.initialize(&mut register)?;
        let mut corrections = 0;

        for (depth, bit) in state.address.clone().into_iter().enumerate() {
            let depth = depth as u32;
            let node = state.node;
            let mut step = |syndrome, flag, decision| {
                trace.push(StepRecord { attempt: state.attempt, depth, node, syndrome, flag, decision })
            };

            bus = match self.transport(&mut register, faults, depth, bus, node) {
                Ok(delivered) => delivered,
                Err(QramError::TransportFailure { .. }) => {
                    step(None, None, Decision::Abort(AbortReason::TransportFailure));
                    return Ok(Attempt::Aborted(AbortReason::TransportFailure));
                }
                Err(err) => return Err(err),
            };

            let addr = register.prepare_cell(bit)?;
            let outcome = match self.route(&mut register, faults, depth, node, &addr, bus) {
                Ok(outcome) => outcome,
                Err(QramError::AddressInvalid { .. }) => {
                    step(None, None, Decision::Abort(AbortReason::AddressInvalid));
                    return Ok(Attempt::Aborted(AbortReason::AddressInvalid));
                }
                Err(err) => return Err(err),
            };

            let branch = Branch::for_bit(bit);
            let decision = self.decoder.decode_routed(outcome.syndrome, &outcome.branch_flags, branch);
            if decision == Decision::Continue && outcome.flag.is_raised() {
                tracing::debug!(depth, %node, routed = %branch, "flag raised outside the routed window");
            }
            step(Some(outcome.syndrome), Some(outcome.flag), decision);
            match decision {
                Decision::Continue => {}
                Decision::Correct(correction) => state.pending.push(correction),
                Decision::Abort(reason) => return Ok(Attempt::Aborted(reason)),
            }

            let (routed, spent) = outcome.take(branch);
            for correction in state.pending.drain(..) {
                tracing::debug!(depth, %node, ?correction, "applying correction");
                correction.apply(&mut register, &routed)?;
                corrections += 1;
            }
            for cell in spent {
                register.retire_cell(cell)?;
            }
            register.retire_cell(addr)?;
            bus = routed;
            state.advance(branch);
        }

        let leaf = state.node.index;
        let payload = self.tree.payload(leaf).ok_or_else(|| QramError::InvalidQuery {
            message: format!("leaf {} is outside the tree", leaf),
        })?;
        let reading = self.read_leaf(&mut register, bus, payload)?;
        Ok(Attempt::Completed { leaf, reading, corrections })
    }

    /// Interacts the bus with the leaf payload and measures it out.
    fn read_leaf(&self, register: &mut Register, bus: DualRailCell, payload: LogicalBit) -> Result<CellReading, QramError> {
        match self.config.readout {
            ReadoutMode::Classical => {
                if payload == LogicalBit::One {
                    register.logical_flip(&bus)?;
                }
            }
            ReadoutMode::PhaseOracle => {
                if payload == LogicalBit::One {
                    register.logical_phase_flip(&bus)?;
                }
                register.logical_hadamard(&bus)?;
            }
        }
        register.retire_cell(bus)
    }

    fn parse_address(&self, address: &[u8]) -> Result<Vec<LogicalBit>, QramError> {
        if address.len() != self.tree.height() as usize {
            return Err(QramError::InvalidQuery {
                message: format!("address has {} bits, tree has height {}", address.len(), self.tree.height()),
            });
        }
        address
            .iter()
            .map(|b| {
                LogicalBit::try_from(*b).map_err(|v| QramError::InvalidQuery {
                    message: format!("address bits must be 0 or 1, got {}", v),
                })
            })
            .collect()
    }

    /// Seed for one attempt. Depends only on the configured seed, the
    /// address and the attempt index, so batch order does not matter.
    fn attempt_seed(&self, address: &[LogicalBit], attempt: u32) -> u64 {
        let leaf = address.iter().fold(0u64, |i, b| i * 2 + u64::from(b.as_u8()));
        let mut z = self
            .config
            .seed
            .wrapping_add(leaf.wrapping_mul(0x9E37_79B9_7F4A_7C15))
            .wrapping_add(u64::from(attempt).wrapping_mul(0xD1B5_4A32_D192_ED03));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}
