// src/router/mod.rs

//! Flagged conditional routing.
//!
//! A [`FlaggedRouter`] moves the bus cell into one of two cleared destination
//! cells, selected by an address cell. Each branch runs inside a flag window:
//! the flag carrier is reset, coupled to the branch's address rail, drives the
//! controlled swaps, is uncoupled and then measured. A phase kickback during
//! the window leaves the flag raised while conservation still holds, which is
//! the hook signal the decoder corrects. Faults that break conservation show
//! up in the joint post-check over both destinations, the bus and the address.

use crate::circuits::{Circuit, CircuitBuilder};
use crate::core::{DualRailCell, LogicalBit, NodeId, QramError, QubitId, Rail};
use crate::decoder::Syndrome;
use crate::faults::{Carrier, CarrierMap, FaultPlan, FaultSite};
use crate::operations::Operation;
use crate::simulation::{MeasurementRecord, Register, Simulator};
use serde::{Deserialize, Serialize};
use std::fmt;

const KEY_OUTPUTS: &str = "post.outputs";
const KEY_BUS: &str = "post.bus";
const KEY_ADDRESS: &str = "post.address";

/// Child selected by one address bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Branch {
    /// Address logical 0.
    Left,
    /// Address logical 1.
    Right,
}

impl Branch {
    /// Order in which the router runs the branches.
    pub const ROUTING_ORDER: [Branch; 2] = [Branch::Right, Branch::Left];

    pub fn for_bit(bit: LogicalBit) -> Self {
        match bit {
            LogicalBit::Zero => Branch::Left,
            LogicalBit::One => Branch::Right,
        }
    }

    /// The address rail that opens this branch's window.
    pub fn control_rail(self) -> Rail {
        match self {
            Branch::Left => Rail::Rail1,
            Branch::Right => Rail::Rail0,
        }
    }

    pub fn child(self, node: NodeId) -> NodeId {
        match self {
            Branch::Left => node.left(),
            Branch::Right => node.right(),
        }
    }

    fn flag_key(self) -> &'static str {
        match self {
            Branch::Left => "flag.left",
            Branch::Right => "flag.right",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Left => write!(f, "left"),
            Branch::Right => write!(f, "right"),
        }
    }
}

/// Measured value of a flag carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagOutcome {
    Clear,
    Raised,
}

impl FlagOutcome {
    pub fn from_bit(bit: u32) -> Self {
        if bit == 0 { FlagOutcome::Clear } else { FlagOutcome::Raised }
    }

    pub fn is_raised(self) -> bool {
        self == FlagOutcome::Raised
    }

    /// Logical OR of two flags.
    pub fn or(self, other: FlagOutcome) -> FlagOutcome {
        if self.is_raised() || other.is_raised() { FlagOutcome::Raised } else { FlagOutcome::Clear }
    }
}

impl fmt::Display for FlagOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagOutcome::Clear => write!(f, "0"),
            FlagOutcome::Raised => write!(f, "1"),
        }
    }
}

/// Per-node flag resource.
///
/// The physical carrier is allocated in the query's register for the duration
/// of one routing step and released afterwards; this handle is what a query
/// locks to gain exclusive use of the node's flag, and it counts measurements.
#[derive(Debug)]
pub struct FlagCarrier {
    node: NodeId,
    measurements: u64,
    raised: u64,
}

impl FlagCarrier {
    pub fn new(node: NodeId) -> Self {
        Self { node, measurements: 0, raised: 0 }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Total flag measurements taken at this node.
    pub fn measurements(&self) -> u64 {
        self.measurements
    }

    /// Flag measurements that came out raised.
    pub fn raised(&self) -> u64 {
        self.raised
    }

    fn record(&mut self, outcome: FlagOutcome) {
        self.measurements += 1;
        if outcome.is_raised() {
            self.raised += 1;
        }
    }
}

/// Excitation totals of the joint post-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCheck {
    /// Both destination cells together.
    pub outputs: u32,
    pub bus: u32,
    pub address: u32,
}

impl PostCheck {
    /// Classifies the post-check.
    ///
    /// Data missing from both outputs is an erasure, and two or more
    /// excitations across outputs and bus is a violation. With the data
    /// routed correctly the address cell is re-checked with the same rule.
    pub fn syndrome(&self) -> Syndrome {
        if self.outputs == 0 {
            Syndrome::Erasure
        } else if self.outputs + self.bus >= 2 {
            Syndrome::Violation
        } else if self.address == 0 {
            Syndrome::Erasure
        } else if self.address >= 2 {
            Syndrome::Violation
        } else {
            Syndrome::Valid
        }
    }
}

/// Per-branch flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFlags {
    pub left: FlagOutcome,
    pub right: FlagOutcome,
}

impl BranchFlags {
    /// Flag measured in `branch`'s window.
    pub fn get(&self, branch: Branch) -> FlagOutcome {
        match branch {
            Branch::Left => self.left,
            Branch::Right => self.right,
        }
    }

    pub fn combined(&self) -> FlagOutcome {
        self.left.or(self.right)
    }
}

/// Everything a routing step hands back to its caller.
#[derive(Debug)]
pub struct RouteOutcome {
    pub left: DualRailCell,
    pub right: DualRailCell,
    /// The source bus cell, cleared in the fault-free case.
    pub bus: DualRailCell,
    pub syndrome: Syndrome,
    /// OR of both branch flags.
    pub flag: FlagOutcome,
    pub branch_flags: BranchFlags,
    pub post_check: PostCheck,
}

impl RouteOutcome {
    /// Splits off the destination of `branch` and returns it with the
    /// remaining `[other destination, bus]` cells.
    pub fn take(self, branch: Branch) -> (DualRailCell, [DualRailCell; 2]) {
        match branch {
            Branch::Left => (self.left, [self.right, self.bus]),
            Branch::Right => (self.right, [self.left, self.bus]),
        }
    }
}

/// The flagged conditional-routing primitive. Holds no state between calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlaggedRouter {
    simulator: Simulator,
}

impl FlaggedRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The routing circuit for one step, from the routing checkpoint to the
    /// joint post-check. The address and destination pre-checks run before it.
    pub fn circuit(
        addr: &DualRailCell,
        bus: &DualRailCell,
        left: &DualRailCell,
        right: &DualRailCell,
        flag: QubitId,
    ) -> Circuit {
        let mut builder = CircuitBuilder::new().add_op(Operation::Checkpoint { site: FaultSite::BeforeRouting });
        for branch in Branch::ROUTING_ORDER {
            let control = addr.rail(branch.control_rail());
            let dest = match branch {
                Branch::Left => left,
                Branch::Right => right,
            };
            builder = builder
                .add_op(Operation::Reset { target: flag })
                .add_op(Operation::Cnot { control, target: flag })
                .add_ops(Rail::BOTH.map(|rail| Operation::ControlledSwap {
                    control: flag,
                    a: bus.rail(rail),
                    b: dest.rail(rail),
                }))
                .add_op(Operation::Checkpoint { site: FaultSite::Window(branch) })
                .add_op(Operation::Cnot { control, target: flag })
                .add_op(Operation::Measure { target: flag, key: branch.flag_key().to_string() })
                .add_op(Operation::Reset { target: flag });
        }
        let outputs = left.qubits().into_iter().chain(right.qubits()).collect();
        builder
            .add_op(Operation::Checkpoint { site: FaultSite::AfterRouting })
            .add_op(Operation::MeasureExcitations { targets: outputs, key: KEY_OUTPUTS.to_string() })
            .add_op(Operation::MeasureExcitations { targets: bus.qubits().to_vec(), key: KEY_BUS.to_string() })
            .add_op(Operation::MeasureExcitations { targets: addr.qubits().to_vec(), key: KEY_ADDRESS.to_string() })
            .build()
    }

    /// Routes `bus` into `left` or `right` according to `addr`.
    ///
    /// `left` and `right` must be cleared; that is checked before the
    /// address-load checkpoint. The flag carrier is allocated in `register`
    /// for the step and retired before returning, on error paths too.
    ///
    /// # Errors
    /// * `QramError::AddressInvalid` if the address cell does not hold exactly
    ///   one excitation.
    /// * `QramError::InvalidOperation` if a destination is not cleared.
    #[allow(clippy::too_many_arguments)]
    pub fn route(
        &self,
        register: &mut Register,
        faults: &mut FaultPlan,
        depth: u32,
        addr: &DualRailCell,
        bus: DualRailCell,
        left: DualRailCell,
        right: DualRailCell,
        flag: &mut FlagCarrier,
    ) -> Result<RouteOutcome, QramError> {
        for dest in [&left, &right] {
            let occupied = register.measure_excitations(&dest.qubits())?;
            if occupied != 0 {
                return Err(QramError::InvalidOperation {
                    message: format!("destination {} is not cleared ({} excitations)", dest, occupied),
                });
            }
        }

        let flag_qubit = register.allocate()?;
        let mut carriers = CarrierMap::new();
        carriers.bind_cell(Carrier::Address, addr);
        carriers.bind_cell(Carrier::Bus, &bus);
        carriers.bind_cell(Carrier::Left, &left);
        carriers.bind_cell(Carrier::Right, &right);
        carriers.bind(Carrier::Flag, flag_qubit);

        faults.fire(depth, FaultSite::AddressLoad, register, &carriers)?;
        let excitations = register.measure_excitations(&addr.qubits())?;
        if excitations != 1 {
            tracing::debug!(depth, node = %flag.node(), excitations, "address pre-check failed");
            register.retire(flag_qubit)?;
            return Err(QramError::AddressInvalid { excitations });
        }

        let circuit = Self::circuit(addr, &bus, &left, &right, flag_qubit);
        let record = match self.simulator.execute(&circuit, register, |site, reg| {
            faults.fire(depth, site, reg, &carriers)
        }) {
            Ok(record) => record,
            Err(err) => {
                // The step is lost either way; report the circuit's error.
                let _ = register.retire(flag_qubit);
                return Err(err);
            }
        };
        register.retire(flag_qubit)?;

        let branch_flags = BranchFlags {
            left: FlagOutcome::from_bit(read(&record, Branch::Left.flag_key())?),
            right: FlagOutcome::from_bit(read(&record, Branch::Right.flag_key())?),
        };
        flag.record(branch_flags.right);
        flag.record(branch_flags.left);

        let post_check = PostCheck {
            outputs: read(&record, KEY_OUTPUTS)?,
            bus: read(&record, KEY_BUS)?,
            address: read(&record, KEY_ADDRESS)?,
        };
        let syndrome = post_check.syndrome();
        let combined = branch_flags.combined();
        tracing::debug!(
            depth,
            node = %flag.node(),
            %syndrome,
            flag = %combined,
            outputs = post_check.outputs,
            bus = post_check.bus,
            "routing step finished"
        );

        Ok(RouteOutcome { left, right, bus, syndrome, flag: combined, branch_flags, post_check })
    }
}

fn read(record: &MeasurementRecord, key: &str) -> Result<u32, QramError> {
    record.get(key).ok_or_else(|| QramError::Incoherence {
        message: format!("routing circuit produced no outcome for '{}'", key),
    })
}
