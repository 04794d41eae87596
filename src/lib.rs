// src/lib.rs

//! `drqram` - dual-rail fault-tolerant QRAM
//!
//! Every logical bit is carried by two physical carriers of which exactly one
//! is active. Routing, link transport and readout are instrumented so that
//! bit flips, relaxation and phase kickback show up as detectable violations
//! of that conservation rule (or as a raised flag) instead of silently
//! corrupting the lookup.
//!
//! The pieces, leaves first:
//! * [`simulation::Register`]: the physical substrate a query runs on.
//! * [`router::FlaggedRouter`]: moves the bus into one child, flagged.
//! * [`decoder`]: maps (syndrome, flag) to continue / correct / abort.
//! * [`transport::LinkTransport`]: distilled teleportation between levels.
//! * [`controller::QueryController`]: per-level driving and retry policy.

pub mod core;
pub mod operations;
pub mod circuits;
pub mod simulation;
pub mod faults;
pub mod router;
pub mod decoder;
pub mod transport;
pub mod tree;
pub mod config;
pub mod controller;
pub mod validation;

// Re-export the most common types for easier top-level use
pub use core::{CellReading, DualRailCell, LogicalBit, NodeId, QramError, QubitId, Rail};
pub use operations::Operation;
pub use circuits::{Circuit, CircuitBuilder};
pub use simulation::{MeasurementRecord, Register, Simulator};
pub use faults::{Carrier, Fault, FaultPlan, FaultSite};
pub use router::{Branch, BranchFlags, FlagCarrier, FlagOutcome, FlaggedRouter, RouteOutcome};
pub use decoder::{decode, decode_routed, AbortReason, Correction, Decision, Syndrome, SyndromeDecoder};
pub use transport::{LinkTransport, PairPool, PoolStats};
pub use tree::QramTree;
pub use config::{QramConfig, ReadoutMode};
pub use controller::{QueryController, QueryResult, QueryState, StepRecord};
pub use validation::{check_conservation, check_normalization, is_cleared, validate_register};

// Example 1: A two-level lookup
// Builds a four-leaf memory and reads leaf 2 with address [1, 0].
/// ```
/// use drqram::{LogicalBit, QramConfig, QramTree, QueryController, QramError};
///
/// let tree = QramTree::from_bits(2, &[0, 0, 1, 0])?;
/// let controller = QueryController::new(QramConfig::with_height(2), tree)?;
///
/// let result = controller.query(&[1, 0])?;
/// assert!(result.success);
/// assert_eq!(result.leaf, Some(2));
/// assert_eq!(result.leaf_value, Some(LogicalBit::One));
/// assert_eq!(result.retries_used, 0);
/// # Ok::<(), QramError>(())
/// ```
#[doc(hidden)]
const _: () = (); // Attaches the preceding doc comment block to a hidden item

// Example 2: A single routing step with an injected hook fault
// The flag catches the phase kickback and the decoder asks for a correction.
/// ```
/// use drqram::{
///     decode, Branch, Correction, Decision, Fault, FaultPlan, FaultSite, FlagCarrier,
///     FlagOutcome, FlaggedRouter, LogicalBit, NodeId, QramError, Register, Syndrome,
/// };
///
/// let mut reg = Register::new(7);
/// let addr = reg.prepare_cell(LogicalBit::One)?;
/// let bus = reg.prepare_cell(LogicalBit::Zero)?;
/// let left = reg.allocate_cell()?;
/// let right = reg.allocate_cell()?;
/// let mut flag = FlagCarrier::new(NodeId::ROOT);
/// let mut faults = FaultPlan::none()
///     .inject(0, FaultSite::Window(Branch::Right), Fault::HookPhase(Branch::Right));
///
/// let outcome = FlaggedRouter::new()
///     .route(&mut reg, &mut faults, 0, &addr, bus, left, right, &mut flag)?;
/// assert_eq!(outcome.syndrome, Syndrome::Valid);
/// assert_eq!(outcome.flag, FlagOutcome::Raised);
/// assert_eq!(
///     decode(outcome.syndrome, outcome.flag),
///     Decision::Correct(Correction::LogicalPhase)
/// );
/// # Ok::<(), QramError>(())
/// ```
#[doc(hidden)]
const _: () = (); // Attaches the preceding doc comment block to a hidden item
