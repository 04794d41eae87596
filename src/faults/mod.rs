// src/faults/mod.rs

//! Deterministic fault injection.
//!
//! A [`FaultPlan`] schedules single physical faults at named checkpoints of
//! the routing and transport circuits. Each scheduled fault fires once and is
//! then consumed, so a query that aborts and restarts sees a clean substrate
//! on its next attempt unless the plan scheduled further faults.

use crate::core::{DualRailCell, QramError, QubitId, Rail};
use crate::router::Branch;
use crate::simulation::Register;
use std::fmt;

/// Named point inside a routing or transport step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultSite {
    /// Router: after the destination pre-check, before the address pre-check.
    AddressLoad,
    /// Router: after the pre-checks, before the first branch.
    BeforeRouting,
    /// Router: inside a branch's flag window, after the transfer and before
    /// the flag is disentangled.
    Window(Branch),
    /// Router: after both branches, before the joint post-check.
    AfterRouting,
    /// Transport: right after a raw pair for `rail` is prepared.
    PairPreparation(Rail),
    /// Transport: after distillation, before the teleport.
    BeforeTeleport,
    /// Transport: after the teleport corrections, before the arrival check.
    AfterTeleport,
}

impl fmt::Display for FaultSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultSite::AddressLoad => write!(f, "address-load"),
            FaultSite::BeforeRouting => write!(f, "before-routing"),
            FaultSite::Window(branch) => write!(f, "{}-window", branch),
            FaultSite::AfterRouting => write!(f, "after-routing"),
            FaultSite::PairPreparation(rail) => write!(f, "pair-prep-{}", rail),
            FaultSite::BeforeTeleport => write!(f, "before-teleport"),
            FaultSite::AfterTeleport => write!(f, "after-teleport"),
        }
    }
}

/// Role of a carrier within the step that is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Carrier {
    Address(Rail),
    Bus(Rail),
    Left(Rail),
    Right(Rail),
    Flag,
    /// Source half of the pair serving `rail`.
    PairSource(Rail),
    /// Destination half of the pair serving `rail`.
    PairTarget(Rail),
    /// Delivered cell at the destination node.
    Arrival(Rail),
}

/// The covered fault classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Pauli X on one carrier.
    BitFlip(Carrier),
    /// Loss of the excitation on one carrier (a quantum jump to inactive).
    /// Acting on a carrier that is inactive in every branch has no effect.
    Relaxation(Carrier),
    /// Phase kickback from the address/flag system during a branch's flag
    /// window, as an effective propagated error rather than a gate-level
    /// fault: the flag is flipped, and `rail0` of the bus and of both
    /// destinations picks up a phase flip conditioned on the branch's address
    /// rail. Only one of those cells holds the data, so in the branch that
    /// opened the window the net effect is a logical phase flip on the data;
    /// in the idle window only the flag is disturbed.
    ///
    /// Which fault timings the flag can tell apart depends on the gate
    /// decomposition; this model covers single faults on the address/flag
    /// system inside the window and nothing more.
    HookPhase(Branch),
}

impl Fault {
    /// Applies the fault. Returns `false` when it had no physical effect,
    /// which only happens for relaxation of an inactive carrier.
    pub(crate) fn apply(&self, register: &mut Register, carriers: &CarrierMap) -> Result<bool, QramError> {
        match *self {
            Fault::BitFlip(carrier) => register.flip(carriers.require(carrier)?).map(|_| true),
            Fault::Relaxation(carrier) => register.relax(carriers.require(carrier)?),
            Fault::HookPhase(branch) => {
                register.flip(carriers.require(Carrier::Flag)?)?;
                let control = carriers.require(Carrier::Address(branch.control_rail()))?;
                for holder in [Carrier::Bus(Rail::Rail0), Carrier::Left(Rail::Rail0), Carrier::Right(Rail::Rail0)] {
                    register.controlled_phase_flip(control, carriers.require(holder)?)?;
                }
                Ok(true)
            }
        }
    }
}

/// Binding of carrier roles to register carriers at a checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CarrierMap {
    entries: Vec<(Carrier, QubitId)>,
}

impl CarrierMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, carrier: Carrier, qubit: QubitId) {
        self.entries.retain(|(c, _)| *c != carrier);
        self.entries.push((carrier, qubit));
    }

    /// Binds both rails of `cell` under the role produced by `role`.
    pub fn bind_cell(&mut self, role: fn(Rail) -> Carrier, cell: &DualRailCell) {
        for rail in Rail::BOTH {
            self.bind(role(rail), cell.rail(rail));
        }
    }

    pub fn get(&self, carrier: Carrier) -> Option<QubitId> {
        self.entries.iter().find(|(c, _)| *c == carrier).map(|(_, q)| *q)
    }

    fn require(&self, carrier: Carrier) -> Result<QubitId, QramError> {
        self.get(carrier).ok_or_else(|| QramError::InvalidOperation {
            message: format!("fault targets {:?}, which is not present at this checkpoint", carrier),
        })
    }
}

/// A fault bound to the tree depth and checkpoint where it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledFault {
    pub depth: u32,
    pub site: FaultSite,
    pub fault: Fault,
}

/// A scheduled fault that has fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredFault {
    pub scheduled: ScheduledFault,
    /// False if the fault found nothing to act on.
    pub effective: bool,
}

/// One-shot schedule of injected faults for a query.
///
/// ```
/// use drqram::faults::{Carrier, Fault, FaultPlan, FaultSite};
/// use drqram::core::Rail;
///
/// let plan = FaultPlan::none()
///     .inject(0, FaultSite::AfterRouting, Fault::Relaxation(Carrier::Left(Rail::Rail1)));
/// assert_eq!(plan.pending(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    scheduled: Vec<ScheduledFault>,
    fired: Vec<FiredFault>,
}

impl FaultPlan {
    /// A plan that never injects anything.
    pub fn none() -> Self {
        Self::default()
    }

    /// Schedules `fault` at `site` of the step at tree `depth`.
    pub fn inject(mut self, depth: u32, site: FaultSite, fault: Fault) -> Self {
        self.scheduled.push(ScheduledFault { depth, site, fault });
        self
    }

    /// Number of faults that have not fired yet.
    pub fn pending(&self) -> usize {
        self.scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }

    /// Faults that have fired so far, in firing order.
    pub fn fired(&self) -> &[FiredFault] {
        &self.fired
    }

    /// Removes and returns the faults due at `(depth, site)`.
    ///
    /// Pair-preparation checkpoints are reached once per raw pair; only the
    /// first scheduled fault fires at each visit so that repeated scheduling
    /// corrupts successive pairs.
    pub(crate) fn take(&mut self, depth: u32, site: FaultSite) -> Vec<Fault> {
        if matches!(site, FaultSite::PairPreparation(_)) {
            return match self.scheduled.iter().position(|s| s.depth == depth && s.site == site) {
                Some(pos) => vec![self.scheduled.remove(pos).fault],
                None => Vec::new(),
            };
        }
        let (due, rest): (Vec<_>, Vec<_>) =
            self.scheduled.drain(..).partition(|s| s.depth == depth && s.site == site);
        self.scheduled = rest;
        due.into_iter().map(|s| s.fault).collect()
    }

    /// Fires every fault due at `(depth, site)` against `register`.
    pub(crate) fn fire(
        &mut self,
        depth: u32,
        site: FaultSite,
        register: &mut Register,
        carriers: &CarrierMap,
    ) -> Result<(), QramError> {
        for fault in self.take(depth, site) {
            let effective = fault.apply(register, carriers)?;
            tracing::debug!(depth, %site, ?fault, effective, "injected fault");
            self.fired.push(FiredFault { scheduled: ScheduledFault { depth, site, fault }, effective });
        }
        Ok(())
    }
}
