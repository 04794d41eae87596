// tests/router_tests.rs

// Routing-step properties: conservation, move semantics, superposed
// addresses, single-fault detection and hook correction.
use drqram::{
    check_conservation, decode, decode_routed, is_cleared, AbortReason, Branch, Carrier, CellReading, Correction,
    Decision, DualRailCell, Fault, FaultPlan, FaultSite, FlagCarrier, FlagOutcome, FlaggedRouter, LogicalBit,
    NodeId, QramError, QubitId, Rail, Register, RouteOutcome, Syndrome,
};
use proptest::prelude::*;

const BITS: [LogicalBit; 2] = [LogicalBit::Zero, LogicalBit::One];

// Helper holding everything one routing step needs
struct Step {
    reg: Register,
    addr: DualRailCell,
    outcome: Result<RouteOutcome, QramError>,
    faults: FaultPlan,
}

fn run_step(seed: u64, address: LogicalBit, data: LogicalBit, superposed_bus: bool, mut faults: FaultPlan) -> Result<Step, QramError> {
    let mut reg = Register::new(seed);
    let addr = reg.prepare_cell(address)?;
    let bus = reg.prepare_cell(data)?;
    if superposed_bus {
        reg.logical_hadamard(&bus)?;
    }
    let left = reg.allocate_cell()?;
    let right = reg.allocate_cell()?;
    let mut flag = FlagCarrier::new(NodeId::ROOT);
    let outcome = FlaggedRouter::new().route(&mut reg, &mut faults, 0, &addr, bus, left, right, &mut flag);
    Ok(Step { reg, addr, outcome, faults })
}

// The fault classes whose single occurrence must be heralded
fn covered_faults() -> Vec<(FaultSite, Fault)> {
    let mut faults = Vec::new();
    let sites = [
        FaultSite::AddressLoad,
        FaultSite::BeforeRouting,
        FaultSite::Window(Branch::Right),
        FaultSite::Window(Branch::Left),
        FaultSite::AfterRouting,
    ];
    let roles: [fn(Rail) -> Carrier; 4] = [Carrier::Address, Carrier::Bus, Carrier::Left, Carrier::Right];
    for site in sites {
        for role in roles {
            for rail in Rail::BOTH {
                faults.push((site, Fault::BitFlip(role(rail))));
                faults.push((site, Fault::Relaxation(role(rail))));
            }
        }
    }
    for branch in [Branch::Right, Branch::Left] {
        let site = FaultSite::Window(branch);
        faults.push((site, Fault::HookPhase(branch)));
        faults.push((site, Fault::BitFlip(Carrier::Flag)));
        faults.push((site, Fault::Relaxation(Carrier::Flag)));
    }
    faults
}

fn is_active(label: u64, qubit: QubitId) -> bool {
    label & (1u64 << qubit.0) != 0
}

// Address in (|0>_L + |1>_L)/sqrt(2), bus holding logical 1
fn run_superposed_address(faults: &mut FaultPlan) -> Result<(Register, DualRailCell, usize, RouteOutcome), QramError> {
    let mut reg = Register::new(5);
    let addr = reg.prepare_cell(LogicalBit::Zero)?;
    reg.logical_hadamard(&addr)?;
    let bus = reg.prepare_cell(LogicalBit::One)?;
    let left = reg.allocate_cell()?;
    let right = reg.allocate_cell()?;
    let support = reg.state().support();
    let mut flag = FlagCarrier::new(NodeId::ROOT);
    let outcome = FlaggedRouter::new().route(&mut reg, faults, 0, &addr, bus, left, right, &mut flag)?;
    Ok((reg, addr, support, outcome))
}

#[test]
fn test_scenario_address_zero_routes_left() -> Result<(), QramError> {
    let step = run_step(1, LogicalBit::Zero, LogicalBit::Zero, false, FaultPlan::none())?;
    let outcome = step.outcome?;
    assert_eq!(outcome.syndrome, Syndrome::Valid);
    assert_eq!(outcome.flag, FlagOutcome::Clear);
    assert_eq!(decode(outcome.syndrome, outcome.flag), Decision::Continue);
    let mut reg = step.reg;
    assert_eq!(reg.retire_cell(outcome.left)?, CellReading::Logical(LogicalBit::Zero));
    assert_eq!(reg.retire_cell(outcome.right)?, CellReading::Erasure);
    Ok(())
}

#[test]
fn test_scenario_address_one_routes_right() -> Result<(), QramError> {
    let step = run_step(1, LogicalBit::One, LogicalBit::Zero, false, FaultPlan::none())?;
    let outcome = step.outcome?;
    assert_eq!(outcome.syndrome, Syndrome::Valid);
    assert_eq!(outcome.flag, FlagOutcome::Clear);
    assert_eq!(outcome.branch_flags.left, FlagOutcome::Clear);
    assert_eq!(outcome.branch_flags.right, FlagOutcome::Clear);
    let mut reg = step.reg;
    assert_eq!(reg.retire_cell(outcome.right)?, CellReading::Logical(LogicalBit::Zero));
    assert_eq!(reg.retire_cell(outcome.left)?, CellReading::Erasure, "data must not be copied");
    Ok(())
}

#[test]
fn test_scenario_relaxation_mid_route_aborts_with_erasure() -> Result<(), QramError> {
    // Bus holds logical 0 (rail1 active) while the right window is open.
    let faults = FaultPlan::none().inject(0, FaultSite::Window(Branch::Right), Fault::Relaxation(Carrier::Bus(Rail::Rail1)));
    let step = run_step(2, LogicalBit::Zero, LogicalBit::Zero, false, faults)?;
    let outcome = step.outcome?;
    assert_eq!(outcome.syndrome, Syndrome::Erasure);
    assert_eq!(decode(outcome.syndrome, outcome.flag), Decision::Abort(AbortReason::Erasure));
    Ok(())
}

#[test]
fn test_scenario_hook_fault_is_corrected_exactly() -> Result<(), QramError> {
    for address in BITS {
        for branch in [Branch::Right, Branch::Left] {
            let clean = run_step(3, address, LogicalBit::Zero, true, FaultPlan::none())?;
            let faults = FaultPlan::none().inject(0, FaultSite::Window(branch), Fault::HookPhase(branch));
            let faulty = run_step(3, address, LogicalBit::Zero, true, faults)?;

            assert!(clean.outcome.is_ok());
            let outcome = faulty.outcome?;
            assert_eq!(outcome.syndrome, Syndrome::Valid);
            assert_eq!(outcome.flag, FlagOutcome::Raised);
            assert_eq!(decode(outcome.syndrome, outcome.flag), Decision::Correct(Correction::LogicalPhase));

            let taken = Branch::for_bit(address);
            let decision = decode_routed(outcome.syndrome, &outcome.branch_flags, taken);
            let mut reg = faulty.reg;
            let (routed, _) = outcome.take(taken);
            if branch == taken {
                assert_eq!(decision, Decision::Correct(Correction::LogicalPhase));
                assert!(
                    !reg.state().approx_eq(clean.reg.state(), 1e-9),
                    "the hook fault must leave a phase error on the data"
                );
                Correction::LogicalPhase.apply(&mut reg, &routed)?;
            } else {
                // The idle window's hook has no data to act on.
                assert_eq!(decision, Decision::Continue);
            }
            assert!(
                reg.state().approx_eq(clean.reg.state(), 1e-12),
                "corrected state differs from the fault-free one (address {}, {} window)",
                address,
                branch
            );
        }
    }
    Ok(())
}

#[test]
fn test_single_faults_are_never_silent() -> Result<(), QramError> {
    let mut checked = 0;
    for address in BITS {
        for data in BITS {
            for (site, fault) in covered_faults() {
                let step = run_step(4, address, data, false, FaultPlan::none().inject(0, site, fault))?;
                if !step.faults.fired().iter().any(|f| f.effective) {
                    // Relaxation of a carrier that held nothing.
                    continue;
                }
                checked += 1;
                match step.outcome {
                    Err(QramError::AddressInvalid { .. }) => {}
                    Err(other) => panic!("{:?} at {} raised an unexpected error: {}", fault, site, other),
                    Ok(outcome) => assert!(
                        !(outcome.syndrome == Syndrome::Valid && outcome.flag == FlagOutcome::Clear),
                        "{:?} at {} went unheralded (address {}, data {})",
                        fault,
                        site,
                        address,
                        data
                    ),
                }
            }
        }
    }
    assert!(checked > 100, "only {} effective faults exercised", checked);
    Ok(())
}

#[test]
fn test_superposed_address_routes_both_branches() -> Result<(), QramError> {
    let (reg, addr, support, outcome) = run_superposed_address(&mut FaultPlan::none())?;
    assert_eq!(outcome.syndrome, Syndrome::Valid);
    assert_eq!(outcome.flag, FlagOutcome::Clear);
    assert_eq!(reg.state().support(), support, "routing must not collapse the address");

    for (label, _) in reg.state().iter() {
        let (taken, idle) =
            if is_active(label, addr.rail0()) { (&outcome.right, &outcome.left) } else { (&outcome.left, &outcome.right) };
        assert!(is_active(label, taken.rail0()) && !is_active(label, taken.rail1()), "data missing in branch {:#b}", label);
        for q in idle.qubits().into_iter().chain(outcome.bus.qubits()) {
            assert!(!is_active(label, q), "{} still active in branch {:#b}", q, label);
        }
    }
    Ok(())
}

#[test]
fn test_superposed_address_flip_after_routing_aborts() -> Result<(), QramError> {
    let mut faults =
        FaultPlan::none().inject(0, FaultSite::AfterRouting, Fault::BitFlip(Carrier::Right(Rail::Rail1)));
    let (_, _, _, outcome) = run_superposed_address(&mut faults)?;
    // Both branches end with two excitations on the outputs.
    assert_eq!(outcome.syndrome, Syndrome::Violation);
    assert_eq!(decode(outcome.syndrome, outcome.flag), Decision::Abort(AbortReason::Violation));
    Ok(())
}

proptest! {
    #[test]
    fn fault_free_routing_moves_and_conserves(
        seed in any::<u64>(),
        address in prop_oneof![Just(LogicalBit::Zero), Just(LogicalBit::One)],
        data in prop_oneof![Just(LogicalBit::Zero), Just(LogicalBit::One)],
        superposed in any::<bool>(),
    ) {
        let step = run_step(seed, address, data, superposed, FaultPlan::none()).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let outcome = step.outcome.map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(outcome.syndrome, Syndrome::Valid);
        prop_assert_eq!(outcome.flag, FlagOutcome::Clear);

        let (routed, [other, bus]) = outcome.take(Branch::for_bit(address));
        prop_assert!(check_conservation(&step.reg, &routed).is_ok());
        prop_assert!(check_conservation(&step.reg, &step.addr).is_ok());
        prop_assert!(is_cleared(&step.reg, &other.qubits()));
        prop_assert!(is_cleared(&step.reg, &bus.qubits()));
        let all = [bus.qubits(), other.qubits(), routed.qubits()].concat();
        prop_assert_eq!(step.reg.definite_excitations(&all), Some(1));
    }
}
