//! Walks through a three-level lookup, one routing circuit, and a query that
//! survives a hook fault and a failed transfer.
//!
//! Run with `RUST_LOG=drqram=debug` to see every routing and transport step.

use drqram::{
    Branch, Carrier, Fault, FaultPlan, FaultSite, FlaggedRouter, QramConfig, QramError, QramTree,
    QueryController, Rail, ReadoutMode, Register,
};
use tracing_subscriber::EnvFilter;

const PATTERN: [u8; 8] = [0, 0, 1, 1, 1, 0, 0, 1];

fn main() -> Result<(), QramError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("drqram=info")))
        .init();

    // 1. The routing circuit of a single node
    let mut reg = Register::new(0);
    let addr = reg.allocate_cell()?;
    let bus = reg.allocate_cell()?;
    let left = reg.allocate_cell()?;
    let right = reg.allocate_cell()?;
    let flag = reg.allocate()?;
    println!("Routing circuit:\n{}", FlaggedRouter::circuit(&addr, &bus, &left, &right, flag));

    // 2. Every address of a depth-3 memory, in both readout modes
    for readout in [ReadoutMode::Classical, ReadoutMode::PhaseOracle] {
        let config = QramConfig { readout, ..QramConfig::with_height(3) };
        let controller = QueryController::new(config, QramTree::from_bits(3, &PATTERN)?)?;
        let addresses: Vec<Vec<u8>> = (0..8u8).map(|leaf| vec![(leaf >> 2) & 1, (leaf >> 1) & 1, leaf & 1]).collect();
        let values: Vec<String> = controller
            .run_batch(&addresses)
            .into_iter()
            .map(|r| r.map(|q| q.leaf_value.map_or("-".to_string(), |v| v.to_string())))
            .collect::<Result<_, _>>()?;
        println!("{:?} readout: {}", readout, values.join(" "));
        println!("  pair usage: {:?}", controller.tree().total_pool_stats());
    }

    // 3. A query under faults
    let config = QramConfig { readout: ReadoutMode::PhaseOracle, ..QramConfig::with_height(3) };
    let controller = QueryController::new(config, QramTree::from_bits(3, &PATTERN)?)?;
    let mut faults = FaultPlan::none()
        .inject(1, FaultSite::Window(Branch::Right), Fault::HookPhase(Branch::Right))
        .inject(2, FaultSite::BeforeTeleport, Fault::BitFlip(Carrier::Bus(Rail::Rail0)));
    let result = controller.query_with_faults(&[0, 1, 1], &mut faults)?;
    println!("\nFaulty query [0, 1, 1]:");
    for step in &result.trace {
        println!(
            "  attempt {} depth {} {}: syndrome {:?}, flag {:?} -> {}",
            step.attempt, step.depth, step.node, step.syndrome, step.flag, step.decision
        );
    }
    println!(
        "  success={} value={:?} retries={} corrections={}",
        result.success, result.leaf_value, result.retries_used, result.corrections_applied
    );
    Ok(())
}
