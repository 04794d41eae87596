// tests/query_tests.rs

// End-to-end queries through the controller: routing across levels, readout
// modes, retry policy and batch execution.
use drqram::{
    AbortReason, Carrier, CellReading, Decision, Fault, FaultPlan, FaultSite, LogicalBit, NodeId, QramConfig,
    QramError, QramTree, QueryController, Rail, ReadoutMode, Syndrome,
};

const PATTERN: [u8; 8] = [0, 0, 1, 1, 1, 0, 0, 1];

// Helper building a controller over `bits` with default parameters
fn controller(bits: &[u8], config: QramConfig) -> Result<QueryController, QramError> {
    let tree = QramTree::from_bits(config.tree_height, bits)?;
    QueryController::new(config, tree)
}

// All addresses of a tree of `height`, most significant bit first
fn addresses(height: u32) -> Vec<Vec<u8>> {
    (0..1u64 << height)
        .map(|leaf| (0..height).rev().map(|bit| ((leaf >> bit) & 1) as u8).collect())
        .collect()
}

#[test]
fn test_depth_one_addresses() -> Result<(), QramError> {
    let ctl = controller(&[0, 1], QramConfig::with_height(1))?;

    let zero = ctl.query(&[0])?;
    assert!(zero.success);
    assert_eq!(zero.leaf, Some(0));
    assert_eq!(zero.trace.len(), 1);
    assert_eq!(zero.trace[0].syndrome, Some(Syndrome::Valid));
    assert_eq!(zero.trace[0].decision, Decision::Continue);

    let one = ctl.query(&[1])?;
    assert!(one.success);
    assert_eq!(one.leaf, Some(1), "address [1] must reach leaf 1");
    assert_eq!(one.leaf_value, Some(LogicalBit::One));
    Ok(())
}

#[test]
fn test_two_levels_address_one_zero_reaches_leaf_two() -> Result<(), QramError> {
    let ctl = controller(&[0, 0, 1, 0], QramConfig::with_height(2))?;
    let result = ctl.query(&[1, 0])?;
    assert!(result.success);
    assert_eq!(result.leaf, Some(2));
    assert_eq!(result.leaf_value, Some(LogicalBit::One));
    let nodes: Vec<NodeId> = result.trace.iter().map(|s| s.node).collect();
    assert_eq!(nodes, vec![NodeId::ROOT, NodeId::ROOT.right()]);
    Ok(())
}

#[test]
fn test_data_pattern_in_both_readout_modes() -> Result<(), QramError> {
    for readout in [ReadoutMode::Classical, ReadoutMode::PhaseOracle] {
        let ctl = controller(&PATTERN, QramConfig { readout, ..QramConfig::with_height(3) })?;
        for (leaf, address) in addresses(3).iter().enumerate() {
            let result = ctl.query(address)?;
            assert!(result.success, "{:?} failed in {:?} mode", address, readout);
            assert_eq!(result.leaf, Some(leaf as u64));
            let expected = LogicalBit::try_from(PATTERN[leaf]).map_err(|_| QramError::InvalidQuery {
                message: "pattern".to_string(),
            })?;
            assert_eq!(result.leaf_value, Some(expected), "{:?} in {:?} mode", address, readout);
            assert_eq!(result.final_reading, Some(CellReading::Logical(expected)));
            assert!(result.trace.iter().all(|s| s.decision == Decision::Continue));
        }
    }
    Ok(())
}

#[test]
fn test_hook_is_corrected_in_phase_readout() -> Result<(), QramError> {
    // The hook at depth 1 is caught and corrected; the answer stays right.
    let ctl = controller(&PATTERN, QramConfig { readout: ReadoutMode::PhaseOracle, ..QramConfig::with_height(3) })?;
    let mut faults = FaultPlan::none().inject(
        1,
        FaultSite::Window(drqram::Branch::Right),
        Fault::HookPhase(drqram::Branch::Right),
    );
    let result = ctl.query_with_faults(&[0, 1, 1], &mut faults)?;
    assert!(result.success);
    assert_eq!(result.retries_used, 0);
    assert_eq!(result.corrections_applied, 1);
    assert_eq!(result.leaf_value, Some(LogicalBit::One));
    Ok(())
}

#[test]
fn test_transport_failure_is_retried() -> Result<(), QramError> {
    let ctl = controller(&PATTERN, QramConfig::with_height(3))?;
    let mut faults =
        FaultPlan::none().inject(2, FaultSite::BeforeTeleport, Fault::BitFlip(Carrier::Bus(Rail::Rail0)));
    let result = ctl.query_with_faults(&[1, 1, 1], &mut faults)?;
    assert!(result.success);
    assert_eq!(result.retries_used, 1);
    assert_eq!(result.leaf_value, Some(LogicalBit::One));
    let aborted = &result.trace[2];
    assert_eq!(aborted.depth, 2);
    assert_eq!(aborted.syndrome, None);
    assert_eq!(aborted.decision, Decision::Abort(AbortReason::TransportFailure));
    Ok(())
}

#[test]
fn test_invalid_address_cell_aborts() -> Result<(), QramError> {
    let ctl = controller(&[1, 0], QramConfig { retry_budget: 0, ..QramConfig::with_height(1) })?;
    let mut faults =
        FaultPlan::none().inject(0, FaultSite::AddressLoad, Fault::Relaxation(Carrier::Address(Rail::Rail1)));
    let result = ctl.query_with_faults(&[0], &mut faults)?;
    assert!(!result.success);
    assert_eq!(result.abort_reason, Some(AbortReason::AddressInvalid));
    assert_eq!(result.leaf_value, None);
    Ok(())
}

#[test]
fn test_exhausted_budget_reports_dominant_reason() -> Result<(), QramError> {
    let ctl = controller(&[0, 1, 1, 0], QramConfig { retry_budget: 2, ..QramConfig::with_height(2) })?;
    // Address [0, 0] keeps logical 0 (rail1) in the left destination.
    let mut faults = FaultPlan::none()
        .inject(0, FaultSite::AfterRouting, Fault::Relaxation(Carrier::Left(Rail::Rail1)))
        .inject(1, FaultSite::BeforeTeleport, Fault::BitFlip(Carrier::Bus(Rail::Rail0)))
        .inject(1, FaultSite::AfterRouting, Fault::Relaxation(Carrier::Left(Rail::Rail1)));
    let result = ctl.query_with_faults(&[0, 0], &mut faults)?;
    assert!(!result.success);
    assert_eq!(result.retries_used, 2);
    assert_eq!(result.abort_reason, Some(AbortReason::Erasure));
    let decisions: Vec<Decision> = result.trace.iter().filter(|s| s.depth == 1 || s.attempt == 0).map(|s| s.decision).collect();
    assert_eq!(
        decisions,
        vec![
            Decision::Abort(AbortReason::Erasure),
            Decision::Abort(AbortReason::TransportFailure),
            Decision::Abort(AbortReason::Erasure),
        ]
    );
    assert!(faults.is_empty());
    Ok(())
}

#[test]
fn test_dominant_reason_tie_goes_to_latest() -> Result<(), QramError> {
    let ctl = controller(&[0, 1, 1, 0], QramConfig { retry_budget: 1, ..QramConfig::with_height(2) })?;
    let mut faults = FaultPlan::none()
        .inject(0, FaultSite::AfterRouting, Fault::Relaxation(Carrier::Left(Rail::Rail1)))
        .inject(1, FaultSite::BeforeTeleport, Fault::BitFlip(Carrier::Bus(Rail::Rail0)));
    let result = ctl.query_with_faults(&[0, 0], &mut faults)?;
    assert!(!result.success);
    assert_eq!(result.retries_used, 1);
    assert_eq!(result.abort_reason, Some(AbortReason::TransportFailure));
    Ok(())
}

#[test]
fn test_batch_matches_sequential_queries() -> Result<(), QramError> {
    let ctl = controller(&PATTERN, QramConfig::with_height(3))?;
    let batch = addresses(3);
    let results = ctl.run_batch(&batch);
    assert_eq!(results.len(), batch.len());
    for (address, result) in batch.iter().zip(results) {
        assert_eq!(result?, ctl.query(address)?);
    }
    // 16 queries, 3 transfers each, 2 rails, 2 raw pairs per distilled pair.
    let stats = ctl.tree().total_pool_stats();
    assert_eq!(stats.deliveries, 48);
    assert_eq!(stats.raw_pairs, 48 * 4);
    assert_eq!(stats.distillation_failures, 0);
    Ok(())
}

#[test]
fn test_result_serializes() -> Result<(), QramError> {
    let ctl = controller(&[0, 1], QramConfig::with_height(1))?;
    let result = ctl.query(&[1])?;
    let json = serde_json::to_string(&result).map_err(|e| QramError::InvalidQuery { message: e.to_string() })?;
    assert!(json.contains("\"success\":true"));
    assert!(json.contains("\"retries_used\":0"));
    Ok(())
}
