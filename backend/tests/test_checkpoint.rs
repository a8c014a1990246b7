//! Checkpoint Tests - Save/Load Simulation State
//!
//! Critical invariants tested:
//! - Determinism: Restored simulation produces identical results
//! - Mass conservation: water held and in flight preserved across save/load
//! - Inbox integrity: queued transfers survive intact
//! - Config matching: Reject state from different config

use hydro_simulator_core_rs::orchestrator::StateSnapshot;
use hydro_simulator_core_rs::topology::{random_topology, RandomTopologyConfig};
use hydro_simulator_core_rs::{
    ElementId, ExecutionMode, HostId, Orchestrator, OrchestratorConfig, PhysicsConfig,
    SimulationError, ViolationPolicy,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn create_config(seed: u64) -> OrchestratorConfig {
    OrchestratorConfig {
        simulation_end_time: 50.0,
        sync_interval: Some(10.0),
        num_hosts: 2,
        execution: ExecutionMode::Inline,
        violation_policy: Some(ViolationPolicy::Abort),
        max_ticks: Some(10_000),
        topology: random_topology(&RandomTopologyConfig {
            num_elements: 20,
            seed,
            ..Default::default()
        })
        .unwrap(),
        physics: PhysicsConfig::Random {
            seed,
            max_rate: 1.0,
            min_duration: 0.5,
            max_duration: 4.0,
        },
    }
}

fn create_test_orchestrator(seed: u64, ticks: usize) -> Orchestrator {
    let mut orchestrator = Orchestrator::new(create_config(seed)).unwrap();
    for _ in 0..ticks {
        orchestrator.tick().unwrap();
    }
    orchestrator
}

// ============================================================================
// Save State
// ============================================================================

#[test]
fn test_save_state_includes_all_required_fields() {
    let mut orchestrator = create_test_orchestrator(42, 3);
    let state_json = orchestrator.save_state().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&state_json).unwrap();

    assert!(parsed["run_id"].is_string(), "Missing run_id");
    assert_eq!(parsed["current_tick"], 3);
    assert!(parsed["next_sync_point"].is_number());
    assert!(parsed["initial_material"].is_number());
    assert_eq!(parsed["elements"].as_array().unwrap().len(), 20);
    assert_eq!(parsed["placements"].as_array().unwrap().len(), 20);
    assert!(parsed["config_hash"].is_string(), "Missing config_hash");

    let element = &parsed["elements"][0];
    assert!(element["neighbors"][0]["incoming_material"].is_array());
    assert!(element["neighbors"][0]["cumulative_flow"].is_number());
}

// ============================================================================
// Load State
// ============================================================================

#[test]
fn test_load_state_restores_exact_state() {
    let mut original = create_test_orchestrator(42, 10);
    let state_json = original.save_state().unwrap();

    let mut restored = Orchestrator::load_state(create_config(42), &state_json).unwrap();

    assert_eq!(restored.run_id(), original.run_id());
    assert_eq!(restored.current_tick(), original.current_tick());
    assert_eq!(restored.next_sync_point(), original.next_sync_point());
    assert_eq!(restored.elements().unwrap(), original.elements().unwrap());
    assert_eq!(restored.mass_balance().unwrap(), original.mass_balance().unwrap());
    restored.check_invariants().unwrap();
}

#[test]
fn test_determinism_after_restore() {
    let mut original = create_test_orchestrator(7, 25);
    let state_json = original.save_state().unwrap();

    // Execution mode is free to change between runs
    let mut config = create_config(7);
    config.execution = ExecutionMode::Threaded;
    let mut restored = Orchestrator::load_state(config, &state_json).unwrap();

    let a = original.run().unwrap();
    let b = restored.run().unwrap();
    assert_eq!(a.ticks, b.ticks);
    assert_eq!(a.mass_balance, b.mass_balance);
    assert_eq!(original.elements().unwrap(), restored.elements().unwrap());
}

#[test]
fn test_in_flight_material_survives_round_trip() {
    let mut original = create_test_orchestrator(3, 1);
    let in_flight = original.mass_balance().unwrap().in_flight;

    let state_json = original.save_state().unwrap();
    let snapshot: StateSnapshot = serde_json::from_str(&state_json).unwrap();
    let queued: f64 = snapshot
        .elements
        .iter()
        .map(|e| e.material_in_flight())
        .sum();
    assert!((queued - in_flight).abs() < 1e-9);

    let mut restored = Orchestrator::load_state(create_config(3), &state_json).unwrap();
    assert_eq!(restored.mass_balance().unwrap().in_flight, in_flight);
}

#[test]
fn test_placements_are_restored() {
    let mut original = create_test_orchestrator(11, 2);
    original.migrate(ElementId(0), HostId(1)).unwrap();
    let state_json = original.save_state().unwrap();

    let restored = Orchestrator::load_state(create_config(11), &state_json).unwrap();
    assert_eq!(
        restored.directory().host_of(ElementId(0)),
        Some(HostId(1))
    );
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn test_config_mismatch_rejected() {
    let mut orchestrator = create_test_orchestrator(42, 1);
    let state_json = orchestrator.save_state().unwrap();

    let result = Orchestrator::load_state(create_config(99999), &state_json);
    assert!(matches!(result, Err(SimulationError::ConfigMismatch { .. })));

    let mut more_hosts = create_config(42);
    more_hosts.num_hosts = 3;
    assert!(matches!(
        Orchestrator::load_state(more_hosts, &state_json),
        Err(SimulationError::ConfigMismatch { .. })
    ));
}

#[test]
fn test_corrupted_state_json_rejected() {
    let corrupted_json = r#"{"current_tick": "not_a_number"}"#;
    assert!(matches!(
        Orchestrator::load_state(create_config(42), corrupted_json),
        Err(SimulationError::DeserializationError(_))
    ));
}

#[test]
fn test_tampered_material_rejected() {
    let mut orchestrator = create_test_orchestrator(42, 4);
    let state_json = orchestrator.save_state().unwrap();

    let mut snapshot: StateSnapshot = serde_json::from_str(&state_json).unwrap();
    snapshot.elements[0].material += 10.0;
    let tampered = serde_json::to_string(&snapshot).unwrap();

    assert!(matches!(
        Orchestrator::load_state(create_config(42), &tampered),
        Err(SimulationError::StateValidationError(_))
    ));
}

#[test]
fn test_asymmetric_link_rejected() {
    let mut orchestrator = create_test_orchestrator(42, 4);
    let state_json = orchestrator.save_state().unwrap();

    let mut snapshot: StateSnapshot = serde_json::from_str(&state_json).unwrap();
    snapshot.elements[0].neighbors[0].nominal_flow_rate += 0.5;
    let tampered = serde_json::to_string(&snapshot).unwrap();

    assert!(matches!(
        Orchestrator::load_state(create_config(42), &tampered),
        Err(SimulationError::Protocol(_))
    ));
}

// ============================================================================
// Multiple Seeds
// ============================================================================

#[test]
fn test_save_load_roundtrip_preserves_state_multiple_seeds() {
    for seed in [1, 2, 3, 4, 5] {
        let mut original = create_test_orchestrator(seed, 15);
        let state_json = original.save_state().unwrap();
        let mut restored = Orchestrator::load_state(create_config(seed), &state_json).unwrap();

        assert_eq!(
            restored.elements().unwrap(),
            original.elements().unwrap(),
            "seed {seed}"
        );
        // A second save of the restored run is byte-identical
        assert_eq!(restored.save_state().unwrap(), state_json, "seed {seed}");
    }
}
