//! Checkpoint - Save/Load Simulation State
//!
//! Enables serialization and deserialization of complete orchestrator state
//! for pause/resume functionality.
//!
//! # Critical Invariants
//!
//! - **Mass Balance**: Σ material + Σ queued = initial + created − destroyed
//! - **Placement Integrity**: every element lives on exactly one known host
//! - **Reciprocity**: restored proxy pairs agree on rate and expiration
//! - **Config Matching**: State can only be loaded with matching config

use crate::models::element::Element;
use crate::models::id::ElementId;
use crate::models::ledger::MassLedger;
use crate::models::neighbor::{NeighborKind, NeighborProxy};
use crate::models::simple_proxy::SimpleNeighborProxy;
use crate::models::transfer::MaterialTransfer;
use crate::orchestrator::directory::HostId;
use crate::orchestrator::engine::{SimulationError, CONSERVATION_TOLERANCE};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use uuid::Uuid;

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Complete orchestrator state snapshot
///
/// Captures all state necessary to resume a run between ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub run_id: Uuid,

    /// Next tick to execute
    pub current_tick: u64,

    pub next_sync_point: f64,

    pub sync_points_reached: u64,

    /// Water present at the start of the run
    pub initial_material: f64,

    /// All element states, ordered by ID
    pub elements: Vec<ElementSnapshot>,

    /// Host owning each element at the time of the snapshot
    pub placements: Vec<ElementPlacement>,

    /// SHA256 hash of original config (for validation)
    pub config_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementPlacement {
    pub element: ElementId,
    pub host: HostId,
}

/// Element state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub id: ElementId,
    pub current_time: f64,
    pub timestep_end_time: f64,
    pub material: f64,
    pub created: f64,
    pub destroyed: f64,
    pub neighbors: Vec<NeighborSnapshot>,
}

/// Neighbor proxy snapshot, inbox included
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborSnapshot {
    pub neighbor: ElementId,
    pub reciprocal_index: usize,
    pub kind: NeighborKind,
    pub inflow_only: bool,
    pub neighbor_inflow_only: bool,
    pub expiration_time: f64,
    pub nominal_flow_rate: f64,
    pub incoming_material: Vec<MaterialTransfer>,
    pub flow_cumulative_short_term: f64,
    pub flow_cumulative_long_term: f64,
    /// Sum of both parts (read-only, ignored on restore)
    pub cumulative_flow: f64,
}

impl ElementSnapshot {
    /// Water still queued in this element's inboxes
    pub fn material_in_flight(&self) -> f64 {
        self.neighbors
            .iter()
            .flat_map(|n| n.incoming_material.iter())
            .map(|t| t.material())
            .sum()
    }

    /// Rebuild the element; the inbox is re-inserted and re-checked
    pub fn into_element(self, simulation_end_time: f64) -> Result<Element, SimulationError> {
        let id = self.id;
        let neighbors = self
            .neighbors
            .into_iter()
            .map(|n| {
                let link = NeighborProxy::from_parts(
                    n.neighbor,
                    n.reciprocal_index,
                    n.kind,
                    n.inflow_only,
                    n.neighbor_inflow_only,
                    n.expiration_time,
                    n.nominal_flow_rate,
                );
                SimpleNeighborProxy::from_parts(
                    link,
                    n.incoming_material,
                    n.flow_cumulative_short_term,
                    n.flow_cumulative_long_term,
                )
                .map_err(|e| {
                    SimulationError::StateValidationError(format!(
                        "Inbox of {} for {} is corrupt: {}",
                        id, n.neighbor, e
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Element::from_parts(
            id,
            self.current_time,
            self.timestep_end_time,
            simulation_end_time,
            self.material,
            neighbors,
            MassLedger::from_parts(self.created, self.destroyed),
        ))
    }
}

impl From<&Element> for ElementSnapshot {
    fn from(element: &Element) -> Self {
        ElementSnapshot {
            id: element.id(),
            current_time: element.current_time(),
            timestep_end_time: element.timestep_end_time(),
            material: element.material(),
            created: element.ledger().created(),
            destroyed: element.ledger().destroyed(),
            neighbors: element.neighbors().iter().map(NeighborSnapshot::from).collect(),
        }
    }
}

impl From<&SimpleNeighborProxy> for NeighborSnapshot {
    fn from(proxy: &SimpleNeighborProxy) -> Self {
        NeighborSnapshot {
            neighbor: proxy.neighbor(),
            reciprocal_index: proxy.reciprocal_index(),
            kind: proxy.kind(),
            inflow_only: proxy.inflow_only(),
            neighbor_inflow_only: proxy.link().neighbor_inflow_only(),
            expiration_time: proxy.expiration_time(),
            nominal_flow_rate: proxy.nominal_flow_rate(),
            incoming_material: proxy.incoming_material().copied().collect(),
            flow_cumulative_short_term: proxy.flow_cumulative_short_term(),
            flow_cumulative_long_term: proxy.flow_cumulative_long_term(),
            cumulative_flow: proxy.cumulative_flow(),
        }
    }
}

// ============================================================================
// Config Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of config
///
/// This hash is used to verify that a checkpoint's config matches
/// the config used to restore it.
///
/// Uses canonical JSON serialization with sorted keys to ensure
/// deterministic hashing regardless of map iteration order.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(config).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    // Recursively sort all object keys for canonical representation
    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validate state snapshot integrity
///
/// Checks:
/// - Mass balance against the recorded initial material and ledgers
/// - Element uniqueness
/// - Every element placed exactly once on a host below `num_hosts`
pub fn validate_snapshot(snapshot: &StateSnapshot, num_hosts: usize) -> Result<(), SimulationError> {
    // 1. Mass balance
    let held: f64 = snapshot
        .elements
        .iter()
        .map(|e| e.material + e.material_in_flight())
        .sum();
    let created: f64 = snapshot.elements.iter().map(|e| e.created).sum();
    let destroyed: f64 = snapshot.elements.iter().map(|e| e.destroyed).sum();
    let expected = snapshot.initial_material + created - destroyed;
    if !((held - expected).abs() <= CONSERVATION_TOLERANCE * expected.abs().max(1.0)) {
        return Err(SimulationError::StateValidationError(format!(
            "Mass balance violated: expected {}, got {}",
            expected, held
        )));
    }

    // 2. Element uniqueness
    let mut ids = HashSet::new();
    for element in &snapshot.elements {
        if !ids.insert(element.id) {
            return Err(SimulationError::StateValidationError(format!(
                "Duplicate element {} in snapshot",
                element.id
            )));
        }
    }

    // 3. Placement integrity
    let mut placed = HashSet::new();
    for placement in &snapshot.placements {
        if placement.host.0 >= num_hosts {
            return Err(SimulationError::StateValidationError(format!(
                "Element {} placed on unknown host {}",
                placement.element, placement.host
            )));
        }
        if !ids.contains(&placement.element) || !placed.insert(placement.element) {
            return Err(SimulationError::StateValidationError(format!(
                "Orphaned or duplicate placement for element {}",
                placement.element
            )));
        }
    }
    if placed.len() != ids.len() {
        return Err(SimulationError::StateValidationError(format!(
            "{} of {} elements have no host",
            ids.len() - placed.len(),
            ids.len()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_config_hash_deterministic() {
        #[derive(Serialize)]
        struct TestConfig {
            value: i32,
            name: String,
        }

        let hash1 = compute_config_hash(&TestConfig {
            value: 42,
            name: "test".to_string(),
        })
        .unwrap();
        let hash2 = compute_config_hash(&TestConfig {
            value: 42,
            name: "test".to_string(),
        })
        .unwrap();

        assert_eq!(hash1, hash2, "Same config should produce same hash");
    }

    #[test]
    fn test_compute_config_hash_different_for_different_configs() {
        #[derive(Serialize)]
        struct TestConfig {
            value: f64,
        }

        let hash1 = compute_config_hash(&TestConfig { value: 1.0 }).unwrap();
        let hash2 = compute_config_hash(&TestConfig { value: 1.5 }).unwrap();

        assert_ne!(hash1, hash2);
    }

    fn snapshot(material: f64) -> StateSnapshot {
        StateSnapshot {
            run_id: Uuid::nil(),
            current_tick: 0,
            next_sync_point: 1.0,
            sync_points_reached: 0,
            initial_material: 10.0,
            elements: vec![ElementSnapshot {
                id: ElementId(0),
                current_time: 0.0,
                timestep_end_time: 0.0,
                material,
                created: 0.0,
                destroyed: 0.0,
                neighbors: Vec::new(),
            }],
            placements: vec![ElementPlacement {
                element: ElementId(0),
                host: HostId(0),
            }],
            config_hash: String::new(),
        }
    }

    #[test]
    fn test_validate_detects_lost_water() {
        assert!(validate_snapshot(&snapshot(10.0), 1).is_ok());
        assert!(matches!(
            validate_snapshot(&snapshot(9.0), 1),
            Err(SimulationError::StateValidationError(_))
        ));
    }

    #[test]
    fn test_validate_detects_bad_placement() {
        assert!(validate_snapshot(&snapshot(10.0), 0).is_err());

        let mut unplaced = snapshot(10.0);
        unplaced.placements.clear();
        assert!(validate_snapshot(&unplaced, 1).is_err());
    }

    #[test]
    fn test_corrupt_inbox_rejected_on_restore() {
        let overlapping = vec![
            MaterialTransfer::new(0.0, 2.0, 1.0).unwrap(),
            MaterialTransfer::new(1.0, 3.0, 1.0).unwrap(),
        ];
        let mut element = snapshot(10.0).elements.remove(0);
        element.neighbors.push(NeighborSnapshot {
            neighbor: ElementId(1),
            reciprocal_index: 0,
            kind: NeighborKind::Mesh,
            inflow_only: false,
            neighbor_inflow_only: false,
            expiration_time: 3.0,
            nominal_flow_rate: -1.0,
            incoming_material: overlapping,
            flow_cumulative_short_term: 0.0,
            flow_cumulative_long_term: 0.0,
            cumulative_flow: 0.0,
        });
        assert!(element.into_element(5.0).is_err());
    }
}
