//! Topology construction
//!
//! Turns a [`TopologyConfig`] (elements plus undirected links) into
//! elements wired with reciprocal proxy pairs, and validates the pairing
//! of elements restored from elsewhere.
//!
//! Everything here runs before the first tick; every failure is a
//! [`ConfigurationError`] and fatal.

use crate::models::element::Element;
use crate::models::id::ElementId;
use crate::models::neighbor::NeighborKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

pub mod random;

pub use random::{random_topology, RandomTopologyConfig};

/// Errors detected before the first tick
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("element {element} is defined more than once")]
    DuplicateElement { element: ElementId },

    #[error("link references unknown element {element}")]
    UnknownElement { element: ElementId },

    #[error("element {element} cannot be its own neighbor")]
    SelfNeighbor { element: ElementId },

    #[error("elements {element} and {neighbor} are linked more than once")]
    DuplicateNeighbor {
        element: ElementId,
        neighbor: ElementId,
    },

    #[error("proxy {index} of {element} does not pair with a reciprocal proxy on {neighbor}")]
    MismatchedReciprocal {
        element: ElementId,
        neighbor: ElementId,
        index: usize,
    },

    #[error("element {element} has invalid initial material {material}")]
    InvalidMaterial { element: ElementId, material: f64 },

    #[error("simulation end time {end_time} must be positive and finite")]
    InvalidEndTime { end_time: f64 },

    #[error("sync interval {interval} must be positive and finite")]
    InvalidSyncInterval { interval: f64 },

    #[error("at least one host is required")]
    NoHosts,

    #[error("invalid physics configuration: {reason}")]
    InvalidPhysics { reason: String },

    #[error("invalid random topology: {reason}")]
    InvalidRandomTopology { reason: String },
}

/// One element and its starting water
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementConfig {
    pub id: ElementId,
    pub initial_material: f64,
}

/// Undirected link between two elements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub from: ElementId,
    pub to: ElementId,
    #[serde(default = "default_kind")]
    pub kind: NeighborKind,
    /// Water may only move from `from` to `to`
    #[serde(default)]
    pub one_way: bool,
}

fn default_kind() -> NeighborKind {
    NeighborKind::Mesh
}

impl LinkConfig {
    pub fn new(from: ElementId, to: ElementId, kind: NeighborKind) -> Self {
        Self {
            from,
            to,
            kind,
            one_way: false,
        }
    }

    pub fn one_way(from: ElementId, to: ElementId, kind: NeighborKind) -> Self {
        Self {
            from,
            to,
            kind,
            one_way: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub elements: Vec<ElementConfig>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

impl TopologyConfig {
    pub fn total_initial_material(&self) -> f64 {
        self.elements.iter().map(|e| e.initial_material).sum()
    }
}

/// Build elements with reciprocal proxy pairs, ordered by element ID
///
/// # Errors
///
/// Duplicate or unknown elements, self links, repeated links, invalid
/// material, or a bad end time.
pub fn build_elements(
    config: &TopologyConfig,
    simulation_end_time: f64,
) -> Result<Vec<Element>, ConfigurationError> {
    if !(simulation_end_time.is_finite() && simulation_end_time > 0.0) {
        return Err(ConfigurationError::InvalidEndTime {
            end_time: simulation_end_time,
        });
    }

    let mut by_id = BTreeMap::new();
    for element in &config.elements {
        if !(element.initial_material.is_finite() && element.initial_material >= 0.0) {
            return Err(ConfigurationError::InvalidMaterial {
                element: element.id,
                material: element.initial_material,
            });
        }
        if by_id
            .insert(element.id, element.initial_material)
            .is_some()
        {
            return Err(ConfigurationError::DuplicateElement {
                element: element.id,
            });
        }
    }

    let mut elements: Vec<Element> = by_id
        .iter()
        .map(|(&id, &material)| Element::new(id, material, simulation_end_time))
        .collect();
    let position: BTreeMap<ElementId, usize> =
        by_id.keys().enumerate().map(|(i, &id)| (id, i)).collect();

    for link in &config.links {
        let a = *position
            .get(&link.from)
            .ok_or(ConfigurationError::UnknownElement { element: link.from })?;
        let b = *position
            .get(&link.to)
            .ok_or(ConfigurationError::UnknownElement { element: link.to })?;
        if a == b {
            return Err(ConfigurationError::SelfNeighbor { element: link.from });
        }

        let (from, to) = pair_mut(&mut elements, a, b);
        Element::connect(from, to, link.kind, false, link.one_way).map_err(|_| {
            ConfigurationError::DuplicateNeighbor {
                element: link.from,
                neighbor: link.to,
            }
        })?;
    }

    Ok(elements)
}

/// Check that every proxy pairs with its reciprocal and links are unique
///
/// Used on element sets that did not come from [`build_elements`], such
/// as restored checkpoints.
pub fn validate_pairing(elements: &[Element]) -> Result<(), ConfigurationError> {
    let mut by_id = BTreeMap::new();
    for element in elements {
        if by_id.insert(element.id(), element).is_some() {
            return Err(ConfigurationError::DuplicateElement {
                element: element.id(),
            });
        }
    }

    for element in elements {
        let mut seen = HashSet::new();
        for (index, proxy) in element.neighbors().iter().enumerate() {
            let neighbor_id = proxy.neighbor();
            if neighbor_id == element.id() {
                return Err(ConfigurationError::SelfNeighbor {
                    element: element.id(),
                });
            }
            if !seen.insert(neighbor_id) {
                return Err(ConfigurationError::DuplicateNeighbor {
                    element: element.id(),
                    neighbor: neighbor_id,
                });
            }

            let neighbor = by_id
                .get(&neighbor_id)
                .ok_or(ConfigurationError::UnknownElement {
                    element: neighbor_id,
                })?;
            let paired = neighbor
                .neighbor(proxy.reciprocal_index())
                .map(|reciprocal| {
                    reciprocal.neighbor() == element.id()
                        && reciprocal.reciprocal_index() == index
                        && reciprocal.kind() == proxy.kind()
                })
                .unwrap_or(false);
            if !paired {
                return Err(ConfigurationError::MismatchedReciprocal {
                    element: element.id(),
                    neighbor: neighbor_id,
                    index,
                });
            }
        }
    }

    Ok(())
}

/// Two distinct mutable elements from one slice
fn pair_mut(elements: &mut [Element], a: usize, b: usize) -> (&mut Element, &mut Element) {
    if a < b {
        let (left, right) = elements.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = elements.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(id: u32, material: f64) -> ElementConfig {
        ElementConfig {
            id: ElementId(id),
            initial_material: material,
        }
    }

    #[test]
    fn test_builds_reciprocal_pairs() {
        let config = TopologyConfig {
            elements: vec![element(2, 1.0), element(0, 5.0), element(1, 0.0)],
            links: vec![
                LinkConfig::new(ElementId(0), ElementId(1), NeighborKind::Mesh),
                LinkConfig::new(ElementId(2), ElementId(0), NeighborKind::Channel),
            ],
        };
        let elements = build_elements(&config, 10.0).unwrap();

        let ids: Vec<ElementId> = elements.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![ElementId(0), ElementId(1), ElementId(2)]);
        assert_eq!(elements[0].neighbors().len(), 2);
        assert_eq!(elements[0].neighbors()[1].neighbor(), ElementId(2));
        assert_eq!(elements[2].neighbors()[0].reciprocal_index(), 1);
        validate_pairing(&elements).unwrap();
    }

    #[test]
    fn test_rejects_self_link() {
        let config = TopologyConfig {
            elements: vec![element(0, 1.0)],
            links: vec![LinkConfig::new(ElementId(0), ElementId(0), NeighborKind::Mesh)],
        };
        assert_eq!(
            build_elements(&config, 1.0).unwrap_err(),
            ConfigurationError::SelfNeighbor {
                element: ElementId(0)
            }
        );
    }

    #[test]
    fn test_rejects_reversed_duplicate_link() {
        let config = TopologyConfig {
            elements: vec![element(0, 1.0), element(1, 1.0)],
            links: vec![
                LinkConfig::new(ElementId(0), ElementId(1), NeighborKind::Mesh),
                LinkConfig::new(ElementId(1), ElementId(0), NeighborKind::Mesh),
            ],
        };
        assert!(matches!(
            build_elements(&config, 1.0),
            Err(ConfigurationError::DuplicateNeighbor { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_and_duplicate_elements() {
        let unknown = TopologyConfig {
            elements: vec![element(0, 1.0)],
            links: vec![LinkConfig::new(ElementId(0), ElementId(4), NeighborKind::Mesh)],
        };
        assert_eq!(
            build_elements(&unknown, 1.0).unwrap_err(),
            ConfigurationError::UnknownElement {
                element: ElementId(4)
            }
        );

        let duplicate = TopologyConfig {
            elements: vec![element(0, 1.0), element(0, 2.0)],
            links: vec![],
        };
        assert!(matches!(
            build_elements(&duplicate, 1.0),
            Err(ConfigurationError::DuplicateElement { .. })
        ));
    }

    #[test]
    fn test_rejects_negative_material_and_bad_end_time() {
        let config = TopologyConfig {
            elements: vec![element(0, -1.0)],
            links: vec![],
        };
        assert!(matches!(
            build_elements(&config, 1.0),
            Err(ConfigurationError::InvalidMaterial { .. })
        ));
        assert!(matches!(
            build_elements(&TopologyConfig::default(), f64::NAN),
            Err(ConfigurationError::InvalidEndTime { .. })
        ));
    }

    #[test]
    fn test_one_way_link_sets_inflow_only_on_receiver() {
        let config = TopologyConfig {
            elements: vec![element(0, 1.0), element(1, 1.0)],
            links: vec![LinkConfig::one_way(
                ElementId(1),
                ElementId(0),
                NeighborKind::Diversion,
            )],
        };
        let elements = build_elements(&config, 1.0).unwrap();
        assert!(elements[0].neighbors()[0].inflow_only());
        assert!(!elements[1].neighbors()[0].inflow_only());
        assert!(elements[1].neighbors()[0].link().neighbor_inflow_only());
    }

    #[test]
    fn test_validate_pairing_detects_missing_reciprocal() {
        let config = TopologyConfig {
            elements: vec![element(0, 1.0), element(1, 1.0)],
            links: vec![LinkConfig::new(ElementId(0), ElementId(1), NeighborKind::Mesh)],
        };
        let mut elements = build_elements(&config, 1.0).unwrap();
        elements[1] = Element::new(ElementId(1), 1.0, 1.0);
        assert!(matches!(
            validate_pairing(&elements),
            Err(ConfigurationError::MismatchedReciprocal { .. })
        ));
    }
}
