//! Random topology generator for the stress harness
//!
//! A random spanning tree keeps the graph connected; extra links are then
//! added between random pairs until the requested mean degree is reached.
//! A fraction of the links become one-way diversions.

use super::{ConfigurationError, ElementConfig, LinkConfig, TopologyConfig};
use crate::models::id::ElementId;
use crate::models::neighbor::NeighborKind;
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Stream reserved for topology draws
const TOPOLOGY_STREAM: u64 = 0x746f_706f;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomTopologyConfig {
    pub num_elements: usize,
    pub seed: u64,
    /// Initial material is uniform in `[0, max_initial_material)`
    pub max_initial_material: f64,
    /// Average number of links per element
    pub mean_degree: f64,
    /// Share of links generated as one-way diversions
    #[serde(default)]
    pub diversion_fraction: f64,
}

impl Default for RandomTopologyConfig {
    fn default() -> Self {
        Self {
            num_elements: 100,
            seed: 12345,
            max_initial_material: 100.0,
            mean_degree: 4.0,
            diversion_fraction: 0.1,
        }
    }
}

/// Generate a connected random topology
///
/// # Example
/// ```
/// use hydro_simulator_core_rs::topology::{random_topology, RandomTopologyConfig};
///
/// let config = RandomTopologyConfig { num_elements: 10, ..Default::default() };
/// let topology = random_topology(&config).unwrap();
/// assert_eq!(topology.elements.len(), 10);
/// assert!(topology.links.len() >= 9);
/// assert_eq!(topology, random_topology(&config).unwrap());
/// ```
pub fn random_topology(config: &RandomTopologyConfig) -> Result<TopologyConfig, ConfigurationError> {
    let invalid = |reason: String| Err(ConfigurationError::InvalidRandomTopology { reason });

    if config.num_elements == 0 {
        return invalid("num_elements must be at least 1".to_string());
    }
    if !(config.max_initial_material.is_finite() && config.max_initial_material >= 0.0) {
        return invalid(format!(
            "max_initial_material {} must be finite and non-negative",
            config.max_initial_material
        ));
    }
    if !(config.mean_degree.is_finite() && config.mean_degree >= 0.0) {
        return invalid(format!("mean_degree {} must be non-negative", config.mean_degree));
    }
    if !(0.0..=1.0).contains(&config.diversion_fraction) {
        return invalid(format!(
            "diversion_fraction {} must lie in [0, 1]",
            config.diversion_fraction
        ));
    }

    let n = config.num_elements;
    let mut rng = RngManager::for_stream(config.seed, TOPOLOGY_STREAM);

    let elements = (0..n)
        .map(|i| ElementConfig {
            id: ElementId(i as u32),
            initial_material: if config.max_initial_material > 0.0 {
                rng.range_f64(0.0, config.max_initial_material)
            } else {
                0.0
            },
        })
        .collect();

    let max_links = n * (n - 1) / 2;
    let target = ((config.mean_degree * n as f64 / 2.0).round() as usize)
        .max(n - 1)
        .min(max_links);

    let mut seen = HashSet::new();
    let mut links = Vec::with_capacity(target);

    for i in 1..n {
        let j = rng.range(0, i as i64) as usize;
        seen.insert((j, i));
        links.push(draw_link(&mut rng, config.diversion_fraction, j, i));
    }

    // Bounded so dense requests near the complete graph still terminate
    let mut attempts = 0;
    while links.len() < target && attempts < target * 20 {
        attempts += 1;
        let a = rng.range(0, n as i64) as usize;
        let b = rng.range(0, n as i64) as usize;
        let key = (a.min(b), a.max(b));
        if a == b || !seen.insert(key) {
            continue;
        }
        links.push(draw_link(&mut rng, config.diversion_fraction, a, b));
    }

    Ok(TopologyConfig { elements, links })
}

fn draw_link(rng: &mut RngManager, diversion_fraction: f64, a: usize, b: usize) -> LinkConfig {
    let (from, to) = (ElementId(a as u32), ElementId(b as u32));
    if rng.next_f64() < diversion_fraction {
        return LinkConfig::one_way(from, to, NeighborKind::Diversion);
    }
    let kind = if rng.next_f64() < 0.5 {
        NeighborKind::Mesh
    } else {
        NeighborKind::Channel
    };
    LinkConfig::new(from, to, kind)
}
