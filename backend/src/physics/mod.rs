//! Physics collaborator interface
//!
//! The exchange protocol never decides *what* rate a link carries. When a
//! link lapses, the negotiating element asks a [`FlowNegotiator`] for a
//! proposal, given both elements' published views for the tick.
//!
//! # Provided negotiators
//!
//! 1. **ScriptedRates**: fixed per-link rates and durations (deterministic scenarios)
//! 2. **RandomExchange**: seeded random rates, keyed by link and time
//! 3. **HeadDifference**: linear reservoir, rate proportional to the material difference
//!
//! Negotiators are selected through [`PhysicsConfig`]:
//!
//! ```rust
//! use hydro_simulator_core_rs::physics::PhysicsConfig;
//!
//! let config = PhysicsConfig::HeadDifference {
//!     conductance: 0.1,
//!     interval: 2.0,
//! };
//! let physics = config.build().unwrap();
//! println!("{:?}", physics);
//! ```

use crate::models::id::ElementId;
use crate::models::neighbor::NeighborKind;
use crate::topology::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

pub mod head;
pub mod random;
pub mod scripted;

pub use head::HeadDifference;
pub use random::RandomExchange;
pub use scripted::{ScriptedLink, ScriptedRates};

/// Read-only view of an element, published once per tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementView {
    pub id: ElementId,
    pub current_time: f64,
    pub timestep_end_time: f64,
    pub simulation_end_time: f64,
    pub material: f64,
}

/// Everything a negotiator may look at for one link
#[derive(Debug, Clone, Copy)]
pub struct LinkContext<'a> {
    /// The negotiating element
    pub element: &'a ElementView,
    /// The element on the other end
    pub neighbor: &'a ElementView,
    pub kind: NeighborKind,
    pub inflow_only: bool,
    pub neighbor_inflow_only: bool,
}

/// Rate and lifetime offered for a link
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowProposal {
    /// Positive = outflow from the negotiating element
    pub nominal_flow_rate: f64,
    pub expiration_time: f64,
}

/// Supplies negotiated rates
///
/// Implementations are shared across host threads and must be pure in
/// their inputs: the same context yields the same proposal whichever host
/// evaluates it.
pub trait FlowNegotiator: Send + Sync + Debug {
    /// Propose a rate for the link, or `None` to decline this tick
    fn propose(&self, link: &LinkContext<'_>) -> Option<FlowProposal>;
}

/// Negotiator selection
///
/// Determines which physics the orchestrator hands to every host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhysicsConfig {
    /// Fixed per-link rates; pairs not listed exchange nothing
    Scripted { links: Vec<ScriptedLink> },

    /// Seeded random rates in `[-max_rate, max_rate]`
    Random {
        seed: u64,
        max_rate: f64,
        min_duration: f64,
        max_duration: f64,
    },

    /// `rate = conductance × (own material − neighbor material)`
    HeadDifference { conductance: f64, interval: f64 },
}

impl PhysicsConfig {
    /// Validate parameters and construct the negotiator
    pub fn build(&self) -> Result<Arc<dyn FlowNegotiator>, ConfigurationError> {
        let invalid = |reason: String| Err(ConfigurationError::InvalidPhysics { reason });

        match self {
            PhysicsConfig::Scripted { links } => {
                for link in links {
                    if !link.rate.is_finite() || !(link.duration.is_finite() && link.duration > 0.0) {
                        return invalid(format!(
                            "scripted link {}->{} needs a finite rate and a positive duration",
                            link.from, link.to
                        ));
                    }
                }
                Ok(Arc::new(ScriptedRates::new(links.iter().copied())))
            }
            PhysicsConfig::Random {
                seed,
                max_rate,
                min_duration,
                max_duration,
            } => {
                if !(max_rate.is_finite() && *max_rate >= 0.0) {
                    return invalid(format!("max_rate {max_rate} must be finite and non-negative"));
                }
                if !(min_duration.is_finite() && *min_duration > 0.0)
                    || !(max_duration.is_finite() && max_duration >= min_duration)
                {
                    return invalid(format!(
                        "durations must satisfy 0 < min_duration ({min_duration}) <= max_duration ({max_duration})"
                    ));
                }
                Ok(Arc::new(RandomExchange::new(
                    *seed,
                    *max_rate,
                    *min_duration,
                    *max_duration,
                )))
            }
            PhysicsConfig::HeadDifference {
                conductance,
                interval,
            } => {
                if !(conductance.is_finite() && *conductance >= 0.0) {
                    return invalid(format!("conductance {conductance} must be finite and non-negative"));
                }
                if !(interval.is_finite() && *interval > 0.0) {
                    return invalid(format!("interval {interval} must be positive"));
                }
                Ok(Arc::new(HeadDifference::new(*conductance, *interval)))
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn view(id: u32, time: f64, material: f64, end: f64) -> ElementView {
    ElementView {
        id: ElementId(id),
        current_time: time,
        timestep_end_time: time,
        simulation_end_time: end,
        material,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trips_through_json() {
        let config = PhysicsConfig::Random {
            seed: 3,
            max_rate: 1.0,
            min_duration: 0.5,
            max_duration: 2.0,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"type\":\"random\""));
        let back: PhysicsConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_bad_durations_rejected() {
        let config = PhysicsConfig::Random {
            seed: 3,
            max_rate: 1.0,
            min_duration: 2.0,
            max_duration: 1.0,
        };
        assert!(matches!(
            config.build(),
            Err(ConfigurationError::InvalidPhysics { .. })
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = PhysicsConfig::HeadDifference {
            conductance: 0.5,
            interval: 0.0,
        };
        assert!(config.build().is_err());
    }
}
