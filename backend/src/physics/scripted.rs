//! Fixed per-link rates for deterministic scenarios

use super::{FlowNegotiator, FlowProposal, LinkContext};
use crate::models::id::ElementId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One scripted link: `from` sends to `to` at `rate` for `duration`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScriptedLink {
    pub from: ElementId,
    pub to: ElementId,
    pub rate: f64,
    pub duration: f64,
}

/// Looks up a fixed rate per ordered pair
///
/// Asked from the reverse side, the rate is negated. Pairs with no entry
/// get rate zero lasting to the simulation end, so they never block.
///
/// # Example
/// ```
/// use hydro_simulator_core_rs::physics::{ScriptedLink, ScriptedRates};
/// use hydro_simulator_core_rs::ElementId;
///
/// let rates = ScriptedRates::new([ScriptedLink {
///     from: ElementId(0),
///     to: ElementId(1),
///     rate: 10.0,
///     duration: 5.0,
/// }]);
/// assert_eq!(rates.lookup(ElementId(1), ElementId(0)), Some((-10.0, 5.0)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedRates {
    links: HashMap<(ElementId, ElementId), (f64, f64)>,
}

impl ScriptedRates {
    pub fn new(links: impl IntoIterator<Item = ScriptedLink>) -> Self {
        let links = links
            .into_iter()
            .map(|link| ((link.from, link.to), (link.rate, link.duration)))
            .collect();
        Self { links }
    }

    /// Rate (oriented from `element`) and duration for a pair, if scripted
    pub fn lookup(&self, element: ElementId, neighbor: ElementId) -> Option<(f64, f64)> {
        if let Some(&(rate, duration)) = self.links.get(&(element, neighbor)) {
            return Some((rate, duration));
        }
        self.links
            .get(&(neighbor, element))
            .map(|&(rate, duration)| (-rate, duration))
    }
}

impl FlowNegotiator for ScriptedRates {
    fn propose(&self, link: &LinkContext<'_>) -> Option<FlowProposal> {
        let now = link.element.current_time;
        let proposal = match self.lookup(link.element.id, link.neighbor.id) {
            Some((rate, duration)) => FlowProposal {
                nominal_flow_rate: rate,
                expiration_time: now + duration,
            },
            None => FlowProposal {
                nominal_flow_rate: 0.0,
                expiration_time: link.element.simulation_end_time,
            },
        };
        Some(proposal)
    }
}
