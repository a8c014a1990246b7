//! Linear-reservoir exchange
//!
//! Water flows from the fuller element to the emptier one at
//! `conductance × Δmaterial`, renegotiated every `interval`.

use super::{FlowNegotiator, FlowProposal, LinkContext};

#[derive(Debug, Clone, PartialEq)]
pub struct HeadDifference {
    conductance: f64,
    interval: f64,
}

impl HeadDifference {
    pub fn new(conductance: f64, interval: f64) -> Self {
        Self {
            conductance,
            interval,
        }
    }
}

impl FlowNegotiator for HeadDifference {
    fn propose(&self, link: &LinkContext<'_>) -> Option<FlowProposal> {
        let difference = link.element.material - link.neighbor.material;
        Some(FlowProposal {
            nominal_flow_rate: self.conductance * difference,
            expiration_time: link.element.current_time + self.interval,
        })
    }
}
