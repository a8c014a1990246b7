//! Random exchange physics for the stress harness
//!
//! Each proposal draws from its own RNG stream, derived from the seed, the
//! unordered element pair and the bit pattern of the negotiation time.
//! The result depends on nothing else, so runs are identical across host
//! counts, threading modes and migrations.

use super::{FlowNegotiator, FlowProposal, LinkContext};
use crate::models::id::ElementId;
use crate::rng::RngManager;

#[derive(Debug, Clone, PartialEq)]
pub struct RandomExchange {
    seed: u64,
    max_rate: f64,
    min_duration: f64,
    max_duration: f64,
}

impl RandomExchange {
    pub fn new(seed: u64, max_rate: f64, min_duration: f64, max_duration: f64) -> Self {
        Self {
            seed,
            max_rate,
            min_duration,
            max_duration,
        }
    }

    fn stream(low: ElementId, high: ElementId, time: f64) -> u64 {
        let pair = ((low.index() as u64) << 32) | high.index() as u64;
        pair.rotate_left(17) ^ time.to_bits()
    }
}

impl FlowNegotiator for RandomExchange {
    fn propose(&self, link: &LinkContext<'_>) -> Option<FlowProposal> {
        let (own, other) = (link.element.id, link.neighbor.id);
        let (low, high) = if own < other { (own, other) } else { (other, own) };
        let now = link.element.current_time;

        let mut rng = RngManager::for_stream(self.seed, Self::stream(low, high, now));

        // Drawn from the lower ID's perspective, then oriented
        let rate_low_to_high = if self.max_rate > 0.0 {
            rng.range_f64(-self.max_rate, self.max_rate)
        } else {
            0.0
        };
        let duration = if self.max_duration > self.min_duration {
            rng.range_f64(self.min_duration, self.max_duration)
        } else {
            self.min_duration
        };

        let nominal_flow_rate = if own == low {
            rate_low_to_high
        } else {
            -rate_low_to_high
        };

        Some(FlowProposal {
            nominal_flow_rate,
            expiration_time: now + duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::neighbor::NeighborKind;
    use crate::physics::view;

    fn propose(physics: &RandomExchange, own: u32, other: u32, time: f64) -> FlowProposal {
        let a = view(own, time, 10.0, 1000.0);
        let b = view(other, time, 3.0, 1000.0);
        physics
            .propose(&LinkContext {
                element: &a,
                neighbor: &b,
                kind: NeighborKind::Mesh,
                inflow_only: false,
                neighbor_inflow_only: false,
            })
            .unwrap()
    }

    #[test]
    fn test_same_inputs_same_proposal() {
        let physics = RandomExchange::new(11, 2.0, 0.5, 3.0);
        assert_eq!(propose(&physics, 1, 4, 2.5), propose(&physics, 1, 4, 2.5));
    }

    #[test]
    fn test_proposal_is_antisymmetric() {
        let physics = RandomExchange::new(11, 2.0, 0.5, 3.0);
        let forward = propose(&physics, 1, 4, 2.5);
        let backward = propose(&physics, 4, 1, 2.5);
        assert_eq!(forward.nominal_flow_rate, -backward.nominal_flow_rate);
        assert_eq!(forward.expiration_time, backward.expiration_time);
    }

    #[test]
    fn test_bounds() {
        let physics = RandomExchange::new(5, 1.0, 0.25, 0.75);
        for step in 0..50 {
            let time = step as f64 * 0.5;
            let p = propose(&physics, 0, 1, time);
            assert!(p.nominal_flow_rate.abs() <= 1.0);
            assert!(p.expiration_time >= time + 0.25 && p.expiration_time < time + 0.75);
        }
    }
}
