//! Neighbor proxy: one directed view of a link
//!
//! Each link between two elements is represented twice, once in each
//! element's proxy list. The two proxies are reciprocal: they always agree
//! on the expiration time and hold opposite nominal flow rates.
//!
//! # Direction policy
//!
//! Some links only ever carry water one way (diversions). `inflow_only`
//! marks the side that may only receive; `neighbor_inflow_only` mirrors the
//! flag of the reciprocal proxy so the negotiating side can honor it
//! without asking.

use crate::models::id::ElementId;
use serde::{Deserialize, Serialize};

/// Closed set of link kinds carried in one homogeneous proxy list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeighborKind {
    /// Overland flow across a shared mesh edge
    Mesh,
    /// Upstream/downstream channel connection
    Channel,
    /// Engineered one-way withdrawal
    Diversion,
}

/// Negotiated state of one directed link
///
/// # Example
/// ```
/// use hydro_simulator_core_rs::{ElementId, NeighborKind, NeighborProxy};
///
/// let proxy = NeighborProxy::new(ElementId(2), 0, NeighborKind::Mesh, false, false, 0.0);
/// assert_eq!(proxy.neighbor(), ElementId(2));
/// assert!(proxy.is_idle_at(0.0));
/// assert_eq!(proxy.nominal_flow_rate(), 0.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborProxy {
    /// Logical ID of the element on the other end
    neighbor: ElementId,

    /// Index of the reciprocal proxy in the neighbor's proxy list
    reciprocal_index: usize,

    kind: NeighborKind,

    /// This side may only receive
    inflow_only: bool,

    /// The reciprocal side may only receive
    neighbor_inflow_only: bool,

    /// Time at which the current rate lapses and must be renegotiated
    expiration_time: f64,

    /// Signed rate; positive = outflow from the owner
    nominal_flow_rate: f64,
}

impl NeighborProxy {
    /// Create a proxy with no rate, expiring at `start_time`
    ///
    /// Expiring at the start time makes the link due for negotiation on
    /// the first tick.
    pub fn new(
        neighbor: ElementId,
        reciprocal_index: usize,
        kind: NeighborKind,
        inflow_only: bool,
        neighbor_inflow_only: bool,
        start_time: f64,
    ) -> Self {
        Self {
            neighbor,
            reciprocal_index,
            kind,
            inflow_only,
            neighbor_inflow_only,
            expiration_time: start_time,
            nominal_flow_rate: 0.0,
        }
    }

    /// Restore a proxy with negotiated values (checkpoint restoration)
    pub fn from_parts(
        neighbor: ElementId,
        reciprocal_index: usize,
        kind: NeighborKind,
        inflow_only: bool,
        neighbor_inflow_only: bool,
        expiration_time: f64,
        nominal_flow_rate: f64,
    ) -> Self {
        Self {
            neighbor,
            reciprocal_index,
            kind,
            inflow_only,
            neighbor_inflow_only,
            expiration_time,
            nominal_flow_rate,
        }
    }

    pub fn neighbor(&self) -> ElementId {
        self.neighbor
    }

    pub fn reciprocal_index(&self) -> usize {
        self.reciprocal_index
    }

    pub fn kind(&self) -> NeighborKind {
        self.kind
    }

    pub fn inflow_only(&self) -> bool {
        self.inflow_only
    }

    pub fn neighbor_inflow_only(&self) -> bool {
        self.neighbor_inflow_only
    }

    pub fn expiration_time(&self) -> f64 {
        self.expiration_time
    }

    pub fn nominal_flow_rate(&self) -> f64 {
        self.nominal_flow_rate
    }

    /// Water leaves the owner over this link
    pub fn is_outflow(&self) -> bool {
        self.nominal_flow_rate > 0.0
    }

    /// Water enters the owner over this link
    pub fn is_inflow(&self) -> bool {
        self.nominal_flow_rate < 0.0
    }

    /// The rate lapses exactly at `time`
    pub fn is_idle_at(&self, time: f64) -> bool {
        self.expiration_time == time
    }

    /// Apply the direction policy to a proposed rate
    ///
    /// A rate that would push water into an inflow-only side from the
    /// wrong direction becomes zero.
    pub fn clamp_rate(&self, rate: f64) -> f64 {
        if (self.inflow_only && rate > 0.0) || (self.neighbor_inflow_only && rate < 0.0) {
            0.0
        } else {
            rate
        }
    }

    /// Overwrite the negotiated values
    ///
    /// Callers check monotonicity first; this only stores.
    pub(crate) fn set_negotiated(&mut self, nominal_flow_rate: f64, expiration_time: f64) {
        self.nominal_flow_rate = nominal_flow_rate;
        self.expiration_time = expiration_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_respects_inflow_only() {
        let receiving = NeighborProxy::new(ElementId(1), 0, NeighborKind::Diversion, true, false, 0.0);
        assert_eq!(receiving.clamp_rate(3.0), 0.0);
        assert_eq!(receiving.clamp_rate(-3.0), -3.0);

        let sending = NeighborProxy::new(ElementId(1), 0, NeighborKind::Diversion, false, true, 0.0);
        assert_eq!(sending.clamp_rate(3.0), 3.0);
        assert_eq!(sending.clamp_rate(-3.0), 0.0);
    }

    #[test]
    fn test_direction_flags() {
        let mut proxy = NeighborProxy::new(ElementId(1), 0, NeighborKind::Mesh, false, false, 0.0);
        proxy.set_negotiated(-2.0, 4.0);
        assert!(proxy.is_inflow());
        assert!(!proxy.is_outflow());
        assert!(proxy.is_idle_at(4.0));
    }
}
