//! Element model
//!
//! An element is one mesh cell or channel segment. It owns:
//! - its local clock (`current_time`, `timestep_end_time`, `simulation_end_time`)
//! - its water (`material`) and the ledger of water created or destroyed
//! - one [`SimpleNeighborProxy`] per link, naming the neighbor by logical ID
//!
//! Three operations run once per driver tick, each separated by a barrier:
//! negotiate, move, receive. Each is a no-op when the element is not ready,
//! so the driver simply retries on the next tick.
//!
//! Cross-element effects are never applied directly. The operations return
//! [`Message`]s addressed by element ID and proxy index; the receiving side
//! applies them through [`Element::apply_reciprocal_update`] and
//! [`Element::accept_transfer`].
//!
//! CRITICAL: `material` never goes negative. Outflow demand beyond the
//! available water is rationed, and clamping is booked in the ledger.

use crate::exchange::{plan_outflows, OutflowPlan};
use crate::models::id::ElementId;
use crate::models::ledger::MassLedger;
use crate::models::message::Message;
use crate::models::neighbor::{NeighborKind, NeighborProxy};
use crate::models::simple_proxy::SimpleNeighborProxy;
use crate::models::transfer::{MaterialTransfer, TransferError};
use crate::models::violation::ProtocolViolation;
use crate::physics::{ElementView, FlowNegotiator, LinkContext};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Per-tick state of an element, as seen by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementStatus {
    /// Made progress this tick and is mid-step
    Running,
    /// No operation made progress this tick
    Blocked,
    /// At a step boundary, ready to negotiate and select the next step
    Synced,
    /// Reached the simulation end time (terminal)
    Done,
}

/// One link renegotiated by this element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegotiatedLink {
    pub neighbor: ElementId,
    pub nominal_flow_rate: f64,
    pub expiration_time: f64,
    /// The direction policy or a non-finite proposal forced the rate to zero
    pub clamped: bool,
}

/// Result of the negotiate phase
#[derive(Debug, Clone, Default)]
pub struct NegotiationOutcome {
    /// Reciprocal updates for neighbors
    pub messages: Vec<Message>,
    pub negotiated: Vec<NegotiatedLink>,
    /// Links skipped because the proposal broke the protocol
    pub violations: Vec<ProtocolViolation>,
}

/// A step adopted by the move phase
#[derive(Debug, Clone)]
pub struct StepTaken {
    pub start_time: f64,
    pub end_time: f64,
    pub plan: OutflowPlan,
    /// One transfer per outgoing link
    pub messages: Vec<Message>,
}

/// Result of the move phase
#[derive(Debug, Clone)]
pub enum MoveOutcome {
    /// Mid-step or done; nothing to select
    Idle,
    /// At a step boundary but the bound does not exceed the current time
    Blocked { bound: f64 },
    Stepped(StepTaken),
}

/// Scalar-material element with its own clock
///
/// # Example
/// ```
/// use hydro_simulator_core_rs::{Element, ElementId, NeighborKind};
///
/// let mut upstream = Element::new(ElementId(0), 100.0, 5.0);
/// let mut downstream = Element::new(ElementId(1), 0.0, 5.0);
/// Element::connect(&mut upstream, &mut downstream, NeighborKind::Channel, false, false).unwrap();
///
/// assert_eq!(upstream.neighbors().len(), 1);
/// assert_eq!(upstream.neighbors()[0].neighbor(), ElementId(1));
/// assert_eq!(downstream.neighbors()[0].reciprocal_index(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    id: ElementId,

    /// Time up to which all exchanges are resolved
    current_time: f64,

    /// End of the step in progress; equals `current_time` between steps
    timestep_end_time: f64,

    simulation_end_time: f64,

    /// Water volume owned by this element
    material: f64,

    /// Links, in insertion order; indices are stable for the run
    neighbors: Vec<SimpleNeighborProxy>,

    ledger: MassLedger,
}

impl Element {
    /// Create an element at time zero with no links
    pub fn new(id: ElementId, initial_material: f64, simulation_end_time: f64) -> Self {
        Self {
            id,
            current_time: 0.0,
            timestep_end_time: 0.0,
            simulation_end_time,
            material: initial_material,
            neighbors: Vec::new(),
            ledger: MassLedger::new(),
        }
    }

    /// Restore an element from checkpointed fields
    pub fn from_parts(
        id: ElementId,
        current_time: f64,
        timestep_end_time: f64,
        simulation_end_time: f64,
        material: f64,
        neighbors: Vec<SimpleNeighborProxy>,
        ledger: MassLedger,
    ) -> Self {
        Self {
            id,
            current_time,
            timestep_end_time,
            simulation_end_time,
            material,
            neighbors,
            ledger,
        }
    }

    /// Link two elements with a reciprocal proxy pair
    ///
    /// Both reciprocal indices are computed before either proxy is pushed,
    /// so neither element is ever observable half-linked. Returns the new
    /// proxy index on `a` and on `b`.
    ///
    /// # Errors
    ///
    /// `DuplicateLink` for a self link or a pair that is already linked.
    pub fn connect(
        a: &mut Element,
        b: &mut Element,
        kind: NeighborKind,
        a_inflow_only: bool,
        b_inflow_only: bool,
    ) -> Result<(usize, usize), ProtocolViolation> {
        if a.id == b.id || a.proxy_index_for(b.id).is_some() || b.proxy_index_for(a.id).is_some() {
            return Err(ProtocolViolation::DuplicateLink {
                element: a.id,
                neighbor: b.id,
            });
        }

        let a_index = a.neighbors.len();
        let b_index = b.neighbors.len();
        let start = a.current_time.max(b.current_time);

        a.neighbors.push(SimpleNeighborProxy::new(NeighborProxy::new(
            b.id,
            b_index,
            kind,
            a_inflow_only,
            b_inflow_only,
            start,
        )));
        b.neighbors.push(SimpleNeighborProxy::new(NeighborProxy::new(
            a.id,
            a_index,
            kind,
            b_inflow_only,
            a_inflow_only,
            start,
        )));

        Ok((a_index, b_index))
    }

    // ========================================================================
    // Getters
    // ========================================================================

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn timestep_end_time(&self) -> f64 {
        self.timestep_end_time
    }

    pub fn simulation_end_time(&self) -> f64 {
        self.simulation_end_time
    }

    pub fn material(&self) -> f64 {
        self.material
    }

    pub fn ledger(&self) -> &MassLedger {
        &self.ledger
    }

    pub fn neighbors(&self) -> &[SimpleNeighborProxy] {
        &self.neighbors
    }

    pub fn neighbor(&self, index: usize) -> Option<&SimpleNeighborProxy> {
        self.neighbors.get(index)
    }

    /// Index of the proxy pointing at `neighbor`, if linked
    pub fn proxy_index_for(&self, neighbor: ElementId) -> Option<usize> {
        self.neighbors.iter().position(|p| p.neighbor() == neighbor)
    }

    pub fn is_done(&self) -> bool {
        self.current_time >= self.simulation_end_time
    }

    /// Earliest expiration over all links; infinite for an isolated element
    pub fn earliest_expiration(&self) -> f64 {
        self.neighbors
            .iter()
            .map(|p| p.expiration_time())
            .fold(f64::INFINITY, f64::min)
    }

    /// Water queued in this element's inboxes, sent but not yet received
    pub fn material_in_flight(&self) -> f64 {
        self.neighbors
            .iter()
            .map(|p| p.total_water_in_incoming_material())
            .sum()
    }

    /// Read-only view published to neighbors for the negotiate phase
    pub fn view(&self) -> ElementView {
        ElementView {
            id: self.id,
            current_time: self.current_time,
            timestep_end_time: self.timestep_end_time,
            simulation_end_time: self.simulation_end_time,
            material: self.material,
        }
    }

    // ========================================================================
    // Phase 1: negotiate
    // ========================================================================

    /// Renegotiate every idle link this element initiates
    ///
    /// A link is renegotiated only when its expiration equals this
    /// element's current time and the neighbor's published current time,
    /// and only by the element with the smaller ID. The accepted rate is
    /// written here and a negated reciprocal update is emitted.
    ///
    /// A proposal whose expiration does not lie after the current time is
    /// reported as a violation and that link is left untouched.
    pub fn negotiate_flow_rates(
        &mut self,
        views: &HashMap<ElementId, ElementView>,
        physics: &dyn FlowNegotiator,
    ) -> NegotiationOutcome {
        let mut outcome = NegotiationOutcome::default();
        if self.is_done() {
            return outcome;
        }

        let own_view = self.view();
        let now = self.current_time;

        for proxy in self.neighbors.iter_mut() {
            let neighbor = proxy.neighbor();
            if neighbor < self.id || !proxy.link().is_idle_at(now) {
                continue;
            }

            let Some(neighbor_view) = views.get(&neighbor) else {
                outcome.violations.push(ProtocolViolation::UnknownNeighbor {
                    element: self.id,
                    neighbor,
                });
                continue;
            };
            if neighbor_view.current_time != now {
                continue;
            }

            let context = LinkContext {
                element: &own_view,
                neighbor: neighbor_view,
                kind: proxy.kind(),
                inflow_only: proxy.inflow_only(),
                neighbor_inflow_only: proxy.link().neighbor_inflow_only(),
            };
            let Some(proposal) = physics.propose(&context) else {
                continue;
            };

            if !(proposal.expiration_time > now) {
                outcome
                    .violations
                    .push(ProtocolViolation::NonMonotonicExpiration {
                        element: self.id,
                        neighbor,
                        current_time: now,
                        previous: proxy.expiration_time(),
                        proposed: proposal.expiration_time,
                    });
                continue;
            }
            let expiration_time = proposal.expiration_time.min(self.simulation_end_time);

            let finite_rate = if proposal.nominal_flow_rate.is_finite() {
                proposal.nominal_flow_rate
            } else {
                0.0
            };
            let rate = proxy.link().clamp_rate(finite_rate);
            // Normalize -0.0 so reciprocal rates compare cleanly
            let rate = if rate == 0.0 { 0.0 } else { rate };

            proxy.link_mut().set_negotiated(rate, expiration_time);

            debug!(
                element = %self.id,
                neighbor = %neighbor,
                rate,
                expiration_time,
                "negotiated link"
            );

            outcome.messages.push(Message::ProxyUpdate {
                from: self.id,
                to: neighbor,
                proxy_index: proxy.reciprocal_index(),
                nominal_flow_rate: if rate == 0.0 { 0.0 } else { -rate },
                expiration_time,
            });
            outcome.negotiated.push(NegotiatedLink {
                neighbor,
                nominal_flow_rate: rate,
                expiration_time,
                clamped: rate != proposal.nominal_flow_rate,
            });
        }

        outcome
    }

    /// Mailbox delivery of a negotiation result from `from`
    ///
    /// # Errors
    ///
    /// `UnknownProxy`, `WrongSender`, or `NonMonotonicExpiration` if the
    /// new expiration lies before the proxy's current one. The proxy is
    /// left unchanged on error.
    pub fn apply_reciprocal_update(
        &mut self,
        proxy_index: usize,
        from: ElementId,
        nominal_flow_rate: f64,
        expiration_time: f64,
    ) -> Result<(), ProtocolViolation> {
        let element = self.id;
        let current_time = self.current_time;
        let proxy = self.proxy_for_delivery(proxy_index, from)?;

        if !(expiration_time >= proxy.expiration_time()) {
            return Err(ProtocolViolation::NonMonotonicExpiration {
                element,
                neighbor: from,
                current_time,
                previous: proxy.expiration_time(),
                proposed: expiration_time,
            });
        }

        proxy
            .link_mut()
            .set_negotiated(nominal_flow_rate, expiration_time);
        Ok(())
    }

    // ========================================================================
    // Phase 2: move
    // ========================================================================

    /// Adopt the next step and send outflow for it
    ///
    /// Acts only between steps and before the end time. The step ends at
    /// `min(next_sync_point, simulation_end_time, earliest expiration)`;
    /// if that bound does not exceed the current time the element is
    /// blocked on a neighbor that has not renegotiated.
    ///
    /// Outflow per link with a positive rate is `rate × step length`,
    /// rationed proportionally when it exceeds the material held. Every
    /// outgoing link gets a transfer, zero-quantity ones included.
    ///
    /// # Errors
    ///
    /// `RejectedTransfer` if a transfer cannot be built (non-finite
    /// quantity). The element is left unchanged on error.
    pub fn select_timestep_and_move_water(
        &mut self,
        next_sync_point: f64,
    ) -> Result<MoveOutcome, ProtocolViolation> {
        if self.current_time != self.timestep_end_time || self.is_done() {
            return Ok(MoveOutcome::Idle);
        }

        let bound = next_sync_point
            .min(self.simulation_end_time)
            .min(self.earliest_expiration());
        if !(bound > self.current_time) {
            return Ok(MoveOutcome::Blocked { bound });
        }

        let start_time = self.current_time;
        let dt = bound - start_time;

        let outgoing: Vec<usize> = self
            .neighbors
            .iter()
            .enumerate()
            .filter(|(_, p)| p.link().is_outflow())
            .map(|(i, _)| i)
            .collect();
        let demands: Vec<f64> = outgoing
            .iter()
            .map(|&i| self.neighbors[i].nominal_flow_rate() * dt)
            .collect();

        let plan = plan_outflows(self.material, &demands);

        // Build every transfer before touching state
        let mut transfers = Vec::with_capacity(outgoing.len());
        for (&index, &amount) in outgoing.iter().zip(plan.amounts()) {
            let transfer = MaterialTransfer::new(start_time, bound, amount).map_err(|source| {
                ProtocolViolation::RejectedTransfer {
                    element: self.id,
                    neighbor: self.neighbors[index].neighbor(),
                    source,
                }
            })?;
            transfers.push((index, transfer));
        }

        self.timestep_end_time = bound;
        // Positive residual vanished in rounding; negative appeared
        self.ledger.record(-plan.residual());
        self.material = plan.remaining();

        let mut messages = Vec::with_capacity(transfers.len());
        for (index, transfer) in transfers {
            let proxy = &mut self.neighbors[index];
            proxy.record_outflow(transfer.material());
            messages.push(Message::Transfer {
                from: self.id,
                to: proxy.neighbor(),
                proxy_index: proxy.reciprocal_index(),
                transfer,
            });
        }

        debug!(
            element = %self.id,
            start_time,
            end_time = bound,
            outflow = plan.total_outflow(),
            rationed = plan.is_rationed(),
            "selected timestep"
        );

        Ok(MoveOutcome::Stepped(StepTaken {
            start_time,
            end_time: bound,
            plan,
            messages,
        }))
    }

    /// Mailbox delivery of material from `from`
    ///
    /// # Errors
    ///
    /// `UnknownProxy`, `WrongSender`, or `RejectedTransfer` when the
    /// transfer lies outside `[current_time, expiration_time]` of the proxy
    /// or overlaps a queued transfer. The inbox is left unchanged on error.
    pub fn accept_transfer(
        &mut self,
        proxy_index: usize,
        from: ElementId,
        transfer: MaterialTransfer,
    ) -> Result<(), ProtocolViolation> {
        let element = self.id;
        let window_start = self.current_time;
        let proxy = self.proxy_for_delivery(proxy_index, from)?;
        let window_end = proxy.expiration_time();

        if transfer.start_time() < window_start || transfer.end_time() > window_end {
            return Err(ProtocolViolation::RejectedTransfer {
                element,
                neighbor: from,
                source: TransferError::OutsideWindow {
                    start_time: transfer.start_time(),
                    end_time: transfer.end_time(),
                    window_start,
                    window_end,
                },
            });
        }

        proxy
            .insert_material(transfer)
            .map_err(|source| ProtocolViolation::RejectedTransfer {
                element,
                neighbor: from,
                source,
            })
    }

    /// Book material the driver discarded instead of delivering here
    pub fn record_rejected_material(&mut self, material: f64) {
        self.ledger.record_destroyed(material);
    }

    // ========================================================================
    // Phase 3: receive
    // ========================================================================

    /// Drain inflow for the current step and advance the clock
    ///
    /// Acts only mid-step. If any inflow link is still missing material for
    /// `[current_time, timestep_end_time]`, nothing changes. Returns whether
    /// the clock advanced.
    pub fn receive_water_and_advance_time(&mut self) -> bool {
        if !(self.current_time < self.timestep_end_time) {
            return false;
        }

        let (start, end) = (self.current_time, self.timestep_end_time);
        let complete = self
            .neighbors
            .iter()
            .filter(|p| p.link().is_inflow())
            .all(|p| p.all_material_has_arrived(start, end));
        if !complete {
            return false;
        }

        let received: f64 = self
            .neighbors
            .iter_mut()
            .filter(|p| p.link().is_inflow())
            .map(|p| p.get_material(start, end))
            .sum();

        self.material += received;
        self.current_time = end;
        true
    }

    // ========================================================================
    // Outside the exchange protocol
    // ========================================================================

    /// Add (positive) or remove (negative) water on behalf of physics
    ///
    /// The change is booked in the ledger. A removal larger than the
    /// material held empties the element and only the removed amount is
    /// booked. Returns the signed amount actually applied.
    pub fn apply_source_term(&mut self, delta: f64) -> f64 {
        if !delta.is_finite() || delta == 0.0 {
            return 0.0;
        }
        if delta > 0.0 {
            self.material += delta;
            self.ledger.record_created(delta);
            delta
        } else {
            let removed = (-delta).min(self.material);
            self.material -= removed;
            self.ledger.record_destroyed(removed);
            -removed
        }
    }

    /// Fold short-term cumulative flow into long-term on every link
    pub fn fold_cumulative_flow(&mut self) {
        for proxy in &mut self.neighbors {
            proxy.fold_cumulative_flow();
        }
    }

    /// Check the invariants that can be verified without the neighbors
    ///
    /// Covers clock order, non-negative material, inbox ordering and window,
    /// and link uniqueness. Reciprocal symmetry needs both sides and is
    /// checked by the driver.
    pub fn check_invariant(&self) -> Result<(), ProtocolViolation> {
        if !(self.material.is_finite() && self.material >= 0.0) {
            return Err(ProtocolViolation::NegativeMaterial {
                element: self.id,
                current_time: self.current_time,
                material: self.material,
            });
        }

        let earliest_expiration = self.earliest_expiration();
        if !(self.current_time <= self.timestep_end_time
            && self.timestep_end_time <= earliest_expiration)
        {
            return Err(ProtocolViolation::ClockOrder {
                element: self.id,
                current_time: self.current_time,
                timestep_end_time: self.timestep_end_time,
                earliest_expiration,
            });
        }

        for (i, proxy) in self.neighbors.iter().enumerate() {
            let neighbor = proxy.neighbor();
            let duplicated = self.neighbors[..i].iter().any(|p| p.neighbor() == neighbor);
            if neighbor == self.id || duplicated {
                return Err(ProtocolViolation::DuplicateLink {
                    element: self.id,
                    neighbor,
                });
            }

            if let Some(misplaced) =
                proxy.first_misplaced_transfer(self.current_time, proxy.expiration_time())
            {
                return Err(ProtocolViolation::InboxOrder {
                    element: self.id,
                    neighbor,
                    start_time: misplaced.start_time(),
                    end_time: misplaced.end_time(),
                    window_start: self.current_time,
                    window_end: proxy.expiration_time(),
                });
            }
        }

        Ok(())
    }

    /// Driver-facing state for this tick
    pub fn status(&self, progressed: bool) -> ElementStatus {
        if self.is_done() {
            ElementStatus::Done
        } else if !progressed {
            ElementStatus::Blocked
        } else if self.current_time == self.timestep_end_time {
            ElementStatus::Synced
        } else {
            ElementStatus::Running
        }
    }

    // ========================================================================
    // Relocation
    // ========================================================================

    /// Serialize the whole element, inboxes and ledger included
    pub fn pack(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn unpack(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    fn proxy_for_delivery(
        &mut self,
        proxy_index: usize,
        from: ElementId,
    ) -> Result<&mut SimpleNeighborProxy, ProtocolViolation> {
        let element = self.id;
        let proxy = self
            .neighbors
            .get_mut(proxy_index)
            .ok_or(ProtocolViolation::UnknownProxy {
                element,
                index: proxy_index,
            })?;
        if proxy.neighbor() != from {
            return Err(ProtocolViolation::WrongSender {
                element,
                neighbor: proxy.neighbor(),
                sender: from,
            });
        }
        Ok(proxy)
    }
}
