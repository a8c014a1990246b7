//! Host: exclusive owner of a set of elements
//!
//! A host runs one protocol phase at a time over all of its elements and
//! hands back an outbox of messages for the driver to route. Hosts never
//! see each other; the only shared value is the read-only physics.
//!
//! Violations are resolved here according to the [`ViolationPolicy`]:
//! `Abort` returns the first one as an error, `Record` logs it, turns it
//! into an event and skips the offending operation.

use crate::models::element::{Element, ElementStatus, MoveOutcome};
use crate::models::event::Event;
use crate::models::id::ElementId;
use crate::models::message::Message;
use crate::models::violation::{ProtocolViolation, ViolationPolicy};
use crate::orchestrator::directory::HostId;
use crate::orchestrator::engine::SimulationError;
use crate::orchestrator::worker::{HostCommand, HostReply, MassTotals};
use crate::physics::{ElementView, FlowNegotiator};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, warn};

/// Result of one phase on one host
#[derive(Debug, Clone, Default)]
pub struct PhaseReport {
    /// Messages for other elements, possibly on other hosts
    pub outbox: Vec<Message>,
    /// Elements that made progress in this phase
    pub progressed: Vec<ElementId>,
    pub events: Vec<Event>,
    /// Per-element status and view, filled by the receive phase
    pub statuses: Vec<(ElementId, ElementStatus)>,
    pub views: Vec<ElementView>,
}

pub struct Host {
    id: HostId,
    elements: BTreeMap<ElementId, Element>,
    physics: Arc<dyn FlowNegotiator>,
    policy: ViolationPolicy,
    /// Elements that made progress since the current tick began
    progressed: HashSet<ElementId>,
}

impl Host {
    pub fn new(
        id: HostId,
        elements: impl IntoIterator<Item = Element>,
        physics: Arc<dyn FlowNegotiator>,
        policy: ViolationPolicy,
    ) -> Self {
        Self {
            id,
            elements: elements.into_iter().map(|e| (e.id(), e)).collect(),
            physics,
            policy,
            progressed: HashSet::new(),
        }
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    /// Run one command; the worker loop and the inline handle both call this
    pub fn execute(&mut self, command: HostCommand) -> Result<HostReply, SimulationError> {
        match command {
            HostCommand::Views => Ok(HostReply::Views(self.views())),
            HostCommand::Negotiate { tick, views } => {
                self.negotiate(tick, &views).map(HostReply::Phase)
            }
            HostCommand::Move {
                tick,
                next_sync_point,
            } => self.move_water(tick, next_sync_point).map(HostReply::Phase),
            HostCommand::Receive => Ok(HostReply::Phase(self.receive())),
            HostCommand::Deliver { tick, messages } => {
                self.deliver(tick, messages).map(HostReply::Phase)
            }
            HostCommand::Fold => Ok(HostReply::Folded(self.fold())),
            HostCommand::Totals => Ok(HostReply::Totals(self.totals())),
            HostCommand::Export => Ok(HostReply::Elements(self.elements.values().cloned().collect())),
            HostCommand::Get { element } => Ok(HostReply::Element(self.elements.get(&element).cloned())),
            HostCommand::Evict { element } => self.evict(element).map(HostReply::Packed),
            HostCommand::Adopt { payload } => self.adopt(&payload).map(HostReply::Adopted),
            HostCommand::Shutdown => Ok(HostReply::Stopped),
        }
    }

    pub fn views(&self) -> Vec<ElementView> {
        self.elements.values().map(Element::view).collect()
    }

    /// Phase 1. Clears the per-tick progress record.
    pub fn negotiate(
        &mut self,
        tick: u64,
        views: &HashMap<ElementId, ElementView>,
    ) -> Result<PhaseReport, SimulationError> {
        self.progressed.clear();
        let mut report = PhaseReport::default();

        for element in self.elements.values_mut() {
            let outcome = element.negotiate_flow_rates(views, self.physics.as_ref());

            if !outcome.negotiated.is_empty() {
                self.progressed.insert(element.id());
                report.progressed.push(element.id());
            }
            for link in &outcome.negotiated {
                report.events.push(Event::FlowNegotiated {
                    tick,
                    element: element.id(),
                    neighbor: link.neighbor,
                    nominal_flow_rate: link.nominal_flow_rate,
                    expiration_time: link.expiration_time,
                    clamped: link.clamped,
                });
            }
            report.outbox.extend(outcome.messages);

            for violation in outcome.violations {
                handle_violation(self.policy, tick, violation, &mut report)?;
            }
        }

        Ok(report)
    }

    /// Phase 2
    pub fn move_water(
        &mut self,
        tick: u64,
        next_sync_point: f64,
    ) -> Result<PhaseReport, SimulationError> {
        let mut report = PhaseReport::default();

        for element in self.elements.values_mut() {
            let id = element.id();
            match element.select_timestep_and_move_water(next_sync_point) {
                Ok(MoveOutcome::Stepped(step)) => {
                    self.progressed.insert(id);
                    report.progressed.push(id);

                    if step.plan.is_rationed() {
                        warn!(
                            element = %id,
                            demand = step.plan.demand(),
                            available = step.plan.available(),
                            fraction = step.plan.fraction(),
                            "outflow rationed"
                        );
                        report.events.push(Event::OutflowRationed {
                            tick,
                            element: id,
                            demand: step.plan.demand(),
                            available: step.plan.available(),
                            fraction: step.plan.fraction(),
                            residual: step.plan.residual(),
                        });
                    }
                    if step.plan.clamped() > 0.0 {
                        warn!(
                            element = %id,
                            clamped = step.plan.clamped(),
                            "material clamped at zero"
                        );
                        report.events.push(Event::NumericAnomaly {
                            tick,
                            element: id,
                            clamped: step.plan.clamped(),
                        });
                    }
                    report.outbox.extend(step.messages);
                }
                Ok(MoveOutcome::Blocked { .. }) | Ok(MoveOutcome::Idle) => {}
                Err(violation) => handle_violation(self.policy, tick, violation, &mut report)?,
            }
        }

        Ok(report)
    }

    /// Phase 3. Also reports every element's status and fresh view.
    pub fn receive(&mut self) -> PhaseReport {
        let mut report = PhaseReport::default();

        for element in self.elements.values_mut() {
            if element.receive_water_and_advance_time() {
                self.progressed.insert(element.id());
                report.progressed.push(element.id());
            }
        }

        for element in self.elements.values() {
            let progressed = self.progressed.contains(&element.id());
            report.statuses.push((element.id(), element.status(progressed)));
            report.views.push(element.view());
        }

        report
    }

    /// Apply routed messages to their target elements
    pub fn deliver(
        &mut self,
        tick: u64,
        messages: Vec<Message>,
    ) -> Result<PhaseReport, SimulationError> {
        let mut report = PhaseReport::default();

        for message in messages {
            let target = message.target();
            let element = self
                .elements
                .get_mut(&target)
                .ok_or(SimulationError::UnknownElement(target))?;

            let (result, rejected_material) = match message {
                Message::ProxyUpdate {
                    from,
                    proxy_index,
                    nominal_flow_rate,
                    expiration_time,
                    ..
                } => (
                    element.apply_reciprocal_update(
                        proxy_index,
                        from,
                        nominal_flow_rate,
                        expiration_time,
                    ),
                    0.0,
                ),
                Message::Transfer {
                    from,
                    proxy_index,
                    transfer,
                    ..
                } => (
                    element.accept_transfer(proxy_index, from, transfer),
                    transfer.material(),
                ),
            };

            if let Err(violation) = result {
                handle_violation(self.policy, tick, violation, &mut report)?;
                // Only reached under the record policy
                if rejected_material > 0.0 {
                    element.record_rejected_material(rejected_material);
                }
            }
        }

        Ok(report)
    }

    /// Fold cumulative flow on every element, returning how many were folded
    pub fn fold(&mut self) -> usize {
        for element in self.elements.values_mut() {
            element.fold_cumulative_flow();
        }
        self.elements.len()
    }

    pub fn totals(&self) -> MassTotals {
        let mut totals = MassTotals::default();
        for element in self.elements.values() {
            totals.material += element.material();
            totals.in_flight += element.material_in_flight();
            totals.created += element.ledger().created();
            totals.destroyed += element.ledger().destroyed();
        }
        totals
    }

    /// Remove an element and return it packed for relocation
    pub fn evict(&mut self, id: ElementId) -> Result<Vec<u8>, SimulationError> {
        let element = self
            .elements
            .get(&id)
            .ok_or(SimulationError::UnknownElement(id))?;
        let payload = element
            .pack()
            .map_err(|e| SimulationError::SerializationError(format!("Failed to pack {id}: {e}")))?;
        self.elements.remove(&id);
        self.progressed.remove(&id);
        Ok(payload)
    }

    /// Take ownership of a packed element
    pub fn adopt(&mut self, payload: &[u8]) -> Result<ElementId, SimulationError> {
        let element = Element::unpack(payload).map_err(|e| {
            SimulationError::DeserializationError(format!("Failed to unpack element: {e}"))
        })?;
        let id = element.id();
        self.elements.insert(id, element);
        Ok(id)
    }
}

fn handle_violation(
    policy: ViolationPolicy,
    tick: u64,
    violation: ProtocolViolation,
    report: &mut PhaseReport,
) -> Result<(), SimulationError> {
    match policy {
        ViolationPolicy::Abort => Err(SimulationError::Protocol(violation)),
        ViolationPolicy::Record => {
            error!(element = %violation.element(), tick, "{}", violation);
            report
                .events
                .push(Event::ProtocolViolation { tick, violation });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::neighbor::NeighborKind;
    use crate::models::transfer::MaterialTransfer;
    use crate::physics::ScriptedRates;

    fn host(policy: ViolationPolicy) -> Host {
        let mut a = Element::new(ElementId(0), 10.0, 10.0);
        let mut b = Element::new(ElementId(1), 0.0, 10.0);
        Element::connect(&mut a, &mut b, NeighborKind::Mesh, false, false).unwrap();
        Host::new(HostId(0), [a, b], Arc::new(ScriptedRates::default()), policy)
    }

    fn stray_transfer() -> Message {
        Message::Transfer {
            from: ElementId(0),
            to: ElementId(1),
            proxy_index: 0,
            transfer: MaterialTransfer::new(0.0, 1.0, 2.5).unwrap(),
        }
    }

    #[test]
    fn test_recorded_rejection_books_destroyed_material() {
        let mut host = host(ViolationPolicy::Record);
        // Link still expires at 0, so [0, 1] lies outside the window
        let report = host.deliver(3, vec![stray_transfer()]).unwrap();

        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].event_type(), "ProtocolViolation");
        let b = host.element(ElementId(1)).unwrap();
        assert_eq!(b.ledger().destroyed(), 2.5);
        assert_eq!(b.material_in_flight(), 0.0);
    }

    #[test]
    fn test_unnegotiated_links_report_blocked_status() {
        let mut host = host(ViolationPolicy::Abort);
        // Both proxies still expire at 0, so no step can be selected
        let moved = host.move_water(0, 10.0).unwrap();
        assert!(moved.progressed.is_empty());
        assert!(moved.outbox.is_empty());

        let received = host.receive();
        assert_eq!(
            received.statuses,
            vec![
                (ElementId(0), ElementStatus::Blocked),
                (ElementId(1), ElementStatus::Blocked),
            ]
        );
    }

    #[test]
    fn test_abort_policy_surfaces_violation() {
        let mut host = host(ViolationPolicy::Abort);
        let err = host.deliver(3, vec![stray_transfer()]).unwrap_err();
        assert!(matches!(err, SimulationError::Protocol(_)));
    }

    #[test]
    fn test_evict_then_adopt_restores_element() {
        let mut source = host(ViolationPolicy::Abort);
        let before = source.element(ElementId(1)).cloned().unwrap();
        let payload = source.evict(ElementId(1)).unwrap();
        assert_eq!(source.len(), 1);

        let mut target = Host::new(
            HostId(1),
            Vec::<Element>::new(),
            Arc::new(ScriptedRates::default()),
            ViolationPolicy::Abort,
        );
        assert_eq!(target.adopt(&payload).unwrap(), ElementId(1));
        assert_eq!(target.element(ElementId(1)), Some(&before));
    }

    #[test]
    fn test_unknown_target_is_an_error() {
        let mut host = host(ViolationPolicy::Record);
        let message = Message::ProxyUpdate {
            from: ElementId(0),
            to: ElementId(42),
            proxy_index: 0,
            nominal_flow_rate: 1.0,
            expiration_time: 1.0,
        };
        assert!(matches!(
            host.deliver(0, vec![message]),
            Err(SimulationError::UnknownElement(id)) if id == ElementId(42)
        ));
    }
}
