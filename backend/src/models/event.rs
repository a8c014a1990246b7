//! Event logging for run auditing.
//!
//! Captures the accounting-relevant moments of a run: every negotiated
//! link, every rationed or clamped outflow, every recorded protocol
//! violation, and the driver's own milestones. Together with the mass
//! ledgers, the log explains every deviation from exact conservation.
//!
//! # Event Types
//!
//! - **Negotiation**: `FlowNegotiated`
//! - **Exchange**: `OutflowRationed`, `NumericAnomaly`
//! - **Protocol**: `ProtocolViolation` (only under the record policy)
//! - **Driver**: `SyncPointReached`, `CumulativeFlowFolded`, `ElementMigrated`
//!
//! # Example
//!
//! ```rust
//! use hydro_simulator_core_rs::models::{Event, EventLog};
//! use hydro_simulator_core_rs::ElementId;
//!
//! let mut log = EventLog::new();
//! log.log(Event::OutflowRationed {
//!     tick: 3,
//!     element: ElementId(7),
//!     demand: 50.0,
//!     available: 20.0,
//!     fraction: 0.4,
//!     residual: 0.0,
//! });
//!
//! assert_eq!(log.events_of_type("OutflowRationed").len(), 1);
//! assert_eq!(log.events_for_element(ElementId(7)).len(), 1);
//! ```

use crate::models::id::ElementId;
use crate::models::violation::ProtocolViolation as Violation;
use crate::orchestrator::HostId;

/// Run event, stamped with the driver tick it happened in
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Initiator wrote a new rate and expiration into a link
    FlowNegotiated {
        tick: u64,
        element: ElementId,
        neighbor: ElementId,
        nominal_flow_rate: f64,
        expiration_time: f64,
        clamped: bool,
    },

    /// Outgoing demand exceeded the material held; every link scaled by `fraction`
    OutflowRationed {
        tick: u64,
        element: ElementId,
        demand: f64,
        available: f64,
        fraction: f64,
        /// Booked in the ledger: positive destroyed, negative created
        residual: f64,
    },

    /// Material clamped at zero after round-off
    NumericAnomaly {
        tick: u64,
        element: ElementId,
        clamped: f64,
    },

    /// Violation skipped under `ViolationPolicy::Record`
    ProtocolViolation { tick: u64, violation: Violation },

    /// Every element reached the sync point at `time`
    SyncPointReached {
        tick: u64,
        time: f64,
        next_sync_point: f64,
    },

    /// Short-term cumulative flow folded into long-term
    CumulativeFlowFolded { tick: u64, time: f64, elements: usize },

    ElementMigrated {
        tick: u64,
        element: ElementId,
        from_host: HostId,
        to_host: HostId,
    },
}

impl Event {
    /// Get the tick number when this event occurred
    pub fn tick(&self) -> u64 {
        match self {
            Event::FlowNegotiated { tick, .. }
            | Event::OutflowRationed { tick, .. }
            | Event::NumericAnomaly { tick, .. }
            | Event::ProtocolViolation { tick, .. }
            | Event::SyncPointReached { tick, .. }
            | Event::CumulativeFlowFolded { tick, .. }
            | Event::ElementMigrated { tick, .. } => *tick,
        }
    }

    /// Get a short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::FlowNegotiated { .. } => "FlowNegotiated",
            Event::OutflowRationed { .. } => "OutflowRationed",
            Event::NumericAnomaly { .. } => "NumericAnomaly",
            Event::ProtocolViolation { .. } => "ProtocolViolation",
            Event::SyncPointReached { .. } => "SyncPointReached",
            Event::CumulativeFlowFolded { .. } => "CumulativeFlowFolded",
            Event::ElementMigrated { .. } => "ElementMigrated",
        }
    }

    /// Element the event concerns, if any
    pub fn element(&self) -> Option<ElementId> {
        match self {
            Event::FlowNegotiated { element, .. }
            | Event::OutflowRationed { element, .. }
            | Event::NumericAnomaly { element, .. }
            | Event::ElementMigrated { element, .. } => Some(*element),
            Event::ProtocolViolation { violation, .. } => Some(violation.element()),
            Event::SyncPointReached { .. } | Event::CumulativeFlowFolded { .. } => None,
        }
    }
}

/// Event log for storing and querying run events.
///
/// This is a simple wrapper around Vec<Event> with convenience methods.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_at_tick(&self, tick: u64) -> Vec<&Event> {
        self.events.iter().filter(|e| e.tick() == tick).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_element(&self, element: ElementId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.element() == Some(element))
            .collect()
    }

    /// Count of events of one type (summaries)
    pub fn count_of_type(&self, event_type: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
