//! Protocol invariant violations
//!
//! A violation means the negotiation or exchange logic upstream produced a
//! state the protocol forbids. Each variant carries the element, the
//! neighbor and the time window involved so the failure can be reproduced.

use crate::models::id::ElementId;
use crate::models::transfer::TransferError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broken protocol invariant, reported with enough context to reproduce
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolViolation {
    #[error("{element} rejected transfer from {neighbor}: {source}")]
    RejectedTransfer {
        element: ElementId,
        neighbor: ElementId,
        source: TransferError,
    },

    #[error("{element} received a delivery from {sender} on the proxy for {neighbor}")]
    WrongSender {
        element: ElementId,
        neighbor: ElementId,
        sender: ElementId,
    },

    #[error(
        "{element}: expiration of link to {neighbor} would move from {previous} to {proposed} at time {current_time}"
    )]
    NonMonotonicExpiration {
        element: ElementId,
        neighbor: ElementId,
        current_time: f64,
        previous: f64,
        proposed: f64,
    },

    #[error(
        "asymmetric link {element}->{neighbor}: rate {rate} vs reciprocal {reciprocal_rate}, expiration {expiration} vs {reciprocal_expiration}"
    )]
    AsymmetricReciprocal {
        element: ElementId,
        neighbor: ElementId,
        rate: f64,
        reciprocal_rate: f64,
        expiration: f64,
        reciprocal_expiration: f64,
    },

    #[error(
        "{element} clock out of order: current {current_time}, step end {timestep_end_time}, earliest expiration {earliest_expiration}"
    )]
    ClockOrder {
        element: ElementId,
        current_time: f64,
        timestep_end_time: f64,
        earliest_expiration: f64,
    },

    #[error("{element} holds invalid material {material} at time {current_time}")]
    NegativeMaterial {
        element: ElementId,
        current_time: f64,
        material: f64,
    },

    #[error(
        "{element}: inbox for {neighbor} is unsorted, overlapping or outside [{window_start}, {window_end}] at [{start_time}, {end_time}]"
    )]
    InboxOrder {
        element: ElementId,
        neighbor: ElementId,
        start_time: f64,
        end_time: f64,
        window_start: f64,
        window_end: f64,
    },

    #[error("{element} links to {neighbor} more than once or to itself")]
    DuplicateLink {
        element: ElementId,
        neighbor: ElementId,
    },

    #[error("{element} has no neighbor proxy at index {index}")]
    UnknownProxy { element: ElementId, index: usize },

    #[error("{element} has no published view of neighbor {neighbor}")]
    UnknownNeighbor {
        element: ElementId,
        neighbor: ElementId,
    },
}

impl ProtocolViolation {
    /// Element whose state or mailbox exposed the violation
    pub fn element(&self) -> ElementId {
        match self {
            ProtocolViolation::RejectedTransfer { element, .. }
            | ProtocolViolation::WrongSender { element, .. }
            | ProtocolViolation::NonMonotonicExpiration { element, .. }
            | ProtocolViolation::AsymmetricReciprocal { element, .. }
            | ProtocolViolation::ClockOrder { element, .. }
            | ProtocolViolation::NegativeMaterial { element, .. }
            | ProtocolViolation::InboxOrder { element, .. }
            | ProtocolViolation::DuplicateLink { element, .. }
            | ProtocolViolation::UnknownProxy { element, .. }
            | ProtocolViolation::UnknownNeighbor { element, .. } => *element,
        }
    }
}

/// What the driver does when an operation reports a violation
///
/// `Abort` stops the run with the violation as the error. `Record` logs it,
/// keeps it in the event log and skips the offending operation, so one bad
/// link does not take down a long production run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationPolicy {
    Abort,
    Record,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            ViolationPolicy::Abort
        } else {
            ViolationPolicy::Record
        }
    }
}
