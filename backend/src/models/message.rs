//! Mailbox messages between elements
//!
//! The only cross-element mutations the protocol allows. Every message is
//! addressed by logical element ID and proxy index; the driver resolves
//! the host that currently owns the target.

use crate::models::id::ElementId;
use crate::models::transfer::MaterialTransfer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Negotiation result for the reciprocal proxy, already negated
    ProxyUpdate {
        from: ElementId,
        to: ElementId,
        proxy_index: usize,
        nominal_flow_rate: f64,
        expiration_time: f64,
    },

    /// Material for the reciprocal proxy's inbox
    Transfer {
        from: ElementId,
        to: ElementId,
        proxy_index: usize,
        transfer: MaterialTransfer,
    },
}

impl Message {
    /// Element the message is addressed to
    pub fn target(&self) -> ElementId {
        match self {
            Message::ProxyUpdate { to, .. } | Message::Transfer { to, .. } => *to,
        }
    }

    /// Element that produced the message
    pub fn sender(&self) -> ElementId {
        match self {
            Message::ProxyUpdate { from, .. } | Message::Transfer { from, .. } => *from,
        }
    }
}
