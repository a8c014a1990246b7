//! Domain models for the exchange protocol

pub mod element;
pub mod event;
pub mod id;
pub mod ledger;
pub mod message;
pub mod neighbor;
pub mod simple_proxy;
pub mod transfer;
pub mod violation;

// Re-exports
pub use element::{
    Element, ElementStatus, MoveOutcome, NegotiatedLink, NegotiationOutcome, StepTaken,
};
pub use event::{Event, EventLog};
pub use id::ElementId;
pub use ledger::MassLedger;
pub use message::Message;
pub use neighbor::{NeighborKind, NeighborProxy};
pub use simple_proxy::SimpleNeighborProxy;
pub use transfer::{MaterialTransfer, TransferError};
pub use violation::{ProtocolViolation, ViolationPolicy};
