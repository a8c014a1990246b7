//! Hydro Simulator Core - Rust Engine
//!
//! Distributed water-exchange simulation with asynchronous, per-element
//! clocks and deterministic execution.
//!
//! # Architecture
//!
//! - **core**: Sync-point schedule and tick counter
//! - **models**: Domain types (Element, NeighborProxy, MaterialTransfer)
//! - **exchange**: Proportional outflow rationing
//! - **physics**: Flow-rate negotiation strategies
//! - **topology**: Element/link configuration and random topologies
//! - **orchestrator**: Hosts, tick loop, migration and checkpoints
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Water is only moved, never lost: material + in-flight equals the
//!    initial total plus the ledgers
//! 2. Every proxy pair is reciprocal (opposite rates, equal expirations)
//! 3. All randomness is deterministic (seeded RNG)

// Module declarations
pub mod core;
pub mod exchange;
pub mod models;
pub mod orchestrator;
pub mod physics;
pub mod rng;
pub mod topology;

// Re-exports for convenience
pub use core::time::SyncSchedule;
pub use exchange::{plan_outflows, OutflowPlan};
pub use models::{
    element::{Element, ElementStatus, MoveOutcome},
    event::{Event, EventLog},
    id::ElementId,
    ledger::MassLedger,
    message::Message,
    neighbor::{NeighborKind, NeighborProxy},
    simple_proxy::SimpleNeighborProxy,
    transfer::{MaterialTransfer, TransferError},
    violation::{ProtocolViolation, ViolationPolicy},
};
pub use orchestrator::{
    ExecutionMode, HostId, MassBalance, Orchestrator, OrchestratorConfig, RunSummary,
    SimulationError, StateSnapshot, TickResult,
};
pub use physics::{ElementView, FlowNegotiator, FlowProposal, LinkContext, PhysicsConfig};
pub use rng::RngManager;
pub use topology::{ConfigurationError, ElementConfig, LinkConfig, TopologyConfig};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn hydro_simulator_core_rs(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<ffi::simulation::PySimulation>()?;
    Ok(())
}
