//! Orchestrator - drives elements through the exchange protocol
//!
//! Elements are partitioned across hosts; the engine runs each tick as a
//! sequence of phases separated by barriers and routes messages between
//! hosts through the directory.
//!
//! See `engine.rs` for the tick loop.

pub mod checkpoint;
pub mod directory;
pub mod engine;
pub mod host;
pub mod worker;

// Re-export main types for convenience
pub use directory::{Directory, HostId};
pub use engine::{
    ExecutionMode, MassBalance, Orchestrator, OrchestratorConfig, RunSummary, SimulationError,
    TickResult, CONSERVATION_TOLERANCE,
};
pub use host::{Host, PhaseReport};
pub use worker::{HostCommand, HostHandle, HostReply, MassTotals};

// Re-export checkpoint types
pub use checkpoint::{ElementPlacement, ElementSnapshot, NeighborSnapshot, StateSnapshot};
