//! Host handles and worker threads
//!
//! The driver talks to every host through a [`HostHandle`] with the same
//! two calls: `dispatch` a command, then `collect` the reply. Dispatching a
//! phase to all hosts before collecting any reply, and collecting every
//! reply before the next dispatch, is the barrier between phases.
//!
//! Two execution modes share this interface:
//! - **Inline**: the host lives on the driver thread; `dispatch` runs the
//!   command and parks the reply until `collect`
//! - **Threaded**: one worker thread per host, commands and replies over
//!   crossbeam channels

use crate::models::element::Element;
use crate::models::id::ElementId;
use crate::models::message::Message;
use crate::orchestrator::directory::HostId;
use crate::orchestrator::engine::SimulationError;
use crate::orchestrator::host::{Host, PhaseReport};
use crate::physics::ElementView;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Work the driver hands to a host
#[derive(Debug)]
pub enum HostCommand {
    Views,
    Negotiate {
        tick: u64,
        views: Arc<HashMap<ElementId, ElementView>>,
    },
    Move {
        tick: u64,
        next_sync_point: f64,
    },
    Receive,
    Deliver {
        tick: u64,
        messages: Vec<Message>,
    },
    Fold,
    Totals,
    Export,
    Get {
        element: ElementId,
    },
    Evict {
        element: ElementId,
    },
    Adopt {
        payload: Vec<u8>,
    },
    Shutdown,
}

/// Per-host sums for the mass balance
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MassTotals {
    pub material: f64,
    pub in_flight: f64,
    pub created: f64,
    pub destroyed: f64,
}

impl std::ops::AddAssign for MassTotals {
    fn add_assign(&mut self, other: Self) {
        self.material += other.material;
        self.in_flight += other.in_flight;
        self.created += other.created;
        self.destroyed += other.destroyed;
    }
}

#[derive(Debug)]
pub enum HostReply {
    Views(Vec<ElementView>),
    Phase(PhaseReport),
    Folded(usize),
    Totals(MassTotals),
    Elements(Vec<Element>),
    Element(Option<Element>),
    Packed(Vec<u8>),
    Adopted(ElementId),
    Stopped,
}

type Reply = Result<HostReply, SimulationError>;

pub enum HostHandle {
    Inline {
        host: Box<Host>,
        pending: Option<Reply>,
    },
    Threaded {
        id: HostId,
        commands: Sender<HostCommand>,
        replies: Receiver<Reply>,
        worker: Option<JoinHandle<()>>,
    },
}

impl HostHandle {
    pub fn inline(host: Host) -> Self {
        HostHandle::Inline {
            host: Box::new(host),
            pending: None,
        }
    }

    /// Move the host onto its own worker thread
    pub fn spawn(host: Host) -> Result<Self, SimulationError> {
        let id = host.id();
        let (command_tx, command_rx) = unbounded();
        let (reply_tx, reply_rx) = unbounded();

        let worker = thread::Builder::new()
            .name(format!("host-{}", id.0))
            .spawn(move || run_worker(host, command_rx, reply_tx))
            .map_err(|e| SimulationError::HostFailure {
                host: id,
                reason: format!("failed to spawn worker: {e}"),
            })?;

        Ok(HostHandle::Threaded {
            id,
            commands: command_tx,
            replies: reply_rx,
            worker: Some(worker),
        })
    }

    pub fn id(&self) -> HostId {
        match self {
            HostHandle::Inline { host, .. } => host.id(),
            HostHandle::Threaded { id, .. } => *id,
        }
    }

    /// Start a command without waiting for its reply
    pub fn dispatch(&mut self, command: HostCommand) -> Result<(), SimulationError> {
        match self {
            HostHandle::Inline { host, pending } => {
                *pending = Some(host.execute(command));
                Ok(())
            }
            HostHandle::Threaded { id, commands, .. } => {
                commands
                    .send(command)
                    .map_err(|_| SimulationError::HostFailure {
                        host: *id,
                        reason: "worker is no longer accepting commands".to_string(),
                    })
            }
        }
    }

    /// Wait for the reply to the last dispatched command
    pub fn collect(&mut self) -> Result<HostReply, SimulationError> {
        match self {
            HostHandle::Inline { host, pending } => {
                pending.take().unwrap_or_else(|| {
                    Err(SimulationError::HostFailure {
                        host: host.id(),
                        reason: "collect without a dispatched command".to_string(),
                    })
                })
            }
            HostHandle::Threaded { id, replies, .. } => {
                replies.recv().map_err(|_| SimulationError::HostFailure {
                    host: *id,
                    reason: "worker exited before replying".to_string(),
                })?
            }
        }
    }

    /// Dispatch and collect in one call
    pub fn request(&mut self, command: HostCommand) -> Result<HostReply, SimulationError> {
        self.dispatch(command)?;
        self.collect()
    }
}

impl Drop for HostHandle {
    fn drop(&mut self) {
        if let HostHandle::Threaded {
            id,
            commands,
            worker,
            ..
        } = self
        {
            let _ = commands.send(HostCommand::Shutdown);
            if let Some(handle) = worker.take() {
                if handle.join().is_err() {
                    debug!(host = %id, "host worker panicked");
                }
            }
        }
    }
}

fn run_worker(mut host: Host, commands: Receiver<HostCommand>, replies: Sender<Reply>) {
    debug!(host = %host.id(), elements = host.len(), "host worker started");
    while let Ok(command) = commands.recv() {
        if matches!(command, HostCommand::Shutdown) {
            break;
        }
        if replies.send(host.execute(command)).is_err() {
            break;
        }
    }
    debug!(host = %host.id(), "host worker stopped");
}
