//! Orchestrator Engine
//!
//! Drives every element through the exchange protocol, one tick at a time:
//!
//! ```text
//! For each tick t:
//! 1. Publish element views (current time, material) from the last receive
//! 2. Negotiate on every host           → barrier → route reciprocal updates
//! 3. Select timestep and move water    → barrier → route transfers
//! 4. Receive water and advance time    → barrier → collect statuses and views
//! 5. If every element reached the sync point: fold cumulative flow,
//!    move the sync point forward
//! 6. Advance the tick counter
//! ```
//!
//! Each barrier is a dispatch/collect rendezvous over the host handles, so
//! no host starts a phase before every host finished the previous one.
//!
//! # Example
//!
//! ```rust
//! use hydro_simulator_core_rs::orchestrator::{ExecutionMode, Orchestrator, OrchestratorConfig};
//! use hydro_simulator_core_rs::physics::{PhysicsConfig, ScriptedLink};
//! use hydro_simulator_core_rs::topology::{ElementConfig, LinkConfig, TopologyConfig};
//! use hydro_simulator_core_rs::{ElementId, NeighborKind};
//!
//! let config = OrchestratorConfig {
//!     simulation_end_time: 5.0,
//!     sync_interval: None,
//!     num_hosts: 1,
//!     execution: ExecutionMode::Inline,
//!     violation_policy: None,
//!     max_ticks: Some(100),
//!     topology: TopologyConfig {
//!         elements: vec![
//!             ElementConfig { id: ElementId(0), initial_material: 100.0 },
//!             ElementConfig { id: ElementId(1), initial_material: 0.0 },
//!         ],
//!         links: vec![LinkConfig::new(ElementId(0), ElementId(1), NeighborKind::Channel)],
//!     },
//!     physics: PhysicsConfig::Scripted {
//!         links: vec![ScriptedLink { from: ElementId(0), to: ElementId(1), rate: 10.0, duration: 5.0 }],
//!     },
//! };
//!
//! let mut orchestrator = Orchestrator::new(config).unwrap();
//! let summary = orchestrator.run().unwrap();
//! assert!(summary.converged);
//! assert_eq!(orchestrator.snapshot(ElementId(1)).unwrap().material, 50.0);
//! ```

use crate::core::time::SyncSchedule;
use crate::models::element::{Element, ElementStatus};
use crate::models::event::{Event, EventLog};
use crate::models::id::ElementId;
use crate::models::message::Message;
use crate::models::violation::{ProtocolViolation, ViolationPolicy};
use crate::orchestrator::checkpoint::{
    compute_config_hash, validate_snapshot, ElementPlacement, ElementSnapshot, StateSnapshot,
};
use crate::orchestrator::directory::{Directory, HostId};
use crate::orchestrator::host::{Host, PhaseReport};
use crate::orchestrator::worker::{HostCommand, HostHandle, HostReply, MassTotals};
use crate::physics::{ElementView, FlowNegotiator, PhysicsConfig};
use crate::topology::{build_elements, validate_pairing, ConfigurationError, TopologyConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Relative tolerance for mass-balance checks
pub const CONSERVATION_TOLERANCE: f64 = 1e-9;

// ============================================================================
// Configuration Types
// ============================================================================

/// How hosts are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// All hosts on the driver thread
    #[default]
    Inline,
    /// One worker thread per host
    Threaded,
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Time every element runs to
    pub simulation_end_time: f64,

    /// Spacing of global sync points; `None` = end time only
    #[serde(default)]
    pub sync_interval: Option<f64>,

    #[serde(default = "default_num_hosts")]
    pub num_hosts: usize,

    #[serde(default)]
    pub execution: ExecutionMode,

    /// `None` = build default (abort in debug, record in release)
    #[serde(default)]
    pub violation_policy: Option<ViolationPolicy>,

    /// Report a stalled run after this many ticks
    #[serde(default)]
    pub max_ticks: Option<u64>,

    pub topology: TopologyConfig,

    pub physics: PhysicsConfig,
}

fn default_num_hosts() -> usize {
    1
}

impl OrchestratorConfig {
    /// Check everything that does not need the topology built
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.simulation_end_time.is_finite() && self.simulation_end_time > 0.0) {
            return Err(ConfigurationError::InvalidEndTime {
                end_time: self.simulation_end_time,
            });
        }
        if let Some(interval) = self.sync_interval {
            if !(interval.is_finite() && interval > 0.0) {
                return Err(ConfigurationError::InvalidSyncInterval { interval });
            }
        }
        if self.num_hosts == 0 {
            return Err(ConfigurationError::NoHosts);
        }
        Ok(())
    }

    pub fn policy(&self) -> ViolationPolicy {
        self.violation_policy.unwrap_or_default()
    }

    /// Hash of the fields a checkpoint must agree on
    pub fn identity_hash(&self) -> Result<String, SimulationError> {
        #[derive(Serialize)]
        struct Identity<'a> {
            simulation_end_time: f64,
            sync_interval: Option<f64>,
            num_hosts: usize,
            topology: &'a TopologyConfig,
            physics: &'a PhysicsConfig,
        }

        compute_config_hash(&Identity {
            simulation_end_time: self.simulation_end_time,
            sync_interval: self.sync_interval,
            num_hosts: self.num_hosts,
            topology: &self.topology,
            physics: &self.physics,
        })
    }
}

// ============================================================================
// Results
// ============================================================================

/// What happened in one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickResult {
    pub tick: u64,
    /// Elements that renegotiated at least one link
    pub negotiated: usize,
    /// Elements that started a new step
    pub stepped: usize,
    /// Elements that advanced their clock
    pub received: usize,
    /// Elements with no progress this tick
    pub blocked: usize,
    pub done: usize,
    /// Messages routed between elements
    pub messages: usize,
    /// Violations recorded (record policy only)
    pub violations: usize,
    pub sync_point_reached: bool,
    pub converged: bool,
}

/// Water accounting across all hosts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassBalance {
    pub initial: f64,
    /// Held by elements
    pub material: f64,
    /// Sent but not yet received
    pub in_flight: f64,
    pub created: f64,
    pub destroyed: f64,
}

impl MassBalance {
    /// `initial + created − destroyed`
    pub fn expected(&self) -> f64 {
        self.initial + self.created - self.destroyed
    }

    /// `material + in_flight`
    pub fn actual(&self) -> f64 {
        self.material + self.in_flight
    }

    pub fn discrepancy(&self) -> f64 {
        self.actual() - self.expected()
    }

    pub fn is_conserved(&self) -> bool {
        let scale = self.expected().abs().max(1.0);
        self.discrepancy().abs() <= CONSERVATION_TOLERANCE * scale
    }
}

/// Outcome of a full run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub ticks: u64,
    pub converged: bool,
    pub simulation_end_time: f64,
    pub sync_points_reached: u64,
    pub num_elements: usize,
    pub num_hosts: usize,
    pub mass_balance: MassBalance,
    pub rationing_events: usize,
    pub numeric_anomalies: usize,
    pub recorded_violations: usize,
    pub migrations: usize,
}

// ============================================================================
// Errors
// ============================================================================

/// Simulation error types
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid config: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Config mismatch: expected hash {expected}, got {actual}")]
    ConfigMismatch { expected: String, actual: String },

    #[error("State validation error: {0}")]
    StateValidationError(String),

    #[error("Element not found: {0}")]
    UnknownElement(ElementId),

    #[error("Host not found: {0}")]
    UnknownHost(HostId),

    #[error("Host {host} failed: {reason}")]
    HostFailure { host: HostId, reason: String },

    #[error("Tick limit exceeded at tick {tick}; blocked elements: {blocked:?}")]
    TickLimitExceeded { tick: u64, blocked: Vec<ElementId> },
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    config: OrchestratorConfig,
    run_id: Uuid,
    schedule: SyncSchedule,
    directory: Directory,
    hosts: Vec<HostHandle>,
    /// Views published by the last receive phase
    views: HashMap<ElementId, ElementView>,
    statuses: BTreeMap<ElementId, ElementStatus>,
    initial_material: f64,
    event_log: EventLog,
    migrations: usize,
}

impl Orchestrator {
    /// Validate the config, build the topology and start the hosts
    pub fn new(config: OrchestratorConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let physics = config.physics.build()?;
        let elements = build_elements(&config.topology, config.simulation_end_time)?;
        let initial_material = config.topology.total_initial_material();
        let schedule = SyncSchedule::new(config.simulation_end_time, config.sync_interval);
        let directory = Directory::partition(elements.iter().map(Element::id), config.num_hosts);

        let orchestrator = Self::assemble(
            config,
            Uuid::new_v4(),
            schedule,
            directory,
            elements,
            physics,
            initial_material,
        )?;

        info!(
            run_id = %orchestrator.run_id,
            elements = orchestrator.directory.len(),
            hosts = orchestrator.hosts.len(),
            "orchestrator ready"
        );
        Ok(orchestrator)
    }

    /// Distribute elements to hosts and publish their initial views
    pub(crate) fn assemble(
        config: OrchestratorConfig,
        run_id: Uuid,
        schedule: SyncSchedule,
        directory: Directory,
        elements: Vec<Element>,
        physics: Arc<dyn FlowNegotiator>,
        initial_material: f64,
    ) -> Result<Self, SimulationError> {
        let policy = config.policy();

        let mut per_host: Vec<Vec<Element>> = (0..config.num_hosts).map(|_| Vec::new()).collect();
        for element in elements {
            let host = directory
                .host_of(element.id())
                .ok_or(SimulationError::UnknownElement(element.id()))?;
            per_host
                .get_mut(host.0)
                .ok_or(SimulationError::UnknownHost(host))?
                .push(element);
        }

        let mut hosts = Vec::with_capacity(per_host.len());
        for (i, elements) in per_host.into_iter().enumerate() {
            let host = Host::new(HostId(i), elements, Arc::clone(&physics), policy);
            hosts.push(match config.execution {
                ExecutionMode::Inline => HostHandle::inline(host),
                ExecutionMode::Threaded => HostHandle::spawn(host)?,
            });
        }

        let mut orchestrator = Self {
            config,
            run_id,
            schedule,
            directory,
            hosts,
            views: HashMap::new(),
            statuses: BTreeMap::new(),
            initial_material,
            event_log: EventLog::new(),
            migrations: 0,
        };
        orchestrator.views = orchestrator.collect_views()?;
        Ok(orchestrator)
    }

    // ========================================================================
    // Getters
    // ========================================================================

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn current_tick(&self) -> u64 {
        self.schedule.current_tick()
    }

    pub fn next_sync_point(&self) -> f64 {
        self.schedule.next_sync_point()
    }

    pub fn schedule(&self) -> &SyncSchedule {
        &self.schedule
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn num_hosts(&self) -> usize {
        self.hosts.len()
    }

    pub fn initial_material(&self) -> f64 {
        self.initial_material
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Status of every element after the last tick
    pub fn statuses(&self) -> &BTreeMap<ElementId, ElementStatus> {
        &self.statuses
    }

    /// Views published by the last receive phase
    pub fn views(&self) -> &HashMap<ElementId, ElementView> {
        &self.views
    }

    /// Every element reached the simulation end time
    pub fn is_converged(&self) -> bool {
        self.views
            .values()
            .all(|v| v.current_time >= v.simulation_end_time)
    }

    // ========================================================================
    // Tick loop
    // ========================================================================

    /// Execute one tick: negotiate, move, receive, with a barrier after each
    pub fn tick(&mut self) -> Result<TickResult, SimulationError> {
        let tick = self.schedule.current_tick();
        let next_sync_point = self.schedule.next_sync_point();
        let was_converged = self.is_converged();
        let mut result = TickResult {
            tick,
            ..Default::default()
        };

        // PHASE 1: NEGOTIATE
        let views = Arc::new(self.views.clone());
        let reports = self.run_phase(|| HostCommand::Negotiate {
            tick,
            views: Arc::clone(&views),
        })?;
        result.negotiated = reports.iter().map(|r| r.progressed.len()).sum();
        result.messages += self.route(tick, reports, &mut result)?;

        // PHASE 2: MOVE
        let reports = self.run_phase(|| HostCommand::Move {
            tick,
            next_sync_point,
        })?;
        result.stepped = reports.iter().map(|r| r.progressed.len()).sum();
        result.messages += self.route(tick, reports, &mut result)?;

        // PHASE 3: RECEIVE
        let reports = self.run_phase(|| HostCommand::Receive)?;
        for report in reports {
            result.received += report.progressed.len();
            self.statuses.extend(report.statuses);
            self.views
                .extend(report.views.into_iter().map(|view| (view.id, view)));
        }
        result.blocked = self
            .statuses
            .values()
            .filter(|s| **s == ElementStatus::Blocked)
            .count();
        result.done = self
            .statuses
            .values()
            .filter(|s| **s == ElementStatus::Done)
            .count();

        // SYNC POINT
        let all_reached = self
            .views
            .values()
            .all(|v| v.current_time >= next_sync_point);
        if all_reached && !was_converged {
            result.sync_point_reached = true;
            self.reach_sync_point(tick, next_sync_point)?;
        }

        result.converged = self.is_converged();
        if result.converged && !was_converged {
            info!(tick, run_id = %self.run_id, "all elements reached the end time");
        }

        debug!(
            tick,
            negotiated = result.negotiated,
            stepped = result.stepped,
            received = result.received,
            blocked = result.blocked,
            "tick complete"
        );

        self.schedule.advance_tick();
        Ok(result)
    }

    /// Tick until every element reaches the end time
    ///
    /// # Errors
    ///
    /// `TickLimitExceeded` with the blocked element IDs once `max_ticks`
    /// ticks have run without convergence. Element state is left as is.
    pub fn run(&mut self) -> Result<RunSummary, SimulationError> {
        while !self.is_converged() {
            if let Some(limit) = self.config.max_ticks {
                if self.schedule.current_tick() >= limit {
                    return Err(SimulationError::TickLimitExceeded {
                        tick: self.schedule.current_tick(),
                        blocked: self.blocked_elements(),
                    });
                }
            }
            self.tick()?;
        }
        self.summary()
    }

    /// Elements not yet done, preferring those that made no progress
    pub fn blocked_elements(&self) -> Vec<ElementId> {
        let unfinished: Vec<ElementId> = self
            .views
            .values()
            .filter(|v| v.current_time < v.simulation_end_time)
            .map(|v| v.id)
            .collect();
        let mut blocked: Vec<ElementId> = unfinished
            .iter()
            .copied()
            .filter(|id| self.statuses.get(id) == Some(&ElementStatus::Blocked))
            .collect();
        if blocked.is_empty() {
            blocked = unfinished;
        }
        blocked.sort();
        blocked
    }

    pub fn summary(&mut self) -> Result<RunSummary, SimulationError> {
        let mass_balance = self.mass_balance()?;
        Ok(RunSummary {
            run_id: self.run_id.to_string(),
            ticks: self.schedule.current_tick(),
            converged: self.is_converged(),
            simulation_end_time: self.config.simulation_end_time,
            sync_points_reached: self.schedule.sync_points_reached(),
            num_elements: self.directory.len(),
            num_hosts: self.hosts.len(),
            mass_balance,
            rationing_events: self.event_log.count_of_type("OutflowRationed"),
            numeric_anomalies: self.event_log.count_of_type("NumericAnomaly"),
            recorded_violations: self.event_log.count_of_type("ProtocolViolation"),
            migrations: self.migrations,
        })
    }

    fn reach_sync_point(&mut self, tick: u64, time: f64) -> Result<(), SimulationError> {
        let folded: usize = self
            .broadcast(|| HostCommand::Fold)?
            .into_iter()
            .map(|reply| match reply {
                HostReply::Folded(n) => Ok(n),
                other => Err(unexpected_reply(&other)),
            })
            .sum::<Result<usize, SimulationError>>()?;

        self.schedule.reach_sync_point();
        let next = self.schedule.next_sync_point();
        info!(tick, time, next_sync_point = next, "sync point reached");

        self.event_log.log(Event::SyncPointReached {
            tick,
            time,
            next_sync_point: next,
        });
        self.event_log.log(Event::CumulativeFlowFolded {
            tick,
            time,
            elements: folded,
        });
        Ok(())
    }

    /// Dispatch one phase to every host, then collect every report
    fn run_phase(
        &mut self,
        command: impl Fn() -> HostCommand,
    ) -> Result<Vec<PhaseReport>, SimulationError> {
        self.broadcast(command)?
            .into_iter()
            .map(|reply| match reply {
                HostReply::Phase(report) => Ok(report),
                other => Err(unexpected_reply(&other)),
            })
            .collect()
    }

    fn broadcast(
        &mut self,
        command: impl Fn() -> HostCommand,
    ) -> Result<Vec<HostReply>, SimulationError> {
        for host in &mut self.hosts {
            host.dispatch(command())?;
        }
        // Drain every reply before reporting the first failure
        let replies: Vec<_> = self.hosts.iter_mut().map(HostHandle::collect).collect();
        replies.into_iter().collect()
    }

    /// Log phase events, then deliver every outbox message to its owner
    ///
    /// Delivery is itself a dispatch/collect round, so all mail is in
    /// place before the next phase starts. Returns the number of messages.
    fn route(
        &mut self,
        tick: u64,
        reports: Vec<PhaseReport>,
        result: &mut TickResult,
    ) -> Result<usize, SimulationError> {
        let mut mail: Vec<Vec<Message>> = (0..self.hosts.len()).map(|_| Vec::new()).collect();
        let mut count = 0;

        for report in reports {
            self.absorb_events(report.events, result);
            for message in report.outbox {
                let target = message.target();
                let host = self
                    .directory
                    .host_of(target)
                    .ok_or(SimulationError::UnknownElement(target))?;
                mail.get_mut(host.0)
                    .ok_or(SimulationError::UnknownHost(host))?
                    .push(message);
                count += 1;
            }
        }

        for (host, messages) in self.hosts.iter_mut().zip(mail.iter_mut()) {
            host.dispatch(HostCommand::Deliver {
                tick,
                messages: std::mem::take(messages),
            })?;
        }
        let mut delivery_events = Vec::new();
        for host in &mut self.hosts {
            match host.collect()? {
                HostReply::Phase(report) => delivery_events.extend(report.events),
                other => return Err(unexpected_reply(&other)),
            }
        }
        self.absorb_events(delivery_events, result);

        Ok(count)
    }

    fn absorb_events(&mut self, events: Vec<Event>, result: &mut TickResult) {
        for event in events {
            if matches!(event, Event::ProtocolViolation { .. }) {
                result.violations += 1;
            }
            self.event_log.log(event);
        }
    }

    fn collect_views(&mut self) -> Result<HashMap<ElementId, ElementView>, SimulationError> {
        let mut views = HashMap::new();
        for reply in self.broadcast(|| HostCommand::Views)? {
            match reply {
                HostReply::Views(host_views) => {
                    views.extend(host_views.into_iter().map(|v| (v.id, v)));
                }
                other => return Err(unexpected_reply(&other)),
            }
        }
        Ok(views)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Clone of every element, ordered by ID
    pub fn elements(&mut self) -> Result<Vec<Element>, SimulationError> {
        let mut elements = Vec::with_capacity(self.directory.len());
        for reply in self.broadcast(|| HostCommand::Export)? {
            match reply {
                HostReply::Elements(host_elements) => elements.extend(host_elements),
                other => return Err(unexpected_reply(&other)),
            }
        }
        elements.sort_by_key(Element::id);
        Ok(elements)
    }

    /// Read-only state of one element
    pub fn snapshot(&mut self, id: ElementId) -> Result<ElementSnapshot, SimulationError> {
        let host = self.host_index(id)?;
        match self.hosts[host].request(HostCommand::Get { element: id })? {
            HostReply::Element(Some(element)) => Ok(ElementSnapshot::from(&element)),
            HostReply::Element(None) => Err(SimulationError::UnknownElement(id)),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Sum material, in-flight water and ledgers over all hosts
    pub fn mass_balance(&mut self) -> Result<MassBalance, SimulationError> {
        let mut totals = MassTotals::default();
        for reply in self.broadcast(|| HostCommand::Totals)? {
            match reply {
                HostReply::Totals(host_totals) => totals += host_totals,
                other => return Err(unexpected_reply(&other)),
            }
        }
        Ok(MassBalance {
            initial: self.initial_material,
            material: totals.material,
            in_flight: totals.in_flight,
            created: totals.created,
            destroyed: totals.destroyed,
        })
    }

    /// Check every protocol invariant across all elements
    ///
    /// Runs each element's local check, then verifies that every proxy pair
    /// is reciprocal (opposite rates, equal expirations) and that total
    /// water matches the ledgers.
    pub fn check_invariants(&mut self) -> Result<(), SimulationError> {
        let elements = self.elements()?;
        check_elements(&elements)?;

        let balance = self.mass_balance()?;
        if !balance.is_conserved() {
            return Err(SimulationError::StateValidationError(format!(
                "mass not conserved: expected {}, found {} (discrepancy {})",
                balance.expected(),
                balance.actual(),
                balance.discrepancy()
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Migration
    // ========================================================================

    /// Move an element to another host between ticks
    ///
    /// The element travels packed, with its inboxes, cumulative flow and
    /// ledger intact; the directory is updated so later mail follows it.
    pub fn migrate(&mut self, id: ElementId, to: HostId) -> Result<(), SimulationError> {
        let from = self
            .directory
            .host_of(id)
            .ok_or(SimulationError::UnknownElement(id))?;
        if to.0 >= self.hosts.len() {
            return Err(SimulationError::UnknownHost(to));
        }
        if from == to {
            return Ok(());
        }

        let payload = match self.hosts[from.0].request(HostCommand::Evict { element: id })? {
            HostReply::Packed(payload) => payload,
            other => return Err(unexpected_reply(&other)),
        };
        match self.hosts[to.0].request(HostCommand::Adopt { payload })? {
            HostReply::Adopted(adopted) if adopted == id => {}
            other => return Err(unexpected_reply(&other)),
        }
        self.directory.relocate(id, to);
        self.migrations += 1;

        let tick = self.schedule.current_tick();
        info!(element = %id, from = %from, to = %to, tick, "element migrated");
        self.event_log.log(Event::ElementMigrated {
            tick,
            element: id,
            from_host: from,
            to_host: to,
        });
        Ok(())
    }

    // ========================================================================
    // Checkpointing
    // ========================================================================

    /// Serialize the complete run state between ticks
    pub fn save_state(&mut self) -> Result<String, SimulationError> {
        let elements = self.elements()?;
        let snapshot = StateSnapshot {
            run_id: self.run_id,
            current_tick: self.schedule.current_tick(),
            next_sync_point: self.schedule.next_sync_point(),
            sync_points_reached: self.schedule.sync_points_reached(),
            initial_material: self.initial_material,
            elements: elements.iter().map(ElementSnapshot::from).collect(),
            placements: self
                .directory
                .iter()
                .map(|(element, host)| ElementPlacement { element, host })
                .collect(),
            config_hash: self.config.identity_hash()?,
        };
        validate_snapshot(&snapshot, self.hosts.len())?;

        serde_json::to_string(&snapshot)
            .map_err(|e| SimulationError::SerializationError(e.to_string()))
    }

    /// Resume a run from [`Orchestrator::save_state`] output
    ///
    /// The config must describe the same run (topology, physics, end time,
    /// sync interval, host count); execution mode and tick limit may differ.
    pub fn load_state(config: OrchestratorConfig, json: &str) -> Result<Self, SimulationError> {
        config.validate()?;
        let snapshot: StateSnapshot = serde_json::from_str(json)
            .map_err(|e| SimulationError::DeserializationError(e.to_string()))?;

        let expected = config.identity_hash()?;
        if snapshot.config_hash != expected {
            return Err(SimulationError::ConfigMismatch {
                expected,
                actual: snapshot.config_hash,
            });
        }
        validate_snapshot(&snapshot, config.num_hosts)?;

        let physics = config.physics.build()?;
        let elements = snapshot
            .elements
            .into_iter()
            .map(|e| e.into_element(config.simulation_end_time))
            .collect::<Result<Vec<_>, _>>()?;
        validate_pairing(&elements)?;
        check_elements(&elements)?;

        let mut directory = Directory::new();
        for placement in &snapshot.placements {
            directory.assign(placement.element, placement.host);
        }
        let schedule = SyncSchedule::from_state(
            config.simulation_end_time,
            config.sync_interval,
            snapshot.current_tick,
            snapshot.next_sync_point,
            snapshot.sync_points_reached,
        );

        let orchestrator = Self::assemble(
            config,
            snapshot.run_id,
            schedule,
            directory,
            elements,
            physics,
            snapshot.initial_material,
        )?;
        info!(
            run_id = %orchestrator.run_id,
            tick = orchestrator.schedule.current_tick(),
            "orchestrator restored from checkpoint"
        );
        Ok(orchestrator)
    }

    fn host_index(&self, id: ElementId) -> Result<usize, SimulationError> {
        self.directory
            .host_of(id)
            .map(|h| h.0)
            .ok_or(SimulationError::UnknownElement(id))
    }
}

/// Local invariants of every element plus pairwise reciprocity
pub(crate) fn check_elements(elements: &[Element]) -> Result<(), SimulationError> {
    let by_id: HashMap<ElementId, &Element> = elements.iter().map(|e| (e.id(), e)).collect();

    for element in elements {
        element.check_invariant()?;

        for (index, proxy) in element.neighbors().iter().enumerate() {
            let neighbor = by_id
                .get(&proxy.neighbor())
                .ok_or(SimulationError::UnknownElement(proxy.neighbor()))?;
            let reciprocal = neighbor
                .neighbor(proxy.reciprocal_index())
                .filter(|r| r.neighbor() == element.id() && r.reciprocal_index() == index)
                .ok_or(ConfigurationError::MismatchedReciprocal {
                    element: element.id(),
                    neighbor: proxy.neighbor(),
                    index,
                })?;

            if proxy.nominal_flow_rate() != -reciprocal.nominal_flow_rate()
                || proxy.expiration_time() != reciprocal.expiration_time()
            {
                return Err(ProtocolViolation::AsymmetricReciprocal {
                    element: element.id(),
                    neighbor: proxy.neighbor(),
                    rate: proxy.nominal_flow_rate(),
                    reciprocal_rate: reciprocal.nominal_flow_rate(),
                    expiration: proxy.expiration_time(),
                    reciprocal_expiration: reciprocal.expiration_time(),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn unexpected_reply(reply: &HostReply) -> SimulationError {
    SimulationError::StateValidationError(format!("unexpected host reply: {reply:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::ScriptedLink;
    use crate::topology::{ElementConfig, LinkConfig};
    use crate::NeighborKind;

    fn config(execution: ExecutionMode, num_hosts: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            simulation_end_time: 5.0,
            sync_interval: None,
            num_hosts,
            execution,
            violation_policy: Some(ViolationPolicy::Abort),
            max_ticks: Some(50),
            topology: TopologyConfig {
                elements: vec![
                    ElementConfig {
                        id: ElementId(0),
                        initial_material: 100.0,
                    },
                    ElementConfig {
                        id: ElementId(1),
                        initial_material: 0.0,
                    },
                ],
                links: vec![LinkConfig::new(ElementId(0), ElementId(1), NeighborKind::Mesh)],
            },
            physics: PhysicsConfig::Scripted {
                links: vec![ScriptedLink {
                    from: ElementId(0),
                    to: ElementId(1),
                    rate: 10.0,
                    duration: 5.0,
                }],
            },
        }
    }

    #[test]
    fn test_zero_hosts_rejected() {
        let err = Orchestrator::new(config(ExecutionMode::Inline, 0)).err().unwrap();
        assert!(matches!(
            err,
            SimulationError::Configuration(ConfigurationError::NoHosts)
        ));
    }

    #[test]
    fn test_bad_sync_interval_rejected() {
        let mut bad = config(ExecutionMode::Inline, 1);
        bad.sync_interval = Some(0.0);
        assert!(Orchestrator::new(bad).is_err());
    }

    #[test]
    fn test_first_tick_negotiates_and_steps() {
        let mut orchestrator = Orchestrator::new(config(ExecutionMode::Inline, 2)).unwrap();
        let result = orchestrator.tick().unwrap();
        assert_eq!(result.negotiated, 1);
        assert_eq!(result.stepped, 2);
        assert_eq!(result.received, 2);
        assert!(result.converged);
        orchestrator.check_invariants().unwrap();
    }

    #[test]
    fn test_tick_limit_reports_blocked_elements() {
        let mut stalled = config(ExecutionMode::Inline, 1);
        stalled.max_ticks = Some(0);
        let mut orchestrator = Orchestrator::new(stalled).unwrap();
        match orchestrator.run() {
            Err(SimulationError::TickLimitExceeded { tick, blocked }) => {
                assert_eq!(tick, 0);
                assert_eq!(blocked, vec![ElementId(0), ElementId(1)]);
            }
            other => panic!("expected tick limit, got {other:?}"),
        }
    }

    #[test]
    fn test_migrate_to_unknown_host_fails() {
        let mut orchestrator = Orchestrator::new(config(ExecutionMode::Inline, 1)).unwrap();
        assert!(matches!(
            orchestrator.migrate(ElementId(0), HostId(3)),
            Err(SimulationError::UnknownHost(HostId(3)))
        ));
    }
}
