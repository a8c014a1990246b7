//! Element directory
//!
//! Maps each logical `ElementId` to the host that currently owns it. The
//! driver resolves every message target through the directory, so an
//! element can change host between ticks without its neighbors noticing.

use crate::models::id::ElementId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Execution unit identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(pub usize);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H{}", self.0)
    }
}

/// ElementId → HostId
///
/// # Example
/// ```
/// use hydro_simulator_core_rs::orchestrator::{Directory, HostId};
/// use hydro_simulator_core_rs::ElementId;
///
/// let mut directory = Directory::new();
/// directory.assign(ElementId(4), HostId(0));
/// assert_eq!(directory.relocate(ElementId(4), HostId(2)), Some(HostId(0)));
/// assert_eq!(directory.host_of(ElementId(4)), Some(HostId(2)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    locations: BTreeMap<ElementId, HostId>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spread elements over `num_hosts` in contiguous blocks of ID order
    pub fn partition(ids: impl IntoIterator<Item = ElementId>, num_hosts: usize) -> Self {
        let ids: Vec<ElementId> = ids.into_iter().collect();
        let total = ids.len().max(1);
        let locations = ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, HostId(i * num_hosts / total)))
            .collect();
        Self { locations }
    }

    pub fn assign(&mut self, element: ElementId, host: HostId) {
        self.locations.insert(element, host);
    }

    pub fn host_of(&self, element: ElementId) -> Option<HostId> {
        self.locations.get(&element).copied()
    }

    /// Move an element, returning its previous host
    pub fn relocate(&mut self, element: ElementId, host: HostId) -> Option<HostId> {
        self.locations.insert(element, host)
    }

    pub fn elements_on(&self, host: HostId) -> Vec<ElementId> {
        self.locations
            .iter()
            .filter(|(_, &h)| h == host)
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementId, HostId)> + '_ {
        self.locations.iter().map(|(&e, &h)| (e, h))
    }
}
