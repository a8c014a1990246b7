//! Logical element identity
//!
//! Elements refer to each other only through `ElementId`. Which host holds
//! an element is resolved by the driver's directory, so an element can
//! change hosts without any of its neighbors noticing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical identifier of a mesh cell or channel segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u32);

impl ElementId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl From<u32> for ElementId {
    fn from(value: u32) -> Self {
        ElementId(value)
    }
}
