//! Type conversion utilities for FFI boundary
//!
//! Converts between Rust types and PyO3-compatible types.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::orchestrator::{ElementSnapshot, SimulationError, TickResult};

/// Map engine errors onto Python exceptions
///
/// Configuration and parse problems become `ValueError`; everything that
/// goes wrong while running becomes `RuntimeError`.
pub fn to_py_err(err: SimulationError) -> PyErr {
    match err {
        SimulationError::Configuration(_)
        | SimulationError::DeserializationError(_)
        | SimulationError::ConfigMismatch { .. } => PyValueError::new_err(err.to_string()),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

pub fn tick_result_to_py<'py>(py: Python<'py>, result: &TickResult) -> PyResult<&'py PyDict> {
    let dict = PyDict::new(py);
    dict.set_item("tick", result.tick)?;
    dict.set_item("negotiated", result.negotiated)?;
    dict.set_item("stepped", result.stepped)?;
    dict.set_item("received", result.received)?;
    dict.set_item("blocked", result.blocked)?;
    dict.set_item("done", result.done)?;
    dict.set_item("messages", result.messages)?;
    dict.set_item("violations", result.violations)?;
    dict.set_item("sync_point_reached", result.sync_point_reached)?;
    dict.set_item("converged", result.converged)?;
    Ok(dict)
}

/// Element state without the inbox contents
pub fn element_snapshot_to_py<'py>(
    py: Python<'py>,
    snapshot: &ElementSnapshot,
) -> PyResult<&'py PyDict> {
    let dict = PyDict::new(py);
    dict.set_item("id", snapshot.id.0)?;
    dict.set_item("current_time", snapshot.current_time)?;
    dict.set_item("timestep_end_time", snapshot.timestep_end_time)?;
    dict.set_item("material", snapshot.material)?;
    dict.set_item("in_flight", snapshot.material_in_flight())?;
    dict.set_item("created", snapshot.created)?;
    dict.set_item("destroyed", snapshot.destroyed)?;

    let neighbors = snapshot
        .neighbors
        .iter()
        .map(|n| {
            let entry = PyDict::new(py);
            entry.set_item("neighbor", n.neighbor.0)?;
            entry.set_item("nominal_flow_rate", n.nominal_flow_rate)?;
            entry.set_item("expiration_time", n.expiration_time)?;
            entry.set_item("queued", n.incoming_material.len())?;
            entry.set_item("cumulative_flow", n.cumulative_flow)?;
            Ok(entry)
        })
        .collect::<PyResult<Vec<_>>>()?;
    dict.set_item("neighbors", neighbors)?;
    Ok(dict)
}
