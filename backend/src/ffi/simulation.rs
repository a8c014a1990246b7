//! PyO3 wrapper for the orchestrator

use pyo3::prelude::*;
use pyo3::types::PyDict;

use super::types::{element_snapshot_to_py, tick_result_to_py, to_py_err};
use crate::models::id::ElementId;
use crate::orchestrator::{Orchestrator, OrchestratorConfig, SimulationError};

/// Python handle on one simulation run
///
/// ```python
/// from hydro_simulator_core_rs import Simulation
///
/// sim = Simulation.from_json(open("run.json").read())
/// while not sim.tick()["converged"]:
///     pass
/// print(sim.snapshot(0)["material"])
/// ```
#[pyclass(name = "Simulation", unsendable)]
pub struct PySimulation {
    inner: Orchestrator,
}

fn parse_config(json: &str) -> PyResult<OrchestratorConfig> {
    serde_json::from_str(json)
        .map_err(|e| to_py_err(SimulationError::DeserializationError(e.to_string())))
}

#[pymethods]
impl PySimulation {
    /// Create a simulation from an `OrchestratorConfig` in JSON
    #[staticmethod]
    fn from_json(config: &str) -> PyResult<Self> {
        let inner = Orchestrator::new(parse_config(config)?).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Resume from `save_state()` output; the config must match
    #[staticmethod]
    fn load_state(config: &str, state: &str) -> PyResult<Self> {
        let inner = Orchestrator::load_state(parse_config(config)?, state).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    fn tick<'py>(&mut self, py: Python<'py>) -> PyResult<&'py PyDict> {
        let result = self.inner.tick().map_err(to_py_err)?;
        tick_result_to_py(py, &result)
    }

    /// Run to convergence and return the summary as JSON
    fn run(&mut self) -> PyResult<String> {
        let summary = self.inner.run().map_err(to_py_err)?;
        serde_json::to_string(&summary)
            .map_err(|e| to_py_err(SimulationError::SerializationError(e.to_string())))
    }

    fn save_state(&mut self) -> PyResult<String> {
        self.inner.save_state().map_err(to_py_err)
    }

    fn snapshot<'py>(&mut self, py: Python<'py>, element: u32) -> PyResult<&'py PyDict> {
        let snapshot = self.inner.snapshot(ElementId(element)).map_err(to_py_err)?;
        element_snapshot_to_py(py, &snapshot)
    }

    fn current_tick(&self) -> u64 {
        self.inner.current_tick()
    }

    fn is_converged(&self) -> bool {
        self.inner.is_converged()
    }
}
