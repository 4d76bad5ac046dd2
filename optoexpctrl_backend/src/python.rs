//! Python bindings, built with the `python` feature.
//!
//! [`SimulatedRunner`] executes protocols authored with `optocompiler_backend.ProtocolDesigner`
//! on a [`SimulatedLabJack`], so a front-end can rehearse a run without hardware:
//!
//! ```python
//! from optocompiler_backend import ProtocolDesigner
//! from optoexpctrl_backend import SimulatedRunner
//!
//! runner = SimulatedRunner('{"inter_loop_delay": 0.1}')
//! runner.start(designer.sequence_to_json(), designer.points_to_json(), 3)
//! runner.join()      # "Completed"
//! runner.frames()    # point indices shown, ending with []
//! ```

use std::sync::Arc;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use optocompiler_backend::{LoadError, PointsState, ProtocolSequence, StimulusPoints};

use crate::config::ExecutorConfig;
use crate::display::RecordingDisplay;
use crate::executor::{ExecutorError, SequenceExecutor};
use crate::simulated::SimulatedLabJack;

impl From<ExecutorError> for PyErr {
    fn from(err: ExecutorError) -> PyErr {
        match err {
            ExecutorError::Busy | ExecutorError::Spawn(_) | ExecutorError::Device(_) => {
                PyRuntimeError::new_err(err.to_string())
            }
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}

/// Parses the JSON produced by `sequence_to_json` and `points_to_json`.
fn load_inputs(
    sequence_json: &str,
    points_json: &str,
) -> optocompiler_backend::Result<(ProtocolSequence, StimulusPoints)> {
    let state: PointsState = serde_json::from_str(points_json).map_err(LoadError::Json)?;
    let points = StimulusPoints::from_state(state)?;
    let sequence = ProtocolSequence::from_json(sequence_json, &points)?;
    Ok((sequence, points))
}

#[pyclass]
pub struct SimulatedRunner {
    executor: SequenceExecutor<SimulatedLabJack>,
    display: Arc<RecordingDisplay>,
}

#[pymethods]
impl SimulatedRunner {
    #[new]
    #[pyo3(signature = (config_json = None))]
    pub fn new(config_json: Option<&str>) -> PyResult<Self> {
        let config = match config_json {
            Some(json) => {
                ExecutorConfig::from_json_str(json).map_err(|err| PyValueError::new_err(err.to_string()))?
            }
            None => ExecutorConfig::default(),
        };
        let display = Arc::new(RecordingDisplay::new());
        let executor = SequenceExecutor::new(SimulatedLabJack::new(), display.clone(), config)?;
        Ok(Self { executor, display })
    }

    /// Generates and runs the sequence on the worker thread; returns immediately.
    pub fn start(&mut self, sequence_json: &str, points_json: &str, loop_count: usize) -> PyResult<()> {
        let (sequence, points) = load_inputs(sequence_json, points_json)?;
        self.executor.start_sequence(&sequence, &points, loop_count)?;
        Ok(())
    }

    pub fn interrupt(&self) {
        self.executor.interrupt();
    }

    /// Blocks until the run ends, releasing the GIL. `None` if nothing was started.
    pub fn join(&mut self, py: Python<'_>) -> Option<String> {
        let executor = &mut self.executor;
        py.allow_threads(|| executor.join())
            .map(|outcome| format!("{:?}", outcome))
    }

    pub fn state(&self) -> String {
        format!("{:?}", self.executor.state())
    }

    pub fn frames(&self) -> Vec<Vec<usize>> {
        self.display.frames()
    }

    /// Every command batch the simulated device executed, e.g. `["BitStateWrite(FIO4, 1)"]`.
    pub fn executed_commands(&self) -> Vec<Vec<String>> {
        let device = self.executor.device();
        let device = device.lock();
        device
            .executed()
            .iter()
            .map(|batch| batch.iter().map(|command| command.to_string()).collect())
            .collect()
    }
}
