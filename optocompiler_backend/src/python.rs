//! Python bindings, built with the `python` feature.
//!
//! [`ProtocolDesigner`] bundles a point registry and a protocol sequence so a Python front-end can
//! author, preview and store protocols without holding Rust references:
//!
//! ```python
//! from optocompiler_backend import ProtocolDesigner
//!
//! designer = ProtocolDesigner("Increment By One", 42)
//! for x in range(4):
//!     designer.add_point(x * 20.0, 0.0)
//! designer.add_element([(0, "Increment By One")], laser=True, duration=0.5)
//! loops = designer.generate(3)   # [[[0]], [[1]], [[2]]]
//! ```

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::Error;
use crate::pattern::Pattern;
use crate::program::Program;
use crate::protocol_element::{ProtocolElement, SelectedStimulusPoint};
use crate::protocol_sequence::ProtocolSequence;
use crate::stimulus_point::{PointRegistry, PointsState, StimulusPoints};

impl From<Error> for PyErr {
    fn from(err: Error) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

#[pyclass]
pub struct ProtocolDesigner {
    points: StimulusPoints,
    sequence: ProtocolSequence,
}

fn parse_pattern(name: &str) -> PyResult<Pattern> {
    name.parse::<Pattern>()
        .map_err(|err| PyValueError::new_err(err.to_string()))
}

#[pymethods]
impl ProtocolDesigner {
    #[new]
    #[pyo3(signature = (pattern = "Normal", random_seed = 0))]
    pub fn new(pattern: &str, random_seed: u64) -> PyResult<Self> {
        Ok(Self {
            points: StimulusPoints::new(),
            sequence: ProtocolSequence::new(parse_pattern(pattern)?, random_seed),
        })
    }

    #[pyo3(signature = (x, y, frame = -1))]
    pub fn add_point(&mut self, x: f64, y: f64, frame: i64) -> usize {
        self.points.add_point([x, y], frame)
    }

    pub fn remove_point(&mut self, index: usize) -> bool {
        self.points.remove(index).is_some()
    }

    pub fn set_point_size(&mut self, size: f64) {
        self.points.set_size(size);
    }

    pub fn set_point_intensity(&mut self, index: usize, intensity: f64) -> PyResult<()> {
        Ok(self.points.edit(index, |point| point.intensity = intensity)?)
    }

    pub fn point_indices(&self) -> Vec<usize> {
        self.points.indices()
    }

    /// Draws `k` distinct point indices, sorted.
    pub fn sample_points(&self, k: usize, seed: u64) -> PyResult<Vec<usize>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let chosen = self.points.sample(k, &mut rng)?;
        Ok(chosen.iter().map(|point| point.index).collect())
    }

    #[pyo3(signature = (points, laser = false, pmt = false, sync = false, wait = false, duration = 0.0))]
    pub fn add_element(
        &mut self,
        points: Vec<(usize, String)>,
        laser: bool,
        pmt: bool,
        sync: bool,
        wait: bool,
        duration: f64,
    ) -> PyResult<()> {
        let selected = points
            .iter()
            .map(|(index, pattern)| Ok(SelectedStimulusPoint::new(*index, parse_pattern(pattern)?)))
            .collect::<PyResult<Vec<SelectedStimulusPoint>>>()?;
        let element = ProtocolElement::new(selected, laser, pmt, sync, wait, duration)?;
        self.sequence.push(element);
        Ok(())
    }

    pub fn remove_element(&mut self, index: usize) -> PyResult<()> {
        self.sequence.remove(index)?;
        Ok(())
    }

    pub fn element_count(&self) -> usize {
        self.sequence.len()
    }

    pub fn pattern(&self) -> String {
        self.sequence.pattern().name().to_string()
    }

    pub fn set_pattern(&mut self, pattern: &str) -> PyResult<()> {
        self.sequence.set_pattern(parse_pattern(pattern)?);
        Ok(())
    }

    pub fn random_seed(&self) -> u64 {
        self.sequence.random_seed()
    }

    pub fn set_random_seed(&mut self, random_seed: u64) {
        self.sequence.set_random_seed(random_seed);
    }

    /// Point indices for every (loop, element) of the generated program.
    pub fn generate(&self, loop_count: usize) -> PyResult<Vec<Vec<Vec<usize>>>> {
        let program = Program::generate(&self.sequence, &self.points, loop_count)?;
        Ok(program
            .loops()
            .iter()
            .map(|elements| elements.iter().map(|e| e.point_indices()).collect())
            .collect())
    }

    pub fn sequence_to_json(&self) -> PyResult<String> {
        Ok(self.sequence.to_json()?)
    }

    pub fn load_sequence_json(&mut self, json: &str) -> PyResult<()> {
        self.sequence = ProtocolSequence::from_json(json, &self.points)?;
        Ok(())
    }

    pub fn points_to_json(&self) -> PyResult<String> {
        serde_json::to_string_pretty(&self.points.to_state())
            .map_err(|err| PyValueError::new_err(err.to_string()))
    }

    pub fn load_points_json(&mut self, json: &str) -> PyResult<()> {
        let state: PointsState =
            serde_json::from_str(json).map_err(|err| PyValueError::new_err(err.to_string()))?;
        self.points = StimulusPoints::from_state(state)?;
        Ok(())
    }
}
