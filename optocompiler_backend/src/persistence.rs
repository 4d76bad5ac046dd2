//! Serialisable forms of a [`ProtocolSequence`].
//!
//! A stored sequence looks like
//!
//! ```json
//! {
//!   "pattern_name": "Random",
//!   "random_seed": 42,
//!   "protocol": [
//!     {
//!       "stimulus_points": [{"stimulus_point_index": 0, "pattern": "Normal"}],
//!       "laser": true, "pmt": false, "sync": false, "wait": false, "duration": 1.0
//!     }
//!   ]
//! }
//! ```
//!
//! Loading resolves every point index against the current registry. A missing index, an unknown
//! pattern or an element that breaks the wait/duration invariants produces a [`LoadError`] that
//! names the offending field.

use serde::{Deserialize, Serialize};

use crate::error::{Error, FieldPath, LoadError, Result};
use crate::pattern::Pattern;
use crate::protocol_element::{ProtocolElement, SelectedStimulusPoint};
use crate::protocol_sequence::ProtocolSequence;
use crate::stimulus_point::PointRegistry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedPointState {
    pub stimulus_point_index: usize,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementState {
    pub stimulus_points: Vec<SelectedPointState>,
    pub laser: bool,
    pub pmt: bool,
    pub sync: bool,
    pub wait: bool,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceState {
    pub pattern_name: String,
    pub random_seed: u64,
    pub protocol: Vec<ElementState>,
}

impl From<&ProtocolElement> for ElementState {
    fn from(element: &ProtocolElement) -> Self {
        Self {
            stimulus_points: element
                .stimulus_points()
                .iter()
                .map(|selected| SelectedPointState {
                    stimulus_point_index: selected.index(),
                    pattern: selected.pattern.name().to_string(),
                })
                .collect(),
            laser: element.laser(),
            pmt: element.pmt(),
            sync: element.sync(),
            wait: element.wait(),
            duration: element.duration(),
        }
    }
}

impl ElementState {
    fn resolve<R: PointRegistry + ?Sized>(&self, element: usize, registry: &R) -> Result<ProtocolElement> {
        let mut points = Vec::with_capacity(self.stimulus_points.len());
        for (slot, stored) in self.stimulus_points.iter().enumerate() {
            let at = FieldPath { element, slot };
            if !registry.contains(stored.stimulus_point_index) {
                return Err(LoadError::MissingPoint {
                    at,
                    index: stored.stimulus_point_index,
                }
                .into());
            }
            let pattern: Pattern = stored.pattern.parse().map_err(|_| LoadError::UnknownPattern {
                at,
                name: stored.pattern.clone(),
            })?;
            points.push(SelectedStimulusPoint::new(stored.stimulus_point_index, pattern));
        }
        ProtocolElement::new(points, self.laser, self.pmt, self.sync, self.wait, self.duration).map_err(
            |err| match err {
                Error::Validation(source) => LoadError::InvalidElement { element, source }.into(),
                other => other,
            },
        )
    }
}

impl ProtocolSequence {
    pub fn to_state(&self) -> SequenceState {
        SequenceState {
            pattern_name: self.pattern().name().to_string(),
            random_seed: self.random_seed(),
            protocol: self.elements().iter().map(ElementState::from).collect(),
        }
    }

    /// Rebuilds a sequence from `state`, checking every point against `registry`.
    pub fn from_state<R: PointRegistry + ?Sized>(state: &SequenceState, registry: &R) -> Result<Self> {
        let pattern: Pattern = state
            .pattern_name
            .parse()
            .map_err(|_| LoadError::UnknownSequencePattern(state.pattern_name.clone()))?;
        let elements = state
            .protocol
            .iter()
            .enumerate()
            .map(|(element, stored)| stored.resolve(element, registry))
            .collect::<Result<Vec<ProtocolElement>>>()?;
        Ok(ProtocolSequence::from_elements(elements, pattern, state.random_seed))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_state()).map_err(|err| LoadError::Json(err).into())
    }

    pub fn from_json<R: PointRegistry + ?Sized>(json: &str, registry: &R) -> Result<Self> {
        let state: SequenceState = serde_json::from_str(json).map_err(LoadError::Json)?;
        Self::from_state(&state, registry)
    }
}
