//! The stimulus display collaborator.
//!
//! The executor only ever asks the display to show a set of points (an empty set clears it).
//! Rendering, homography and window management belong to the implementor.

use parking_lot::Mutex;

use optocompiler_backend::StimulusPoint;

pub trait StimulusDisplay: Send + Sync {
    fn display_points(&self, points: &[StimulusPoint]);
}

/// Keeps every frame it was asked to show, as lists of point indices.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    frames: Mutex<Vec<Vec<usize>>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Vec<usize>> {
        self.frames.lock().clone()
    }

    pub fn last_frame(&self) -> Option<Vec<usize>> {
        self.frames.lock().last().cloned()
    }
}

impl StimulusDisplay for RecordingDisplay {
    fn display_points(&self, points: &[StimulusPoint]) {
        self.frames
            .lock()
            .push(points.iter().map(|point| point.index).collect());
    }
}
