//! Stimulus points and the registry that owns them.
//!
//! A [`StimulusPoint`] is a square region on the stimulus display, identified by a stable
//! `index`. Programs never copy points: every selection refers to a point by index, and the
//! registry ([`PointRegistry`], implemented by [`StimulusPoints`]) stays the source of truth
//! for location, size and intensity.
//!
//! ## Persistence
//! The registry serialises to `{size, data: [{index, frame, location, intensity, size}]}`
//! through [`StimulusPoints::to_state`] and [`StimulusPoints::from_state`].

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result, ValidationError};

/// Default edge length applied to newly added points.
pub const DEFAULT_POINT_SIZE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusPoint {
    pub index: usize,
    pub location: [f64; 2],
    pub size: f64,
    pub intensity: f64,
    pub frame: i64,
}

impl StimulusPoint {
    pub fn new(index: usize, location: [f64; 2], size: f64) -> Self {
        Self {
            index,
            location,
            size,
            intensity: 1.0,
            frame: -1,
        }
    }

    pub fn top_left(&self) -> [f64; 2] {
        let half_size = 0.5 * self.size;
        [self.location[0] - half_size, self.location[1] - half_size]
    }

    pub fn bottom_right(&self) -> [f64; 2] {
        let half_size = 0.5 * self.size;
        [self.location[0] + half_size, self.location[1] + half_size]
    }

    /// Axis-aligned bounding box as `(top_left, bottom_right)`.
    pub fn bounding_box(&self) -> ([f64; 2], [f64; 2]) {
        (self.top_left(), self.bottom_right())
    }
}

/// Read access to an ordered collection of stimulus points.
///
/// `all` must return the points sorted by ascending `index`: the increment pattern walks
/// this order.
pub trait PointRegistry {
    fn get(&self, index: usize) -> Option<&StimulusPoint>;
    fn all(&self) -> Vec<&StimulusPoint>;

    fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Chooses `k` distinct points uniformly at random, returned sorted by index.
    fn sample(&self, k: usize, rng: &mut dyn RngCore) -> Result<Vec<&StimulusPoint>> {
        let points = self.all();
        if k > points.len() {
            return Err(ValidationError::SampleTooLarge {
                requested: k,
                available: points.len(),
            }
            .into());
        }
        let mut chosen: Vec<&StimulusPoint> = points.choose_multiple(rng, k).copied().collect();
        chosen.sort_by_key(|point| point.index);
        Ok(chosen)
    }
}

/// Index-keyed registry of stimulus points, always kept in ascending index order.
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusPoints {
    points: IndexMap<usize, StimulusPoint>,
    size: f64,
}

impl Default for StimulusPoints {
    fn default() -> Self {
        Self::new()
    }
}

impl StimulusPoints {
    pub fn new() -> Self {
        Self {
            points: IndexMap::new(),
            size: DEFAULT_POINT_SIZE,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.points.keys().copied().collect()
    }

    /// Registers a point at `location` with the registry's current size and returns its index.
    pub fn add_point(&mut self, location: [f64; 2], frame: i64) -> usize {
        let index = self.points.keys().max().map_or(0, |max| max + 1);
        let mut point = StimulusPoint::new(index, location, self.size);
        point.frame = frame;
        self.points.insert(index, point);
        index
    }

    /// Registers a fully specified point. Indices are unique.
    pub fn insert(&mut self, point: StimulusPoint) -> Result<()> {
        if self.points.contains_key(&point.index) {
            return Err(ValidationError::DuplicateIndex(point.index).into());
        }
        self.points.insert(point.index, point);
        self.points.sort_keys();
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<StimulusPoint> {
        self.points.shift_remove(&index)
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// In-place access for editing location, intensity, size or frame. The index is not editable.
    pub fn edit<F>(&mut self, index: usize, f: F) -> Result<()>
    where
        F: FnOnce(&mut StimulusPoint),
    {
        let point = self
            .points
            .get_mut(&index)
            .ok_or(ValidationError::UnknownPoint(index))?;
        f(point);
        point.index = index;
        Ok(())
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    /// Sets the edge length of every registered point and of points added later.
    pub fn set_size(&mut self, size: f64) {
        self.size = size;
        self.points.values_mut().for_each(|point| point.size = size);
    }

    pub fn to_state(&self) -> PointsState {
        PointsState {
            size: self.size,
            data: self.points.values().cloned().collect(),
        }
    }

    pub fn from_state(state: PointsState) -> Result<Self> {
        let mut points = StimulusPoints::new();
        points.size = state.size;
        for (position, point) in state.data.into_iter().enumerate() {
            if let Err(source) = point_state_check(&points, &point) {
                return Err(LoadError::InvalidPoint { position, source }.into());
            }
            points.points.insert(point.index, point);
        }
        points.points.sort_keys();
        Ok(points)
    }
}

fn point_state_check(points: &StimulusPoints, point: &StimulusPoint) -> Result<(), ValidationError> {
    if points.points.contains_key(&point.index) {
        return Err(ValidationError::DuplicateIndex(point.index));
    }
    Ok(())
}

impl PointRegistry for StimulusPoints {
    fn get(&self, index: usize) -> Option<&StimulusPoint> {
        self.points.get(&index)
    }

    fn all(&self) -> Vec<&StimulusPoint> {
        self.points.values().collect()
    }
}

impl FromIterator<StimulusPoint> for StimulusPoints {
    /// Later points with an already registered index are dropped.
    fn from_iter<I: IntoIterator<Item = StimulusPoint>>(iter: I) -> Self {
        let mut points = StimulusPoints::new();
        for point in iter {
            points.points.entry(point.index).or_insert(point);
        }
        points.points.sort_keys();
        points
    }
}

/// Serialisable form of a [`StimulusPoints`] registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsState {
    pub size: f64,
    pub data: Vec<StimulusPoint>,
}
