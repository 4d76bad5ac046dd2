//! Expansion of a [`ProtocolSequence`] into a multi-loop [`Program`].
//!
//! Loop 0 is the authored sequence. Every following loop is derived element by element from the
//! loop before it:
//!
//! 1. Points tagged [`Pattern::Normal`] are carried over unchanged and claimed first.
//! 2. The remaining (patterned) points are resolved in their authored order with
//!    [`crate::pattern::resolve_next`], each result joining the claimed set.
//! 3. The new point list is sorted by point index. Lines, wait and duration are copied.
//!
//! A single `StdRng` seeded from the sequence's `random_seed` is consumed across the whole
//! program, so equal inputs always produce equal programs. Generation is all-or-nothing: the
//! first resolver failure is returned and no partial program is observable.

use std::collections::BTreeSet;

use log::debug;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::error::{Error, GenerationError, Result, ValidationError};
use crate::pattern::{resolve_next, Pattern};
use crate::protocol_element::{ProtocolElement, SelectedStimulusPoint};
use crate::protocol_sequence::ProtocolSequence;
use crate::stimulus_point::{PointRegistry, StimulusPoint};

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pattern: Pattern,
    random_seed: u64,
    loops: Vec<Vec<ProtocolElement>>,
}

impl Program {
    /// Expands `sequence` into `loop_count` loops against the points in `registry`.
    pub fn generate<R: PointRegistry + ?Sized>(
        sequence: &ProtocolSequence,
        registry: &R,
        loop_count: usize,
    ) -> Result<Self> {
        Self::generate_with(
            sequence.elements(),
            sequence.pattern(),
            sequence.random_seed(),
            loop_count,
            registry,
        )
    }

    pub fn generate_with<R: PointRegistry + ?Sized>(
        elements: &[ProtocolElement],
        pattern: Pattern,
        random_seed: u64,
        loop_count: usize,
        registry: &R,
    ) -> Result<Self> {
        if loop_count < 1 {
            return Err(ValidationError::InvalidLoopCount(loop_count).into());
        }
        let points = registry.all();
        if let Some(missing) = elements
            .iter()
            .flat_map(|element| element.stimulus_points())
            .find(|selected| !registry.contains(selected.index()))
        {
            return Err(GenerationError::MissingPoint(missing.index()).into());
        }

        let mut rng = StdRng::seed_from_u64(random_seed);
        let mut loops: Vec<Vec<ProtocolElement>> = Vec::with_capacity(loop_count);
        loops.push(elements.to_vec());
        for loop_index in 1..loop_count {
            let previous = &loops[loop_index - 1];
            let next = previous
                .iter()
                .map(|element| next_element(element, &points, pattern, &mut rng))
                .collect::<Result<Vec<ProtocolElement>>>()?;
            loops.push(next);
        }
        debug!(
            "generated program: {} loops x {} elements, pattern {}, seed {}",
            loop_count,
            elements.len(),
            pattern,
            random_seed
        );

        Ok(Self {
            pattern,
            random_seed,
            loops,
        })
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    pub fn random_seed(&self) -> u64 {
        self.random_seed
    }

    pub fn loop_count(&self) -> usize {
        self.loops.len()
    }

    /// Number of elements per loop.
    pub fn iterations(&self) -> usize {
        self.loops.first().map_or(0, |first| first.len())
    }

    pub fn total_elements(&self) -> usize {
        self.loop_count() * self.iterations()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations() == 0
    }

    pub fn loops(&self) -> &[Vec<ProtocolElement>] {
        &self.loops
    }

    pub fn initial_sequence(&self) -> &[ProtocolElement] {
        self.loops.first().map(|first| first.as_slice()).unwrap_or(&[])
    }

    /// Loops 1.., i.e. everything that was produced by the resolver.
    pub fn generated_sequences(&self) -> &[Vec<ProtocolElement>] {
        self.loops.get(1..).unwrap_or(&[])
    }

    pub fn element(&self, loop_index: usize, iteration: usize) -> Option<&ProtocolElement> {
        self.loops.get(loop_index)?.get(iteration)
    }

    /// Point indices shown at (`loop_index`, `iteration`), for previews.
    pub fn point_indices(&self, loop_index: usize, iteration: usize) -> Option<Vec<usize>> {
        self.element(loop_index, iteration)
            .map(|element| element.point_indices())
    }

    /// Resolves the points shown at (`loop_index`, `iteration`) against `registry`.
    pub fn resolve_points<'a, R: PointRegistry + ?Sized>(
        &self,
        loop_index: usize,
        iteration: usize,
        registry: &'a R,
    ) -> Result<Vec<&'a StimulusPoint>> {
        let elements = self.loops.get(loop_index).ok_or(ValidationError::LoopOutOfRange {
            index: loop_index,
            len: self.loop_count(),
        })?;
        let element = elements.get(iteration).ok_or(ValidationError::ElementOutOfRange {
            index: iteration,
            len: elements.len(),
        })?;
        element
            .stimulus_points()
            .iter()
            .map(|selected| {
                registry
                    .get(selected.index())
                    .ok_or_else(|| Error::from(GenerationError::MissingPoint(selected.index())))
            })
            .collect()
    }
}

fn next_element(
    previous: &ProtocolElement,
    points: &[&StimulusPoint],
    pattern: Pattern,
    rng: &mut dyn RngCore,
) -> Result<ProtocolElement> {
    let (normal, patterned): (Vec<&SelectedStimulusPoint>, Vec<&SelectedStimulusPoint>) = previous
        .stimulus_points()
        .iter()
        .partition(|selected| selected.pattern.is_normal());

    let mut claimed: BTreeSet<usize> = normal.iter().map(|selected| selected.index()).collect();
    let mut selection: Vec<SelectedStimulusPoint> = normal.into_iter().copied().collect();
    for selected in patterned {
        let next = resolve_next(selected, points, pattern, &claimed, rng)?;
        claimed.insert(next.index());
        selection.push(next);
    }
    selection.sort_by_key(|selected| selected.index());
    Ok(previous.with_stimulus_points(selection))
}
