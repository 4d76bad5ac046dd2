//! Point-selection patterns and the resolver that applies them from one loop to the next.
//!
//! A [`Pattern`] governs how a selected stimulus point changes between consecutive loops of a
//! program:
//! - `Normal`: the point stays the same.
//! - `IncrementByOne`: the point advances to the next registered point (in index order,
//!   wrapping) that is not already used by the element being built.
//! - `Random`: the point is drawn uniformly from the registered points not already used by
//!   the element being built.
//!
//! [`resolve_next`] resolves a single slot. Building whole elements (Normal points claimed first,
//! then patterned points in order) is done by [`crate::program`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::RngCore;

use crate::error::{GenerationError, Result, ValidationError};
use crate::protocol_element::SelectedStimulusPoint;
use crate::stimulus_point::StimulusPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Pattern {
    #[default]
    Normal,
    IncrementByOne,
    Random,
}

impl Pattern {
    pub const ALL: [Pattern; 3] = [Pattern::Normal, Pattern::IncrementByOne, Pattern::Random];

    pub fn name(&self) -> &'static str {
        match self {
            Pattern::Normal => "Normal",
            Pattern::IncrementByOne => "Increment By One",
            Pattern::Random => "Random",
        }
    }

    pub fn is_normal(&self) -> bool {
        *self == Pattern::Normal
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Pattern {
    type Err = ValidationError;

    /// Accepts display names and variant names, ignoring case, spaces and underscores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "normal" | "normalpattern" => Ok(Pattern::Normal),
            "incrementbyone" | "incrementbyonepattern" => Ok(Pattern::IncrementByOne),
            "random" | "randompattern" => Ok(Pattern::Random),
            _ => Err(ValidationError::UnknownPattern(s.to_string())),
        }
    }
}

/// Resolves the successor of one patterned slot.
///
/// * `previous` - the slot in the previous loop's element.
/// * `points` - the full registry, in ascending index order.
/// * `policy` - the sequence's active pattern.
/// * `claimed` - point indices already taken by the element being built.
/// * `rng` - the program's seeded random stream.
///
/// The returned slot keeps `previous`'s pattern tag. Fails with
/// [`GenerationError::NoCandidate`] when every registered point is claimed.
pub fn resolve_next(
    previous: &SelectedStimulusPoint,
    points: &[&StimulusPoint],
    policy: Pattern,
    claimed: &BTreeSet<usize>,
    rng: &mut dyn RngCore,
) -> Result<SelectedStimulusPoint> {
    let no_candidate = || GenerationError::NoCandidate {
        pattern: policy,
        from: previous.index(),
        claimed: claimed.len(),
        available: points.len(),
    };

    let next_index = match policy {
        Pattern::Normal => previous.index(),
        Pattern::IncrementByOne => {
            let position = points
                .iter()
                .position(|point| point.index == previous.index())
                .ok_or(GenerationError::MissingPoint(previous.index()))?;
            let n = points.len();
            (1..=n)
                .map(|offset| points[(position + offset) % n].index)
                .find(|index| !claimed.contains(index))
                .ok_or_else(no_candidate)?
        }
        Pattern::Random => {
            let candidates: Vec<usize> = points
                .iter()
                .map(|point| point.index)
                .filter(|index| !claimed.contains(index))
                .collect();
            *candidates.choose(rng).ok_or_else(no_candidate)?
        }
    };
    Ok(SelectedStimulusPoint::new(next_index, previous.pattern))
}
