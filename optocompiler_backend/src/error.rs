//! Error types shared by every stage of the compiler.
//!
//! Errors are grouped by when they surface:
//! - [`ValidationError`]: raised synchronously when a mutation or a request would break an invariant.
//! - [`GenerationError`]: raised by the pattern resolver when a program cannot be expanded.
//! - [`LoadError`]: raised when stored state cannot be resolved against the current registry.

use std::fmt;

use crate::pattern::Pattern;
use crate::protocol_element::LineRole;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl Error {
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_generation(&self) -> bool {
        matches!(self, Error::Generation(_))
    }

    pub fn is_load(&self) -> bool {
        matches!(self, Error::Load(_))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{0} can not be switched on while wait is set")]
    LineWhileWaiting(LineRole),
    #[error("wait can not be set while {0} is on")]
    WaitWhileLineOn(LineRole),
    #[error("duration can not be > 0 with wait set to true (got {0})")]
    DurationWhileWaiting(f64),
    #[error("wait can not be set while the duration is {0} > 0")]
    WaitWithDuration(f64),
    #[error("duration must be a finite, non-negative number of seconds (got {0})")]
    InvalidDuration(f64),
    #[error("loop count must be at least 1 (got {0})")]
    InvalidLoopCount(usize),
    #[error("stimulus point {0} is selected more than once in the same element")]
    DuplicateSelection(usize),
    #[error("stimulus point index {0} is already registered")]
    DuplicateIndex(usize),
    #[error("stimulus point {0} is not registered")]
    UnknownPoint(usize),
    #[error("cannot sample {requested} stimulus points from a registry of {available}")]
    SampleTooLarge { requested: usize, available: usize },
    #[error("element {index} is out of range for a sequence of {len} elements")]
    ElementOutOfRange { index: usize, len: usize },
    #[error("loop {index} is out of range for a program of {len} loops")]
    LoopOutOfRange { index: usize, len: usize },
    #[error("unrecognised line name '{0}', expected one of FIO4, FIO5, FIO6, FIO7")]
    UnknownLine(String),
    #[error("unrecognised line role '{0}', expected one of Laser, PMT, Sync, Wait")]
    UnknownRole(String),
    #[error("unrecognised pattern '{0}'")]
    UnknownPattern(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error(
        "no stimulus point could be found for pattern {pattern} following point {from} \
         ({claimed} of {available} points already claimed)"
    )]
    NoCandidate {
        pattern: Pattern,
        from: usize,
        claimed: usize,
        available: usize,
    },
    #[error("stimulus point {0} referenced by the sequence is not in the registry")]
    MissingPoint(usize),
}

/// Location of a field inside a stored protocol, used to localise load errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPath {
    pub element: usize,
    pub slot: usize,
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol[{}].stimulus_points[{}]", self.element, self.slot)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("{at}: stimulus point index {index} not found in the registry")]
    MissingPoint { at: FieldPath, index: usize },
    #[error("{at}: unknown pattern '{name}'")]
    UnknownPattern { at: FieldPath, name: String },
    #[error("pattern_name: unknown pattern '{0}'")]
    UnknownSequencePattern(String),
    #[error("protocol[{element}]: {source}")]
    InvalidElement {
        element: usize,
        #[source]
        source: ValidationError,
    },
    #[error("data[{position}]: {source}")]
    InvalidPoint {
        position: usize,
        #[source]
        source: ValidationError,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
