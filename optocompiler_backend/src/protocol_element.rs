//! Protocol elements: one step of an authored stimulation sequence.
//!
//! A [`ProtocolElement`] either drives its digital lines (`laser`, `pmt`, `sync`) for a fixed
//! `duration`, or waits for an external trigger (`wait`). The two modes are mutually exclusive and
//! every setter enforces that:
//!
//! - `wait == true` implies `laser == pmt == sync == false` and `duration == 0`.
//! - Switching a line on, or setting a positive duration, while `wait` is set fails.
//! - Setting `wait` while a line is on or the duration is positive fails.
//!
//! Violations are reported as [`ValidationError`]s at the point of mutation.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::pattern::Pattern;

/// Logical meaning of a digital line driven (or read) by a protocol element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineRole {
    Laser,
    #[serde(rename = "PMT")]
    Pmt,
    Sync,
    Wait,
}

impl LineRole {
    pub const ALL: [LineRole; 4] = [LineRole::Laser, LineRole::Pmt, LineRole::Sync, LineRole::Wait];
}

impl fmt::Display for LineRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                LineRole::Laser => "Laser",
                LineRole::Pmt => "PMT",
                LineRole::Sync => "Sync",
                LineRole::Wait => "Wait",
            }
        )
    }
}

impl FromStr for LineRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "laser" => Ok(LineRole::Laser),
            "pmt" => Ok(LineRole::Pmt),
            "sync" => Ok(LineRole::Sync),
            "wait" => Ok(LineRole::Wait),
            _ => Err(ValidationError::UnknownRole(s.to_string())),
        }
    }
}

/// A stimulus point chosen for an element, referenced by registry index, with its pattern tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectedStimulusPoint {
    point_index: usize,
    pub pattern: Pattern,
}

impl SelectedStimulusPoint {
    pub fn new(point_index: usize, pattern: Pattern) -> Self {
        Self {
            point_index,
            pattern,
        }
    }

    pub fn normal(point_index: usize) -> Self {
        Self::new(point_index, Pattern::Normal)
    }

    pub fn index(&self) -> usize {
        self.point_index
    }
}

impl fmt::Display for SelectedStimulusPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.point_index, self.pattern)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProtocolElement {
    stimulus_points: Vec<SelectedStimulusPoint>,
    laser: bool,
    pmt: bool,
    sync: bool,
    wait: bool,
    duration: f64,
}

impl ProtocolElement {
    /// Constructs a validated element.
    ///
    /// # Examples
    ///
    /// ```
    /// use optocompiler_backend::*;
    ///
    /// let element = ProtocolElement::new(vec![SelectedStimulusPoint::normal(0)], true, false, false, false, 2.5);
    /// assert!(element.is_ok());
    ///
    /// // A waiting element can not also drive the laser
    /// let element = ProtocolElement::new(vec![], true, false, false, true, 0.0);
    /// assert!(element.is_err());
    /// ```
    pub fn new(
        stimulus_points: Vec<SelectedStimulusPoint>,
        laser: bool,
        pmt: bool,
        sync: bool,
        wait: bool,
        duration: f64,
    ) -> Result<Self> {
        let mut element = ProtocolElement::default();
        element.set_stimulus_points(stimulus_points)?;
        element.set_duration(duration)?;
        element.set_laser(laser)?;
        element.set_pmt(pmt)?;
        element.set_sync(sync)?;
        element.set_wait(wait)?;
        Ok(element)
    }

    /// An element that drives the given lines for `duration` seconds.
    pub fn timed(stimulus_points: Vec<SelectedStimulusPoint>, duration: f64) -> Result<Self> {
        Self::new(stimulus_points, false, false, false, false, duration)
    }

    /// An element that holds its stimulus until the external trigger arrives.
    pub fn waiting(stimulus_points: Vec<SelectedStimulusPoint>) -> Result<Self> {
        Self::new(stimulus_points, false, false, false, true, 0.0)
    }

    pub fn stimulus_points(&self) -> &[SelectedStimulusPoint] {
        &self.stimulus_points
    }

    pub fn point_indices(&self) -> Vec<usize> {
        self.stimulus_points.iter().map(|p| p.index()).collect()
    }

    pub fn laser(&self) -> bool {
        self.laser
    }

    pub fn pmt(&self) -> bool {
        self.pmt
    }

    pub fn sync(&self) -> bool {
        self.sync
    }

    pub fn wait(&self) -> bool {
        self.wait
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// State of the flag backing `role`.
    pub fn line(&self, role: LineRole) -> bool {
        match role {
            LineRole::Laser => self.laser,
            LineRole::Pmt => self.pmt,
            LineRole::Sync => self.sync,
            LineRole::Wait => self.wait,
        }
    }

    /// Replaces the selected points. A point index may only be selected once per element.
    pub fn set_stimulus_points(&mut self, stimulus_points: Vec<SelectedStimulusPoint>) -> Result<()> {
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = stimulus_points.iter().find(|p| !seen.insert(p.index())) {
            return Err(ValidationError::DuplicateSelection(duplicate.index()).into());
        }
        self.stimulus_points = stimulus_points;
        Ok(())
    }

    pub fn set_laser(&mut self, value: bool) -> Result<()> {
        self.check_line(LineRole::Laser, value)?;
        self.laser = value;
        Ok(())
    }

    pub fn set_pmt(&mut self, value: bool) -> Result<()> {
        self.check_line(LineRole::Pmt, value)?;
        self.pmt = value;
        Ok(())
    }

    pub fn set_sync(&mut self, value: bool) -> Result<()> {
        self.check_line(LineRole::Sync, value)?;
        self.sync = value;
        Ok(())
    }

    pub fn set_wait(&mut self, value: bool) -> Result<()> {
        if value {
            if let Some(role) = [LineRole::Laser, LineRole::Pmt, LineRole::Sync]
                .into_iter()
                .find(|role| self.line(*role))
            {
                return Err(ValidationError::WaitWhileLineOn(role).into());
            }
            if self.duration > 0.0 {
                return Err(ValidationError::WaitWithDuration(self.duration).into());
            }
        }
        self.wait = value;
        Ok(())
    }

    pub fn set_duration(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::InvalidDuration(value).into());
        }
        if self.wait && value > 0.0 {
            return Err(ValidationError::DurationWhileWaiting(value).into());
        }
        self.duration = value;
        Ok(())
    }

    /// Sets the flag backing `role`.
    pub fn set_line(&mut self, role: LineRole, value: bool) -> Result<()> {
        match role {
            LineRole::Laser => self.set_laser(value),
            LineRole::Pmt => self.set_pmt(value),
            LineRole::Sync => self.set_sync(value),
            LineRole::Wait => self.set_wait(value),
        }
    }

    fn check_line(&self, role: LineRole, value: bool) -> Result<(), ValidationError> {
        if value && self.wait {
            return Err(ValidationError::LineWhileWaiting(role));
        }
        Ok(())
    }

    /// Copy of this element's lines and timing with different stimulus points.
    ///
    /// Used by program generation; the point list is assumed to be free of duplicates.
    pub(crate) fn with_stimulus_points(&self, stimulus_points: Vec<SelectedStimulusPoint>) -> Self {
        Self {
            stimulus_points,
            ..self.clone()
        }
    }

    /// Re-tags every non-Normal selected point with `pattern`.
    pub(crate) fn retag_patterned(&mut self, pattern: Pattern) {
        self.stimulus_points
            .iter_mut()
            .filter(|p| !p.pattern.is_normal())
            .for_each(|p| p.pattern = pattern);
    }
}

impl fmt::Display for ProtocolElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let points = self
            .stimulus_points
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<String>>()
            .join(", ");
        write!(
            f,
            "ProtocolElement([{}], laser={}, pmt={}, sync={}, wait={}, duration={})",
            points, self.laser, self.pmt, self.sync, self.wait, self.duration
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn timed_element_is_valid() {
        let element = ProtocolElement::new(vec![SelectedStimulusPoint::normal(1)], false, false, false, false, 2.5)
            .unwrap();
        assert_eq!(element.duration(), 2.5);
        assert!(!element.wait());
    }

    #[test]
    fn wait_with_duration_is_rejected() {
        let err = ProtocolElement::new(vec![], false, false, false, true, 1.0).unwrap_err();
        assert!(err.is_validation());

        let mut element = ProtocolElement::waiting(vec![]).unwrap();
        assert!(element.set_duration(0.5).is_err());
        assert_eq!(element.duration(), 0.0);
        // Zero duration stays allowed
        element.set_duration(0.0).unwrap();
    }

    #[test]
    fn wait_with_lines_is_rejected() {
        for role in [LineRole::Laser, LineRole::Pmt, LineRole::Sync] {
            let mut element = ProtocolElement::waiting(vec![]).unwrap();
            let err = element.set_line(role, true).unwrap_err();
            assert_eq!(err.to_string(), format!("{} can not be switched on while wait is set", role));
            assert!(!element.line(role));
            // Switching a line off never conflicts
            element.set_line(role, false).unwrap();
        }
    }

    #[test]
    fn wait_after_lines_is_rejected() {
        let mut element = ProtocolElement::timed(vec![], 0.0).unwrap();
        element.set_pmt(true).unwrap();
        assert!(element.set_wait(true).is_err());
        element.set_pmt(false).unwrap();
        element.set_duration(1.0).unwrap();
        assert!(element.set_wait(true).is_err());
        element.set_duration(0.0).unwrap();
        element.set_wait(true).unwrap();
        assert!(element.wait());
    }

    #[test]
    fn negative_duration_is_rejected() {
        assert!(ProtocolElement::timed(vec![], -0.1).is_err());
        assert!(ProtocolElement::timed(vec![], f64::NAN).is_err());
    }

    #[test]
    fn duplicate_selection_is_rejected() {
        let points = vec![
            SelectedStimulusPoint::normal(3),
            SelectedStimulusPoint::new(3, Pattern::Random),
        ];
        assert!(ProtocolElement::timed(points, 1.0).is_err());
    }

    #[test]
    fn retag_leaves_normal_points() {
        let mut element = ProtocolElement::timed(
            vec![
                SelectedStimulusPoint::normal(0),
                SelectedStimulusPoint::new(1, Pattern::Random),
            ],
            1.0,
        )
        .unwrap();
        element.retag_patterned(Pattern::IncrementByOne);
        let patterns: Vec<Pattern> = element.stimulus_points().iter().map(|p| p.pattern).collect();
        assert_eq!(patterns, vec![Pattern::Normal, Pattern::IncrementByOne]);
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("pmt".parse::<LineRole>().unwrap(), LineRole::Pmt);
        assert_eq!(" Wait ".parse::<LineRole>().unwrap(), LineRole::Wait);
        assert!("Shutter".parse::<LineRole>().is_err());
    }
}
