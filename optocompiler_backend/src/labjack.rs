//! Digital I/O model of the LabJack U3 and compilation of element states into command batches.
//!
//! The rig uses four flexible I/O lines (`FIO4`..`FIO7`) and two analog outputs (`DAC0`, `DAC1`).
//! A [`LineMapping`] assigns a [`LineRole`] to each FIO line, and [`LabJackState::from_element`]
//! uses it to turn a [`ProtocolElement`] into the line levels the device should hold.
//!
//! [`compile_command_batches`] turns an ordered list of states into one [`CommandBatch`] per
//! state, containing only the writes that differ from the previous state. The first state is
//! diffed against the idle baseline (all lines low, both DACs at 0 V).

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::protocol_element::{LineRole, ProtocolElement};

static FIO_NAME: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"(?i)^\s*fio(\d+)\s*$"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Fio {
    Fio4,
    Fio5,
    Fio6,
    Fio7,
}

impl Fio {
    pub const ALL: [Fio; 4] = [Fio::Fio4, Fio::Fio5, Fio::Fio6, Fio::Fio7];

    /// Hardware line number, as used by the device's bit-state commands.
    pub fn number(&self) -> u8 {
        match self {
            Fio::Fio4 => 4,
            Fio::Fio5 => 5,
            Fio::Fio6 => 6,
            Fio::Fio7 => 7,
        }
    }

    /// Position of this line inside [`LabJackState::fio`].
    pub fn slot(&self) -> usize {
        (self.number() - 4) as usize
    }

    pub fn from_number(number: u8) -> Option<Fio> {
        Fio::ALL.into_iter().find(|fio| fio.number() == number)
    }
}

impl fmt::Display for Fio {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FIO{}", self.number())
    }
}

impl FromStr for Fio {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ValidationError::UnknownLine(s.to_string());
        let re = FIO_NAME.as_ref().map_err(|_| unknown())?;
        let number = re
            .captures(s)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u8>().ok())
            .ok_or_else(unknown)?;
        Fio::from_number(number).ok_or_else(unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dac {
    Dac0,
    Dac1,
}

impl Dac {
    pub const ALL: [Dac; 2] = [Dac::Dac0, Dac::Dac1];

    pub fn number(&self) -> u8 {
        match self {
            Dac::Dac0 => 0,
            Dac::Dac1 => 1,
        }
    }

    fn slot(&self) -> usize {
        self.number() as usize
    }
}

impl fmt::Display for Dac {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DAC{}", self.number())
    }
}

/// Assignment of logical roles to the FIO lines.
///
/// Serialises as a map of line names to role names, e.g. `{"FIO4": "Laser", "FIO7": "Wait"}`.
/// Lines without a role are held low.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IndexMap<String, String>", into = "IndexMap<String, String>")]
pub struct LineMapping {
    lines: IndexMap<Fio, LineRole>,
}

impl Default for LineMapping {
    fn default() -> Self {
        Self {
            lines: Fio::ALL.into_iter().zip(LineRole::ALL).collect(),
        }
    }
}

impl LineMapping {
    pub fn empty() -> Self {
        Self {
            lines: IndexMap::new(),
        }
    }

    pub fn set(&mut self, fio: Fio, role: LineRole) {
        self.lines.insert(fio, role);
        self.lines.sort_keys();
    }

    pub fn unset(&mut self, fio: Fio) -> Option<LineRole> {
        self.lines.shift_remove(&fio)
    }

    pub fn role_of(&self, fio: Fio) -> Option<LineRole> {
        self.lines.get(&fio).copied()
    }

    /// First line carrying `role`.
    pub fn line_for(&self, role: LineRole) -> Option<Fio> {
        self.lines
            .iter()
            .find(|(_, r)| **r == role)
            .map(|(fio, _)| *fio)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Fio, LineRole)> + '_ {
        self.lines.iter().map(|(fio, role)| (*fio, *role))
    }
}

impl TryFrom<IndexMap<String, String>> for LineMapping {
    type Error = ValidationError;

    fn try_from(map: IndexMap<String, String>) -> Result<Self, Self::Error> {
        let mut mapping = LineMapping::empty();
        for (line, role) in map {
            mapping.set(line.parse()?, role.parse()?);
        }
        Ok(mapping)
    }
}

impl From<LineMapping> for IndexMap<String, String> {
    fn from(mapping: LineMapping) -> Self {
        mapping
            .iter()
            .map(|(fio, role)| (fio.to_string(), role.to_string()))
            .collect()
    }
}

/// Levels the device should hold while one element (or one raw state) is active.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LabJackState {
    /// `FIO4`..`FIO7`, indexed by [`Fio::slot`].
    pub fio: [bool; 4],
    /// `DAC0`, `DAC1` in volts.
    pub dac: [f64; 2],
    /// Seconds.
    pub duration: f64,
}

impl LabJackState {
    pub fn from_element(element: &ProtocolElement, mapping: &LineMapping) -> Self {
        let mut state = LabJackState {
            duration: element.duration(),
            ..Default::default()
        };
        for (fio, role) in mapping.iter() {
            state.fio[fio.slot()] = element.line(role);
        }
        state
    }

    pub fn line(&self, fio: Fio) -> bool {
        self.fio[fio.slot()]
    }

    pub fn set_line(&mut self, fio: Fio, value: bool) {
        self.fio[fio.slot()] = value;
    }

    pub fn voltage(&self, dac: Dac) -> f64 {
        self.dac[dac.slot()]
    }

    pub fn set_voltage(&mut self, dac: Dac, volts: f64) {
        self.dac[dac.slot()] = volts;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    BitStateWrite { fio: Fio, state: bool },
    /// 8-bit DAC write, `code` already converted by the device's calibration.
    Dac8 { dac: Dac, code: u8 },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::BitStateWrite { fio, state } => write!(f, "BitStateWrite({}, {})", fio, *state as u8),
            Command::Dac8 { dac, code } => write!(f, "{}_8({})", dac, code),
        }
    }
}

pub type CommandBatch = Vec<Command>;

/// Compiles `states` into one command batch per state.
///
/// Only lines and DACs that differ from the previous state are written. `to_code` converts a
/// voltage into the device's DAC code and is called only for DACs that changed; its first
/// error aborts compilation.
///
/// # Examples
///
/// ```
/// use optocompiler_backend::*;
///
/// let mut on = LabJackState::default();
/// on.set_line(Fio::Fio4, true);
/// let states = [LabJackState::default(), on, LabJackState::default()];
///
/// let batches = compile_command_batches(&states, |_, _| Ok::<u8, ()>(0)).unwrap();
/// assert!(batches[0].is_empty());
/// assert_eq!(batches[1], vec![Command::BitStateWrite { fio: Fio::Fio4, state: true }]);
/// assert_eq!(batches[2], vec![Command::BitStateWrite { fio: Fio::Fio4, state: false }]);
/// ```
pub fn compile_command_batches<F, E>(states: &[LabJackState], mut to_code: F) -> Result<Vec<CommandBatch>, E>
where
    F: FnMut(f64, Dac) -> Result<u8, E>,
{
    let mut batches = Vec::with_capacity(states.len());
    let mut previous = LabJackState::default();
    for state in states {
        let mut batch = CommandBatch::new();
        for fio in Fio::ALL {
            if previous.line(fio) != state.line(fio) {
                batch.push(Command::BitStateWrite {
                    fio,
                    state: state.line(fio),
                });
            }
        }
        for dac in Dac::ALL {
            if previous.voltage(dac) != state.voltage(dac) {
                let code = to_code(state.voltage(dac), dac)?;
                batch.push(Command::Dac8 { dac, code });
            }
        }
        batches.push(batch);
        previous = *state;
    }
    Ok(batches)
}
