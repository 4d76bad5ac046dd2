//! An in-memory LabJack U3 used by the demo binary and the tests.
//!
//! The simulated device records every executed batch, keeps output levels, exposes settable input
//! levels for the lines the executor reads, and can be told to fail on a given batch.

use log::debug;
use optocompiler_backend::{Command, CommandBatch, Dac, Fio};

use crate::device::{DeviceError, DigitalIoDevice};

/// Full-scale output of the simulated DACs, in volts.
pub const DAC_FULL_SCALE: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct SimulatedLabJack {
    connected: bool,
    connection_check: bool,
    outputs: [bool; 4],
    dac_codes: [u8; 2],
    inputs: [bool; 4],
    executed: Vec<CommandBatch>,
    fail_on_batch: Option<usize>,
    clear_count: usize,
    read_count: usize,
}

impl Default for SimulatedLabJack {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLabJack {
    pub fn new() -> Self {
        Self {
            connected: true,
            connection_check: true,
            outputs: [false; 4],
            dac_codes: [0; 2],
            inputs: [false; 4],
            executed: Vec::new(),
            fail_on_batch: None,
            clear_count: 0,
            read_count: 0,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Self::new()
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Level returned by [`DigitalIoDevice::read_digital_line`] for `fio`.
    pub fn set_input(&mut self, fio: Fio, level: bool) {
        self.inputs[fio.slot()] = level;
    }

    /// Fails the `n`th executed batch (0-based) with a [`DeviceError`].
    pub fn fail_on_batch(&mut self, n: usize) {
        self.fail_on_batch = Some(n);
    }

    pub fn executed(&self) -> &[CommandBatch] {
        &self.executed
    }

    pub fn output(&self, fio: Fio) -> bool {
        self.outputs[fio.slot()]
    }

    pub fn dac_code(&self, dac: Dac) -> u8 {
        self.dac_codes[dac.number() as usize]
    }

    pub fn connection_check(&self) -> bool {
        self.connection_check
    }

    pub fn clear_count(&self) -> usize {
        self.clear_count
    }

    pub fn read_count(&self) -> usize {
        self.read_count
    }
}

impl DigitalIoDevice for SimulatedLabJack {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn execute_batch(&mut self, batch: &[Command]) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::not_connected());
        }
        if self.fail_on_batch == Some(self.executed.len()) {
            return Err(DeviceError::new(format!(
                "feedback command {} rejected",
                self.executed.len()
            )));
        }
        for command in batch {
            match *command {
                Command::BitStateWrite { fio, state } => self.outputs[fio.slot()] = state,
                Command::Dac8 { dac, code } => self.dac_codes[dac.number() as usize] = code,
            }
        }
        self.executed.push(batch.to_vec());
        Ok(())
    }

    fn read_digital_line(&mut self, fio: Fio) -> Result<bool, DeviceError> {
        if !self.connected {
            return Err(DeviceError::not_connected());
        }
        self.read_count += 1;
        Ok(self.inputs[fio.slot()])
    }

    fn voltage_to_device_code(&self, volts: f64, dac: Dac) -> Result<u8, DeviceError> {
        if !(0.0..=DAC_FULL_SCALE).contains(&volts) {
            return Err(DeviceError::new(format!(
                "{} V is outside the {} range 0..{} V",
                volts, dac, DAC_FULL_SCALE
            )));
        }
        Ok((volts / DAC_FULL_SCALE * u8::MAX as f64).round() as u8)
    }

    fn clear_all_lines(&mut self) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::not_connected());
        }
        self.outputs = [false; 4];
        self.dac_codes = [0; 2];
        self.clear_count += 1;
        Ok(())
    }

    fn set_connection_check(&mut self, enabled: bool) {
        debug!("simulated LabJack connection check: {}", enabled);
        self.connection_check = enabled;
    }
}
