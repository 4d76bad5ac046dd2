//! The hardware seam of the executor.
//!
//! [`DigitalIoDevice`] is the small slice of a LabJack U3 driver the executor needs: executing a
//! pre-compiled batch of feedback commands, reading one digital line, converting a voltage into
//! a DAC code and driving every line back to idle. Vendor failures are surfaced as
//! [`DeviceError`] messages and never retried.

use optocompiler_backend::{compile_command_batches, Command, CommandBatch, Dac, Fio, LabJackState};

/// Failure reported by the device driver. Cloneable so it can travel inside executor events.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("LabJack error: {0}")]
pub struct DeviceError(pub String);

impl DeviceError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn not_connected() -> Self {
        Self::new("device is not connected")
    }
}

pub trait DigitalIoDevice: Send {
    fn is_connected(&self) -> bool;

    /// Executes every command of `batch` in a single device round trip.
    fn execute_batch(&mut self, batch: &[Command]) -> Result<(), DeviceError>;

    fn read_digital_line(&mut self, fio: Fio) -> Result<bool, DeviceError>;

    /// Converts `volts` to the device's calibrated 8-bit DAC code.
    fn voltage_to_device_code(&self, volts: f64, dac: Dac) -> Result<u8, DeviceError>;

    /// Drives every FIO line low and both DACs to 0 V.
    fn clear_all_lines(&mut self) -> Result<(), DeviceError>;

    /// Suspends (`false`) or resumes (`true`) the driver's periodic connection check.
    fn set_connection_check(&mut self, _enabled: bool) {}

    /// Compiles `states` against this device's DAC calibration.
    ///
    /// A disconnected device yields one empty batch per state, so a run still steps through its
    /// elements and drives the display.
    fn compile_batches(&self, states: &[LabJackState]) -> Result<Vec<CommandBatch>, DeviceError> {
        if !self.is_connected() {
            return Ok(vec![CommandBatch::new(); states.len()]);
        }
        compile_command_batches(states, |volts, dac| self.voltage_to_device_code(volts, dac))
    }
}
