//! # optoexpctrl_backend
//!
//! Executes programs built with `optocompiler_backend` on a LabJack-style digital I/O device,
//! keeping a stimulus display in step with the device lines.
//!
//! - [`device`]: the [`DigitalIoDevice`] trait the executor drives.
//! - [`simulated`]: an in-memory device for demos and tests.
//! - [`display`]: the [`StimulusDisplay`] collaborator.
//! - [`interrupt`]: the cooperative cancellation token.
//! - [`config`]: [`ExecutorConfig`], loadable from JSON.
//! - [`executor`]: [`SequenceExecutor`] and its events.
//!
//! With the `python` feature the crate also builds as a Python extension module exposing
//! [`python::SimulatedRunner`].

pub mod config;
pub mod device;
pub mod display;
pub mod executor;
pub mod interrupt;
pub mod simulated;
pub mod utils;
#[cfg(feature = "python")]
pub mod python;

pub use config::*;
pub use device::*;
pub use display::*;
pub use executor::*;
pub use interrupt::*;
pub use simulated::*;

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn optoexpctrl_backend(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<python::SimulatedRunner>()?;
    Ok(())
}
