//! # optocompiler_backend
//!
//! Data model and program generation for optogenetic stimulation protocols.
//!
//! The crate is organised leaf-first:
//! - [`stimulus_point`]: stimulus points and the index-keyed registry that owns them.
//! - [`pattern`]: point-selection patterns and the single-slot resolver.
//! - [`protocol_element`] and [`protocol_sequence`]: the authored protocol, with validated setters.
//! - [`program`]: deterministic expansion of a sequence into a multi-loop program.
//! - [`labjack`]: LabJack line mapping, device states and diffed command batches.
//! - [`persistence`]: the stored form of a sequence.
//!
//! Nothing in this crate touches hardware or spawns threads; execution lives in
//! `optoexpctrl_backend`. With the `python` feature the crate also builds as a Python
//! extension module exposing [`python::ProtocolDesigner`].

pub mod error;
pub mod labjack;
pub mod pattern;
pub mod persistence;
pub mod program;
pub mod protocol_element;
pub mod protocol_sequence;
pub mod stimulus_point;
#[cfg(feature = "python")]
pub mod python;

pub use error::*;
pub use labjack::*;
pub use pattern::*;
pub use persistence::*;
pub use program::*;
pub use protocol_element::*;
pub use protocol_sequence::*;
pub use stimulus_point::*;

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn optocompiler_backend(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<python::ProtocolDesigner>()?;
    Ok(())
}
