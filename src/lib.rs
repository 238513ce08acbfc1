//! `armlite`: lowers a small imperative language into a linear,
//! label-addressed IR modeled on an ARM-like register machine.
//!
//! See `src/bin` for the executable driving this library.

pub mod common;
pub mod error;
pub mod front;
pub mod middle;
pub mod back;

pub use error::{Error, Result};
pub use middle::lower::lower;
