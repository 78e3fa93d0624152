//! Tarifa Types
//!
//! This crate defines the value and context types shared by the formula
//! evaluator (`tarifa-formula`) and the pricing pipeline (`tarifa-core`).
//! Keeping them here avoids a dependency cycle between the two.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod context;
pub mod keys;
mod value;

pub use context::FormulaContext;
pub use value::FormulaValue;
