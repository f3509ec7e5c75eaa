//! Compute module - Models, cross-validation and the genetic search.

mod crossval;
mod models;
mod range;

pub mod evolution;

pub use crossval::*;
pub use models::*;
pub use range::*;
