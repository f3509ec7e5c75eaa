//! Schema module - Configuration, measure and dataset types for genetic searches.

mod config;
mod dataset;
mod measure;

pub use config::*;
pub use dataset::*;
pub use measure::*;
