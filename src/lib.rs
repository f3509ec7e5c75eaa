//! Genetic Tuner - Genetic search over attribute subsets and model parameters.
//!
//! A population of bit-string genotypes is evolved; every genotype is decoded
//! into a model configuration and scored by cross-validation. The best
//! configuration found so far is tracked, optionally confirmed by a second
//! fold split, reported to listeners and written out as artifacts.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration, measures and datasets
//! - `compute`: Models, cross-validation and the genetic search
//!
//! # Example
//!
//! ```rust,no_run
//! use genetic_tuner::{
//!     compute::{CrossValidator, NearestNeighbors, evolution::GeneticSearch},
//!     schema::{Attribute, ClassIndex, Dataset, Measure, SearchConfig},
//! };
//!
//! let data = Dataset::new(
//!     "toy",
//!     vec![
//!         Attribute::numeric("a"),
//!         Attribute::numeric("b"),
//!         Attribute::nominal("class", vec!["no", "yes"]),
//!     ],
//!     (0..20).map(|i| vec![i as f64, (i % 3) as f64, (i % 2) as f64]).collect(),
//!     ClassIndex::Last,
//! )
//! .unwrap();
//!
//! let config = SearchConfig {
//!     measure: Measure::Accuracy,
//!     ..Default::default()
//! };
//! let mut search =
//!     GeneticSearch::new(config, NearestNeighbors::new(3), data, CrossValidator).unwrap();
//! let result = search.run();
//! println!("Best accuracy: {}", result.best_fitness());
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::evolution::{GeneticSearch, SearchHandle, SearchResult};
pub use compute::{CrossValidator, Model, ModelKind};
pub use schema::{Dataset, Measure, SearchConfig};
