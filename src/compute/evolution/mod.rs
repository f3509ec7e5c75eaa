//! Genetic search over bit-string genotypes.
//!
//! # Overview
//!
//! - **Genotypes** (`genotype`): fixed-length bit strings grouped into genes
//! - **Decoders** (`decoder`): attribute masks and packed model parameters
//! - **Fitness cache** (`cache`): one evaluation per distinct genotype
//! - **Best tracking** (`tracker`, `gate`): replace-if-better, optionally
//!   confirmed by a second fold split
//! - **Notifications** (`throttle`): rate-limited listener callbacks
//! - **Artifacts** (`output`): setup records and datasets on improvement
//! - **Search** (`search`): the generational driver
//!
//! # Example
//!
//! ```rust,no_run
//! use genetic_tuner::compute::{CrossValidator, ZeroR};
//! use genetic_tuner::compute::evolution::GeneticSearch;
//! use genetic_tuner::schema::{Dataset, SearchConfig};
//!
//! # fn load() -> Dataset { unimplemented!() }
//! let data = load();
//! let mut search = GeneticSearch::new(
//!     SearchConfig::default(),
//!     ZeroR::default(),
//!     data,
//!     CrossValidator,
//! )
//! .unwrap();
//! let result = search.run_with_callback(|progress| {
//!     println!("Iteration {}: best = {:.3}", progress.iteration, progress.best_fitness);
//! });
//! println!("Stopped: {:?}", result.stop_reason);
//! ```

mod cache;
pub mod decoder;
mod gate;
mod genotype;
mod output;
mod search;
mod throttle;
mod tracker;

pub use cache::{FitnessCache, FitnessRecord};
pub use decoder::{
    AttributeMask, AttributeMaskDecoder, BitSlot, DecodeError, Decoder, DiscoveryHandler,
    Phenotype, PropertyPackingDecoder, build_decoder,
};
pub use gate::SecondEvaluationGate;
pub use genotype::Genotype;
pub use output::{
    ArtifactWriter, DATA_SUFFIX, DirectoryOutput, OutputEmitter, OutputError, SETUP_SUFFIX,
    SetupRecord,
};
pub use search::{
    GenerationProgress, GeneticSearch, MaxDuration, MaxIterations, SearchError, SearchHandle,
    SearchResult, SearchState, Stagnation, StopReason, StoppingCriterion, criterion_from_config,
};
pub use throttle::{
    FitnessChangeEvent, FitnessListener, ListenerId, ListenerRegistry, NotificationThrottle,
};
pub use tracker::{BestSolution, BestTracker};
