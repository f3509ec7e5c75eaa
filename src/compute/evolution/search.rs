//! Generational genetic search over bit-string genotypes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rand::prelude::*;
use rayon::prelude::*;

use crate::compute::{CrossValidator, Model, ModelEvaluator};
use crate::schema::{
    ConfigError, Dataset, EvaluationConfig, Measure, SearchConfig, StoppingConfig,
};

use super::decoder::{Decoder, Phenotype, build_decoder};
use super::{
    BestSolution, BestTracker, FitnessCache, FitnessChangeEvent, FitnessListener, FitnessRecord,
    Genotype, ListenerId, ListenerRegistry, NotificationThrottle, OutputEmitter,
    SecondEvaluationGate, SetupRecord,
};

/// Errors that prevent a search from being set up.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxIterations,
    MaxDuration,
    Stagnation,
    /// A user supplied criterion fired.
    Custom,
    /// Stopped through a [`SearchHandle`].
    Cancelled,
}

/// Algorithm state handed to stopping criteria after each generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchState {
    /// Completed generations.
    pub iteration: usize,
    pub elapsed: Duration,
    pub best_fitness: f64,
    /// Generations since the best fitness last improved.
    pub stagnant_iterations: usize,
}

/// Predicate deciding after each generation whether to stop.
pub trait StoppingCriterion: Send + Sync {
    fn should_stop(&self, state: &SearchState) -> bool;

    fn reason(&self) -> StopReason {
        StopReason::Custom
    }
}

/// Stop after a number of generations.
#[derive(Debug, Clone, Copy)]
pub struct MaxIterations(pub usize);

impl StoppingCriterion for MaxIterations {
    fn should_stop(&self, state: &SearchState) -> bool {
        state.iteration >= self.0
    }

    fn reason(&self) -> StopReason {
        StopReason::MaxIterations
    }
}

/// Stop once a wall-clock budget is spent.
#[derive(Debug, Clone, Copy)]
pub struct MaxDuration(pub Duration);

impl StoppingCriterion for MaxDuration {
    fn should_stop(&self, state: &SearchState) -> bool {
        state.elapsed >= self.0
    }

    fn reason(&self) -> StopReason {
        StopReason::MaxDuration
    }
}

/// Stop when the best fitness has not improved for a number of generations.
#[derive(Debug, Clone, Copy)]
pub struct Stagnation(pub usize);

impl StoppingCriterion for Stagnation {
    fn should_stop(&self, state: &SearchState) -> bool {
        state.stagnant_iterations >= self.0
    }

    fn reason(&self) -> StopReason {
        StopReason::Stagnation
    }
}

/// Build the criterion selected in the configuration.
pub fn criterion_from_config(config: &StoppingConfig) -> Box<dyn StoppingCriterion> {
    match *config {
        StoppingConfig::MaxIterations { count } => Box::new(MaxIterations(count)),
        StoppingConfig::MaxSeconds { seconds } => Box::new(MaxDuration(
            Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX),
        )),
        StoppingConfig::Stagnation { iterations } => Box::new(Stagnation(iterations)),
    }
}

/// Stop, pause and resume control shared with other threads.
#[derive(Debug, Clone, Default)]
pub struct SearchHandle {
    stopped: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl SearchHandle {
    /// Request a stop. No new evaluations start; running ones finish.
    pub fn stop(&self) {
        log::warn!("Stop requested");
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

/// Per-generation progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationProgress {
    pub iteration: usize,
    /// Externally visible best adjusted fitness.
    pub best_fitness: f64,
    pub generation_best: f64,
    /// Mean over the generation's valid adjusted fitness values.
    pub average_fitness: f64,
    /// Evaluator invocations so far.
    pub evaluations: usize,
    pub cache_size: usize,
    pub stagnant_iterations: usize,
    pub elapsed_seconds: f64,
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct SearchResult<M> {
    pub best: Option<BestSolution<M>>,
    pub measure: Measure,
    pub iterations: usize,
    pub stop_reason: StopReason,
    pub evaluations: usize,
    pub cache_size: usize,
    pub elapsed_seconds: f64,
    /// Best adjusted fitness after each generation.
    pub history: Vec<f64>,
}

impl<M> SearchResult<M> {
    /// Best adjusted fitness, negative infinity if nothing was valid.
    pub fn best_fitness(&self) -> f64 {
        self.best
            .as_ref()
            .map_or(f64::NEG_INFINITY, |b| b.adjusted)
    }
}

/// Genetic search driver.
///
/// Each generation is evaluated on a rayon pool, one job per distinct
/// genotype. Jobs share the fitness cache, the best tracker (optionally behind
/// the second evaluation gate) and the notification throttle.
pub struct GeneticSearch<M: Model, E: ModelEvaluator<M> = CrossValidator> {
    config: SearchConfig,
    base: M,
    data: Arc<Dataset>,
    evaluator: E,
    decoder: Box<dyn Decoder<M>>,
    cache: FitnessCache,
    best: BestTracker<M>,
    gate: Option<SecondEvaluationGate<M>>,
    throttle: NotificationThrottle,
    listeners: ListenerRegistry,
    output: Option<OutputEmitter>,
    stopping: Box<dyn StoppingCriterion>,
    handle: SearchHandle,
    evaluations: AtomicUsize,
    rng: StdRng,
    pool: rayon::ThreadPool,
}

impl<M: Model + 'static, E: ModelEvaluator<M>> GeneticSearch<M, E> {
    /// Validate the setup and build the search.
    pub fn new(
        config: SearchConfig,
        base: M,
        data: Dataset,
        evaluator: E,
    ) -> Result<Self, SearchError> {
        config.validate(&data)?;
        let decoder = build_decoder(&config, &data)?;
        Self::check_decoder(&config, decoder.as_ref(), &base)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads.unwrap_or(0))
            .build()?;

        let measure = config.measure;
        let gate = config
            .second_evaluation
            .enabled
            .then(|| SecondEvaluationGate::new(config.second_evaluation.evaluation(), measure));
        let output = OutputEmitter::from_config(&config.output, &data.relation);

        Ok(Self {
            stopping: criterion_from_config(&config.stopping),
            throttle: NotificationThrottle::new(config.notification_interval),
            best: BestTracker::new(measure),
            rng: StdRng::seed_from_u64(config.population.seed),
            config,
            base,
            data: Arc::new(data),
            evaluator,
            decoder,
            cache: FitnessCache::new(),
            gate,
            listeners: ListenerRegistry::new(),
            output,
            handle: SearchHandle::default(),
            evaluations: AtomicUsize::new(0),
            pool,
        })
    }

    /// Replace the decoder, e.g. with custom discovery handlers.
    pub fn with_decoder(mut self, decoder: Box<dyn Decoder<M>>) -> Result<Self, SearchError> {
        Self::check_decoder(&self.config, decoder.as_ref(), &self.base)?;
        self.decoder = decoder;
        Ok(self)
    }

    /// Replace the configured stopping criterion.
    pub fn with_stopping_criterion(mut self, criterion: Box<dyn StoppingCriterion>) -> Self {
        self.stopping = criterion;
        self
    }

    /// Replace the artifact emitter.
    pub fn with_output(mut self, output: OutputEmitter) -> Self {
        self.output = Some(output);
        self
    }

    fn check_decoder(
        config: &SearchConfig,
        decoder: &dyn Decoder<M>,
        base: &M,
    ) -> Result<(), ConfigError> {
        decoder.validate(base)?;
        let expected = decoder.genotype_len();
        for setup in &config.population.initial_setups {
            if setup.len() != expected {
                return Err(ConfigError::BitWidthMismatch {
                    expected,
                    actual: setup.len(),
                });
            }
        }
        Ok(())
    }

    pub fn handle(&self) -> SearchHandle {
        self.handle.clone()
    }

    pub fn subscribe(&self, listener: Arc<dyn FitnessListener>) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn cache(&self) -> &FitnessCache {
        &self.cache
    }

    pub fn genotype_len(&self) -> usize {
        self.decoder.genotype_len()
    }

    /// Externally visible best solution.
    pub fn best(&self) -> Option<BestSolution<M>> {
        self.best.best()
    }

    /// Evaluator invocations in the current run.
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    /// Run the search (blocking).
    pub fn run(&mut self) -> SearchResult<M> {
        self.run_with_callback(|_| {})
    }

    /// Run the search, reporting progress after every generation.
    pub fn run_with_callback<F>(&mut self, callback: F) -> SearchResult<M>
    where
        F: Fn(&GenerationProgress),
    {
        let start = Instant::now();
        self.reset();

        let measure = self.config.measure;
        log::info!(
            "Starting {} search: #chrom={}, #genes={}, measure={}, folds={}",
            self.decoder.name(),
            self.config.population.size,
            self.decoder.genotype_len(),
            measure,
            self.config.evaluation.folds
        );

        let mut population = self.initial_population();
        let mut history = Vec::new();
        let mut iteration = 0;
        let mut stagnant = 0;

        let stop_reason = loop {
            if self.handle.is_paused() && !self.handle.is_stopped() {
                std::thread::sleep(Duration::from_millis(100));
                continue;
            }
            if self.handle.is_stopped() {
                log::warn!("Interrupted at iteration {iteration}");
                break StopReason::Cancelled;
            }

            let previous_best = self.best.best_fitness();
            let fitness = self.evaluate_generation(&population, iteration);
            if self.handle.is_stopped() {
                log::warn!("Interrupted at iteration {iteration}");
                break StopReason::Cancelled;
            }
            iteration += 1;
            if iteration % 100 == 0 {
                log::info!("[{iteration}] Iteration");
            }

            let best_fitness = self.best.best_fitness();
            if best_fitness > previous_best {
                stagnant = 0;
            } else {
                stagnant += 1;
            }
            history.push(best_fitness);

            let valid: Vec<f64> = fitness.iter().copied().filter(|f| f.is_finite()).collect();
            let progress = GenerationProgress {
                iteration,
                best_fitness,
                generation_best: fitness.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                average_fitness: if valid.is_empty() {
                    f64::NEG_INFINITY
                } else {
                    valid.iter().sum::<f64>() / valid.len() as f64
                },
                evaluations: self.evaluations(),
                cache_size: self.cache.len(),
                stagnant_iterations: stagnant,
                elapsed_seconds: start.elapsed().as_secs_f64(),
            };
            callback(&progress);

            let state = SearchState {
                iteration,
                elapsed: start.elapsed(),
                best_fitness,
                stagnant_iterations: stagnant,
            };
            if self.stopping.should_stop(&state) {
                break self.stopping.reason();
            }

            population = self.next_generation(population, &fitness);
        };

        let elapsed_seconds = start.elapsed().as_secs_f64();
        log::info!(
            "Search finished after {iteration} iterations ({stop_reason:?}), best fitness {}",
            self.best.best_fitness()
        );

        SearchResult {
            best: self.best.best(),
            measure,
            iterations: iteration,
            stop_reason,
            evaluations: self.evaluations(),
            cache_size: self.cache.len(),
            elapsed_seconds,
            history,
        }
    }

    fn reset(&mut self) {
        self.cache.clear();
        self.best.reset();
        if let Some(gate) = &self.gate {
            gate.reset();
        }
        self.throttle.reset();
        self.evaluations.store(0, Ordering::Relaxed);
        self.rng = StdRng::seed_from_u64(self.config.population.seed);
    }

    /// First generation: explicit setups, decoder seeds, then initial weights
    /// followed by random bits.
    fn initial_population(&mut self) -> Vec<Genotype> {
        let size = self.config.population.size;
        let len = self.decoder.genotype_len();
        let bits_per_gene = self.config.population.bits_per_gene;
        let mut population = Vec::with_capacity(size);

        for setup in &self.config.population.initial_setups {
            match Genotype::from_bit_str(setup, bits_per_gene) {
                Ok(g) if g.len() == len => population.push(g),
                _ => log::warn!("Ignoring initial setup '{setup}'"),
            }
        }
        population.extend(
            self.decoder
                .seed_genotypes(&self.base)
                .into_iter()
                .filter(|g| g.len() == len),
        );
        population.truncate(size);

        let weights = self.config.population.initial_weights.clone();
        let mut weights = weights.chars().map(|c| c == '1');
        while population.len() < size {
            let bits = (0..len)
                .map(|_| {
                    let random = self.rng.gen_bool(0.5);
                    weights.next().unwrap_or(random)
                })
                .collect();
            population.push(Genotype::new(bits, bits_per_gene));
        }
        population
    }

    /// Adjusted fitness of every chromosome. Each distinct genotype is
    /// evaluated by exactly one job.
    fn evaluate_generation(&self, population: &[Genotype], iteration: usize) -> Vec<f64> {
        let mut seen = HashSet::new();
        let unique: Vec<&Genotype> = population
            .iter()
            .filter(|g| seen.insert(g.key()))
            .collect();

        let results: HashMap<String, f64> = self.pool.install(|| {
            unique
                .par_iter()
                .map(|g| (g.key(), self.evaluate_genotype(g, iteration)))
                .collect()
        });

        let fitness: Vec<f64> = population
            .iter()
            .map(|g| {
                results
                    .get(&g.key())
                    .copied()
                    .unwrap_or(f64::NEG_INFINITY)
            })
            .collect();

        if log::log_enabled!(log::Level::Debug) {
            for (i, (g, f)) in population.iter().zip(&fitness).enumerate() {
                log::debug!("[{iteration}] Fitness for chromosome {i}: {g} ---> {f}");
            }
        }
        fitness
    }

    /// One evaluation job: cache lookup, decode, evaluate, offer.
    fn evaluate_genotype(&self, genotype: &Genotype, iteration: usize) -> f64 {
        let measure = self.config.measure;
        if self.handle.is_stopped() {
            return f64::NEG_INFINITY;
        }

        let key = genotype.key();
        let mut decoded = None;
        let (record, _) = self.cache.get_or_evaluate(&key, || {
            match self.decoder.decode(genotype, &self.base, &self.data) {
                Ok(phenotype) => {
                    let record = self.run_evaluator(&key, &phenotype, self.config.evaluation);
                    decoded = Some(phenotype);
                    record
                }
                Err(e) => {
                    log::error!("Failed to decode {key}: {e}");
                    FitnessRecord::Invalid
                }
            }
        });

        // only a fresh evaluation can improve the trackers
        if let (FitnessRecord::Valid(raw), Some(phenotype)) = (record, decoded.as_ref()) {
            let improved = match &self.gate {
                Some(gate) => gate.offer(&self.best, raw, genotype, phenotype, |p, cfg| {
                    self.run_evaluator(&key, p, cfg)
                }),
                None => self.best.offer(raw, genotype, phenotype),
            };
            if improved {
                self.on_improvement(raw, genotype, phenotype, iteration);
            }
        }
        record.adjusted(measure)
    }

    fn run_evaluator(
        &self,
        key: &str,
        phenotype: &Phenotype<M>,
        evaluation: EvaluationConfig,
    ) -> FitnessRecord {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        match self.evaluator.evaluate(
            &phenotype.model,
            &phenotype.dataset,
            self.config.measure,
            evaluation.folds,
            evaluation.seed,
        ) {
            Ok(raw) if raw.is_finite() => FitnessRecord::Valid(raw),
            Ok(raw) => {
                log::error!("Evaluation of {key} returned {raw}");
                FitnessRecord::Invalid
            }
            Err(e) => {
                log::error!("Evaluation of {key} failed: {e}");
                FitnessRecord::Invalid
            }
        }
    }

    fn on_improvement(
        &self,
        raw: f64,
        genotype: &Genotype,
        phenotype: &Phenotype<M>,
        iteration: usize,
    ) {
        let measure = self.config.measure;
        let adjusted = measure.adjust(raw);
        let key = genotype.key();
        log::info!("[{iteration}] New best fitness {adjusted} ({measure} = {raw}) for {key}");

        let event = FitnessChangeEvent {
            measure,
            raw,
            adjusted,
            genotype: key.clone(),
            iteration,
        };
        let listeners = self.listeners.snapshot();
        self.throttle.maybe_notify(&event, &listeners);

        if let Some(output) = &self.output {
            let record = SetupRecord {
                measure,
                raw_fitness: raw,
                adjusted_fitness: adjusted,
                model: phenotype.model.describe(),
                decoder: self.decoder.name().to_string(),
                genotype: key,
                weights: genotype.genes(),
                iteration,
                details: phenotype.details.iter().cloned().collect(),
            };
            output.emit(&record, &phenotype.dataset);
        }
    }

    /// Sort, copy, crossover and mutate into the next generation.
    fn next_generation(&mut self, population: Vec<Genotype>, fitness: &[f64]) -> Vec<Genotype> {
        let n = population.len();
        let favor_zeroes = self.config.population.favor_zeroes;

        let mut ranked: Vec<(Genotype, f64)> =
            population.into_iter().zip(fitness.iter().copied()).collect();
        ranked.sort_by(|a, b| {
            let by_fitness = b.1.total_cmp(&a.1);
            if favor_zeroes {
                by_fitness.then_with(|| a.0.count_ones().cmp(&b.0.count_ones()))
            } else {
                by_fitness
            }
        });
        let mut next: Vec<Genotype> = ranked.into_iter().map(|(g, _)| g).collect();

        let elites = (n - 1).min(2);

        // top quarter replaces the bottom quarter
        for i in 0..n / 4 {
            next[n - 1 - i] = next[i].clone();
        }
        // the two best get extra copies at the tail
        if n > 4 {
            for (slot, source) in [(n - 1, 0), (n - 2, 0), (n - 3, 0), (n - 4, 1), (n - 5, 1)] {
                if slot >= elites {
                    next[slot] = next[source].clone();
                }
            }
        }

        let len = next.first().map_or(0, Genotype::len);
        let pool = n - elites;

        if pool >= 2 && len >= 2 {
            for _ in 0..n / 4 {
                let a = self.rng.gen_range(elites..n);
                let b = self.rng.gen_range(elites..n);
                if a == b {
                    continue;
                }
                let point = self.rng.gen_range(1..len);
                let (lo, hi) = (a.min(b), a.max(b));
                let (left, right) = next.split_at_mut(hi);
                left[lo].crossover(&mut right[0], point);
            }
        }

        if pool >= 1 && len >= 1 {
            let p = 1.0 / len as f64;
            for _ in 0..n.div_ceil(2) {
                let c = self.rng.gen_range(elites..n);
                for bit in 0..len {
                    if self.rng.gen_bool(p) {
                        next[c].flip(bit);
                    }
                }
            }
        }

        next
    }
}
