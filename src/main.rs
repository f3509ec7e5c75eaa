//! Genetic Tuner CLI - Run a search from a JSON job file.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use genetic_tuner::{
    compute::{
        CrossValidator, Model, ModelKind, NearestNeighbors,
        evolution::{FitnessChangeEvent, FitnessListener, GeneticSearch},
    },
    schema::{
        Attribute, ClassIndex, Dataset, DecoderConfig, Measure, ParameterSpec, SearchConfig,
        StoppingConfig,
    },
};

/// Everything needed for one run.
#[derive(Debug, Serialize, Deserialize)]
struct Job {
    #[serde(default)]
    search: SearchConfig,
    #[serde(default)]
    model: ModelKind,
    dataset: Dataset,
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <job.json> [iterations]", args[0]);
        eprintln!();
        eprintln!("Run a genetic search from a JSON job file.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  job.json     Search configuration, model and dataset");
        eprintln!("  iterations   Override the stopping criterion with a generation count");
        eprintln!();
        eprintln!("Example job is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_job();
        return;
    }

    let job_path = PathBuf::from(&args[1]);
    let job_str = fs::read_to_string(&job_path).unwrap_or_else(|e| {
        eprintln!("Error reading job file: {}", e);
        std::process::exit(1);
    });
    let mut job: Job = serde_json::from_str(&job_str).unwrap_or_else(|e| {
        eprintln!("Error parsing job: {}", e);
        std::process::exit(1);
    });
    if let Some(count) = args.get(2).and_then(|s| s.parse().ok()) {
        job.search.stopping = StoppingConfig::MaxIterations { count };
    }

    println!("Genetic Tuner");
    println!("=============");
    println!(
        "Dataset: {} ({} rows, {} attributes)",
        job.dataset.relation,
        job.dataset.num_rows(),
        job.dataset.num_attributes()
    );
    println!("Model: {}", job.model.describe());
    println!("Measure: {}", job.search.measure);
    println!("Population: {}", job.search.population.size);
    println!();

    let mut search = GeneticSearch::new(job.search, job.model, job.dataset, CrossValidator)
        .unwrap_or_else(|e| {
            eprintln!("Error setting up search: {}", e);
            std::process::exit(1);
        });

    let listener: Arc<dyn FitnessListener> = Arc::new(|event: &FitnessChangeEvent| {
        println!(
            "  [{}] {} = {:.6} ({})",
            event.iteration, event.measure, event.raw, event.genotype
        );
    });
    search.subscribe(listener);

    println!("Running search...");
    let result = search.run_with_callback(|progress| {
        if progress.iteration % 10 == 0 {
            println!(
                "  Iteration {}: best={:.6}, mean={:.6}, evaluations={}",
                progress.iteration,
                progress.best_fitness,
                progress.average_fitness,
                progress.evaluations
            );
        }
    });

    println!();
    println!("Stopped: {:?} after {} iterations", result.stop_reason, result.iterations);
    println!(
        "Evaluations: {} ({} distinct genotypes)",
        result.evaluations, result.cache_size
    );
    println!("Time: {:.2}s", result.elapsed_seconds);

    match result.best {
        Some(best) => {
            println!();
            println!("Best {}: {:.6}", result.measure, best.raw);
            println!("  Genotype: {}", best.genotype);
            println!("  Setup: {}", best.phenotype.model.describe());
            for (key, value) in &best.phenotype.details {
                println!("  {}: {}", key, value);
            }
        }
        None => {
            eprintln!("No valid configuration was evaluated");
            std::process::exit(1);
        }
    }
}

fn print_example_job() {
    let job = Job {
        search: SearchConfig {
            measure: Measure::Accuracy,
            notification_interval: 0,
            decoder: DecoderConfig::PropertyPacking {
                handlers: vec![
                    ParameterSpec::Integer {
                        name: "k".into(),
                        min: 1,
                        max: 8,
                        bits: 3,
                    },
                    ParameterSpec::Boolean {
                        name: "normalize".into(),
                    },
                ],
            },
            ..Default::default()
        },
        model: ModelKind::NearestNeighbors(NearestNeighbors::new(1)),
        dataset: Dataset {
            relation: "example".into(),
            attributes: vec![
                Attribute::numeric("x"),
                Attribute::numeric("y"),
                Attribute::nominal("class", vec!["low", "high"]),
            ],
            rows: (0..20)
                .map(|i| {
                    let high = (i % 2) as f64;
                    vec![i as f64 * 0.5, high * 3.0 + (i % 5) as f64 * 0.1, high]
                })
                .collect(),
            class: ClassIndex::Last,
        },
    };

    println!("Example job (job.json):");
    match serde_json::to_string_pretty(&job) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing example: {}", e);
            std::process::exit(1);
        }
    }
}
