//! Attribute selection on a synthetic dataset with noise columns.

use std::sync::Arc;
use std::time::Instant;

use genetic_tuner::{
    compute::{
        CrossValidator, NearestNeighbors,
        evolution::{FitnessChangeEvent, FitnessListener, GeneticSearch},
    },
    schema::{
        Attribute, ClassIndex, Dataset, Measure, PopulationConfig, SearchConfig, StoppingConfig,
    },
};

/// Three informative columns followed by `noise` pseudo-random ones.
fn dataset(rows: usize, noise: usize) -> Dataset {
    let mut attributes = vec![
        Attribute::numeric("signal_a"),
        Attribute::numeric("signal_b"),
        Attribute::numeric("signal_c"),
    ];
    attributes.extend((0..noise).map(|i| Attribute::numeric(format!("noise_{i}"))));
    attributes.push(Attribute::nominal("class", vec!["neg", "pos"]));

    let data = (0..rows)
        .map(|r| {
            let label = (r % 2) as f64;
            let mut row = vec![
                label * 2.0 + (r % 7) as f64 * 0.1,
                label - (r % 5) as f64 * 0.05,
                label * 0.5 + (r % 3) as f64 * 0.2,
            ];
            row.extend((0..noise).map(|i| ((r * 31 + i * 17) % 23) as f64));
            row.push(label);
            row
        })
        .collect();
    Dataset::new("synthetic", attributes, data, ClassIndex::Last).unwrap()
}

fn main() {
    env_logger::init();
    println!("=== Feature Selection ===\n");

    for noise in [3, 9, 21] {
        println!("Noise columns: {}", noise);

        let config = SearchConfig {
            measure: Measure::Accuracy,
            population: PopulationConfig {
                size: 20,
                favor_zeroes: true,
                ..Default::default()
            },
            stopping: StoppingConfig::Stagnation { iterations: 10 },
            notification_interval: 0,
            ..Default::default()
        };

        let mut search =
            GeneticSearch::new(config, NearestNeighbors::new(3), dataset(120, noise), CrossValidator)
                .unwrap();
        let listener: Arc<dyn FitnessListener> = Arc::new(|e: &FitnessChangeEvent| {
            println!("  [{}] accuracy {:.2} ({})", e.iteration, e.raw, e.genotype);
        });
        search.subscribe(listener);

        let start = Instant::now();
        let result = search.run();
        let elapsed = start.elapsed();

        println!("  Iterations:     {}", result.iterations);
        println!("  Evaluations:    {}", result.evaluations);
        println!("  Elapsed:        {:.2}s", elapsed.as_secs_f64());
        println!("  Best accuracy:  {:.2}", result.best_fitness());
        if let Some(best) = result.best {
            for (key, value) in &best.phenotype.details {
                println!("  {:<15} {}", format!("{key}:"), value);
            }
        }
        println!();
    }
}
