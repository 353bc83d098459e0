//! Codon Evo CLI - Validate run configurations and inspect checkpoint logs.

use std::fs;
use std::path::PathBuf;

use codon_evo::{compute::evolution::load_checkpoints, schema::EvolutionConfig};

fn print_usage(program: &str) {
    eprintln!("Usage: {} <command> [args]", program);
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  example                     Print a default run configuration");
    eprintln!("  validate <config.json>      Load and validate a run configuration");
    eprintln!("  inspect <checkpoints.jsonl> Summarize a checkpoint log");
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    match (args.get(1).map(String::as_str), args.get(2)) {
        (Some("example" | "--example"), _) => print_example_config(),
        (Some("validate"), Some(path)) => validate(PathBuf::from(path)),
        (Some("inspect"), Some(path)) => inspect(PathBuf::from(path)),
        _ => {
            print_usage(args.first().map_or("codon-evo", String::as_str));
            std::process::exit(1);
        }
    }
}

fn print_example_config() {
    let config = EvolutionConfig::default();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            std::process::exit(1);
        }
    }
}

fn validate(path: PathBuf) {
    let config_str = fs::read_to_string(&path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: EvolutionConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {}", e);
        std::process::exit(1);
    }

    println!("Configuration OK");
    println!("  Objectives: {}", config.objectives.join(", "));
    println!(
        "  Population: {} (+{} offspring per generation)",
        config.population.size, config.population.offspring
    );
    println!("  Max generations: {}", config.population.max_generations);
    match config.population.stagnation_window {
        Some(window) => println!("  Stagnation window: {}", window),
        None => println!("  Stagnation window: disabled"),
    }
    println!(
        "  Workers: {}",
        match config.evaluation.workers {
            0 => "auto".to_string(),
            n => n.to_string(),
        }
    );
}

fn inspect(path: PathBuf) {
    let records = load_checkpoints(&path).unwrap_or_else(|e| {
        eprintln!("Error reading checkpoints: {}", e);
        std::process::exit(1);
    });

    let Some(last) = records.last() else {
        eprintln!("No checkpoint records in {}", path.display());
        std::process::exit(1);
    };

    println!("Checkpoint log: {}", path.display());
    println!("  Records: {}", records.len());
    println!("  Last generation: {}", last.generation);
    println!("  Mutation rate: {:.4}", last.mutation_rate);
    println!("  Stagnation: {}", last.stagnation_count);
    println!("  Front 0 size: {}", last.stats.front_size);
    for summary in &last.stats.objectives {
        println!(
            "  {}: best {:.4}, mean {:.4}",
            summary.name, summary.best, summary.mean
        );
    }

    let total_failures: usize = records.iter().map(|r| r.stats.failures).sum();
    println!("  Failed evaluations: {}", total_failures);

    if let Some(best) = last.best.first() {
        println!();
        println!("Best design (id {}, generation {}):", best.id, best.generation);
        println!("  Aggregate: {:.4}", best.aggregate);
        println!("  Objectives: {:?}", best.objectives);
        println!("  Sequence: {}", best.sequence);
    }
}
