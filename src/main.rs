//! coalesce - aggregation batch over an enrichment store.
//!
//! Reads completed messages and their extraction payloads from the SQLite
//! store written by the upstream enrichment stage, clusters projects, merges
//! stakeholder profiles, and writes the aggregated JSON documents.
//!
//! Usage: `coalesce <store.db> [--out DIR] [--config PATH]`

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use coalesce::config::AggregationConfig;
use coalesce::db::AggregateDb;
use coalesce::error::PipelineError;
use coalesce::filter::FallbackOnlyScorer;
use coalesce::pipeline::AggregationEngine;

#[derive(Parser, Debug)]
#[command(name = "coalesce")]
#[command(about = "Aggregate LLM-extracted project and stakeholder mentions")]
#[command(version)]
struct Args {
    /// SQLite store written by the enrichment stage.
    db: PathBuf,

    /// Directory for the aggregated JSON documents.
    #[arg(short, long, default_value = "aggregated")]
    out: PathBuf,

    /// Aggregation config file. A missing file runs with defaults.
    #[arg(short, long, default_value = "aggregation_config.json")]
    config: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match AggregationConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let db = match AggregateDb::open(&args.db) {
        Ok(db) => db,
        Err(err) => {
            log::error!("Failed to open store {}: {}", args.db.display(), err);
            return ExitCode::FAILURE;
        }
    };

    match run(config, &db, &args.out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            log::error!("{}", err.recovery_suggestion());
            ExitCode::FAILURE
        }
    }
}

fn run(config: AggregationConfig, db: &AggregateDb, out: &Path) -> Result<(), PipelineError> {
    let mut engine = AggregationEngine::new(config);
    let stats = engine.run(db)?;
    engine.write_outputs(out)?;

    if engine.post_filter_enabled() {
        // No scoring collaborator is wired in yet, so every cluster goes
        // through the deterministic fallback heuristic.
        engine.run_filter(db, &FallbackOnlyScorer, out)?;
    }

    if stats.errors > 0 {
        log::warn!("Completed with {} extraction errors", stats.errors);
    }

    Ok(())
}
