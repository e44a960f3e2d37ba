use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use negmas_app_lib::config::AppConfig;
use negmas_app_lib::core::scenarios::info::{has_info, merge_info, ScenarioInfo};
use negmas_app_lib::core::scenarios::load_scenario;
use negmas_app_lib::core::scenarios::stats::{compute_stats, MAX_CARDINALITY};
use negmas_app_lib::core::setup::find_scenario_dirs;

#[derive(Parser, Debug)]
#[command(name = "calculate-scenario-info")]
#[command(about = "Compute outcome count, opposition and rational fraction into each scenario's _info.yaml")]
struct Cli {
    /// Recompute scenarios that already have an _info.yaml
    #[arg(long)]
    force: bool,

    /// Scenario tree to scan (defaults to the user's scenarios directory)
    #[arg(long)]
    scenarios_dir: Option<PathBuf>,

    /// Outcomes evaluated per scenario; larger spaces are sampled
    #[arg(long, default_value_t = MAX_CARDINALITY)]
    max_cardinality: usize,
}

fn main() {
    let _ = dotenvy::dotenv();
    negmas_app_lib::init_tracing();

    match run(Cli::parse()) {
        Ok(0) => {}
        Ok(failed) => {
            eprintln!("{failed} scenario(s) failed");
            std::process::exit(1);
        }
        Err(error) => {
            eprintln!("calculate-scenario-info failed: {error}");
            std::process::exit(1);
        }
    }
}

/// Returns the number of scenarios that failed.
fn run(cli: Cli) -> Result<usize, String> {
    let root = match cli.scenarios_dir {
        Some(dir) => dir,
        None => AppConfig::from_env().map_err(|e| e.to_string())?.directories().scenarios,
    };
    if !root.is_dir() {
        return Err(format!("scenarios directory not found: {}", root.display()));
    }

    let pending: Vec<PathBuf> = find_scenario_dirs(&root)
        .into_iter()
        .filter(|dir| cli.force || !has_info(dir))
        .collect();
    tracing::info!("{} scenario(s) to process under {}", pending.len(), root.display());

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map_err(|e| e.to_string())?
            .progress_chars("#>-"),
    );

    let mut failed = 0;
    for dir in &pending {
        let label = dir.strip_prefix(&root).unwrap_or(dir).display().to_string();
        pb.set_message(label.clone());

        let result = load_scenario(dir)
            .and_then(|scenario| compute_stats(&scenario, cli.max_cardinality))
            .and_then(|stats| merge_info(dir, &ScenarioInfo::from(&stats)));
        match result {
            Ok(info) => tracing::debug!(
                "{label}: n_outcomes={:?} opposition={:?} rational_fraction={:?}",
                info.n_outcomes,
                info.opposition,
                info.rational_fraction
            ),
            Err(e) => {
                failed += 1;
                pb.suspend(|| tracing::error!("{label}: {e}"));
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message(format!("{} processed, {failed} failed", pending.len()));
    Ok(failed)
}
