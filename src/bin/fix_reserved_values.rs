use std::path::PathBuf;

use clap::Parser;
use negmas_app_lib::config::AppConfig;
use negmas_app_lib::core::scenarios::reserved::{fix_scenario_dir, FixOutcome};
use negmas_app_lib::core::setup::find_scenario_dirs;

#[derive(Parser, Debug)]
#[command(name = "fix-reserved-values")]
#[command(about = "Replace infinite, NaN or missing reserved values with each utility function's minimum")]
struct Cli {
    /// Scenario tree to scan (defaults to the user's scenarios directory)
    #[arg(long)]
    scenarios_dir: Option<PathBuf>,

    /// Report what would change without writing files
    #[arg(long)]
    dry_run: bool,

    /// Print every utility function that was examined
    #[arg(long, short)]
    verbose: bool,
}

#[derive(Debug, Default)]
struct Totals {
    scenarios: usize,
    affected: usize,
    fixed: usize,
    unfixable: usize,
    failed: usize,
}

fn main() {
    let _ = dotenvy::dotenv();
    negmas_app_lib::init_tracing();

    match run(Cli::parse()) {
        Ok(totals) if totals.failed == 0 => {}
        Ok(totals) => {
            eprintln!("{} scenario(s) could not be processed", totals.failed);
            std::process::exit(1);
        }
        Err(error) => {
            eprintln!("fix-reserved-values failed: {error}");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<Totals, String> {
    let root = match cli.scenarios_dir {
        Some(dir) => dir,
        None => AppConfig::from_env().map_err(|e| e.to_string())?.directories().scenarios,
    };
    if !root.is_dir() {
        return Err(format!("scenarios directory not found: {}", root.display()));
    }
    if cli.dry_run {
        println!("Dry run: no files will be modified");
    }

    let mut totals = Totals::default();
    for dir in find_scenario_dirs(&root) {
        totals.scenarios += 1;
        let label = dir.strip_prefix(&root).unwrap_or(&dir).display().to_string();

        let report = match fix_scenario_dir(&dir, cli.dry_run) {
            Ok(report) => report,
            Err(e) => {
                totals.failed += 1;
                tracing::error!("{label}: {e}");
                continue;
            }
        };
        if report.fixes.is_empty() {
            if cli.verbose {
                println!("{label}: ok");
            }
            continue;
        }

        totals.affected += 1;
        totals.fixed += report.fixed();
        totals.unfixable += report.unfixable();
        println!("{label}:");
        for fix in &report.fixes {
            let previous = fix.previous.as_deref().unwrap_or("missing");
            match &fix.outcome {
                FixOutcome::Fixed { value } => {
                    println!("  {} ({:?}): {previous} -> {value}", fix.ufun, fix.target)
                }
                FixOutcome::Unfixable { reason } => {
                    println!("  {} ({:?}): {previous} left as is ({reason})", fix.ufun, fix.target)
                }
            }
        }
        for error in &report.write_errors {
            eprintln!("  write failed: {error}");
        }
        if !report.write_errors.is_empty() {
            totals.failed += 1;
        }
    }

    println!(
        "{} scenario(s) scanned, {} affected, {} value(s) fixed, {} unfixable{}",
        totals.scenarios,
        totals.affected,
        totals.fixed,
        totals.unfixable,
        if cli.dry_run { " (dry run)" } else { "" }
    );
    Ok(totals)
}
