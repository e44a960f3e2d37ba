use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use negmas_app_lib::core::images::{
    convert_directory, find_images, ConversionOptions, TargetFormat, DEFAULT_QUALITY,
};

#[derive(Parser, Debug)]
#[command(name = "convert-images")]
#[command(about = "Convert every image under a directory to another format")]
struct Cli {
    /// Directory to scan recursively
    directory: PathBuf,

    /// Target format: png, jpg, jpeg, webp, bmp, gif or tiff
    format: String,

    /// Delete each source file once its conversion was written
    #[arg(long)]
    delete_originals: bool,

    /// Only list what would be converted
    #[arg(long)]
    dry_run: bool,

    /// Do not ask before deleting originals
    #[arg(long, short)]
    yes: bool,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = DEFAULT_QUALITY)]
    quality: u8,
}

fn main() {
    let _ = dotenvy::dotenv();
    negmas_app_lib::init_tracing();

    if let Err(error) = run(Cli::parse()) {
        eprintln!("convert-images failed: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let target: TargetFormat = cli.format.parse().map_err(|e| format!("{e}"))?;
    if !cli.directory.is_dir() {
        return Err(format!("not a directory: {}", cli.directory.display()));
    }

    let options = ConversionOptions {
        target,
        quality: cli.quality,
        delete_originals: cli.delete_originals,
        dry_run: cli.dry_run,
    };

    if options.delete_originals && !options.dry_run && !cli.yes {
        let pending = find_images(&cli.directory)
            .iter()
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| !target.matches_extension(ext))
            })
            .count();
        if pending > 0 && !confirm(&format!("Delete {pending} original image(s) after conversion?"))? {
            println!("Aborted");
            return Ok(());
        }
    }

    let report = convert_directory(&cli.directory, &options).map_err(|e| e.to_string())?;
    for (source, output) in &report.converted {
        let verb = if options.dry_run { "would convert" } else { "converted" };
        println!("{verb} {} -> {}", source.display(), output.display());
    }
    for error in &report.errors {
        eprintln!("error: {error}");
    }
    println!(
        "{} image(s) found, {} already {}, {} converted, {} original(s) deleted, {} error(s)",
        report.found,
        report.already_in_format,
        target.extension(),
        report.converted.len(),
        report.deleted,
        report.errors.len()
    );
    Ok(())
}

fn confirm(question: &str) -> Result<bool, String> {
    print!("{question} [y/N] ");
    io::stdout().flush().map_err(|e| e.to_string())?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| e.to_string())?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
