use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use negmas_app_lib::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "negmas-app")]
#[command(about = "HTTP backend for the negmas negotiation workbench")]
struct Cli {
    /// TCP address to bind (overrides NEGMAS_APP_BIND)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Directory containing front-end assets (overrides NEGMAS_APP_STATIC_DIR)
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Root of the user data tree (overrides NEGMAS_APP_DIR)
    #[arg(long)]
    base_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    negmas_app_lib::init_tracing();

    if let Err(error) = run(Cli::parse()).await {
        tracing::error!("{error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = AppConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(dir) = cli.static_dir {
        config.static_dir = Some(dir);
    }
    if let Some(dir) = cli.base_dir {
        config.base_dir = dir;
    }
    negmas_app_lib::run(config).await
}
