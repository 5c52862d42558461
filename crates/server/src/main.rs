mod config;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use crate::config::Settings;

/// Biznesplan generation backend.
#[derive(Parser)]
#[command(name = "biznesplan", version, about = "Biznesplan generation backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8000")]
        port: u16,

        /// Env file loaded before reading the environment
        #[arg(long)]
        env_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, env_file } => {
            match env_file {
                Some(path) => {
                    if let Err(e) = dotenv::from_path(&path) {
                        eprintln!("Failed to load env file {}: {}", path.display(), e);
                        process::exit(2);
                    }
                }
                // A local .env is optional; its absence is not an error.
                None => {
                    let _ = dotenv::dotenv();
                }
            }

            let settings = match Settings::load() {
                Ok(settings) => settings,
                Err(e) => {
                    eprintln!("Configuration error: {}", e);
                    process::exit(2);
                }
            };

            init_tracing(&settings.log_level);

            if let Err(e) = serve::start_server(port, settings).await {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
