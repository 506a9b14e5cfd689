//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod fetch;
mod serve;
mod sources;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::load_settings;

#[derive(Parser)]
#[command(name = "dealfeed")]
#[command(about = "Discounted product feed aggregated from retail sites")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "DEALFEED_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        /// Bind address: port, host, or host:port (defaults to the configured bind)
        bind: Option<String>,
    },

    /// Acquire one source and print its records as JSON
    Fetch {
        /// Source ID to fetch
        source_id: String,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// List configured sources
    Sources,
}

/// Parse arguments, load settings and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.bind.clone());
            serve::cmd_serve(&settings, &bind).await
        }
        Commands::Fetch { source_id, pretty } => {
            fetch::cmd_fetch(&settings, &source_id, pretty).await
        }
        Commands::Sources => sources::cmd_sources(&settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from(["dealfeed", "-v", "fetch", "nikora", "--pretty"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Fetch { source_id, pretty } => {
                assert_eq!(source_id, "nikora");
                assert!(pretty);
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_parse_serve_with_config() {
        let cli =
            Cli::try_parse_from(["dealfeed", "serve", "0.0.0.0:8080", "--config", "deals.toml"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("deals.toml")));
        match cli.command {
            Commands::Serve { bind } => assert_eq!(bind.as_deref(), Some("0.0.0.0:8080")),
            _ => panic!("expected serve"),
        }
    }
}
