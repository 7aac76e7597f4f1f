// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concord - operator CLI for the thread messaging core.

mod commands;
mod doctor;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use concord_config::model::ConcordConfig;
use concord_config::ConfigError;

/// Concord - operator CLI for the thread messaging core.
#[derive(Parser, Debug)]
#[command(name = "concord", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the effective configuration as TOML.
    Config,
    /// Run diagnostic checks against configuration and the moderation provider.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Print the close-request state derived from a JSON array of messages.
    CloseState {
        /// Path to the message log.
        file: PathBuf,
    },
    /// Review a draft with the configured moderation provider.
    Review {
        /// The draft message text.
        draft: String,
        /// Thread title given to the provider as context.
        #[arg(long)]
        title: String,
        /// Thread topic given to the provider as context.
        #[arg(long)]
        topic: Option<String>,
    },
}

fn load(path: Option<&std::path::Path>) -> Result<ConcordConfig, Vec<ConfigError>> {
    match path {
        Some(path) => concord_config::load_and_validate_path(path),
        None => concord_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            concord_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.log_level);

    let result = match cli.command {
        Commands::Config => commands::run_config(&config),
        Commands::Doctor { plain } => {
            doctor::run_doctor(&config, cli.config.as_deref(), plain).await
        }
        Commands::CloseState { file } => commands::run_close_state(&file),
        Commands::Review {
            draft,
            title,
            topic,
        } => commands::run_review(&config, &draft, title, topic).await,
    };

    if let Err(e) = result {
        eprintln!("concord: {e}");
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("concord={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_review_arguments() {
        let cli = Cli::try_parse_from([
            "concord",
            "review",
            "See you at 5",
            "--title",
            "Pickup",
            "--topic",
            "school",
        ])
        .unwrap();
        match cli.command {
            Commands::Review {
                draft,
                title,
                topic,
            } => {
                assert_eq!(draft, "See you at 5");
                assert_eq!(title, "Pickup");
                assert_eq!(topic.as_deref(), Some("school"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_config_flag_follows_subcommand() {
        let cli = Cli::try_parse_from(["concord", "doctor", "--plain", "--config", "c.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(cli.command, Commands::Doctor { plain: true }));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["concord"]).is_err());
    }
}
