//! turnrelay CLI entry point.
//!
//! Commands:
//! - `serve`: Start the HTTP relay
//! - `doctor`: Check configuration, credentials, and policy
//! - `policy show`: Print the active policy

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "turnrelay",
    about = "turnrelay: policy-driven conversational relay",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "TURNRELAY_JSON_LOGS")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP relay
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Diagnose configuration and credentials
    Doctor,

    /// Inspect policy documents
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
}

#[derive(Subcommand)]
enum PolicyAction {
    /// Print the active policy's name, version, and size
    Show {
        /// Also print the full policy text
        #[arg(long)]
        full: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Policy {
            action: PolicyAction::Show { full },
        } => commands::policy::show(full).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_serve_with_port() {
        let cli = Cli::try_parse_from(["turnrelay", "-v", "serve", "--port", "9000"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Serve { port: Some(9000) }));
    }

    #[test]
    fn parses_policy_show() {
        let cli = Cli::try_parse_from(["turnrelay", "policy", "show", "--json-logs"]).unwrap();
        assert!(cli.json_logs);
        assert!(matches!(
            cli.command,
            Commands::Policy {
                action: PolicyAction::Show { full: false }
            }
        ));
    }
}
