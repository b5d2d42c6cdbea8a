//! taskrelay CLI - Main entry point

mod cli;
mod serve;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskrelay_foundation::RelayConfig;
use taskrelay_task::CaptureLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// taskrelay - run agents in the background and poll their progress
#[derive(Parser, Debug)]
#[command(name = "taskrelay")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to ./taskrelay.json when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Agent to run (echo, shell)
    #[arg(long, global = true)]
    agent: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run an input in-process and stream its logs; without INPUT, read
    /// prompts from stdin until `exit`
    Prompt {
        /// Input handed to the agent
        input: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = RelayConfig::load(args.config.as_deref())?;
    if let Some(agent) = &args.agent {
        config.agent = agent.clone();
    }

    match args.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            init_logging(if args.debug { "debug" } else { config.log_level.as_str() });
            serve::run(config).await
        }
        Command::Prompt { input } => {
            // captured lines are printed by the prompt loop; keep the console quiet
            init_logging(if args.debug { "debug" } else { "warn" });
            match input {
                Some(input) => cli::run_once(&config, &input).await,
                None => cli::run_interactive(&config).await,
            }
        }
    }
}

/// Console output filtered by level; run capture sees every event
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_filter(filter))
        .with(CaptureLayer::new())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_serve() {
        let args = Args::try_parse_from(["taskrelay", "serve", "--port", "8080", "--agent", "shell"]).unwrap();
        assert_eq!(args.agent.as_deref(), Some("shell"));
        match args.command {
            Command::Serve { port, host } => {
                assert_eq!(port, Some(8080));
                assert_eq!(host, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_prompt() {
        let args = Args::try_parse_from(["taskrelay", "--debug", "prompt", "hello"]).unwrap();
        assert!(args.debug);
        assert!(matches!(args.command, Command::Prompt { input: Some(ref input) } if input == "hello"));
    }

    #[test]
    fn test_parse_interactive_prompt() {
        let args = Args::try_parse_from(["taskrelay", "prompt", "--agent", "shell"]).unwrap();
        assert_eq!(args.agent.as_deref(), Some("shell"));
        assert!(matches!(args.command, Command::Prompt { input: None }));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["taskrelay"]).is_err());
    }
}
