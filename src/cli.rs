use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "thumbnailer")]
#[command(about = "Queue-driven JPEG thumbnail worker", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to THUMBNAILER_CONFIG or config/thumbnailer.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the queue and process messages until interrupted
    Poll,
    /// Serve SQS batch events from the Lambda runtime
    Lambda,
    /// Process one SQS batch event and print the batch response
    Invoke(InvokeArgs),
}

#[derive(clap::Args, Debug)]
pub struct InvokeArgs {
    /// Event file, or `-` for stdin
    #[arg(long, default_value = "-")]
    pub event: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_poll_with_config() {
        let cli = Cli::parse_from(["thumbnailer", "--config", "worker.toml", "poll"]);
        assert_eq!(cli.config, Some(PathBuf::from("worker.toml")));
        assert!(matches!(cli.command, Commands::Poll));
    }

    #[test]
    fn test_parse_invoke() {
        let cli = Cli::parse_from(["thumbnailer", "invoke", "--event", "event.json"]);
        match cli.command {
            Commands::Invoke(args) => assert_eq!(args.event, "event.json"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_lambda() {
        let cli = Cli::parse_from(["thumbnailer", "lambda"]);
        assert!(cli.config.is_none());
        assert!(matches!(cli.command, Commands::Lambda));
    }

    #[test]
    fn test_invoke_defaults_to_stdin() {
        let cli = Cli::parse_from(["thumbnailer", "invoke"]);
        assert!(matches!(cli.command, Commands::Invoke(InvokeArgs { ref event }) if event == "-"));
    }
}
