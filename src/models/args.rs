use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "stepchain", version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to ./.stepchainrc.toml, then ~/.stepchainrc.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the execution service
    Serve {
        /// Listen address, overrides the config file
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Execute a request file and print the step results
    Run {
        /// ExecutionRequest JSON file
        file: PathBuf,

        /// Overrides base_url from the file
        #[arg(short, long)]
        base_url: Option<String>,

        /// Print the full report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["stepchain", "-v", "run", "flow.json", "--base-url", "http://localhost:9000"]);
        assert!(cli.verbose);
        match cli.command {
            Command::Run { file, base_url, json } => {
                assert_eq!(file, PathBuf::from("flow.json"));
                assert_eq!(base_url.as_deref(), Some("http://localhost:9000"));
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_serve_with_config() {
        let cli = Cli::parse_from(["stepchain", "serve", "--bind", "0.0.0.0:8004", "--config", "cfg.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("cfg.toml")));
        assert!(matches!(cli.command, Command::Serve { bind: Some(ref b) } if b == "0.0.0.0:8004"));
    }
}
