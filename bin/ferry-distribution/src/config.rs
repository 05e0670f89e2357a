use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/ferry/distribution.yaml";

#[derive(Parser)]
#[command(about)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub action: Option<Action>,
}

#[derive(Subcommand)]
pub enum Action {
    /// Runs the distribution service.
    #[command(name = "run")]
    Run(RunConfig),

    /// Validates the configuration and prints a report, without starting anything.
    #[command(name = "validate")]
    Validate(ValidateConfig),
}

impl Action {
    /// Path of the configuration file the action reads.
    pub fn config_path(&self) -> &PathBuf {
        match self {
            Self::Run(config) => &config.config,
            Self::Validate(config) => &config.config,
        }
    }
}

/// Run subcommand configuration.
#[derive(Args, Clone, Debug)]
pub struct RunConfig {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            config: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }
}

/// Validate subcommand configuration.
#[derive(Args, Clone, Debug)]
pub struct ValidateConfig {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Prints the validation report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["ferry-distribution", "validate", "--json", "-c", "ferry.yaml"])
            .expect("arguments should parse");
        match cli.action {
            Some(Action::Validate(config)) => {
                assert!(config.json);
                assert_eq!(config.config, PathBuf::from("ferry.yaml"));
            }
            _ => panic!("expected the validate subcommand"),
        }

        let cli = Cli::try_parse_from(["ferry-distribution", "run"]).expect("arguments should parse");
        let action = cli.action.expect("subcommand should be present");
        assert_eq!(action.config_path(), &PathBuf::from(DEFAULT_CONFIG_PATH));

        let cli = Cli::try_parse_from(["ferry-distribution"]).expect("arguments should parse");
        assert!(cli.action.is_none());
    }
}
