//! Distribution service.
//!
//! Receives distribution notifications through reception plugins and pushes every artifact they carry to the configured
//! forwarders. A small REST control plane reports liveness and dispatch statistics.

use clap::Parser as _;
use ferry_app::logging::{fatal_and_exit, initialize_logging, LoggingConfiguration};
use tracing::{error, info};

mod activator;

mod cli;
use self::cli::{run::run, validate::validate};

mod config;
use self::config::{Action, Cli, RunConfig};

mod parameters;

mod rest;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // If no subcommand is provided, the run subcommand is executed with the default configuration.
    let action = cli.action.unwrap_or_else(|| Action::Run(RunConfig::default()));

    let configuration = cli::run::load_configuration(action.config_path())
        .unwrap_or_else(|e| fatal_and_exit(format!("failed to load configuration: {:#}", e)));
    let logging_config = LoggingConfiguration::from_configuration(&configuration)
        .unwrap_or_else(|e| fatal_and_exit(format!("failed to read logging configuration: {:#}", e)));
    if let Err(e) = initialize_logging(&logging_config) {
        fatal_and_exit(format!("failed to initialize logging: {:#}", e));
    }

    match action {
        Action::Run(_) => match run(configuration).await {
            Ok(()) => info!("Distribution service stopped."),
            Err(e) => {
                error!("{:?}", e);
                std::process::exit(1);
            }
        },
        Action::Validate(config) => {
            if let Err(e) = validate(&configuration, config.json) {
                error!("{:#}", e);
                std::process::exit(1);
            }
        }
    }
}
