use clap::Parser;
use std::process::ExitCode;

use sentimen::SentimenError;
use sentimen::cli::{Cli, Command};
use sentimen::config::{SentimenConfig, load_config, validate_config};

fn resolve_config(cli: &Cli) -> Result<SentimenConfig, SentimenError> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(dir) = &cli.artifacts {
        config.artifacts.dir = dir.clone();
    }
    if let Command::Serve(args) = &cli.command {
        if let Some(host) = &args.host {
            config.server.host = host.clone();
        }
        if let Some(port) = args.port {
            config.server.port = port;
        }
    }
    validate_config(&config)?;
    Ok(config)
}

fn run() -> Result<(), SentimenError> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    match &cli.command {
        Command::Serve(_) => sentimen::serve::handle_serve(&config),
        Command::Predict(args) => sentimen::predict::handle_predict(&config, args),
        Command::Info => sentimen::predict::handle_info(&config),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sentimen: {e}");
            ExitCode::from(1)
        }
    }
}
