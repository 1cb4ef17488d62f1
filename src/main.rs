use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use serde::Serialize;
use tokio::sync::watch;

use txfetch::{
    api::LoginReauth,
    config::Config,
    config_error,
    core::{ClientResult, Reauthenticate},
    logging::{self, Logger},
    orchestration::SessionClient,
};

use cli::{Cli, Commands};

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration, environment overrides included
    let config = match Config::load(cli.conf.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let log_sink = match config.log.clone() {
        Some(log_cfg) => {
            let logger = Logger::new(log_cfg);
            logger.init_env_logger();
            Some(tokio::spawn(logger.run(shutdown_rx)))
        }
        None => {
            logging::init_stderr_logger();
            None
        }
    };

    let outcome = run(cli.command, &config).await;

    if let Some(sink) = log_sink {
        let _ = shutdown_tx.send(true);
        match sink.await {
            Ok(Err(e)) => eprintln!("{e}"),
            Err(e) => eprintln!("Log writer stopped abnormally: {e}"),
            Ok(Ok(())) => {}
        }
    }

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: &Config) -> ClientResult<()> {
    let client = SessionClient::from_config(config);
    log::info!("Using backend {}", config.api.base_url);

    let reauth = config.session.credentials().map(|(user, password)| {
        Arc::new(LoginReauth::new(client.clone(), user, password)) as Arc<dyn Reauthenticate>
    });

    match command {
        Commands::Status => {
            let authorized = client.check_auth_status().await;
            println!("{}", if authorized { "authorized" } else { "unauthorized" });
        }
        Commands::Login { username, password } => {
            let username = username.or_else(|| config.session.username.clone());
            let password = password.or_else(|| config.session.password.clone());
            let (Some(username), Some(password)) = (username, password) else {
                return Err(config_error!("username and password are required to log in"));
            };
            let cookie = client.perform_login(&username, &password).await?;
            println!("{cookie}");
        }
        Commands::Start { range } => {
            let response = client.start_fetch(range.from, range.to, reauth).await?;
            print_json(&response)?;
        }
        Commands::Fetch { range, mode } => {
            let response = client.fetch_data(range.from, range.to, mode, reauth).await?;
            log::info!(
                "Fetched {} transaction(s) via {}",
                response.transactions().len(),
                mode.endpoint()
            );
            print_json(&response)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> ClientResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
