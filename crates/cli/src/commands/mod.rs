//! Command dispatch: one bridge-backed session per invocation.

mod bulk;
mod qr;
mod restart;
mod send;
mod status;

use std::time::Duration;

use serde_json::Value;

use watify::{BridgeFactory, SessionConfig, SessionService};

use crate::cli::{Cli, Commands};
use crate::error::Result;
use crate::output::{CommandResult, OutputFormat};

pub async fn dispatch(cli: Cli) -> Result<()> {
    let format: OutputFormat = cli.format.into();
    let command_name = cli.command.name();

    let mut config = SessionConfig::default()
        .with_max_retries(cli.max_retries)
        .with_client_id(cli.client_id.clone());
    config.ready_timeout_ms = cli.ready_timeout_ms;
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir.clone());
    }

    let ready_timeout = config.ready_timeout();
    let factory = BridgeFactory::new(config.clone());
    let service = SessionService::new(config, factory);

    let result = run(cli.command, &service, ready_timeout).await;
    service.shutdown().await;

    match result {
        Ok(data) => {
            CommandResult::success(command_name, data).print(format);
            Ok(())
        }
        Err(err) => {
            CommandResult::failure(command_name, err.to_command_error()).print(format);
            Err(err)
        }
    }
}

async fn run(command: Commands, service: &SessionService, ready_timeout: Duration) -> Result<Value> {
    match command {
        Commands::Status { wait_ms } => {
            status::run(service, Duration::from_millis(wait_ms)).await
        }
        Commands::Qr { timeout_ms } => qr::run(service, Duration::from_millis(timeout_ms)).await,
        Commands::Send { recipient, message } => {
            send::run(service, &recipient, &message, ready_timeout).await
        }
        Commands::Bulk {
            recipients,
            message,
            delay_ms,
        } => {
            bulk::run(
                service,
                &recipients,
                &message,
                Duration::from_millis(delay_ms),
                ready_timeout,
            )
            .await
        }
        Commands::Restart => restart::run(service).await,
    }
}
