use filepipe::client::{ClientConfig, Command, FileClient};

use crate::exit::{client_error, io_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_response, OutputFormat};

/// Run one command on a freshly spawned worker, then shut the worker down.
pub fn run(command: Command, config: &ClientConfig, format: OutputFormat) -> CliResult<i32> {
    command
        .validate()
        .map_err(|err| client_error(&format!("{} failed", command.kind()), err))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start async runtime", err))?;

    runtime.block_on(execute(command, config, format))
}

async fn execute(command: Command, config: &ClientConfig, format: OutputFormat) -> CliResult<i32> {
    let kind = command.kind();
    let context = format!("{kind} failed");

    let client = FileClient::spawn(config).map_err(|err| client_error(&context, err))?;
    tracing::debug!(pid = client.id(), op = %kind, "worker spawned");

    let result = client.request(command).await;
    let state = client.shutdown().await;
    tracing::debug!(%state, "worker stopped");

    let response = result.map_err(|err| client_error(&context, err))?;
    print_response(kind, &response, format);
    Ok(if response.is_ok() { SUCCESS } else { FAILURE })
}
