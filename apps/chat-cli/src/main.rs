//! Terminal chat client: reads lines from stdin, prints events to stdout.

mod config;
mod input;
mod logging;
mod sink;

use std::{process::ExitCode, time::Duration};

use chat_websocket::spawn_runtime;
use tracing::{info, warn};

use crate::{
    config::ChatConfig,
    input::{HELP, Input, parse_line, spawn_stdin_reader},
};

/// How long teardown may take before the runtime task is abandoned.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let config = match ChatConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };
    info!(endpoint = %config.endpoint, "starting chat client");

    let (handle, mut runtime_task) = spawn_runtime(config.runtime_config());
    let sink_task = tokio::spawn(sink::run(handle.subscribe()));

    println!("{HELP}");
    if let Some((display_name, token)) = config.prefilled_credential()
        && let Err(err) = handle.connect(display_name, token).await
    {
        eprintln!("failed to start connection: {err}");
    }

    let mut lines = match spawn_stdin_reader() {
        Ok(lines) => lines,
        Err(err) => {
            eprintln!("failed to start input reader: {err}");
            return ExitCode::FAILURE;
        }
    };
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        let line = tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            line = lines.recv() => line,
        };

        let line = match line {
            Some(Ok(line)) => line,
            None => break,
            Some(Err(err)) => {
                warn!(error = %err, "failed to read stdin");
                break;
            }
        };

        let result = match parse_line(&line) {
            Input::Connect {
                display_name,
                token,
            } => handle.connect(display_name, token).await,
            Input::Message(text) => handle.send_message(text).await,
            Input::Quit => break,
            Input::Help => {
                println!("{HELP}");
                Ok(())
            }
            Input::Invalid(message) => {
                eprintln!("{message}");
                Ok(())
            }
        };
        if let Err(err) = result {
            eprintln!("runtime stopped: {err}");
            break;
        }
    }

    if let Err(err) = handle.shutdown().await {
        warn!(error = %err, "runtime already stopped");
    }
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut runtime_task).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "runtime task failed"),
        Err(_) => {
            warn!("runtime did not stop in time; aborting");
            runtime_task.abort();
        }
    }
    drop(handle);
    if let Err(err) = sink_task.await {
        warn!(error = %err, "terminal sink failed");
    }

    ExitCode::SUCCESS
}
