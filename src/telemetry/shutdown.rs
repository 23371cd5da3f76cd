//! Termination-signal handling.

use tracing::{error, info};

use crate::error::TelemetryError;
use crate::telemetry::sessions::service::WeakClient;

const SIGNAL_THREAD_NAME: &str = "agentspan-signals";

/// Spawn the listener thread. It holds only a weak handle, so it never keeps
/// the client alive on its own.
pub(crate) fn install(client: WeakClient, exit_on_signal: bool) -> Result<(), TelemetryError> {
    std::thread::Builder::new()
        .name(SIGNAL_THREAD_NAME.to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!(error = %e, "Failed to build signal listener runtime");
                    return;
                }
            };
            let Some((name, signo)) = runtime.block_on(wait_for_signal()) else {
                return;
            };

            info!(signal = name, "Termination signal received; flushing sessions");
            if let Some(client) = client.upgrade() {
                client.interrupt(name);
            }
            if exit_on_signal {
                std::process::exit(128 + signo);
            }
        })
        .map(|_| ())
        .map_err(|e| TelemetryError::WorkerStart(e.to_string()))
}

#[cfg(unix)]
async fn wait_for_signal() -> Option<(&'static str, i32)> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "Failed to listen for SIGINT");
            return None;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "Failed to listen for SIGTERM");
            return None;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => Some(("SIGINT", 2)),
        _ = terminate.recv() => Some(("SIGTERM", 15)),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Option<(&'static str, i32)> {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Some(("ctrl-c", 2)),
        Err(e) => {
            error!(error = %e, "Failed to listen for ctrl-c");
            None
        }
    }
}
