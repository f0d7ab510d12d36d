//! OS shutdown signal handling for the `faultwatch` binary

/// Resolve once SIGINT or SIGTERM (Ctrl+C elsewhere) is received.
///
/// Returns `Err` if the signal handlers cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };
    Ok(name)
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}

/// Process exit code for a target's exit status: signal `N` maps to `128 + N`
pub fn exit_code(status: crate::ExitStatus) -> i32 {
    use crate::ExitStatus;

    match status {
        ExitStatus::Exited(code) => code.clamp(0, 255),
        ExitStatus::Signaled(signal) => 128_i32.saturating_add(signal).min(255),
        ExitStatus::Unknown => 1,
    }
}
