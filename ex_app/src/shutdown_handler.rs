use tokio_util::sync::CancellationToken;

/// Installs a Ctrl+C handler that cancels `token` on the shutdown signal
///
/// Waiting acquires observe the token and return `Cancelled` without charging quota.
pub fn setup(token: CancellationToken) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received");
        token.cancel();
    })
}
