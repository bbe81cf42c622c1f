use std::fmt::Display;
use std::future::Future;

/// Waits for a shutdown signal to fire.
///
/// A listener that fails to install never fires: the error is logged and the
/// returned future stays pending, so the server keeps running.
pub async fn wait_for<F, E>(name: &str, listener: F)
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    if let Err(e) = listener.await {
        tracing::error!("failed to listen for {name}: {e}");
        std::future::pending::<()>().await;
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn signal() {
    let ctrl_c = wait_for("ctrl-c", tokio::signal::ctrl_c());

    #[cfg(unix)]
    let terminate = wait_for("SIGTERM", async {
        let mut signal =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        signal.recv().await;
        Ok::<(), std::io::Error>(())
    });

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
