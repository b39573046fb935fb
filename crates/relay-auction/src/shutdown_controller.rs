use tokio::sync::watch;

/// Cloneable handle that reports whether the process should shut down.
#[derive(Clone, Debug)]
pub struct ShutdownController {
    shutdown: watch::Receiver<bool>,
}

pub struct ShutdownSignal(watch::Sender<bool>);

impl ShutdownController {
    /// Creates a new Control which reacts to sigint/sigterm from the OS
    pub fn new_shutdown_on_signal() -> Self {
        let (signal, controller) = Self::new_manual_shutdown();
        tokio::spawn(Self::wait_for_signal(signal));
        controller
    }

    /// Creates a new Control that can be manually instructed to shut down
    /// the auction.
    pub fn new_manual_shutdown() -> (ShutdownSignal, Self) {
        let (sender, receiver) = watch::channel(false);
        (ShutdownSignal(sender), Self { shutdown: receiver })
    }

    async fn wait_for_signal(shutdown: ShutdownSignal) {
        #[cfg(unix)]
        {
            use tokio::{signal, signal::unix};
            let mut sigterm = match unix::signal(unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    tracing::error!(?err, "failed to install SIGTERM handler");
                    return;
                }
            };

            // Equivalent to SIGINT
            let ctrl_c = signal::ctrl_c();
            tokio::select! {
                _ = ctrl_c => {
                    tracing::info!("Received SIGINT");
                },
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM");
                },
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(?err, "failed to install CTRL+C handler");
                return;
            }
            tracing::info!("Received SIGINT");
        }

        shutdown.shutdown();
    }

    /// Non-blocking check if shutdown signal has been received yet
    pub fn should_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once shutdown was requested. Never resolves if the signal
    /// gets dropped without firing.
    pub async fn wait(&mut self) {
        if self.shutdown.wait_for(|shutdown| *shutdown).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new_shutdown_on_signal()
    }
}

impl ShutdownSignal {
    /// Send shutdown signal to all associated Controls
    pub fn shutdown(self) {
        // Nobody listening means nobody left to shut down.
        let _ = self.0.send(true);
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::time::Duration};

    #[tokio::test]
    async fn clones_observe_shutdown() {
        let (signal, controller) = ShutdownController::new_manual_shutdown();
        let mut clone = controller.clone();
        assert!(!controller.should_shutdown());

        signal.shutdown();
        clone.wait().await;
        assert!(controller.should_shutdown());
        assert!(clone.should_shutdown());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_signal_never_shuts_down() {
        let (signal, mut controller) = ShutdownController::new_manual_shutdown();
        drop(signal);
        let waited = tokio::time::timeout(Duration::from_secs(60), controller.wait()).await;
        assert!(waited.is_err());
        assert!(!controller.should_shutdown());
    }
}
