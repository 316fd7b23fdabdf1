//! Process supervision: signals, panic reporting, idempotent shutdown.
//!
//! - SIGTERM and SIGINT both trigger graceful shutdown; only the first
//!   delivery acts, re-entry is ignored.
//! - A panic anywhere in the process is logged through tracing and marks
//!   the run fatal, so the binary exits non-zero.
//! - Shutdown is a `CancellationToken` cancelled at most once; everything
//!   downstream (serve loop, retry sleeps) races it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Installed process supervisor.
pub(crate) struct Supervisor {
    shutdown: CancellationToken,
    triggered: Arc<AtomicBool>,
    fatal: Arc<AtomicBool>,
}

impl Supervisor {
    /// Install the panic hook and signal listeners.
    pub(crate) fn install() -> Self {
        let shutdown = CancellationToken::new();
        let triggered = Arc::new(AtomicBool::new(false));
        let fatal = Arc::new(AtomicBool::new(false));

        install_panic_hook(&shutdown, &triggered, &fatal);
        spawn_signal_listener(shutdown.clone(), Arc::clone(&triggered));

        Self {
            shutdown,
            triggered,
            fatal,
        }
    }

    /// The token every long-running operation races against.
    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Trigger graceful shutdown. Idempotent: later calls are no-ops.
    pub(crate) fn trigger_shutdown(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            info!("shutdown triggered");
            self.shutdown.cancel();
        }
    }

    /// Mark this run as fatally wounded (exit code 1).
    pub(crate) fn mark_fatal(&self) {
        self.fatal.store(true, Ordering::SeqCst);
    }

    /// Whether a fatal condition was recorded.
    pub(crate) fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }
}

fn install_panic_hook(
    shutdown: &CancellationToken,
    triggered: &Arc<AtomicBool>,
    fatal: &Arc<AtomicBool>,
) {
    let shutdown = shutdown.clone();
    let triggered = Arc::clone(triggered);
    let fatal = Arc::clone(fatal);
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic");
        let location = panic_info
            .location()
            .map_or_else(|| "<unknown>".to_string(), ToString::to_string);

        // The process is in an indeterminate state after this; it must
        // stop serving.
        error!(panic = message, location = %location, "uncaught panic; shutting down");
        fatal.store(true, Ordering::SeqCst);
        if !triggered.swap(true, Ordering::SeqCst) {
            shutdown.cancel();
        }

        previous(panic_info);
    }));
}

fn spawn_signal_listener(shutdown: CancellationToken, triggered: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut acted = false;
        loop {
            wait_for_signal().await;
            if acted || triggered.swap(true, Ordering::SeqCst) {
                warn!("shutdown already in progress; signal ignored");
                continue;
            }
            acted = true;
            info!("termination signal received; shutting down");
            shutdown.cancel();
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            return;
        },
    };

    tokio::select! {
        _ = sigterm.recv() => {},
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "ctrl-c listener failed");
                std::future::pending::<()>().await;
            }
        },
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "ctrl-c listener failed");
        std::future::pending::<()>().await;
    }
}
