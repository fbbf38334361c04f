use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Ctrl-C latch shared between the signal handler thread and async code.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.requested() {
                return;
            }
            notified.await;
        }
    }
}

/// Route Ctrl-C to the returned signal. A second Ctrl-C while the first is
/// still being handled exits the process.
pub fn install_signal_handler() -> ShutdownSignal {
    let signal = ShutdownSignal::new();
    let handler = signal.clone();
    let installed = ctrlc::set_handler(move || {
        if handler.requested() {
            std::process::exit(130);
        }
        handler.trigger();
    });
    if let Err(e) = installed {
        tracing::debug!("signal handler not installed: {e}");
    }
    signal
}
