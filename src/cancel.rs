//! Cooperative cancellation for asynchronous worksheet writes
//!
//! ```
//! use excelstream_data::cancel::cancellation;
//!
//! let (handle, signal) = cancellation();
//! assert!(!signal.is_cancelled());
//! handle.cancel();
//! assert!(signal.is_cancelled());
//! ```

use std::sync::Arc;
use tokio::sync::watch;

/// Create a connected handle/signal pair
pub fn cancellation() -> (CancelHandle, CancellationSignal) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle { tx: Arc::new(tx) },
        CancellationSignal { rx },
    )
}

/// Requests cancellation of every write observing the paired signal
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// A fresh signal observing this handle
    pub fn signal(&self) -> CancellationSignal {
        CancellationSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Checked by the async write path before each row is pulled from the source
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_reaches_every_signal() {
        let (handle, signal) = cancellation();
        let cloned = signal.clone();
        let subscribed = handle.signal();

        assert!(!signal.is_cancelled());
        handle.clone().cancel();

        assert!(signal.is_cancelled());
        assert!(cloned.is_cancelled());
        assert!(subscribed.is_cancelled());
    }

    #[test]
    fn test_cancel_without_signals() {
        let (handle, signal) = cancellation();
        drop(signal);
        handle.cancel();
        assert!(handle.signal().is_cancelled());
    }
}
