use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Creates a connected notifier/signal pair.
///
/// The channel holds at most one pending token, so repeated notifications
/// coalesce and a notification sent before anyone waits is not lost.
pub fn readiness_channel() -> (ReadinessNotifier, ReadinessSignal) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (
        ReadinessNotifier { tx: tx.clone() },
        ReadinessSignal { tx, rx },
    )
}

/// Sending half, held by whoever frees capacity (the encoder worker).
#[derive(Clone, Debug)]
pub struct ReadinessNotifier {
    tx: Sender<()>,
}

impl ReadinessNotifier {
    pub fn notify(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                log::trace!("readiness notified with no listener");
            }
        }
    }
}

/// Waiting half, held by the pump.
#[derive(Clone, Debug)]
pub struct ReadinessSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl ReadinessSignal {
    /// Blocks until the next notification.
    pub fn wait(&self) {
        // The signal keeps its own sender, so the channel never disconnects.
        let _ = self.rx.recv();
    }

    /// Consumes a pending notification without blocking.
    #[cfg(test)]
    fn try_take(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// A notifier that wakes this signal, e.g. to interrupt a wait on cancel.
    pub fn notifier(&self) -> ReadinessNotifier {
        ReadinessNotifier {
            tx: self.tx.clone(),
        }
    }
}
