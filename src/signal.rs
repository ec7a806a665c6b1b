//! One-shot "processing complete" signal handed to an event consumer.
//!
//! The producer (change-notification facility, transfer manager) keeps the
//! receiver and may hold a wake lock or execution window until it fires.
//! `done` consumes the signal, so it can be sent at most once.

use tokio::sync::oneshot;

#[derive(Debug)]
pub struct DoneSignal {
    tx: Option<oneshot::Sender<()>>,
}

impl DoneSignal {
    /// Create a signal and the receiver the producer waits on.
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A signal nobody waits for.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    /// Tell the producer the event has been fully handled.
    pub fn done(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn done_reaches_receiver() {
        let (signal, rx) = DoneSignal::new();
        signal.done();
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn dropped_signal_closes_receiver() {
        let (signal, rx) = DoneSignal::new();
        drop(signal);
        assert!(rx.await.is_err());
    }

    #[test]
    fn detached_done_is_harmless() {
        DoneSignal::detached().done();
    }
}
