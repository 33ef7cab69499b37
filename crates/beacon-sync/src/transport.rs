//! Push transport abstraction.
//!
//! A transport opens one push channel and reports what happens on it as a
//! stream of [`TransportSignal`]s. It owns low-level reconnection: when the
//! channel drops mid-session it emits `Reconnecting`, retries on its own
//! schedule, and either emits `Reconnected` or gives up with `Closed`.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use beacon_core::{PushEvent, Result};

/// What the transport observed on an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// A named server event.
    Message(PushEvent),
    /// The channel dropped; the transport is re-establishing it.
    Reconnecting { reason: String },
    /// The channel is back after a `Reconnecting` episode.
    Reconnected,
    /// The channel is gone for good.
    Closed { reason: Option<String> },
}

/// Close handle for an open session. Dropping it also closes the session.
#[derive(Debug)]
pub struct SessionCloser {
    tx: oneshot::Sender<()>,
}

impl SessionCloser {
    pub fn close(self) {
        let _ = self.tx.send(());
    }
}

/// An open channel: its signal stream plus the handle that shuts it down.
#[derive(Debug)]
pub struct TransportSession {
    pub signals: mpsc::Receiver<TransportSignal>,
    pub closer: SessionCloser,
}

impl TransportSession {
    /// Create a session and return the transport-side ends.
    ///
    /// The transport keeps the `mpsc::Sender` to publish signals and awaits
    /// the `oneshot::Receiver` to learn that the consumer closed the session
    /// (it resolves with `Err` when the closer is dropped).
    pub fn channel(
        capacity: usize,
    ) -> (
        Self,
        mpsc::Sender<TransportSignal>,
        oneshot::Receiver<()>,
    ) {
        let (signal_tx, signal_rx) = mpsc::channel(capacity);
        let (close_tx, close_rx) = oneshot::channel();
        (
            Self {
                signals: signal_rx,
                closer: SessionCloser { tx: close_tx },
            },
            signal_tx,
            close_rx,
        )
    }
}

/// Opens push channels to the server.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a channel. An `Err` means the start attempt failed outright.
    async fn open(&self) -> Result<TransportSession>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_session_channel_delivers_signals() {
        let (mut session, tx, _close_rx) = TransportSession::channel(4);
        tx.send(TransportSignal::Message(PushEvent::new("Ping", json!(1))))
            .await
            .unwrap();
        tx.send(TransportSignal::Reconnected).await.unwrap();

        assert!(matches!(
            session.signals.recv().await,
            Some(TransportSignal::Message(_))
        ));
        assert_eq!(
            session.signals.recv().await,
            Some(TransportSignal::Reconnected)
        );
    }

    #[tokio::test]
    async fn test_closer_close_resolves_receiver() {
        let (session, _tx, close_rx) = TransportSession::channel(1);
        session.closer.close();
        assert!(close_rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_dropping_closer_resolves_receiver_with_err() {
        let (session, _tx, close_rx) = TransportSession::channel(1);
        drop(session);
        assert!(close_rx.await.is_err());
    }
}
