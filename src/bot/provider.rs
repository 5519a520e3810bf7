//! Messaging provider seam.
//!
//! The provider owns the transport session (pairing state, auth material)
//! and therefore must be created once and survive flow reloads — discarding
//! it would force the operator to re-pair the device.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::error::AppError;
use crate::flow::Reply;

/// An inbound message from a contact.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub from: String,
    pub text: String,
}

/// Transport adapter for the messaging session.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Stable identifier used in log messages.
    fn id(&self) -> &str;

    /// Current pairing code to display on the portal, if the session still
    /// needs pairing.
    fn pairing_code(&self) -> Option<String>;

    /// Wait for the next inbound message. `None` means the transport closed.
    async fn recv(&self) -> Option<IncomingMessage>;

    /// Send one reply to a contact.
    async fn send(&self, to: &str, reply: &Reply) -> Result<(), AppError>;
}

// ── in-memory provider ────────────────────────────────────────────────────────

/// In-memory provider: a channel-backed transport used in tests and as the
/// default stand-in while no real transport is wired up.
pub struct InMemoryProvider {
    incoming: Mutex<mpsc::Receiver<IncomingMessage>>,
    outbox: mpsc::Sender<(String, Reply)>,
    pairing_code: StdMutex<Option<String>>,
}

/// Test-side handles for an [`InMemoryProvider`]: inject inbound messages,
/// observe outbound replies.
pub struct ProviderHarness {
    pub incoming_tx: mpsc::Sender<IncomingMessage>,
    pub outbox_rx: mpsc::Receiver<(String, Reply)>,
}

impl InMemoryProvider {
    pub fn new() -> (Self, ProviderHarness) {
        let (incoming_tx, incoming_rx) = mpsc::channel(32);
        let (outbox_tx, outbox_rx) = mpsc::channel(32);
        (
            Self {
                incoming: Mutex::new(incoming_rx),
                outbox: outbox_tx,
                pairing_code: StdMutex::new(Some("ASTRO-0000".to_string())),
            },
            ProviderHarness {
                incoming_tx,
                outbox_rx,
            },
        )
    }

    /// Mark the session as paired; the portal stops showing a code.
    pub fn mark_paired(&self) {
        *self.pairing_code.lock().expect("pairing lock poisoned") = None;
    }
}

#[async_trait]
impl MessagingProvider for InMemoryProvider {
    fn id(&self) -> &str {
        "in-memory"
    }

    fn pairing_code(&self) -> Option<String> {
        self.pairing_code.lock().expect("pairing lock poisoned").clone()
    }

    async fn recv(&self) -> Option<IncomingMessage> {
        self.incoming.lock().await.recv().await
    }

    async fn send(&self, to: &str, reply: &Reply) -> Result<(), AppError> {
        self.outbox
            .send((to.to_string(), reply.clone()))
            .await
            .map_err(|_| AppError::Bot("provider outbox closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_provider_round_trip() {
        let (provider, mut harness) = InMemoryProvider::new();

        harness
            .incoming_tx
            .send(IncomingMessage {
                from: "555".into(),
                text: "hola".into(),
            })
            .await
            .unwrap();

        let msg = provider.recv().await.unwrap();
        assert_eq!(msg.text, "hola");

        provider
            .send(
                "555",
                &Reply {
                    text: "Bienvenido".into(),
                    media: None,
                },
            )
            .await
            .unwrap();

        let (to, reply) = harness.outbox_rx.recv().await.unwrap();
        assert_eq!(to, "555");
        assert_eq!(reply.text, "Bienvenido");
    }

    #[test]
    fn pairing_code_clears_after_pairing() {
        let (provider, _harness) = InMemoryProvider::new();
        assert!(provider.pairing_code().is_some());
        provider.mark_paired();
        assert!(provider.pairing_code().is_none());
    }
}
