//! The composed bot instance.
//!
//! A [`Bot`] is `{flow set, provider, session store}`. The flow set is owned
//! exclusively by this instance and superseded — not mutated — on reload;
//! provider and session store are shared with past and future instances.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::bot::provider::{IncomingMessage, MessagingProvider};
use crate::bot::session::SessionStore;
use crate::error::AppError;
use crate::flow::FlowSet;

pub struct Bot {
    flows: Arc<FlowSet>,
    provider: Arc<dyn MessagingProvider>,
    sessions: Arc<dyn SessionStore>,
}

impl Bot {
    pub fn new(
        flows: Arc<FlowSet>,
        provider: Arc<dyn MessagingProvider>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            flows,
            provider,
            sessions,
        }
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Wait for the next inbound message on the provider.
    pub async fn recv(&self) -> Option<IncomingMessage> {
        self.provider.recv().await
    }

    /// Dispatch one inbound message against the flow tree.
    ///
    /// Matching order: the children of the contact's current node first,
    /// then the top-level flows. A match with children parks the contact on
    /// that node for follow-up; a leaf match ends the conversation thread.
    pub async fn handle_incoming(&self, msg: IncomingMessage) -> Result<(), AppError> {
        let current = self.sessions.position(&msg.from).await;

        let matched = current
            .as_deref()
            .and_then(|path| self.flows.match_child(path, &msg.text))
            .or_else(|| self.flows.match_root(&msg.text));

        let Some(path) = matched else {
            debug!(from = %msg.from, "no flow matched message");
            return Ok(());
        };

        let Some(node) = self.flows.resolve(&path) else {
            // Path just matched, so this only happens on a concurrent swap.
            warn!(from = %msg.from, "matched flow vanished during dispatch");
            self.sessions.clear(&msg.from).await;
            return Ok(());
        };

        for (i, reply) in node.replies.iter().enumerate() {
            if i > 0 {
                if let Some(delay) = node.delay {
                    tokio::time::sleep(delay).await;
                }
            }
            self.provider.send(&msg.from, reply).await?;
        }

        if node.children.is_empty() {
            self.sessions.clear(&msg.from).await;
        } else {
            self.sessions.set_position(&msg.from, path).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::bot::provider::InMemoryProvider;
    use crate::bot::session::InMemorySessionStore;
    use crate::flow::builder;
    use crate::flow::record::FlowRecord;

    fn record(keywords: &[&str], answers: &[&str]) -> FlowRecord {
        FlowRecord {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            answers: answers.iter().map(|s| s.to_string()).collect(),
            media: None,
            childrens: None,
        }
    }

    fn menu_flow() -> FlowRecord {
        let mut parent = record(&["menu"], &["Elige una opción"]);
        parent.childrens = Some(BTreeMap::from([(
            "precios".to_string(),
            record(&["precios"], &["Lista de precios"]),
        )]));
        parent
    }

    fn bot_with_flows(flows: Vec<FlowRecord>) -> (Bot, crate::bot::provider::ProviderHarness) {
        let set = FlowSet::new(flows.iter().map(|r| builder::build(r).unwrap()).collect());
        let (provider, harness) = InMemoryProvider::new();
        let bot = Bot::new(
            Arc::new(set),
            Arc::new(provider),
            Arc::new(InMemorySessionStore::new()),
        );
        (bot, harness)
    }

    #[tokio::test(start_paused = true)]
    async fn replies_to_keyword_match() {
        let (bot, mut harness) = bot_with_flows(vec![record(&["hola"], &["Bienvenido"])]);

        bot.handle_incoming(IncomingMessage {
            from: "555".into(),
            text: "Hola".into(),
        })
        .await
        .unwrap();

        let (to, reply) = harness.outbox_rx.recv().await.unwrap();
        assert_eq!(to, "555");
        assert_eq!(reply.text, "Bienvenido");
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_message_sends_nothing() {
        let (bot, mut harness) = bot_with_flows(vec![record(&["hola"], &["Bienvenido"])]);

        bot.handle_incoming(IncomingMessage {
            from: "555".into(),
            text: "adios".into(),
        })
        .await
        .unwrap();

        assert!(harness.outbox_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn child_flow_matches_after_parent() {
        let (bot, mut harness) = bot_with_flows(vec![menu_flow()]);

        bot.handle_incoming(IncomingMessage {
            from: "555".into(),
            text: "menu".into(),
        })
        .await
        .unwrap();
        let (_, parent_reply) = harness.outbox_rx.recv().await.unwrap();
        assert_eq!(parent_reply.text, "Elige una opción");

        bot.handle_incoming(IncomingMessage {
            from: "555".into(),
            text: "precios".into(),
        })
        .await
        .unwrap();
        let (_, child_reply) = harness.outbox_rx.recv().await.unwrap();
        assert_eq!(child_reply.text, "Lista de precios");
    }

    #[tokio::test(start_paused = true)]
    async fn multi_reply_node_sends_all_in_order() {
        let (bot, mut harness) =
            bot_with_flows(vec![record(&["info"], &["Primera", "Segunda", "Tercera"])]);

        bot.handle_incoming(IncomingMessage {
            from: "555".into(),
            text: "info".into(),
        })
        .await
        .unwrap();

        for expected in ["Primera", "Segunda", "Tercera"] {
            let (_, reply) = harness.outbox_rx.recv().await.unwrap();
            assert_eq!(reply.text, expected);
        }
    }
}
