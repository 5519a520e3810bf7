//! Live-reload watcher — polls the flow collection and signals the reload
//! worker when its contents change.
//!
//! The REST surface of the store has no push notifications, so change
//! detection is a fixed-interval poll comparing a SHA-256 digest of the raw
//! document payloads. Every detected change triggers a full re-fetch and
//! recompose downstream — there is no diffing of what changed.
//!
//! Signals go through a capacity-1 channel with `try_send`: if a reload is
//! already pending, further signals are coalesced into it.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};
use crate::store::{FlowDocument, FlowSource};

/// "The collection changed" — carries no payload; the reload path re-fetches
/// everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSignal;

pub struct FlowWatcher {
    id: String,
    source: Arc<dyn FlowSource>,
    poll_interval: Duration,
    reload_tx: mpsc::Sender<ReloadSignal>,
}

impl FlowWatcher {
    pub fn new(
        source: Arc<dyn FlowSource>,
        poll_interval: Duration,
        reload_tx: mpsc::Sender<ReloadSignal>,
    ) -> Self {
        Self {
            id: "flow-watcher".to_string(),
            source,
            poll_interval,
            reload_tx,
        }
    }
}

impl Component for FlowWatcher {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_watcher(
            self.source,
            self.poll_interval,
            self.reload_tx,
            shutdown,
        ))
    }
}

async fn run_watcher(
    source: Arc<dyn FlowSource>,
    poll_interval: Duration,
    reload_tx: mpsc::Sender<ReloadSignal>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(interval_ms = poll_interval.as_millis() as u64, "flow watcher started");

    let mut last_digest: Option<[u8; 32]> = None;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("flow watcher shutting down");
                return Ok(());
            }

            _ = tokio::time::sleep(poll_interval) => {}
        }

        let documents = match source.fetch().await {
            Ok(docs) => docs,
            Err(e) => {
                warn!("flow watcher poll failed: {e}");
                continue;
            }
        };

        let digest = digest_documents(&documents);

        match last_digest {
            // First successful poll just establishes the baseline — the
            // bootstrap load already ran at startup.
            None => last_digest = Some(digest),
            Some(previous) if previous != digest => {
                info!("flow collection changed, requesting reload");
                last_digest = Some(digest);
                if reload_tx.try_send(ReloadSignal).is_err() {
                    debug!("reload already pending, coalescing");
                }
            }
            Some(_) => {}
        }
    }
}

/// Order-independent digest of the collection contents.
///
/// Documents are hashed sorted by id, so a store that iterates in a
/// different order does not register as a change.
fn digest_documents(documents: &[FlowDocument]) -> [u8; 32] {
    let mut ids: Vec<usize> = (0..documents.len()).collect();
    ids.sort_by(|&a, &b| documents[a].id.cmp(&documents[b].id));

    let mut hasher = Sha256::new();
    for &i in &ids {
        let doc = &documents[i];
        hasher.update(doc.id.as_bytes());
        hasher.update([0u8]);
        // Records serialize deterministically: childrens is a BTreeMap.
        if let Ok(bytes) = serde_json::to_vec(&CanonicalRecord(&doc.record)) {
            hasher.update(&bytes);
        }
        hasher.update([0xff]);
    }
    hasher.finalize().into()
}

/// Serialization shim: `FlowRecord` only derives `Deserialize`, the digest
/// needs a stable byte form.
struct CanonicalRecord<'a>(&'a crate::flow::FlowRecord);

impl serde::Serialize for CanonicalRecord<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let record = self.0;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("keywords", &record.keywords)?;
        map.serialize_entry("answers", &record.answers)?;
        map.serialize_entry("media", &record.media)?;
        if let Some(children) = &record.childrens {
            let wrapped: std::collections::BTreeMap<&String, CanonicalRecord<'_>> = children
                .iter()
                .map(|(k, v)| (k, CanonicalRecord(v)))
                .collect();
            map.serialize_entry("childrens", &wrapped)?;
        }
        map.end()
    }
}
