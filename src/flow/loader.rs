//! Flow loader — turns the flow collection into the runtime flow set.
//!
//! Read failures degrade to an empty set: the bot keeps serving its current
//! flows (or stays unbootstrapped) rather than crashing on a store outage.
//! Individual documents that fail validation are skipped so one bad edit
//! cannot take down every other flow.

use tracing::{error, warn};

use crate::flow::builder::{self, FlowNode};
use crate::store::FlowSource;

/// Load and build every flow in the collection.
///
/// Returns the flows in store-iteration order. Never fails: a source error
/// yields an empty vector (logged at error level), an invalid document is
/// skipped (logged at warn level).
pub async fn load_flows(source: &dyn FlowSource) -> Vec<FlowNode> {
    let documents = match source.fetch().await {
        Ok(docs) => docs,
        Err(e) => {
            error!("flow collection read failed, continuing with no flows: {e}");
            return Vec::new();
        }
    };

    let mut flows = Vec::with_capacity(documents.len());
    for doc in &documents {
        match builder::build(&doc.record) {
            Ok(node) => flows.push(node),
            Err(e) => {
                warn!(document = %doc.id, "skipping invalid flow document: {e}");
            }
        }
    }
    flows
}
