//! Document-store access: service-account credentials, OAuth token exchange,
//! and the Firestore REST client behind the [`FlowSource`] seam.

pub mod auth;
pub mod credentials;
pub mod firestore;
pub mod value;

pub use credentials::ServiceAccount;
pub use firestore::FirestoreClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::flow::record::FlowRecord;

/// Errors from the document store and its auth plumbing.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store config error: {0}")]
    Config(String),

    #[error("token exchange failed: {0}")]
    Auth(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),
}

/// One top-level document from the flow collection.
#[derive(Debug, Clone)]
pub struct FlowDocument {
    /// Document id (last path segment of the resource name).
    pub id: String,
    pub record: FlowRecord,
}

/// Read seam over the flow collection.
///
/// The loader and the live-reload watcher only see this trait, so both are
/// testable without a network.
#[async_trait]
pub trait FlowSource: Send + Sync {
    /// Fetch every document in the flow collection.
    ///
    /// Returns documents in store-iteration order; the order is not
    /// guaranteed to be stable between calls.
    async fn fetch(&self) -> Result<Vec<FlowDocument>, StoreError>;
}
