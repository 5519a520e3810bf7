//! Firestore REST client — reads the flow collection.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::store::auth::TokenProvider;
use crate::store::{FlowDocument, FlowSource, ServiceAccount, StoreError, value};

const API_BASE: &str = "https://firestore.googleapis.com/v1";
const PAGE_SIZE: u32 = 300;

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct RawDocument {
    /// Full resource name: `projects/{p}/databases/(default)/documents/{coll}/{id}`.
    name: String,
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
}

/// Read-only client for one document collection.
pub struct FirestoreClient {
    http: reqwest::Client,
    auth: TokenProvider,
    project_id: String,
    collection: String,
}

impl FirestoreClient {
    pub fn new(account: ServiceAccount, collection: impl Into<String>) -> Self {
        let http = reqwest::Client::new();
        let project_id = account.project_id.clone();
        Self {
            auth: TokenProvider::new(http.clone(), account),
            http,
            project_id,
            collection: collection.into(),
        }
    }

    fn collection_url(&self) -> String {
        format!(
            "{API_BASE}/projects/{}/databases/(default)/documents/{}",
            self.project_id, self.collection
        )
    }

    async fn list_page(&self, page_token: Option<&str>) -> Result<ListResponse, StoreError> {
        let bearer = self.auth.bearer().await?;

        let mut request = self
            .http
            .get(self.collection_url())
            .bearer_auth(bearer)
            .query(&[("pageSize", PAGE_SIZE.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ListResponse>()
            .await
            .map_err(|e| StoreError::Decode(format!("unparseable list response: {e}")))
    }
}

#[async_trait]
impl FlowSource for FirestoreClient {
    async fn fetch(&self) -> Result<Vec<FlowDocument>, StoreError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(page_token.as_deref()).await?;

            for raw in &page.documents {
                let id = document_id(&raw.name);
                let plain = value::decode_fields(&raw.fields)?;
                match serde_json::from_value(plain) {
                    Ok(record) => documents.push(FlowDocument {
                        id: id.to_string(),
                        record,
                    }),
                    Err(e) => {
                        // One unreadable document must not hide the rest.
                        warn!(document = %id, "skipping undeserializable flow document: {e}");
                    }
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(count = documents.len(), collection = %self.collection, "fetched flow documents");
        Ok(documents)
    }
}

/// Last path segment of a document resource name.
fn document_id(resource_name: &str) -> &str {
    resource_name
        .rsplit('/')
        .next()
        .unwrap_or(resource_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_takes_last_segment() {
        let name = "projects/bot-astro/databases/(default)/documents/flows/saludo";
        assert_eq!(document_id(name), "saludo");
    }

    #[test]
    fn document_id_tolerates_bare_names() {
        assert_eq!(document_id("saludo"), "saludo");
    }

    #[test]
    fn collection_url_shape() {
        let client = FirestoreClient::new(
            ServiceAccount {
                project_id: "bot-astro".into(),
                client_email: "svc@bot-astro.iam.gserviceaccount.com".into(),
                private_key: "pem".into(),
                token_uri: "https://oauth2.googleapis.com/token".into(),
            },
            "flows",
        );
        assert_eq!(
            client.collection_url(),
            "https://firestore.googleapis.com/v1/projects/bot-astro/databases/(default)/documents/flows"
        );
    }

    #[test]
    fn list_response_parses_empty_collection() {
        let parsed: ListResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.documents.is_empty());
        assert!(parsed.next_page_token.is_none());
    }
}
