use crate::{
    address::ContentAddress,
    store::{ContentStore, StoreError},
};
use async_trait::async_trait;
use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`ContentStore`] backed by the HTTP RPC API of an IPFS (Kubo) node.
///
/// Documents are written as DAG-CBOR and read back as DAG-JSON.
#[derive(Debug, Clone)]
pub struct IpfsHttpStore {
    client: Client,
    api_url: String,
}

#[derive(Deserialize)]
struct DagPutResponse {
    #[serde(rename = "Cid")]
    cid: ContentAddress,
}

impl IpfsHttpStore {
    pub fn new(api_url: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/{}", self.api_url, command)
    }
}

// Kubo reports missing blocks as a 500 with an error message body. A 404
// means the API route itself is wrong.
fn is_not_found(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::INTERNAL_SERVER_ERROR {
        return false;
    }
    let body = body.to_ascii_lowercase();
    body.contains("not found") || body.contains("could not find")
}

#[async_trait]
impl ContentStore for IpfsHttpStore {
    #[instrument(skip(self), fields(address = %address))]
    async fn get(&self, address: &ContentAddress) -> Result<Option<Value>, StoreError> {
        let response = self
            .client
            .post(self.endpoint("dag/get"))
            .query(&[("arg", address.as_str()), ("output-codec", "dag-json")])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            return serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Malformed(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        if is_not_found(status, &body) {
            debug!("Document not found in IPFS");
            return Ok(None);
        }

        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }

    #[instrument(skip_all)]
    async fn put(&self, document: &Value) -> Result<ContentAddress, StoreError> {
        let bytes = serde_json::to_vec(document)?;
        let part = Part::bytes(bytes)
            .file_name("document.json")
            .mime_str("application/json")?;

        let response = self
            .client
            .post(self.endpoint("dag/put"))
            .query(&[
                ("store-codec", "dag-cbor"),
                ("input-codec", "dag-json"),
                ("pin", "true"),
            ])
            .multipart(Form::new().part("file", part))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let put: DagPutResponse =
            serde_json::from_str(&body).map_err(|e| StoreError::Malformed(e.to_string()))?;
        debug!(address = %put.cid, "Stored document in IPFS");
        Ok(put.cid)
    }
}
