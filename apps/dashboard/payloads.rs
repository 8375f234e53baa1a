use metasync::{ContentAddress, Fetch, IdeaMetadata, IdeaPayload, MetaCache};
use tracing::{error, info, instrument};

/// Why an installed payload cannot be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broken {
    Loader,
    App,
}

impl Broken {
    pub fn title(self) -> &'static str {
        match self {
            Self::Loader => "Broken Loader",
            Self::App => "Broken App",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Loader => {
                "The Beacon DAO did not provide a working loader. Please try again later, or contact a DAO member."
            }
            Self::App => {
                "An app installed by the Beacon DAO is not working. Please try again later, or contact a DAO member."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadStatus {
    /// Every payload was found and is well formed.
    Ready(Vec<IdeaPayload>),
    NotFound(ContentAddress),
    Broken(ContentAddress, Broken),
}

/// Resolves every payload listed in the metadata, stopping at the first one
/// that is missing or malformed.
#[instrument(skip_all, fields(title = %metadata.title, payloads = metadata.payload.len()))]
pub async fn load_payloads(cache: &MetaCache, metadata: &IdeaMetadata) -> PayloadStatus {
    let mut payloads = Vec::with_capacity(metadata.payload.len());

    for address in &metadata.payload {
        let document = match cache.fetch(address).await {
            Fetch::Found(document) => document,
            Fetch::NotFound | Fetch::Failed(_) => {
                error!(address = %address, "Failed to load payload");
                return PayloadStatus::NotFound(address.clone());
            }
        };

        let payload = match serde_json::from_value::<IdeaPayload>((*document).clone()) {
            Ok(payload) if !payload.loader.trim().is_empty() => payload,
            _ => {
                error!(address = %address, "Invalid payload loader");
                return PayloadStatus::Broken(address.clone(), Broken::Loader);
            }
        };

        if payload.module.is_empty() {
            error!(address = %address, "Payload module is empty");
            return PayloadStatus::Broken(address.clone(), Broken::App);
        }

        info!(address = %address, module_bytes = payload.module.len(), "Payload ready");
        payloads.push(payload);
    }

    PayloadStatus::Ready(payloads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use metasync::{ContentStore, MetaCacheConfig, memory::MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    async fn setup(documents: &[serde_json::Value]) -> (MetaCache, Vec<ContentAddress>) {
        let store = Arc::new(MemoryStore::new());
        let mut addresses = Vec::new();
        for document in documents {
            addresses.push(store.put(document).await.unwrap());
        }
        let cache = MetaCache::new(store, &MetaCacheConfig::default()).unwrap();
        (cache, addresses)
    }

    fn metadata(payload: Vec<ContentAddress>) -> IdeaMetadata {
        IdeaMetadata {
            title: "Beacon".to_string(),
            description: String::new(),
            payload,
        }
    }

    #[tokio::test]
    async fn test_all_payloads_ready() {
        let (cache, addresses) = setup(&[
            json!({"loader": "export default init", "module": [0, 97, 115, 109]}),
            json!({"loader": "export default init", "module": [1]}),
        ])
        .await;

        let status = load_payloads(&cache, &metadata(addresses)).await;

        let PayloadStatus::Ready(payloads) = status else {
            panic!("expected ready payloads, got {status:?}");
        };
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].module, vec![0, 97, 115, 109]);
    }

    #[tokio::test]
    async fn test_missing_payload_stops_loading() {
        let (cache, mut addresses) =
            setup(&[json!({"loader": "export default init", "module": [1]})]).await;
        let missing = ContentAddress::parse("bafymissing").unwrap();
        addresses.insert(0, missing.clone());

        assert_eq!(
            load_payloads(&cache, &metadata(addresses)).await,
            PayloadStatus::NotFound(missing)
        );
    }

    #[tokio::test]
    async fn test_broken_loader_and_app() {
        let (cache, addresses) = setup(&[
            json!({"module": [1]}),
            json!({"loader": 42, "module": [1]}),
            json!({"loader": "export default init"}),
        ])
        .await;

        assert_eq!(
            load_payloads(&cache, &metadata(vec![addresses[0].clone()])).await,
            PayloadStatus::Broken(addresses[0].clone(), Broken::Loader)
        );
        assert_eq!(
            load_payloads(&cache, &metadata(vec![addresses[1].clone()])).await,
            PayloadStatus::Broken(addresses[1].clone(), Broken::Loader)
        );
        assert_eq!(
            load_payloads(&cache, &metadata(vec![addresses[2].clone()])).await,
            PayloadStatus::Broken(addresses[2].clone(), Broken::App)
        );
        assert_eq!(Broken::App.title(), "Broken App");
    }

    #[tokio::test]
    async fn test_empty_metadata_is_ready() {
        let (cache, _) = setup(&[]).await;

        assert_eq!(
            load_payloads(&cache, &IdeaMetadata::default()).await,
            PayloadStatus::Ready(Vec::new())
        );
    }
}
