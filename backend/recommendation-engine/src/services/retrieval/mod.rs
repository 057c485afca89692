//! Retrieval Adapter
//!
//! Issues nearest-neighbor queries against the product collection and turns raw hits into
//! `ItemResult`s. Every store call goes through the configured timeout and retry policy;
//! records whose payload cannot be mapped are skipped, never fatal.
pub mod payload;

pub use payload::{resolve, FieldWarning, ItemPayload, UNCATEGORIZED};

use crate::clients::{Filter, Mmr, Point, QueryRequest, ScoredPoint, VectorStore};
use crate::error::{EngineError, Result, UpstreamError};
use crate::models::{ItemResult, StoreId};
use resilience::{call_with_config, ServiceConfig};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const SERVICE: &str = "vector_store";

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub score_threshold: Option<f32>,
    pub diversify: bool,
    pub filter: Option<Filter>,
}

impl SearchRequest {
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector,
            limit,
            score_threshold: None,
            diversify: false,
            filter: None,
        }
    }
}

/// Item record plus its stored vector, as returned by `fetch`
#[derive(Debug, Clone)]
pub struct CatalogItem {
    pub item: ItemResult,
    pub vector: Option<Vec<f32>>,
}

pub struct RetrievalAdapter {
    store: Arc<dyn VectorStore>,
    collection: String,
    vector_name: Option<String>,
    policy: ServiceConfig,
    mmr_diversity: f32,
    mmr_candidate_multiplier: usize,
}

impl RetrievalAdapter {
    pub fn new(
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        vector_name: Option<String>,
        policy: ServiceConfig,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            vector_name,
            policy,
            mmr_diversity: 0.5,
            mmr_candidate_multiplier: 3,
        }
    }

    pub fn with_mmr(mut self, diversity: f32, candidate_multiplier: usize) -> Self {
        self.mmr_diversity = diversity;
        self.mmr_candidate_multiplier = candidate_multiplier.max(1);
        self
    }

    /// Top-`limit` cosine search. In diversify mode the store reranks `limit * 3` candidates
    /// with MMR and returns its top `limit`.
    pub async fn search(&self, request: SearchRequest) -> Result<Vec<ItemResult>> {
        if request.limit == 0 {
            return Ok(Vec::new());
        }

        let mmr = request.diversify.then(|| Mmr {
            diversity: self.mmr_diversity,
            candidates_limit: request.limit.saturating_mul(self.mmr_candidate_multiplier),
        });

        let query = QueryRequest::new(request.vector, request.limit)
            .using(self.vector_name.clone())
            .filter(request.filter)
            .score_threshold(request.score_threshold)
            .mmr(mmr);

        let store = &self.store;
        let collection = self.collection.as_str();
        let hits: Vec<ScoredPoint> = call_with_config(
            &self.policy,
            || store.query(collection, query.clone()),
            UpstreamError::is_transient,
        )
        .await
        .map_err(|e| EngineError::upstream(SERVICE, e))?;

        debug!(collection, hits = hits.len(), diversify = request.diversify, "Vector search");

        Ok(hits
            .iter()
            .filter_map(|hit| map_hit(hit.id, hit.score, &hit.payload))
            .collect())
    }

    /// Retrieve items by store id. Missing ids are silently absent from the result.
    pub async fn fetch(&self, ids: &[StoreId], with_vectors: bool) -> Result<Vec<CatalogItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let store = &self.store;
        let collection = self.collection.as_str();
        let points: Vec<Point> = call_with_config(
            &self.policy,
            || store.retrieve(collection, ids, with_vectors),
            UpstreamError::is_transient,
        )
        .await
        .map_err(|e| EngineError::upstream(SERVICE, e))?;

        let vector_name = self.vector_name.as_deref();
        Ok(points
            .iter()
            .filter_map(|point| {
                let item = map_hit(point.id, 0.0, &point.payload)?;
                let vector = point.vector(vector_name).map(<[f32]>::to_vec);
                Some(CatalogItem { item, vector })
            })
            .collect())
    }

    /// Retrieve one item by store id along with its vector
    pub async fn fetch_one(&self, id: StoreId) -> Result<Option<CatalogItem>> {
        Ok(self.fetch(&[id], true).await?.into_iter().next())
    }

    /// Scroll up to `max` items matching `filter`, following cursors
    pub async fn scroll(&self, filter: Option<&Filter>, max: usize) -> Result<Vec<ItemResult>> {
        let store = &self.store;
        let collection = self.collection.as_str();
        let mut items = Vec::new();
        let mut cursor = None;

        while items.len() < max {
            let page_size = max - items.len();
            let page = call_with_config(
                &self.policy,
                || store.scroll(collection, filter, cursor, page_size),
                UpstreamError::is_transient,
            )
            .await
            .map_err(|e| EngineError::upstream(SERVICE, e))?;

            items.extend(
                page.points
                    .iter()
                    .filter_map(|point| map_hit(point.id, 0.0, &point.payload)),
            );

            match page.next_cursor {
                Some(next) if !page.points.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        items.truncate(max);
        Ok(items)
    }
}

fn map_hit(id: StoreId, score: f32, payload: &Value) -> Option<ItemResult> {
    match resolve(id, score, payload) {
        Ok((item, warnings)) => {
            for w in &warnings {
                debug!(store_id = id, field = w.field, "{}", w.message);
            }
            Some(item)
        }
        Err(e) => {
            warn!(store_id = id, error = %e, "Skipping malformed item");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{Condition, InMemoryVectorStore};
    use resilience::{RetryConfig, TimeoutConfig};
    use serde_json::json;
    use std::time::Duration;

    fn fast_policy() -> ServiceConfig {
        ServiceConfig {
            timeout: TimeoutConfig {
                duration: Duration::from_secs(1),
            },
            retry: Some(RetryConfig {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                jitter: false,
                ..Default::default()
            }),
        }
    }

    async fn adapter() -> (Arc<InMemoryVectorStore>, RetrievalAdapter) {
        let store = Arc::new(InMemoryVectorStore::new());
        let points = vec![
            Point::new(1, vec![1.0, 0.0], json!({ "id": "a", "name": "Alpha", "brand": "X", "price": 10.0 })),
            Point::new(2, vec![0.9, 0.1], json!({ "id": "b", "name": "Beta", "brand": "X", "price": 25.0 })),
            Point::new(3, vec![0.0, 1.0], json!({ "id": "c", "name": "Gamma", "brand": "Y", "price": 40.0 })),
            Point::new(4, vec![0.8, 0.2], json!(["not", "an", "object"])),
        ];
        store.upsert("products", points).await.unwrap();
        let adapter = RetrievalAdapter::new(store.clone(), "products", None, fast_policy());
        (store, adapter)
    }

    #[tokio::test]
    async fn test_search_skips_malformed_records() {
        let (_, adapter) = adapter().await;
        let items = adapter
            .search(SearchRequest::new(vec![1.0, 0.0], 4))
            .await
            .unwrap();

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(items[0].score >= items[1].score);
    }

    #[tokio::test]
    async fn test_search_with_filter() {
        let (_, adapter) = adapter().await;
        let mut request = SearchRequest::new(vec![1.0, 0.0], 10);
        request.filter = Some(Filter::default().must(Condition::range("price", Some(20.0), None)));

        let items = adapter.search(request).await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_search_retries_transient_failures() {
        let (store, adapter) = adapter().await;
        store.fail_next(2);

        let items = adapter
            .search(SearchRequest::new(vec![1.0, 0.0], 1))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(store.calls(), 4);
    }

    #[tokio::test]
    async fn test_offline_store_surfaces_upstream_unavailable() {
        let (store, adapter) = adapter().await;
        store.set_offline(true);

        let err = adapter
            .search(SearchRequest::new(vec![1.0, 0.0], 1))
            .await
            .unwrap_err();
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn test_fetch_returns_vectors() {
        let (_, adapter) = adapter().await;
        let item = adapter.fetch_one(3).await.unwrap().unwrap();
        assert_eq!(item.item.id, "c");
        assert_eq!(item.vector, Some(vec![0.0, 1.0]));
        assert!(adapter.fetch_one(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scroll_follows_cursor() {
        let (_, adapter) = adapter().await;
        let items = adapter.scroll(None, 10).await.unwrap();
        assert_eq!(items.len(), 3);

        let limited = adapter.scroll(None, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }
}
