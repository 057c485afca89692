use super::vector_store::{Filter, Mmr, Point, QueryRequest, ScoredPoint, ScrollPage, VectorStore};
use crate::error::UpstreamError;
use crate::models::StoreId;
use crate::utils::cosine_similarity;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::debug;

/// Exact-search vector store kept in process memory.
///
/// Collections are created on first upsert. Scroll order is ascending point id. The failure
/// switches let tests exercise retry and degraded paths.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, BTreeMap<StoreId, Point>>>,
    offline: AtomicBool,
    fail_next: AtomicU32,
    calls: AtomicU32,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `Unavailable` while set
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// The next `n` calls fail with `Unavailable`
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Calls received so far, failed ones included
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    fn gate(&self) -> Result<(), UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(UpstreamError::Unavailable("vector store offline".into()));
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(UpstreamError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), UpstreamError> {
        self.gate()?;
        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_string()).or_default();
        for point in points {
            target.insert(point.id, point);
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        request: QueryRequest,
    ) -> Result<Vec<ScoredPoint>, UpstreamError> {
        self.gate()?;
        let collections = self.collections.read();
        let points = collections
            .get(collection)
            .ok_or_else(|| UpstreamError::NotFound(format!("collection {}", collection)))?;

        let using = request.using.as_deref();
        let mut scored: Vec<(&Point, &[f32], f32)> = points
            .values()
            .filter(|p| {
                request
                    .filter
                    .as_ref()
                    .map_or(true, |f| f.check(p.id, &p.payload))
            })
            .filter_map(|p| {
                let v = p.vector(using)?;
                if v.len() != request.vector.len() {
                    return None;
                }
                Some((p, v, cosine_similarity(&request.vector, v)))
            })
            .filter(|(_, _, score)| request.score_threshold.map_or(true, |t| *score >= t))
            .collect();

        scored.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(CmpOrdering::Equal)
                .then(a.0.id.cmp(&b.0.id))
        });

        let selected = match request.mmr {
            Some(mmr) => {
                scored.truncate(mmr.candidates_limit.max(request.limit));
                mmr_select(scored, mmr, request.limit)
            }
            None => {
                scored.truncate(request.limit);
                scored
            }
        };

        debug!(collection, hits = selected.len(), "In-memory query");

        Ok(selected
            .into_iter()
            .map(|(p, _, score)| ScoredPoint {
                id: p.id,
                score,
                payload: p.payload.clone(),
            })
            .collect())
    }

    async fn retrieve(
        &self,
        collection: &str,
        ids: &[StoreId],
        with_vectors: bool,
    ) -> Result<Vec<Point>, UpstreamError> {
        self.gate()?;
        let collections = self.collections.read();
        let Some(points) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .iter()
            .filter_map(|id| points.get(id))
            .map(|p| {
                let mut point = p.clone();
                if !with_vectors {
                    point.vectors.clear();
                }
                point
            })
            .collect())
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        cursor: Option<StoreId>,
        limit: usize,
    ) -> Result<ScrollPage, UpstreamError> {
        self.gate()?;
        let collections = self.collections.read();
        let Some(points) = collections.get(collection) else {
            return Ok(ScrollPage::default());
        };

        let mut matching = points
            .range(cursor.unwrap_or(StoreId::MIN)..)
            .map(|(_, p)| p)
            .filter(|p| filter.map_or(true, |f| f.check(p.id, &p.payload)));

        let page: Vec<Point> = matching.by_ref().take(limit).cloned().collect();
        let next_cursor = matching.next().map(|p| p.id);

        Ok(ScrollPage {
            points: page,
            next_cursor,
        })
    }
}

/// Greedy maximal marginal relevance over candidates already sorted by relevance
fn mmr_select<'a>(
    mut candidates: Vec<(&'a Point, &'a [f32], f32)>,
    mmr: Mmr,
    limit: usize,
) -> Vec<(&'a Point, &'a [f32], f32)> {
    let lambda = 1.0 - mmr.diversity.clamp(0.0, 1.0);
    let mut selected: Vec<(&'a Point, &'a [f32], f32)> =
        Vec::with_capacity(limit.min(candidates.len()));

    while selected.len() < limit && !candidates.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f32::MIN;

        for (idx, (_, vector, sim_q)) in candidates.iter().enumerate() {
            let max_sim_selected = selected
                .iter()
                .map(|(_, chosen, _)| cosine_similarity(vector, chosen))
                .fold(0.0_f32, f32::max);
            let score = lambda * sim_q - (1.0 - lambda) * max_sim_selected;
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }

        selected.push(candidates.remove(best_idx));
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::vector_store::Condition;
    use serde_json::json;

    async fn seeded_store() -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        store
            .upsert(
                "products",
                vec![
                    Point::new(1, vec![1.0, 0.0], json!({ "id": "a", "price": 10.0 })),
                    Point::new(2, vec![0.99, 0.14], json!({ "id": "b", "price": 20.0 })),
                    Point::new(3, vec![0.0, 1.0], json!({ "id": "c", "price": 30.0 })),
                    Point::new(4, vec![0.7, 0.7], json!({ "id": "d", "price": 40.0 })),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_query_orders_by_cosine() {
        let store = seeded_store().await;
        let hits = store
            .query("products", QueryRequest::new(vec![1.0, 0.0], 2))
            .await
            .unwrap();

        let ids: Vec<_> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_query_filter_and_threshold() {
        let store = seeded_store().await;
        let request = QueryRequest::new(vec![1.0, 0.0], 10)
            .filter(Some(
                Filter::default().must(Condition::range("price", Some(15.0), None)),
            ))
            .score_threshold(Some(0.5));

        let hits = store.query("products", request).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[tokio::test]
    async fn test_mmr_prefers_diverse_second_pick() {
        let store = seeded_store().await;
        let request = QueryRequest::new(vec![1.0, 0.0], 2).mmr(Some(Mmr {
            diversity: 0.8,
            candidates_limit: 4,
        }));

        let hits = store.query("products", request).await.unwrap();
        assert_eq!(hits[0].id, 1);
        // Near-duplicate 2 loses to a point pointing elsewhere
        assert_ne!(hits[1].id, 2);
    }

    #[tokio::test]
    async fn test_scroll_pages_through_collection() {
        let store = seeded_store().await;
        let first = store.scroll("products", None, None, 3).await.unwrap();
        assert_eq!(first.points.len(), 3);
        assert_eq!(first.next_cursor, Some(4));

        let second = store
            .scroll("products", None, first.next_cursor, 3)
            .await
            .unwrap();
        assert_eq!(second.points.len(), 1);
        assert_eq!(second.next_cursor, None);
    }

    #[tokio::test]
    async fn test_retrieve_without_vectors() {
        let store = seeded_store().await;
        let points = store.retrieve("products", &[3, 99, 1], false).await.unwrap();
        let ids: Vec<_> = points.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert!(points.iter().all(|p| p.vectors.is_empty()));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = seeded_store().await;
        store.fail_next(1);
        assert!(store.retrieve("products", &[1], false).await.is_err());
        assert!(store.retrieve("products", &[1], false).await.is_ok());

        store.set_offline(true);
        let err = store.scroll("products", None, None, 1).await.unwrap_err();
        assert!(err.is_transient());
    }
}
