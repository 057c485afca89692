use super::{Candidate, RecallContext, RecallStrategy};
use crate::error::Result;
use crate::models::{ItemResult, RecommendationSource};
use crate::services::retrieval::RetrievalAdapter;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, warn};

/// Trending Recall Strategy
///
/// Samples from the best-rated items of a catalog scan. Needs no profile.
pub struct TrendingRecallStrategy {
    retrieval: Arc<RetrievalAdapter>,
    pool_size: usize,
    sample_size: usize,
    seed: Option<u64>,
}

impl TrendingRecallStrategy {
    pub fn new(
        retrieval: Arc<RetrievalAdapter>,
        pool_size: usize,
        sample_size: usize,
        seed: Option<u64>,
    ) -> Self {
        Self {
            retrieval,
            pool_size,
            sample_size,
            seed,
        }
    }

    /// Top `sample_size` by rating, then `limit` of them at random, best-rated first
    fn sample(&self, mut items: Vec<ItemResult>, limit: usize) -> Vec<ItemResult> {
        items.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        items.truncate(self.sample_size.max(limit));

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut picked: Vec<ItemResult> = items.choose_multiple(&mut rng, limit).cloned().collect();
        picked.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        picked
    }
}

#[async_trait]
impl RecallStrategy for TrendingRecallStrategy {
    async fn recall(&self, ctx: &RecallContext, limit: usize) -> Result<Vec<Candidate>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let pool: Vec<ItemResult> = self
            .retrieval
            .scroll(None, self.pool_size)
            .await?
            .into_iter()
            .filter(|item| ctx.constraints.admits(item))
            .collect();

        if pool.is_empty() {
            warn!(user_id = %ctx.user_id, "No trending items satisfy the constraints");
            return Ok(Vec::new());
        }

        let candidates: Vec<Candidate> = self
            .sample(pool, limit)
            .into_iter()
            .map(|mut item| {
                let score = (item.rating / 5.0).clamp(0.0, 1.0) as f32;
                item.score = score;
                Candidate::new(item, RecommendationSource::Trending, score)
            })
            .collect();

        debug!(user_id = %ctx.user_id, count = candidates.len(), "Trending recall");
        Ok(candidates)
    }

    fn source(&self) -> RecommendationSource {
        RecommendationSource::Trending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{InMemoryVectorStore, Point, VectorStore};
    use crate::models::Constraints;
    use resilience::presets::vector_store_config;
    use serde_json::json;

    async fn strategy(seed: Option<u64>, sample_size: usize) -> TrendingRecallStrategy {
        let store = Arc::new(InMemoryVectorStore::new());
        let points = (1..=30)
            .map(|i| {
                Point::new(
                    i,
                    vec![1.0, 0.0],
                    json!({
                        "id": format!("item-{}", i),
                        "rating": (i % 10) as f64 / 2.0,
                        "price": i as f64 * 10.0,
                    }),
                )
            })
            .collect();
        store.upsert("products", points).await.unwrap();
        let retrieval = RetrievalAdapter::new(store, "products", None, vector_store_config());
        TrendingRecallStrategy::new(Arc::new(retrieval), 100, sample_size, seed)
    }

    #[tokio::test]
    async fn test_seeded_sampling_is_reproducible() {
        let s = strategy(Some(7), 20).await;
        let ctx = RecallContext::new("anon", None, Constraints::default());

        let first: Vec<_> = s.recall(&ctx, 5).await.unwrap().into_iter().map(|c| c.item.id).collect();
        let second: Vec<_> = s.recall(&ctx, 5).await.unwrap().into_iter().map(|c| c.item.id).collect();
        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_sample_comes_from_top_rated_and_is_ordered() {
        let s = strategy(None, 3).await;
        let ctx = RecallContext::new("anon", None, Constraints::default());

        let candidates = s.recall(&ctx, 3).await.unwrap();
        assert_eq!(candidates.len(), 3);
        // ratings cycle 0.0..4.5, three items carry the top rating 4.5
        assert!(candidates.iter().all(|c| c.item.rating == 4.5));
        assert!(candidates.iter().all(|c| (c.score - 0.9).abs() < 1e-6));
        assert!(candidates.iter().all(|c| c.source == RecommendationSource::Trending));
    }

    #[tokio::test]
    async fn test_constraints_filter_the_pool() {
        let s = strategy(Some(1), 20).await;
        let constraints = Constraints {
            budget_max: Some(50.0),
            ..Default::default()
        };
        let ctx = RecallContext::new("anon", None, constraints);

        let candidates = s.recall(&ctx, 10).await.unwrap();
        assert_eq!(candidates.len(), 5);
        assert!(candidates.iter().all(|c| c.item.price <= 50.0));
        assert!(candidates.windows(2).all(|w| w[0].item.rating >= w[1].item.rating));
    }
}
