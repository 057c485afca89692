//! Query Vector Builder
//!
//! Folds a heterogeneous seed (explicit items, cart, wishlist, free text) into one unit-length
//! query vector by weighted averaging.
use crate::clients::EmbeddingService;
use crate::config::SeedWeights;
use crate::error::{EngineError, Result, UpstreamError};
use crate::utils::{normalize, weighted_mean};
use resilience::{call_with_config, ServiceConfig};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// One contribution to the query vector
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedVector {
    pub vector: Vec<f32>,
    pub weight: f32,
}

impl WeightedVector {
    pub fn new(vector: Vec<f32>, weight: f32) -> Self {
        Self { vector, weight }
    }
}

/// Output of [`QueryVectorBuilder::build`]
#[derive(Debug, Clone, PartialEq)]
pub struct QueryVector {
    pub vector: Vec<f32>,
    /// Query text was given but could not be embedded, so only seed items contributed
    pub text_dropped: bool,
}

/// Where a seed item came from; decides its weight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedContext {
    Explicit,
    Wishlist,
    Cart,
}

/// Items and context a search is seeded with
#[derive(Debug, Clone, Default)]
pub struct Seed {
    pub item_ids: Vec<String>,
    pub cart_ids: Vec<String>,
    pub wishlist_ids: Vec<String>,
}

impl Seed {
    pub fn items<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            item_ids: ids.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_cart<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cart_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_wishlist<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wishlist_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty() && self.cart_ids.is_empty() && self.wishlist_ids.is_empty()
    }

    /// Distinct seed ids in first-seen order (explicit, then cart, then wishlist), each with its
    /// strongest context. Cart outranks wishlist, which outranks a plain mention.
    pub fn contexts(&self) -> Vec<(String, SeedContext)> {
        let cart: HashSet<&str> = self.cart_ids.iter().map(String::as_str).collect();
        let wishlist: HashSet<&str> = self.wishlist_ids.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();

        self.item_ids
            .iter()
            .chain(&self.cart_ids)
            .chain(&self.wishlist_ids)
            .filter(|id| seen.insert(id.as_str()))
            .map(|id| {
                let context = if cart.contains(id.as_str()) {
                    SeedContext::Cart
                } else if wishlist.contains(id.as_str()) {
                    SeedContext::Wishlist
                } else {
                    SeedContext::Explicit
                };
                (id.clone(), context)
            })
            .collect()
    }
}

pub struct QueryVectorBuilder {
    embedder: Arc<dyn EmbeddingService>,
    weights: SeedWeights,
    policy: ServiceConfig,
}

impl QueryVectorBuilder {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        weights: SeedWeights,
        policy: ServiceConfig,
    ) -> Self {
        Self {
            embedder,
            weights,
            policy,
        }
    }

    pub fn weight_for(&self, context: SeedContext) -> f32 {
        match context {
            SeedContext::Explicit => self.weights.explicit,
            SeedContext::Wishlist => self.weights.wishlist,
            SeedContext::Cart => self.weights.cart,
        }
    }

    /// Weighted mean of the seed vectors plus the embedded query text, L2-normalized.
    ///
    /// Fails with `EmptySeed` when there is nothing to average. An embedding failure for the
    /// query text is tolerated when seed vectors exist.
    pub async fn build(
        &self,
        mut seeds: Vec<WeightedVector>,
        query_text: Option<&str>,
    ) -> Result<QueryVector> {
        let mut text_dropped = false;
        if let Some(text) = query_text.map(str::trim).filter(|t| !t.is_empty()) {
            match self.embed_text(text).await {
                Ok(vector) => seeds.push(WeightedVector::new(vector, self.weights.query_text)),
                Err(e) if !seeds.is_empty() => {
                    warn!(error = %e, "Query text embedding failed, using seed items only");
                    text_dropped = true;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(QueryVector {
            vector: combine(&seeds)?,
            text_dropped,
        })
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = &self.embedder;
        call_with_config(
            &self.policy,
            || embedder.embed(text),
            UpstreamError::is_transient,
        )
        .await
        .map_err(|e| EngineError::upstream("embedding_service", e))
    }
}

/// Weighted mean of `seeds`, normalized to unit length.
///
/// Non-finite or non-positive weights are dropped. Every vector must share the first one's
/// dimension.
pub fn combine(seeds: &[WeightedVector]) -> Result<Vec<f32>> {
    let usable: Vec<(&[f32], f32)> = seeds
        .iter()
        .filter(|s| {
            let keep = s.weight.is_finite() && s.weight > 0.0 && !s.vector.is_empty();
            if !keep {
                debug!(weight = s.weight, "Ignoring seed contribution");
            }
            keep
        })
        .map(|s| (s.vector.as_slice(), s.weight))
        .collect();

    let Some((first, _)) = usable.first() else {
        return Err(EngineError::EmptySeed);
    };
    let expected = first.len();
    if let Some((bad, _)) = usable.iter().find(|(v, _)| v.len() != expected) {
        return Err(EngineError::DimensionMismatch {
            expected,
            actual: bad.len(),
        });
    }

    let mean = weighted_mean(&usable).ok_or(EngineError::EmptySeed)?;
    normalize(&mean).ok_or_else(|| {
        EngineError::InvalidVector("seed vectors cancel out to a zero vector".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::embedding::MockEmbeddingService;
    use crate::utils::norm;
    use resilience::{RetryConfig, TimeoutConfig};
    use std::time::Duration;

    fn policy() -> ServiceConfig {
        ServiceConfig {
            timeout: TimeoutConfig {
                duration: Duration::from_secs(1),
            },
            retry: Some(RetryConfig {
                max_retries: 1,
                initial_backoff: Duration::from_millis(1),
                jitter: false,
                ..Default::default()
            }),
        }
    }

    fn builder(mock: MockEmbeddingService) -> QueryVectorBuilder {
        QueryVectorBuilder::new(Arc::new(mock), SeedWeights::default(), policy())
    }

    #[test]
    fn test_combine_is_unit_norm_for_many_weight_sets() {
        let vectors = [
            vec![1.0, 0.0, 0.0],
            vec![0.3, 0.4, 0.5],
            vec![-0.2, 0.9, 0.1],
        ];
        for weights in [[1.0, 1.0, 1.0], [2.0, 1.5, 1.0], [0.01, 5.0, 0.3], [1.0, 0.0, 7.5]] {
            let seeds: Vec<_> = vectors
                .iter()
                .zip(weights)
                .map(|(v, w)| WeightedVector::new(v.clone(), w))
                .collect();
            let out = combine(&seeds).unwrap();
            assert!((norm(&out) - 1.0).abs() < 1e-6, "weights {:?}", weights);
        }
    }

    #[test]
    fn test_combine_weights_pull_toward_heavier_seed() {
        let seeds = vec![
            WeightedVector::new(vec![1.0, 0.0], 2.0),
            WeightedVector::new(vec![0.0, 1.0], 1.0),
        ];
        let out = combine(&seeds).unwrap();
        assert!(out[0] > out[1]);
        assert!((out[0] / out[1] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_combine_errors() {
        assert!(matches!(combine(&[]), Err(EngineError::EmptySeed)));
        assert!(matches!(
            combine(&[WeightedVector::new(vec![1.0], 0.0)]),
            Err(EngineError::EmptySeed)
        ));
        assert!(matches!(
            combine(&[
                WeightedVector::new(vec![1.0, 0.0], 1.0),
                WeightedVector::new(vec![1.0], 1.0)
            ]),
            Err(EngineError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            combine(&[
                WeightedVector::new(vec![1.0, 0.0], 1.0),
                WeightedVector::new(vec![-1.0, 0.0], 1.0)
            ]),
            Err(EngineError::InvalidVector(_))
        ));
    }

    #[test]
    fn test_seed_contexts_prefer_cart() {
        let seed = Seed::items(["a", "b"])
            .with_cart(["b", "c"])
            .with_wishlist(["a", "d"]);

        assert_eq!(
            seed.contexts(),
            vec![
                ("a".to_string(), SeedContext::Wishlist),
                ("b".to_string(), SeedContext::Cart),
                ("c".to_string(), SeedContext::Cart),
                ("d".to_string(), SeedContext::Wishlist),
            ]
        );
    }

    #[tokio::test]
    async fn test_build_adds_query_text_with_its_weight() {
        let mut mock = MockEmbeddingService::new();
        mock.expect_embed()
            .withf(|text| text.to_string() == "red dress")
            .times(1)
            .returning(|_| Ok(vec![0.0, 1.0]));

        let out = builder(mock)
            .build(vec![WeightedVector::new(vec![1.0, 0.0], 1.5)], Some(" red dress "))
            .await
            .unwrap();

        // Equal weights (1.5 each) give the bisector
        assert!(!out.text_dropped);
        assert!((out.vector[0] - out.vector[1]).abs() < 1e-6);
        assert!((norm(&out.vector) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_build_without_inputs_is_empty_seed() {
        let mut mock = MockEmbeddingService::new();
        mock.expect_embed().never();

        let result = builder(mock).build(vec![], Some("   ")).await;
        assert!(matches!(result, Err(EngineError::EmptySeed)));
    }

    #[tokio::test]
    async fn test_text_only_embedding_failure_propagates() {
        let mut mock = MockEmbeddingService::new();
        mock.expect_embed()
            .times(2)
            .returning(|_| Err(UpstreamError::Unavailable("model server down".into())));

        let result = builder(mock).build(vec![], Some("sofa")).await;
        assert!(matches!(result, Err(EngineError::UpstreamUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_embedding_failure_tolerated_with_seeds() {
        let mut mock = MockEmbeddingService::new();
        mock.expect_embed()
            .returning(|_| Err(UpstreamError::InvalidRequest("too long".into())));

        let out = builder(mock)
            .build(vec![WeightedVector::new(vec![3.0, 4.0], 1.0)], Some("sofa"))
            .await
            .unwrap();
        assert!(out.text_dropped);
        assert!((out.vector[0] - 0.6).abs() < 1e-6);
    }
}
