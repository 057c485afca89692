use crate::error::{EngineError, Result};
use crate::models::InteractionType;
use resilience::presets::{embedding_config, interaction_log_config, vector_store_config};
use resilience::ServiceConfig;
use serde::Deserialize;
use std::time::Duration;

/// Per-interaction-type weights
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionWeights {
    pub view: f32,
    pub click: f32,
    pub wishlist: f32,
    pub cart: f32,
    pub purchase: f32,
    /// Anything without a dedicated weight
    pub other: f32,
}

impl InteractionWeights {
    pub fn weight(&self, interaction_type: InteractionType) -> f32 {
        match interaction_type {
            InteractionType::View => self.view,
            InteractionType::Click => self.click,
            InteractionType::Wishlist => self.wishlist,
            InteractionType::Cart => self.cart,
            InteractionType::Purchase => self.purchase,
            InteractionType::Search => self.other,
        }
    }

    /// How far one interaction pulls the taste vector toward the item
    pub fn profile_default() -> Self {
        Self {
            view: 0.1,
            click: 0.1,
            wishlist: 0.3,
            cart: 0.5,
            purchase: 1.0,
            other: 0.1,
        }
    }

    /// How much a peer's interaction counts toward a collaborative score
    pub fn collaborative_default() -> Self {
        Self {
            view: 0.2,
            click: 0.1,
            wishlist: 0.5,
            cart: 0.7,
            purchase: 1.0,
            other: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedWeights {
    pub explicit: f32,
    pub cart: f32,
    pub wishlist: f32,
    pub query_text: f32,
}

impl Default for SeedWeights {
    fn default() -> Self {
        Self {
            explicit: 1.0,
            cart: 2.0,
            wishlist: 1.5,
            query_text: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetFactors {
    pub cold_start_min: f64,
    pub cold_start_max: f64,
    pub cold_start_confidence: f64,
    pub purchase_min_target: f64,
    pub purchase_max_target: f64,
    /// Fraction of the distance to the purchase targets covered per purchase
    pub purchase_pull: f64,
    pub purchase_confidence_step: f64,
    pub browse_min: f64,
    pub browse_max: f64,
    pub browse_confidence_step: f64,
}

impl Default for BudgetFactors {
    fn default() -> Self {
        Self {
            cold_start_min: 0.7,
            cold_start_max: 1.3,
            cold_start_confidence: 0.3,
            purchase_min_target: 0.7,
            purchase_max_target: 1.5,
            purchase_pull: 0.5,
            purchase_confidence_step: 0.2,
            browse_min: 0.5,
            browse_max: 1.5,
            browse_confidence_step: 0.05,
        }
    }
}

/// Every tuning constant of the engine in one place
#[derive(Debug, Clone, PartialEq)]
pub struct EngineWeights {
    pub seed: SeedWeights,
    pub profile: InteractionWeights,
    pub collaborative: InteractionWeights,
    pub personal_share: f32,
    pub collaborative_share: f32,
    pub budget: BudgetFactors,
    /// Personal retrieval price window as multiples of the profile budget
    pub price_window_min: f64,
    pub price_window_max: f64,
    pub mmr_diversity: f32,
    pub mmr_candidate_multiplier: usize,
}

impl Default for EngineWeights {
    fn default() -> Self {
        Self {
            seed: SeedWeights::default(),
            profile: InteractionWeights::profile_default(),
            collaborative: InteractionWeights::collaborative_default(),
            personal_share: 0.4,
            collaborative_share: 0.6,
            budget: BudgetFactors::default(),
            price_window_min: 0.5,
            price_window_max: 2.0,
            mmr_diversity: 0.5,
            mmr_candidate_multiplier: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub products_collection: String,
    pub users_collection: String,
    /// Named item vector to search, `None` for unnamed vectors
    pub item_vector: Option<String>,
    /// Embedding space tag stamped on profiles, defaults to the embedding service's model id
    pub embedding_model: Option<String>,
    pub history_capacity: usize,
    pub cold_start_threshold: u64,
    pub similar_users: usize,
    pub peer_history_window: usize,
    pub trending_pool_size: usize,
    pub trending_sample_size: usize,
    pub trending_seed: Option<u64>,
    pub max_seed_items: usize,
    /// Upper bound on the results one call may ask for; larger limits are clamped
    pub max_results: usize,
    /// Extra candidates requested by seed searches on top of `limit + seeds`
    pub seed_overfetch: usize,
    pub diversify_recommendations: bool,
    pub vector_store_policy: ServiceConfig,
    pub embedding_policy: ServiceConfig,
    pub interaction_log_policy: ServiceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            products_collection: "products".to_string(),
            users_collection: "users".to_string(),
            item_vector: Some("text_dense".to_string()),
            embedding_model: None,
            history_capacity: 20,
            cold_start_threshold: 3,
            similar_users: 20,
            peer_history_window: 10,
            trending_pool_size: 100,
            trending_sample_size: 20,
            trending_seed: None,
            max_seed_items: 50,
            max_results: 200,
            seed_overfetch: 5,
            diversify_recommendations: true,
            vector_store_policy: vector_store_config(),
            embedding_policy: embedding_config(),
            interaction_log_policy: interaction_log_config(),
        }
    }
}

/// Settings used only by the replay binary
#[derive(Debug, Clone, Default)]
pub struct ReplayConfig {
    pub catalog_path: Option<String>,
    pub events_path: Option<String>,
    pub user_id: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub engine: EngineConfig,
    pub weights: EngineWeights,
    pub replay: ReplayConfig,
}

/// `RECO_*` environment overrides, every field optional
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    products_collection: Option<String>,
    users_collection: Option<String>,
    item_vector: Option<String>,
    embedding_model: Option<String>,
    history_capacity: Option<usize>,
    cold_start_threshold: Option<u64>,
    similar_users: Option<usize>,
    peer_history_window: Option<usize>,
    trending_pool_size: Option<usize>,
    trending_sample_size: Option<usize>,
    trending_seed: Option<u64>,
    max_results: Option<usize>,
    diversify: Option<bool>,
    personal_share: Option<f32>,
    collaborative_share: Option<f32>,
    mmr_diversity: Option<f32>,
    store_timeout_ms: Option<u64>,
    store_max_retries: Option<u32>,
    embedding_timeout_ms: Option<u64>,
    catalog_path: Option<String>,
    events_path: Option<String>,
    user_id: Option<String>,
    limit: Option<usize>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let overrides: EnvOverrides = envy::prefixed("RECO_")
            .from_env()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        let config = Self::default().apply(overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply(mut self, o: EnvOverrides) -> Self {
        let engine = &mut self.engine;
        if let Some(v) = o.products_collection {
            engine.products_collection = v;
        }
        if let Some(v) = o.users_collection {
            engine.users_collection = v;
        }
        if let Some(v) = o.item_vector {
            // Empty string selects the unnamed vector
            engine.item_vector = if v.is_empty() { None } else { Some(v) };
        }
        if o.embedding_model.is_some() {
            engine.embedding_model = o.embedding_model;
        }
        if let Some(v) = o.history_capacity {
            engine.history_capacity = v;
        }
        if let Some(v) = o.cold_start_threshold {
            engine.cold_start_threshold = v;
        }
        if let Some(v) = o.similar_users {
            engine.similar_users = v;
        }
        if let Some(v) = o.peer_history_window {
            engine.peer_history_window = v;
        }
        if let Some(v) = o.trending_pool_size {
            engine.trending_pool_size = v;
        }
        if let Some(v) = o.trending_sample_size {
            engine.trending_sample_size = v;
        }
        if o.trending_seed.is_some() {
            engine.trending_seed = o.trending_seed;
        }
        if let Some(v) = o.max_results {
            engine.max_results = v;
        }
        if let Some(v) = o.diversify {
            engine.diversify_recommendations = v;
        }
        if let Some(ms) = o.store_timeout_ms {
            engine.vector_store_policy.timeout.duration = Duration::from_millis(ms);
        }
        if let Some(n) = o.store_max_retries {
            if let Some(retry) = engine.vector_store_policy.retry.as_mut() {
                retry.max_retries = n;
            }
        }
        if let Some(ms) = o.embedding_timeout_ms {
            engine.embedding_policy.timeout.duration = Duration::from_millis(ms);
        }

        if let Some(v) = o.personal_share {
            self.weights.personal_share = v;
        }
        if let Some(v) = o.collaborative_share {
            self.weights.collaborative_share = v;
        }
        if let Some(v) = o.mmr_diversity {
            self.weights.mmr_diversity = v;
        }

        self.replay = ReplayConfig {
            catalog_path: o.catalog_path,
            events_path: o.events_path,
            user_id: o.user_id,
            limit: o.limit.unwrap_or(10),
        };
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.history_capacity == 0 {
            return Err(EngineError::Config(
                "history_capacity must be positive".into(),
            ));
        }
        if self.engine.max_results == 0 {
            return Err(EngineError::Config("max_results must be positive".into()));
        }
        if self.engine.trending_sample_size == 0 || self.engine.trending_pool_size == 0 {
            return Err(EngineError::Config(
                "trending pool and sample sizes must be positive".into(),
            ));
        }
        let w = &self.weights;
        if w.personal_share < 0.0 || w.collaborative_share < 0.0 {
            return Err(EngineError::Config("hybrid shares must be non-negative".into()));
        }
        if !(0.0..=1.0).contains(&w.mmr_diversity) {
            return Err(EngineError::Config(
                "mmr_diversity must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let w = EngineWeights::default();
        assert_eq!(w.seed.cart, 2.0);
        assert_eq!(w.seed.wishlist, 1.5);
        assert_eq!(w.profile.weight(InteractionType::Purchase), 1.0);
        assert_eq!(w.profile.weight(InteractionType::Wishlist), 0.3);
        assert_eq!(w.collaborative.weight(InteractionType::Cart), 0.7);
        assert_eq!(w.collaborative.weight(InteractionType::Click), 0.1);
        assert!((w.personal_share + w.collaborative_share - 1.0).abs() < 1e-6);

        let c = EngineConfig::default();
        assert_eq!(c.history_capacity, 20);
        assert_eq!(c.cold_start_threshold, 3);
        assert_eq!(c.item_vector.as_deref(), Some("text_dense"));
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = EnvOverrides {
            item_vector: Some(String::new()),
            history_capacity: Some(5),
            max_results: Some(50),
            diversify: Some(false),
            store_max_retries: Some(1),
            user_id: Some("u-7".into()),
            ..Default::default()
        };

        let config = Config::default().apply(overrides);
        assert_eq!(config.engine.item_vector, None);
        assert_eq!(config.engine.history_capacity, 5);
        assert_eq!(config.engine.max_results, 50);
        assert!(!config.engine.diversify_recommendations);
        assert_eq!(
            config.engine.vector_store_policy.retry.map(|r| r.max_retries),
            Some(1)
        );
        assert_eq!(config.replay.user_id.as_deref(), Some("u-7"));
        assert_eq!(config.replay.limit, 10);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.weights.mmr_diversity = 1.5;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let mut config = Config::default();
        config.engine.history_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.engine.max_results = 0;
        assert!(config.validate().is_err());
    }
}
