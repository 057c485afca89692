use crate::clients::{Condition, EmbeddingService, Filter, InteractionLog, VectorStore};
use crate::config::{Config, EngineConfig};
use crate::error::{EngineError, Result, UpstreamError};
use crate::models::{
    Constraints, InteractionEvent, InteractionOutcome, InteractionRecord, InteractionType,
    RecommendationResponse, RecommendationResult, RecommendationSource, SearchResponse, StoreId,
    Strategy, UserProfile,
};
use crate::services::diversity::DiversityLayer;
use crate::services::id_mapper::to_store_id;
use crate::services::profile_builder::{
    ItemSignal, ProfileStore, ProfileUpdater, ProfileUpdaterConfig, VectorProfileStore,
};
use crate::services::query_builder::{QueryVectorBuilder, Seed, SeedContext, WeightedVector};
use crate::services::ranking::{explain, HybridScorer};
use crate::services::recall::{
    PersonalizedRecallStrategy, RecallContext, RecallStrategy, TrendingRecallStrategy,
    UserCfRecallStrategy,
};
use crate::services::retrieval::{RetrievalAdapter, SearchRequest};
use resilience::call_with_config;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

const INTERACTION_LOG: &str = "interaction_log";

/// Parameters of an ad-hoc seed search
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub score_threshold: Option<f32>,
    pub diversify: bool,
}

impl SearchOptions {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            score_threshold: None,
            diversify: false,
        }
    }

    pub fn diversified(mut self) -> Self {
        self.diversify = true;
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }
}

/// Entry point tying retrieval, profiles and scoring together
pub struct Engine {
    config: EngineConfig,
    embedding_model: String,
    interactions: Arc<dyn InteractionLog>,
    profiles: Arc<dyn ProfileStore>,
    retrieval: Arc<RetrievalAdapter>,
    query_builder: QueryVectorBuilder,
    updater: ProfileUpdater,
    personal: PersonalizedRecallStrategy,
    collaborative: UserCfRecallStrategy,
    trending: TrendingRecallStrategy,
    scorer: HybridScorer,
    diversity: DiversityLayer,
}

impl Engine {
    /// Engine whose profiles live in the users collection of `store`
    pub fn new(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingService>,
        interactions: Arc<dyn InteractionLog>,
    ) -> Self {
        let profiles = Arc::new(VectorProfileStore::new(
            store.clone(),
            config.engine.users_collection.clone(),
            config.engine.vector_store_policy.clone(),
        ));
        Self::with_profile_store(config, store, profiles, embedder, interactions)
    }

    pub fn with_profile_store(
        config: Config,
        store: Arc<dyn VectorStore>,
        profiles: Arc<dyn ProfileStore>,
        embedder: Arc<dyn EmbeddingService>,
        interactions: Arc<dyn InteractionLog>,
    ) -> Self {
        let Config {
            engine, weights, ..
        } = config;

        let embedding_model = engine
            .embedding_model
            .clone()
            .unwrap_or_else(|| embedder.model_id());

        let retrieval = Arc::new(
            RetrievalAdapter::new(
                store,
                engine.products_collection.clone(),
                engine.item_vector.clone(),
                engine.vector_store_policy.clone(),
            )
            .with_mmr(weights.mmr_diversity, weights.mmr_candidate_multiplier),
        );

        let updater = ProfileUpdater::new(
            profiles.clone(),
            ProfileUpdaterConfig {
                weights: weights.profile.clone(),
                budget: weights.budget.clone(),
                history_capacity: engine.history_capacity,
                embedding_model: embedding_model.clone(),
            },
        );

        info!(
            products = %engine.products_collection,
            users = %engine.users_collection,
            embedding_model = %embedding_model,
            "Recommendation engine ready"
        );

        Self {
            query_builder: QueryVectorBuilder::new(
                embedder,
                weights.seed.clone(),
                engine.embedding_policy.clone(),
            ),
            personal: PersonalizedRecallStrategy::new(
                retrieval.clone(),
                weights.price_window_min,
                weights.price_window_max,
            ),
            collaborative: UserCfRecallStrategy::new(
                profiles.clone(),
                retrieval.clone(),
                weights.collaborative.clone(),
                engine.similar_users,
                engine.peer_history_window,
            ),
            trending: TrendingRecallStrategy::new(
                retrieval.clone(),
                engine.trending_pool_size,
                engine.trending_sample_size,
                engine.trending_seed,
            ),
            scorer: HybridScorer::new(weights.personal_share, weights.collaborative_share),
            diversity: DiversityLayer::new(),
            updater,
            retrieval,
            profiles,
            interactions,
            embedding_model,
            config: engine,
        }
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Items similar to a seed of cart, wishlist and explicit items plus optional free text.
    ///
    /// Seed items never appear in the results. An empty seed without text yields an empty list.
    /// Never fails: an upstream outage gives an empty response marked degraded.
    pub async fn search(
        &self,
        seed: &Seed,
        query_text: Option<&str>,
        options: SearchOptions,
    ) -> SearchResponse {
        let limit = self.clamp_limit(options.limit);
        if limit == 0 {
            return SearchResponse::default();
        }

        match self.seed_search(seed, query_text, &options, limit).await {
            Ok(response) => response,
            Err(EngineError::EmptySeed) => {
                debug!("Nothing to search with");
                SearchResponse::default()
            }
            Err(e) if e.is_upstream() => {
                warn!(error = %e, "Seed search failed upstream, returning nothing");
                SearchResponse::degraded()
            }
            Err(e) => {
                warn!(error = %e, "Seed search rejected");
                SearchResponse::default()
            }
        }
    }

    async fn seed_search(
        &self,
        seed: &Seed,
        query_text: Option<&str>,
        options: &SearchOptions,
        limit: usize,
    ) -> Result<SearchResponse> {
        let mut contexts = seed.contexts();
        if contexts.len() > self.config.max_seed_items {
            warn!(
                seeds = contexts.len(),
                max = self.config.max_seed_items,
                "Too many seed items, keeping the first ones"
            );
            contexts.truncate(self.config.max_seed_items);
        }

        let weighted = self.seed_vectors(&contexts).await?;
        let query = self.query_builder.build(weighted, query_text).await?;

        let seed_ids: HashSet<&str> = contexts.iter().map(|(id, _)| id.as_str()).collect();
        let (fetch, filter) = if seed_ids.is_empty() {
            (limit, None)
        } else {
            let excluded = contexts
                .iter()
                .map(|(id, _)| Value::String(id.clone()))
                .collect();
            (
                limit
                    .saturating_add(seed_ids.len())
                    .saturating_add(self.config.seed_overfetch),
                Some(Filter::default().must_not(Condition::match_any("id", excluded))),
            )
        };

        let items = self
            .retrieval
            .search(SearchRequest {
                vector: query.vector,
                limit: fetch,
                score_threshold: options.score_threshold,
                diversify: options.diversify,
                filter,
            })
            .await?;

        let mut seen = HashSet::new();
        let mut items: Vec<_> = items
            .into_iter()
            .filter(|item| !seed_ids.contains(item.id.as_str()) && seen.insert(item.id.clone()))
            .take(limit)
            .collect();
        if options.diversify {
            items = self.diversity.rerank(items);
        }

        let sources = BTreeSet::from([RecommendationSource::BySeed]);
        let explanation = explain(&sources, 0);
        info!(
            seeds = seed_ids.len(),
            with_text = query_text.is_some(),
            text_dropped = query.text_dropped,
            count = items.len(),
            "Seed search"
        );

        Ok(SearchResponse {
            degraded: query.text_dropped,
            results: items
                .into_iter()
                .map(|item| RecommendationResult {
                    item_id: item.id.clone(),
                    score: item.score,
                    sources: sources.clone(),
                    explanation: explanation.clone(),
                    item,
                })
                .collect(),
        })
    }

    fn clamp_limit(&self, limit: usize) -> usize {
        if limit > self.config.max_results {
            debug!(limit, max = self.config.max_results, "Clamping requested limit");
        }
        limit.min(self.config.max_results)
    }

    async fn seed_vectors(
        &self,
        contexts: &[(String, SeedContext)],
    ) -> Result<Vec<WeightedVector>> {
        if contexts.is_empty() {
            return Ok(Vec::new());
        }

        let weights: HashMap<StoreId, f32> = contexts
            .iter()
            .map(|(id, ctx)| (to_store_id(id), self.query_builder.weight_for(*ctx)))
            .collect();
        let ids: Vec<StoreId> = contexts.iter().map(|(id, _)| to_store_id(id)).collect();

        let found = self.retrieval.fetch(&ids, true).await?;
        if found.len() < ids.len() {
            warn!(
                requested = ids.len(),
                found = found.len(),
                "Some seed items are missing from the catalog"
            );
        }

        Ok(found
            .into_iter()
            .filter_map(|catalog| {
                let weight = *weights.get(&catalog.item.store_id)?;
                match catalog.vector {
                    Some(vector) => Some(WeightedVector::new(vector, weight)),
                    None => {
                        warn!(item_id = %catalog.item.id, "Seed item has no vector");
                        None
                    }
                }
            })
            .collect())
    }

    // ========================================================================
    // Recommendations
    // ========================================================================

    /// Ranked recommendations for a user. Never fails: upstream trouble falls back to
    /// trending items or an empty list and marks the response degraded. Limits above
    /// `max_results` are clamped.
    pub async fn recommend(
        &self,
        user_id: &str,
        limit: usize,
        constraints: Option<&Constraints>,
    ) -> RecommendationResponse {
        let constraints = constraints.cloned().unwrap_or_default();
        let limit = self.clamp_limit(limit);
        if limit == 0 {
            return RecommendationResponse::empty(Strategy::Trending, false);
        }

        let profile = match self.profiles.get(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                info!(user_id, "No profile, using trending items");
                let ctx = RecallContext::new(user_id, None, constraints);
                return self.trending_response(&ctx, limit, false).await;
            }
            Err(e) => {
                warn!(user_id, error = %e, "Profile lookup failed, using trending items");
                let ctx = RecallContext::new(user_id, None, constraints);
                return self.trending_response(&ctx, limit, true).await;
            }
        };

        if profile.embedding_model != self.embedding_model {
            warn!(
                user_id,
                profile_model = %profile.embedding_model,
                engine_model = %self.embedding_model,
                "Profile built in another embedding space, using trending items"
            );
            let ctx = RecallContext::new(user_id, None, constraints);
            return self.trending_response(&ctx, limit, true).await;
        }

        let interactions = profile.total_interactions;
        let ctx = RecallContext::new(user_id, Some(profile), constraints);

        if interactions < self.config.cold_start_threshold {
            info!(user_id, interactions, "Cold start recommendations");
            self.cold_start_response(&ctx, limit).await
        } else {
            info!(user_id, interactions, "Hybrid recommendations");
            self.hybrid_response(&ctx, limit).await
        }
    }

    async fn cold_start_response(&self, ctx: &RecallContext, limit: usize) -> RecommendationResponse {
        match self.personal.recall(ctx, limit).await {
            Ok(candidates) if !candidates.is_empty() => {
                let results = self.scorer.single_source(candidates, limit);
                self.finish(Strategy::ColdStart, false, results)
            }
            Ok(_) => {
                debug!(user_id = %ctx.user_id, "Nothing in the price window, using trending items");
                self.trending_response(ctx, limit, false).await
            }
            Err(e) => {
                warn!(user_id = %ctx.user_id, error = %e, "Personal recall failed, using trending items");
                self.trending_response(ctx, limit, true).await
            }
        }
    }

    async fn hybrid_response(&self, ctx: &RecallContext, limit: usize) -> RecommendationResponse {
        let (personal, collaborative) = tokio::join!(
            self.personal.recall(ctx, limit.saturating_mul(2)),
            self.collaborative.recall(ctx, limit.saturating_mul(2)),
        );

        let mut degraded = false;
        let mut take = |result: Result<_>, source: RecommendationSource| match result {
            Ok(candidates) => Some(candidates),
            Err(e) => {
                warn!(
                    user_id = %ctx.user_id,
                    source = source.as_str(),
                    error = %e,
                    "Recall strategy failed"
                );
                degraded = true;
                None
            }
        };
        let personal = take(personal, self.personal.source());
        let collaborative = take(collaborative, self.collaborative.source());

        let (personal, collaborative) = match (personal, collaborative) {
            (None, None) => return self.trending_response(ctx, limit, true).await,
            (p, c) => (p.unwrap_or_default(), c.unwrap_or_default()),
        };

        let Some(profile) = ctx.profile.as_ref() else {
            return self.trending_response(ctx, limit, degraded).await;
        };
        let results = self.scorer.combine(personal, collaborative, profile, limit);
        if results.is_empty() {
            debug!(user_id = %ctx.user_id, "No hybrid candidates, using trending items");
            return self.trending_response(ctx, limit, degraded).await;
        }

        self.finish(Strategy::Hybrid, degraded, results)
    }

    async fn trending_response(
        &self,
        ctx: &RecallContext,
        limit: usize,
        degraded: bool,
    ) -> RecommendationResponse {
        match self.trending.recall(ctx, limit).await {
            Ok(candidates) => RecommendationResponse {
                strategy: Strategy::Trending,
                degraded,
                results: self.scorer.single_source(candidates, limit),
            },
            Err(e) => {
                warn!(user_id = %ctx.user_id, error = %e, "Trending fallback failed, returning nothing");
                RecommendationResponse::empty(Strategy::Trending, true)
            }
        }
    }

    fn finish(
        &self,
        strategy: Strategy,
        degraded: bool,
        mut results: Vec<RecommendationResult>,
    ) -> RecommendationResponse {
        if self.config.diversify_recommendations {
            results = self.diversity.rerank(results);
        }
        RecommendationResponse {
            strategy,
            degraded,
            results,
        }
    }

    // ========================================================================
    // Interactions
    // ========================================================================

    /// Record an event and fold it into the user's profile.
    ///
    /// Errors only when the event could not be recorded or an upstream call failed. Events the
    /// profile cannot absorb come back as `Skipped` with the reason.
    pub async fn apply_interaction(&self, event: InteractionEvent) -> Result<InteractionOutcome> {
        let log = &self.interactions;
        call_with_config(
            &self.config.interaction_log_policy,
            || log.record(event.clone()),
            UpstreamError::is_transient,
        )
        .await
        .map_err(|e| EngineError::upstream(INTERACTION_LOG, e))?;

        if event.interaction_type == InteractionType::Search {
            debug!(user_id = %event.user_id, "Search event recorded");
            return Ok(InteractionOutcome::Recorded);
        }

        let Some(item_id) = event.item_id.as_deref() else {
            return Ok(skipped(&event.user_id, "event has no item id".to_string()));
        };

        let Some(catalog) = self.retrieval.fetch_one(to_store_id(item_id)).await? else {
            return Ok(skipped(&event.user_id, EngineError::ItemNotFound(item_id.to_string()).to_string()));
        };
        let Some(vector) = catalog.vector else {
            return Ok(skipped(&event.user_id, format!("item {} has no vector", item_id)));
        };

        let signal = ItemSignal {
            item_id: item_id.to_string(),
            vector,
            price: catalog.item.price,
            category: catalog.item.category,
        };

        match self
            .updater
            .apply_interaction(&event.user_id, event.interaction_type, &signal, event.timestamp)
            .await
        {
            Ok(profile) => {
                info!(
                    user_id = %event.user_id,
                    item_id,
                    interaction = %event.interaction_type,
                    total = profile.total_interactions,
                    "Interaction applied"
                );
                Ok(InteractionOutcome::Applied)
            }
            Err(
                e @ (EngineError::EmbeddingSpaceMismatch { .. }
                | EngineError::DimensionMismatch { .. }
                | EngineError::InvalidVector(_)
                | EngineError::UnsupportedInteraction(_)),
            ) => Ok(skipped(&event.user_id, e.to_string())),
            Err(e) => Err(e),
        }
    }

    pub async fn profile(&self, user_id: &str) -> Result<UserProfile> {
        self.profiles
            .get(user_id)
            .await?
            .ok_or_else(|| EngineError::ProfileNotFound(user_id.to_string()))
    }

    /// Last `n` interactions from the profile history, most recent last
    pub async fn recent_interactions(&self, user_id: &str, n: usize) -> Result<Vec<InteractionRecord>> {
        match self.profile(user_id).await {
            Ok(profile) => {
                let skip = profile.recent_interactions.len().saturating_sub(n);
                Ok(profile.recent_interactions.into_iter().skip(skip).collect())
            }
            Err(EngineError::ProfileNotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Last `n` logged events, search events included, most recent first
    pub async fn logged_events(&self, user_id: &str, n: usize) -> Result<Vec<InteractionEvent>> {
        let log = &self.interactions;
        call_with_config(
            &self.config.interaction_log_policy,
            || log.last_n(user_id, n),
            UpstreamError::is_transient,
        )
        .await
        .map_err(|e| EngineError::upstream(INTERACTION_LOG, e))
    }
}

fn skipped(user_id: &str, reason: String) -> InteractionOutcome {
    warn!(user_id, reason = %reason, "Profile update skipped");
    InteractionOutcome::Skipped { reason }
}
