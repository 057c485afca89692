use super::profile_store::ProfileStore;
use crate::config::{BudgetFactors, InteractionWeights};
use crate::error::{EngineError, Result};
use crate::models::{Budget, InteractionRecord, InteractionType, UserProfile};
use crate::utils::normalize;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// What the catalog knows about the item a user interacted with
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSignal {
    pub item_id: String,
    pub vector: Vec<f32>,
    pub price: f64,
    pub category: String,
}

#[derive(Debug, Clone)]
pub struct ProfileUpdaterConfig {
    pub weights: InteractionWeights,
    pub budget: BudgetFactors,
    pub history_capacity: usize,
    /// Embedding space every profile handled here lives in
    pub embedding_model: String,
}

impl ProfileUpdaterConfig {
    pub fn new(embedding_model: impl Into<String>) -> Self {
        Self {
            weights: InteractionWeights::profile_default(),
            budget: BudgetFactors::default(),
            history_capacity: 20,
            embedding_model: embedding_model.into(),
        }
    }
}

/// Incrementally maintains taste vector, budget and category affinity per user.
///
/// Updates for one user are serialised through a per-user async mutex so concurrent
/// read-modify-write cycles never lose an interaction. Different users never wait on each other.
pub struct ProfileUpdater {
    store: Arc<dyn ProfileStore>,
    config: ProfileUpdaterConfig,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProfileUpdater {
    pub fn new(store: Arc<dyn ProfileStore>, config: ProfileUpdaterConfig) -> Self {
        Self {
            store,
            config,
            locks: DashMap::new(),
        }
    }

    /// Fold one interaction into the user's stored profile, creating it on first contact.
    ///
    /// Nothing is written when any step fails.
    pub async fn apply_interaction(
        &self,
        user_id: &str,
        interaction_type: InteractionType,
        signal: &ItemSignal,
        at: DateTime<Utc>,
    ) -> Result<UserProfile> {
        if !interaction_type.updates_profile() {
            return Err(EngineError::UnsupportedInteraction(interaction_type));
        }

        let lock = self
            .locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.read_modify_write(user_id, interaction_type, signal, at)
                .await
        };

        drop(lock);
        self.locks
            .remove_if(user_id, |_, l| Arc::strong_count(l) == 1);

        result
    }

    async fn read_modify_write(
        &self,
        user_id: &str,
        interaction_type: InteractionType,
        signal: &ItemSignal,
        at: DateTime<Utc>,
    ) -> Result<UserProfile> {
        let existing = self.store.get(user_id).await?;
        let updated = self.fold(existing, user_id, interaction_type, signal, at)?;
        self.store.put(&updated).await?;
        Ok(updated)
    }

    /// Pure profile transition for one interaction
    pub fn fold(
        &self,
        existing: Option<UserProfile>,
        user_id: &str,
        interaction_type: InteractionType,
        signal: &ItemSignal,
        at: DateTime<Utc>,
    ) -> Result<UserProfile> {
        let price = if signal.price.is_finite() {
            signal.price.max(0.0)
        } else {
            0.0
        };
        let record = InteractionRecord {
            item_id: signal.item_id.clone(),
            interaction_type,
            timestamp: at,
        };

        let Some(mut profile) = existing else {
            let taste_vector = normalize(&signal.vector)
                .ok_or_else(|| EngineError::InvalidVector("item vector has no direction".into()))?;
            let b = &self.config.budget;
            info!(user_id, category = %signal.category, "Cold start profile");

            return Ok(UserProfile {
                user_id: user_id.to_string(),
                taste_vector,
                budget: Budget {
                    min: price * b.cold_start_min,
                    max: price * b.cold_start_max,
                    confidence: b.cold_start_confidence,
                },
                category_affinity: BTreeMap::from([(signal.category.clone(), 1)]),
                recent_interactions: VecDeque::from(vec![record]),
                total_interactions: 1,
                embedding_model: self.config.embedding_model.clone(),
                created_at: at,
                last_updated: at,
            });
        };

        if profile.embedding_model != self.config.embedding_model {
            return Err(EngineError::EmbeddingSpaceMismatch {
                expected: self.config.embedding_model.clone(),
                found: profile.embedding_model,
            });
        }
        if profile.taste_vector.len() != signal.vector.len() {
            return Err(EngineError::DimensionMismatch {
                expected: profile.taste_vector.len(),
                actual: signal.vector.len(),
            });
        }

        let weight = self.config.weights.weight(interaction_type);
        let blended: Vec<f32> = profile
            .taste_vector
            .iter()
            .zip(&signal.vector)
            .map(|(t, i)| t * (1.0 - weight) + i * weight)
            .collect();
        profile.taste_vector = normalize(&blended)
            .ok_or_else(|| EngineError::InvalidVector("blended taste vector collapsed".into()))?;

        profile.budget = self.update_budget(profile.budget, interaction_type, price);

        *profile
            .category_affinity
            .entry(signal.category.clone())
            .or_insert(0) += 1;

        profile.recent_interactions.push_back(record);
        while profile.recent_interactions.len() > self.config.history_capacity {
            profile.recent_interactions.pop_front();
        }

        profile.total_interactions += 1;
        profile.last_updated = at;

        debug!(
            user_id,
            interaction = %interaction_type,
            weight,
            budget_min = profile.budget.min,
            budget_max = profile.budget.max,
            "Profile updated"
        );

        Ok(profile)
    }

    /// Purchases pull the range toward the paid price; everything else only widens it
    fn update_budget(&self, budget: Budget, interaction_type: InteractionType, price: f64) -> Budget {
        let b = &self.config.budget;
        let mut next = if interaction_type == InteractionType::Purchase {
            let keep = 1.0 - b.purchase_pull;
            Budget {
                min: budget.min * keep + price * b.purchase_min_target * b.purchase_pull,
                max: budget.max * keep + price * b.purchase_max_target * b.purchase_pull,
                confidence: (budget.confidence + b.purchase_confidence_step).min(1.0),
            }
        } else {
            Budget {
                min: budget.min.min(price * b.browse_min),
                max: budget.max.max(price * b.browse_max),
                confidence: (budget.confidence + b.browse_confidence_step).min(1.0),
            }
        };

        if next.min > next.max {
            next.max = next.min;
        }
        next
    }

    /// Number of users currently holding or waiting for their update lock
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}
