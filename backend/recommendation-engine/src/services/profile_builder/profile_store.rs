use crate::clients::{Condition, Filter, Point, QueryRequest, VectorStore};
use crate::error::{EngineError, Result, UpstreamError};
use crate::models::{Budget, InteractionRecord, UserProfile};
use crate::services::id_mapper::to_store_id;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use resilience::{call_with_config, ServiceConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

const SERVICE: &str = "profile_store";

/// Another user near a taste vector
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarUser {
    pub user_id: String,
    pub similarity: f32,
    pub embedding_model: String,
    /// Oldest first
    pub recent_interactions: Vec<InteractionRecord>,
}

/// Persistence for user profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn put(&self, profile: &UserProfile) -> Result<()>;

    /// Users whose taste vectors are closest to `vector`, most similar first
    async fn nearest(
        &self,
        vector: &[f32],
        limit: usize,
        exclude_user: &str,
    ) -> Result<Vec<SimilarUser>>;
}

/// Everything but the taste vector, which is stored as the point's vector
#[derive(Debug, Serialize, Deserialize)]
struct ProfilePayload {
    user_id: String,
    budget: Budget,
    #[serde(default)]
    category_affinity: BTreeMap<String, u64>,
    #[serde(default)]
    recent_interactions: VecDeque<InteractionRecord>,
    #[serde(default)]
    total_interactions: u64,
    embedding_model: String,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl ProfilePayload {
    fn from_profile(profile: &UserProfile) -> Self {
        Self {
            user_id: profile.user_id.clone(),
            budget: profile.budget,
            category_affinity: profile.category_affinity.clone(),
            recent_interactions: profile.recent_interactions.clone(),
            total_interactions: profile.total_interactions,
            embedding_model: profile.embedding_model.clone(),
            created_at: profile.created_at,
            last_updated: profile.last_updated,
        }
    }

    fn into_profile(self, taste_vector: Vec<f32>) -> UserProfile {
        UserProfile {
            user_id: self.user_id,
            taste_vector,
            budget: self.budget,
            category_affinity: self.category_affinity,
            recent_interactions: self.recent_interactions,
            total_interactions: self.total_interactions,
            embedding_model: self.embedding_model,
            created_at: self.created_at,
            last_updated: self.last_updated,
        }
    }
}

fn decode(payload: &Value) -> Option<ProfilePayload> {
    match serde_json::from_value(payload.clone()) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(error = %e, "Skipping unreadable profile payload");
            None
        }
    }
}

/// Profiles stored as points of a vector store collection, keyed by `to_store_id(user_id)`
pub struct VectorProfileStore {
    store: Arc<dyn VectorStore>,
    collection: String,
    policy: ServiceConfig,
}

impl VectorProfileStore {
    pub fn new(
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        policy: ServiceConfig,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            policy,
        }
    }
}

#[async_trait]
impl ProfileStore for VectorProfileStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let ids = [to_store_id(user_id)];
        let store = &self.store;
        let collection = self.collection.as_str();
        let points = call_with_config(
            &self.policy,
            || store.retrieve(collection, &ids, true),
            UpstreamError::is_transient,
        )
        .await
        .map_err(|e| EngineError::upstream(SERVICE, e))?;

        let Some(point) = points.into_iter().next() else {
            return Ok(None);
        };
        let Some(vector) = point.vector(None).map(<[f32]>::to_vec) else {
            warn!(user_id, "Stored profile has no taste vector");
            return Ok(None);
        };

        Ok(decode(&point.payload).map(|p| p.into_profile(vector)))
    }

    async fn put(&self, profile: &UserProfile) -> Result<()> {
        let payload = serde_json::to_value(ProfilePayload::from_profile(profile)).map_err(|e| {
            EngineError::MalformedPayload {
                item_id: profile.user_id.clone(),
                reason: e.to_string(),
            }
        })?;
        let point = Point::new(
            to_store_id(&profile.user_id),
            profile.taste_vector.clone(),
            payload,
        );

        let store = &self.store;
        let collection = self.collection.as_str();
        call_with_config(
            &self.policy,
            || store.upsert(collection, vec![point.clone()]),
            UpstreamError::is_transient,
        )
        .await
        .map_err(|e| EngineError::upstream(SERVICE, e))?;

        debug!(user_id = %profile.user_id, "Profile stored");
        Ok(())
    }

    async fn nearest(
        &self,
        vector: &[f32],
        limit: usize,
        exclude_user: &str,
    ) -> Result<Vec<SimilarUser>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let filter = Filter::default().must_not(Condition::matches("user_id", exclude_user));
        // One extra in case the filter is not honoured by the backend
        let request =
            QueryRequest::new(vector.to_vec(), limit.saturating_add(1)).filter(Some(filter));

        let store = &self.store;
        let collection = self.collection.as_str();
        let hits = call_with_config(
            &self.policy,
            || store.query(collection, request.clone()),
            UpstreamError::is_transient,
        )
        .await
        .map_err(|e| EngineError::upstream(SERVICE, e))?;

        Ok(hits
            .iter()
            .filter_map(|hit| {
                let payload = decode(&hit.payload)?;
                Some(SimilarUser {
                    user_id: payload.user_id,
                    similarity: hit.score,
                    embedding_model: payload.embedding_model,
                    recent_interactions: payload.recent_interactions.into_iter().collect(),
                })
            })
            .filter(|peer| peer.user_id != exclude_user)
            .take(limit)
            .collect())
    }
}
