use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Integer point id in the vector store, see `services::id_mapper`
pub type StoreId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    View,
    Click,
    Wishlist,
    Cart,
    Purchase,
    Search,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::View => "view",
            InteractionType::Click => "click",
            InteractionType::Wishlist => "wishlist",
            InteractionType::Cart => "cart",
            InteractionType::Purchase => "purchase",
            InteractionType::Search => "search",
        }
    }

    /// Search events carry a query instead of an item and never move the profile
    pub fn updates_profile(&self) -> bool {
        !matches!(self, InteractionType::Search)
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(InteractionType::View),
            "click" => Ok(InteractionType::Click),
            "wishlist" | "favorite" => Ok(InteractionType::Wishlist),
            "cart" | "add_to_cart" => Ok(InteractionType::Cart),
            "purchase" => Ok(InteractionType::Purchase),
            "search" => Ok(InteractionType::Search),
            other => Err(format!("unknown interaction type: {}", other)),
        }
    }
}

/// One append-only entry of the interaction log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    #[serde(default = "Uuid::new_v4")]
    pub event_id: Uuid,
    pub user_id: String,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(rename = "type")]
    pub interaction_type: InteractionType,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl InteractionEvent {
    pub fn new(
        user_id: impl Into<String>,
        item_id: impl Into<String>,
        interaction_type: InteractionType,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            user_id: user_id.into(),
            item_id: Some(item_id.into()),
            interaction_type,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn search(user_id: impl Into<String>, query: &str) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            user_id: user_id.into(),
            item_id: None,
            interaction_type: InteractionType::Search,
            timestamp: Utc::now(),
            metadata: serde_json::json!({ "query": query }),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub min: f64,
    pub max: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub item_id: String,
    #[serde(rename = "type")]
    pub interaction_type: InteractionType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub taste_vector: Vec<f32>,
    pub budget: Budget,
    pub category_affinity: BTreeMap<String, u64>,
    /// Oldest first, bounded by the configured history capacity
    pub recent_interactions: VecDeque<InteractionRecord>,
    /// Every profile-moving interaction ever applied, not bounded by the history buffer
    pub total_interactions: u64,
    /// Model tag of the embedding space `taste_vector` lives in
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl UserProfile {
    pub fn has_interacted_with(&self, item_id: &str) -> bool {
        self.recent_interactions.iter().any(|r| r.item_id == item_id)
    }
}

/// Normalized catalog record produced from a raw vector store hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub id: String,
    pub store_id: StoreId,
    pub score: f32,
    pub name: String,
    pub description: String,
    pub category: String,
    pub brand: String,
    pub price: f64,
    pub initial_price: f64,
    pub currency: String,
    pub rating: f64,
    pub review_count: Option<u64>,
    pub image: Option<String>,
    pub image_urls: Vec<String>,
    pub url: Option<String>,
    pub discount: Option<serde_json::Value>,
    pub available: Option<bool>,
    pub payment_methods: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationSource {
    Personal,
    Collaborative,
    Trending,
    BySeed,
}

impl RecommendationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationSource::Personal => "personal",
            RecommendationSource::Collaborative => "collaborative",
            RecommendationSource::Trending => "trending",
            RecommendationSource::BySeed => "by-seed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub item_id: String,
    pub score: f32,
    pub sources: BTreeSet<RecommendationSource>,
    pub explanation: String,
    pub item: ItemResult,
}

/// Hard filters supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub availability: Option<bool>,
    pub payment_method: Option<String>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self == &Constraints::default()
    }

    pub fn has_budget(&self) -> bool {
        self.budget_min.is_some() || self.budget_max.is_some()
    }

    /// Whether `item` passes every supplied constraint.
    ///
    /// Unknown availability passes an availability constraint. Items listing no payment methods
    /// pass any payment method constraint.
    pub fn admits(&self, item: &ItemResult) -> bool {
        if let Some(min) = self.budget_min {
            if item.price < min {
                return false;
            }
        }
        if let Some(max) = self.budget_max {
            if item.price > max {
                return false;
            }
        }
        if let (Some(wanted), Some(actual)) = (self.availability, item.available) {
            if wanted != actual {
                return false;
            }
        }
        if let Some(method) = &self.payment_method {
            if !item.payment_methods.is_empty()
                && !item
                    .payment_methods
                    .iter()
                    .any(|m| m.eq_ignore_ascii_case(method))
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Trending,
    ColdStart,
    Hybrid,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Trending => "trending",
            Strategy::ColdStart => "cold_start",
            Strategy::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub strategy: Strategy,
    /// Set when an upstream failure forced a fallback
    pub degraded: bool,
    pub results: Vec<RecommendationResult>,
}

impl RecommendationResponse {
    pub fn empty(strategy: Strategy, degraded: bool) -> Self {
        Self {
            strategy,
            degraded,
            results: Vec::new(),
        }
    }
}

/// Seed search output. `degraded` marks an upstream failure that emptied the list or
/// dropped the query text from the query vector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub degraded: bool,
    pub results: Vec<RecommendationResult>,
}

impl SearchResponse {
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            results: Vec::new(),
        }
    }
}

/// What `Engine::apply_interaction` did with an event
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionOutcome {
    /// Logged and folded into the profile
    Applied,
    /// Logged only (search events)
    Recorded,
    /// Profile left untouched
    Skipped { reason: String },
}
