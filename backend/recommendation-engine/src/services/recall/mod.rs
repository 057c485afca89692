mod personalized_recall;
mod trending_recall;
mod user_cf_recall;

use crate::error::Result;
use crate::models::{Constraints, ItemResult, RecommendationSource, UserProfile};
use async_trait::async_trait;

pub use personalized_recall::PersonalizedRecallStrategy;
pub use trending_recall::TrendingRecallStrategy;
pub use user_cf_recall::{aggregate_peer_scores, PeerScore, UserCfRecallStrategy};

/// One recalled item with the score its strategy gave it
#[derive(Debug, Clone)]
pub struct Candidate {
    pub item: ItemResult,
    pub source: RecommendationSource,
    pub score: f32,
    /// Similar-user interactions behind a collaborative score
    pub peer_count: usize,
}

impl Candidate {
    pub fn new(item: ItemResult, source: RecommendationSource, score: f32) -> Self {
        Self {
            item,
            source,
            score,
            peer_count: 0,
        }
    }
}

/// Everything a strategy may look at for one request
#[derive(Debug, Clone)]
pub struct RecallContext {
    pub user_id: String,
    pub profile: Option<UserProfile>,
    pub constraints: Constraints,
}

impl RecallContext {
    pub fn new(user_id: impl Into<String>, profile: Option<UserProfile>, constraints: Constraints) -> Self {
        Self {
            user_id: user_id.into(),
            profile,
            constraints,
        }
    }
}

/// Recall strategy
#[async_trait]
pub trait RecallStrategy: Send + Sync {
    async fn recall(&self, ctx: &RecallContext, limit: usize) -> Result<Vec<Candidate>>;
    fn source(&self) -> RecommendationSource;
}
