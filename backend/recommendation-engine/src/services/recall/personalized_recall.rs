use super::{Candidate, RecallContext, RecallStrategy};
use crate::clients::{Condition, Filter};
use crate::error::Result;
use crate::models::{Constraints, RecommendationSource, UserProfile};
use crate::services::retrieval::{RetrievalAdapter, SearchRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Personalized Recall Strategy
///
/// Searches the catalog with the profile's taste vector inside a price window around the
/// profile budget. Caller-supplied budget bounds replace the window bounds as-is.
pub struct PersonalizedRecallStrategy {
    retrieval: Arc<RetrievalAdapter>,
    window_min: f64,
    window_max: f64,
}

impl PersonalizedRecallStrategy {
    pub fn new(retrieval: Arc<RetrievalAdapter>, window_min: f64, window_max: f64) -> Self {
        Self {
            retrieval,
            window_min,
            window_max,
        }
    }

    /// `(gte, lte)` price bounds; a zero budget ceiling leaves the top open
    pub fn price_window(&self, profile: &UserProfile, constraints: &Constraints) -> (f64, Option<f64>) {
        let min = constraints
            .budget_min
            .unwrap_or_else(|| (profile.budget.min * self.window_min).max(0.0));
        let max = match constraints.budget_max {
            Some(max) => Some(max),
            None if profile.budget.max > 0.0 => Some(profile.budget.max * self.window_max),
            None => None,
        };
        (min, max)
    }
}

#[async_trait]
impl RecallStrategy for PersonalizedRecallStrategy {
    async fn recall(&self, ctx: &RecallContext, limit: usize) -> Result<Vec<Candidate>> {
        let Some(profile) = ctx.profile.as_ref() else {
            debug!(user_id = %ctx.user_id, "No profile, personalized recall skipped");
            return Ok(Vec::new());
        };

        let (gte, lte) = self.price_window(profile, &ctx.constraints);
        if lte.map_or(false, |max| max < gte) {
            debug!(
                user_id = %ctx.user_id,
                price_min = gte,
                price_max = ?lte,
                "Price window is empty"
            );
            return Ok(Vec::new());
        }

        let mut request = SearchRequest::new(profile.taste_vector.clone(), limit);
        request.filter = Some(Filter::default().must(Condition::range("price", Some(gte), lte)));

        let items = self.retrieval.search(request).await?;
        let candidates: Vec<Candidate> = items
            .into_iter()
            .filter(|item| ctx.constraints.admits(item))
            .map(|item| {
                let score = item.score;
                Candidate::new(item, RecommendationSource::Personal, score)
            })
            .collect();

        debug!(
            user_id = %ctx.user_id,
            price_min = gte,
            price_max = ?lte,
            count = candidates.len(),
            "Personalized recall"
        );
        Ok(candidates)
    }

    fn source(&self) -> RecommendationSource {
        RecommendationSource::Personal
    }
}
