use super::{Candidate, RecallContext, RecallStrategy};
use crate::config::InteractionWeights;
use crate::error::Result;
use crate::models::{RecommendationSource, StoreId};
use crate::services::id_mapper::to_store_id;
use crate::services::profile_builder::{ProfileStore, SimilarUser};
use crate::services::retrieval::RetrievalAdapter;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Aggregated peer evidence for one item
#[derive(Debug, Clone, PartialEq)]
pub struct PeerScore {
    pub item_id: String,
    pub score: f32,
    /// Peer interactions that mentioned the item
    pub count: usize,
}

/// User-based collaborative filtering
///
/// Finds the users nearest to this user's taste vector and scores the items in their
/// recent histories by interaction strength and similarity.
pub struct UserCfRecallStrategy {
    profiles: Arc<dyn ProfileStore>,
    retrieval: Arc<RetrievalAdapter>,
    weights: InteractionWeights,
    similar_users: usize,
    peer_history_window: usize,
}

impl UserCfRecallStrategy {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        retrieval: Arc<RetrievalAdapter>,
        weights: InteractionWeights,
        similar_users: usize,
        peer_history_window: usize,
    ) -> Self {
        Self {
            profiles,
            retrieval,
            weights,
            similar_users,
            peer_history_window,
        }
    }
}

/// Score every item in the peers' recent histories.
///
/// Each interaction contributes `weight(type) * similarity`. An item's score is the mean
/// contribution boosted by how many peer interactions mention it:
/// `(sum / count) * (1 + count / peers)`. Highest score first, ties by item id.
pub fn aggregate_peer_scores(
    peers: &[SimilarUser],
    weights: &InteractionWeights,
    window: usize,
) -> Vec<PeerScore> {
    if peers.is_empty() {
        return Vec::new();
    }

    let mut totals: HashMap<&str, (f32, usize)> = HashMap::new();
    for peer in peers {
        let skip = peer.recent_interactions.len().saturating_sub(window);
        for record in &peer.recent_interactions[skip..] {
            let entry = totals.entry(record.item_id.as_str()).or_insert((0.0, 0));
            entry.0 += weights.weight(record.interaction_type) * peer.similarity;
            entry.1 += 1;
        }
    }

    let peer_total = peers.len() as f32;
    let mut scores: Vec<PeerScore> = totals
        .into_iter()
        .map(|(item_id, (sum, count))| PeerScore {
            item_id: item_id.to_string(),
            score: (sum / count as f32) * (1.0 + count as f32 / peer_total),
            count,
        })
        .collect();

    scores.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    scores
}

#[async_trait]
impl RecallStrategy for UserCfRecallStrategy {
    async fn recall(&self, ctx: &RecallContext, limit: usize) -> Result<Vec<Candidate>> {
        let Some(profile) = ctx.profile.as_ref() else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let found = self
            .profiles
            .nearest(&profile.taste_vector, self.similar_users, &ctx.user_id)
            .await?;
        let total = found.len();
        let peers: Vec<SimilarUser> = found
            .into_iter()
            .filter(|peer| peer.embedding_model == profile.embedding_model)
            .collect();
        if peers.len() < total {
            warn!(
                user_id = %ctx.user_id,
                dropped = total - peers.len(),
                embedding_model = %profile.embedding_model,
                "Ignoring similar users from another embedding space"
            );
        }
        if peers.is_empty() {
            info!(user_id = %ctx.user_id, "No similar users found");
            return Ok(Vec::new());
        }

        let scores = aggregate_peer_scores(&peers, &self.weights, self.peer_history_window);
        let by_store_id: HashMap<StoreId, &PeerScore> = scores
            .iter()
            .map(|s| (to_store_id(&s.item_id), s))
            .collect();
        let ids: Vec<StoreId> = scores.iter().map(|s| to_store_id(&s.item_id)).collect();

        let items = self.retrieval.fetch(&ids, false).await?;
        let mut candidates: Vec<Candidate> = items
            .into_iter()
            .filter(|catalog| ctx.constraints.admits(&catalog.item))
            .filter_map(|catalog| {
                let peer = by_store_id.get(&catalog.item.store_id)?;
                let mut item = catalog.item;
                item.score = peer.score;
                Some(Candidate {
                    item,
                    source: RecommendationSource::Collaborative,
                    score: peer.score,
                    peer_count: peer.count,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        candidates.truncate(limit);

        debug!(
            user_id = %ctx.user_id,
            peers = peers.len(),
            scored_items = scores.len(),
            count = candidates.len(),
            "Collaborative recall"
        );
        Ok(candidates)
    }

    fn source(&self) -> RecommendationSource {
        RecommendationSource::Collaborative
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InteractionRecord, InteractionType};
    use chrono::Utc;

    fn peer(user_id: &str, similarity: f32, history: &[(&str, InteractionType)]) -> SimilarUser {
        SimilarUser {
            user_id: user_id.to_string(),
            similarity,
            embedding_model: "m".to_string(),
            recent_interactions: history
                .iter()
                .map(|(item, kind)| InteractionRecord {
                    item_id: item.to_string(),
                    interaction_type: *kind,
                    timestamp: Utc::now(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_peer_scores_boost_popular_items() {
        let peers = vec![
            peer("a", 0.9, &[("x", InteractionType::Purchase), ("y", InteractionType::View)]),
            peer("b", 0.5, &[("x", InteractionType::Cart)]),
        ];
        let scores = aggregate_peer_scores(&peers, &InteractionWeights::collaborative_default(), 10);

        assert_eq!(scores[0].item_id, "x");
        assert_eq!(scores[0].count, 2);
        // ((0.9 * 1.0 + 0.5 * 0.7) / 2) * (1 + 2 / 2)
        assert!((scores[0].score - 1.25).abs() < 1e-6);

        assert_eq!(scores[1].item_id, "y");
        // (0.9 * 0.2) * (1 + 1 / 2)
        assert!((scores[1].score - 0.27).abs() < 1e-6);
    }

    #[test]
    fn test_only_recent_window_counts() {
        let peers = vec![peer(
            "a",
            1.0,
            &[
                ("old", InteractionType::Purchase),
                ("new1", InteractionType::View),
                ("new2", InteractionType::View),
            ],
        )];
        let scores = aggregate_peer_scores(&peers, &InteractionWeights::collaborative_default(), 2);

        let ids: Vec<_> = scores.iter().map(|s| s.item_id.as_str()).collect();
        assert_eq!(ids, vec!["new1", "new2"]);
    }

    #[test]
    fn test_no_peers_no_scores() {
        assert!(aggregate_peer_scores(&[], &InteractionWeights::collaborative_default(), 10).is_empty());
    }
}
