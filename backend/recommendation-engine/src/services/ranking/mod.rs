//! Hybrid Recommendation Scorer
//!
//! Merges personal and collaborative candidates into one ranked list:
//! `final = personal * personal_share + collaborative * collaborative_share`, where an item
//! found by both strategies collects both terms. Items the user already interacted with are
//! dropped. Every result carries the sources that found it and a short explanation.
use crate::models::{RecommendationResult, RecommendationSource, UserProfile};
use crate::services::recall::Candidate;
use std::collections::{BTreeSet, HashMap, HashSet};

pub struct HybridScorer {
    personal_share: f32,
    collaborative_share: f32,
}

impl HybridScorer {
    pub fn new(personal_share: f32, collaborative_share: f32) -> Self {
        Self {
            personal_share,
            collaborative_share,
        }
    }

    fn share(&self, source: RecommendationSource) -> f32 {
        match source {
            RecommendationSource::Personal => self.personal_share,
            RecommendationSource::Collaborative => self.collaborative_share,
            RecommendationSource::Trending | RecommendationSource::BySeed => 1.0,
        }
    }

    /// Weighted merge of both candidate pools, top `limit` by final score
    pub fn combine(
        &self,
        personal: Vec<Candidate>,
        collaborative: Vec<Candidate>,
        profile: &UserProfile,
        limit: usize,
    ) -> Vec<RecommendationResult> {
        let mut merged: Vec<Merged> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for candidate in personal.into_iter().chain(collaborative) {
            if profile.has_interacted_with(&candidate.item.id) {
                continue;
            }
            let contribution = candidate.score * self.share(candidate.source);

            match index.get(&candidate.item.id) {
                Some(&at) => {
                    let entry = &mut merged[at];
                    // A repeat from the same strategy adds nothing
                    if entry.sources.insert(candidate.source) {
                        entry.score += contribution;
                        entry.peer_count = entry.peer_count.max(candidate.peer_count);
                    }
                }
                None => {
                    index.insert(candidate.item.id.clone(), merged.len());
                    merged.push(Merged {
                        score: contribution,
                        sources: BTreeSet::from([candidate.source]),
                        peer_count: candidate.peer_count,
                        candidate,
                    });
                }
            }
        }

        // Stable sort keeps personal-first order among equal scores
        merged.sort_by(|a, b| b.score.total_cmp(&a.score));
        merged.truncate(limit);
        merged.into_iter().map(Merged::into_result).collect()
    }

    /// Results from a single strategy, scores untouched, duplicates dropped
    pub fn single_source(&self, candidates: Vec<Candidate>, limit: usize) -> Vec<RecommendationResult> {
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|c| seen.insert(c.item.id.clone()))
            .take(limit)
            .map(|candidate| {
                Merged {
                    score: candidate.score,
                    sources: BTreeSet::from([candidate.source]),
                    peer_count: candidate.peer_count,
                    candidate,
                }
                .into_result()
            })
            .collect()
    }
}

struct Merged {
    candidate: Candidate,
    score: f32,
    sources: BTreeSet<RecommendationSource>,
    peer_count: usize,
}

impl Merged {
    fn into_result(self) -> RecommendationResult {
        let mut item = self.candidate.item;
        item.score = self.score;
        RecommendationResult {
            item_id: item.id.clone(),
            score: self.score,
            explanation: explain(&self.sources, self.peer_count),
            sources: self.sources,
            item,
        }
    }
}

/// Human-readable reason for a recommendation
pub fn explain(sources: &BTreeSet<RecommendationSource>, peer_count: usize) -> String {
    let personal = sources.contains(&RecommendationSource::Personal);
    let collaborative = sources.contains(&RecommendationSource::Collaborative);

    if personal && collaborative {
        format!("Matches your taste and liked by {} similar users", peer_count)
    } else if collaborative {
        format!("Liked by {} users with similar taste", peer_count)
    } else if personal {
        "Based on your preferences and history".to_string()
    } else if sources.contains(&RecommendationSource::Trending) {
        "Popular product".to_string()
    } else if sources.contains(&RecommendationSource::BySeed) {
        "Similar to your wishlist, cart or search".to_string()
    } else {
        "Recommended for you".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Budget, InteractionRecord, InteractionType, ItemResult};
    use chrono::Utc;
    use std::collections::{BTreeMap, VecDeque};

    fn candidate(id: &str, source: RecommendationSource, score: f32, peers: usize) -> Candidate {
        let item = ItemResult {
            id: id.to_string(),
            store_id: 0,
            score,
            name: id.to_string(),
            description: String::new(),
            category: "General".to_string(),
            brand: "acme".to_string(),
            price: 10.0,
            initial_price: 0.0,
            currency: "$".to_string(),
            rating: 4.0,
            review_count: None,
            image: None,
            image_urls: vec![],
            url: None,
            discount: None,
            available: None,
            payment_methods: vec![],
        };
        Candidate {
            item,
            source,
            score,
            peer_count: peers,
        }
    }

    fn profile(history: &[&str]) -> UserProfile {
        let now = Utc::now();
        UserProfile {
            user_id: "u1".to_string(),
            taste_vector: vec![1.0],
            budget: Budget {
                min: 1.0,
                max: 2.0,
                confidence: 0.5,
            },
            category_affinity: BTreeMap::new(),
            recent_interactions: history
                .iter()
                .map(|id| InteractionRecord {
                    item_id: id.to_string(),
                    interaction_type: InteractionType::View,
                    timestamp: now,
                })
                .collect::<VecDeque<_>>(),
            total_interactions: history.len() as u64,
            embedding_model: "m".to_string(),
            created_at: now,
            last_updated: now,
        }
    }

    #[test]
    fn test_item_found_by_both_outranks_stronger_personal_only() {
        let scorer = HybridScorer::new(0.4, 0.6);
        let results = scorer.combine(
            vec![
                candidate("solo", RecommendationSource::Personal, 0.9, 0),
                candidate("both", RecommendationSource::Personal, 0.8, 0),
            ],
            vec![candidate("both", RecommendationSource::Collaborative, 0.6, 3)],
            &profile(&[]),
            10,
        );

        assert_eq!(results[0].item_id, "both");
        assert!((results[0].score - 0.68).abs() < 1e-6);
        assert_eq!(
            results[0].explanation,
            "Matches your taste and liked by 3 similar users"
        );
        assert_eq!(results[0].sources.len(), 2);

        assert_eq!(results[1].item_id, "solo");
        assert!((results[1].score - 0.36).abs() < 1e-6);
        assert_eq!(results[1].explanation, "Based on your preferences and history");
    }

    #[test]
    fn test_history_is_excluded_and_ids_unique() {
        let scorer = HybridScorer::new(0.4, 0.6);
        let results = scorer.combine(
            vec![
                candidate("seen", RecommendationSource::Personal, 0.99, 0),
                candidate("a", RecommendationSource::Personal, 0.5, 0),
                candidate("a", RecommendationSource::Personal, 0.5, 0),
            ],
            vec![candidate("b", RecommendationSource::Collaborative, 0.1, 1)],
            &profile(&["seen"]),
            10,
        );

        let ids: Vec<_> = results.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!((results[0].score - 0.2).abs() < 1e-6);
        assert_eq!(results[1].explanation, "Liked by 1 users with similar taste");
    }

    #[test]
    fn test_combine_truncates_to_limit() {
        let scorer = HybridScorer::new(0.4, 0.6);
        let personal = (0..10)
            .map(|i| candidate(&format!("p{}", i), RecommendationSource::Personal, i as f32 / 10.0, 0))
            .collect();
        let results = scorer.combine(personal, vec![], &profile(&[]), 3);

        let ids: Vec<_> = results.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["p9", "p8", "p7"]);
    }

    #[test]
    fn test_single_source_keeps_scores() {
        let scorer = HybridScorer::new(0.4, 0.6);
        let results = scorer.single_source(
            vec![
                candidate("t1", RecommendationSource::Trending, 0.9, 0),
                candidate("t1", RecommendationSource::Trending, 0.9, 0),
                candidate("t2", RecommendationSource::Trending, 0.8, 0),
            ],
            5,
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].score, 0.9);
        assert_eq!(results[0].explanation, "Popular product");
    }
}
