use crate::models::{ItemResult, RecommendationResult};

/// Anything the diversity layer can reorder
pub trait Branded {
    fn brand(&self) -> &str;
    fn score(&self) -> f32;
}

impl Branded for ItemResult {
    fn brand(&self) -> &str {
        &self.brand
    }

    fn score(&self) -> f32 {
        self.score
    }
}

impl Branded for RecommendationResult {
    fn brand(&self) -> &str {
        &self.item.brand
    }

    fn score(&self) -> f32 {
        self.score
    }
}

/// Diversity Layer - brand-aware greedy rerank
///
/// Repeatedly places the highest-scoring remaining item whose brand differs from the one
/// placed just before it. When every remaining item shares that brand the best-scoring one
/// is placed anyway. Ties keep input order.
#[derive(Debug, Clone, Default)]
pub struct DiversityLayer;

impl DiversityLayer {
    pub fn new() -> Self {
        Self
    }

    /// Returns a permutation of `items`
    pub fn rerank<T: Branded>(&self, items: Vec<T>) -> Vec<T> {
        if items.len() <= 1 {
            return items;
        }

        let mut remaining: Vec<(String, T)> = items
            .into_iter()
            .map(|item| (normalize_brand(item.brand()), item))
            .collect();
        let mut reranked = Vec::with_capacity(remaining.len());
        let mut last_brand: Option<String> = None;

        while !remaining.is_empty() {
            let idx = best_index(&remaining, last_brand.as_deref())
                .or_else(|| best_index(&remaining, None))
                .unwrap_or(0);

            let (brand, item) = remaining.remove(idx);
            last_brand = Some(brand);
            reranked.push(item);
        }

        reranked
    }
}

/// Highest-scoring entry whose brand differs from `excluded`; strict `>` keeps the first of equals
fn best_index<T: Branded>(remaining: &[(String, T)], excluded: Option<&str>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, (brand, item)) in remaining.iter().enumerate() {
        if excluded == Some(brand.as_str()) {
            continue;
        }
        let score = item.score();
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

fn normalize_brand(brand: &str) -> String {
    let brand = brand.trim().to_lowercase();
    if brand.is_empty() {
        "unknown".to_string()
    } else {
        brand
    }
}
