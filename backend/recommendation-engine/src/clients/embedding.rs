use crate::error::UpstreamError;
use crate::utils::normalize;
use async_trait::async_trait;

/// Maps text or images to fixed-length, L2-normalized vectors
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError>;

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>, UpstreamError>;

    /// Tag of the model/version producing the vectors
    fn model_id(&self) -> String;

    fn dimension(&self) -> usize;
}

/// Feature-hashed bag-of-words embedder.
///
/// Deterministic and dependency free: each token lands in three signed buckets chosen by
/// seeded FNV-1a hashes, adjacent token pairs add a weaker bigram bucket, and the result is
/// L2-normalized. Images are embedded the same way over 8-byte shingles.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub const MODEL_ID: &'static str = "hashing-fnv1a-v1";

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_tokens(&self, tokens: &[String]) -> Option<Vec<f32>> {
        if tokens.is_empty() {
            return None;
        }

        let mut v = vec![0.0_f32; self.dimension];
        let total = tokens.len() as f32;

        for token in tokens {
            let weight = (1.0 / total) * (1.0 + 1.0 / (token.len() as f32).sqrt());
            for (seed, scale) in [(0_u64, 1.0_f32), (1, 0.7), (2, 0.5)] {
                let bucket = hash_term(token.as_bytes(), seed) % self.dimension;
                let sign = if hash_term(token.as_bytes(), seed + 3) % 2 == 0 {
                    1.0
                } else {
                    -1.0
                };
                v[bucket] += weight * sign * scale;
            }
        }

        for pair in tokens.windows(2) {
            let bigram = format!("{}_{}", pair[0], pair[1]);
            let bucket = hash_term(bigram.as_bytes(), 6) % self.dimension;
            let sign = if hash_term(bigram.as_bytes(), 7) % 2 == 0 {
                1.0
            } else {
                -1.0
            };
            v[bucket] += sign * 0.3 / total;
        }

        normalize(&v)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        self.embed_tokens(&tokenize(text))
            .ok_or_else(|| UpstreamError::InvalidRequest("text has no embeddable tokens".into()))
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>, UpstreamError> {
        let shingles: Vec<String> = image
            .chunks(8)
            .map(|chunk| chunk.iter().map(|b| format!("{:02x}", b)).collect())
            .collect();
        self.embed_tokens(&shingles)
            .ok_or_else(|| UpstreamError::InvalidRequest("image is empty".into()))
    }

    fn model_id(&self) -> String {
        format!("{}-{}", Self::MODEL_ID, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 2)
        .map(String::from)
        .collect()
}

fn hash_term(term: &[u8], seed: u64) -> usize {
    let mut h: u64 = 14695981039346656037_u64.wrapping_add(seed.wrapping_mul(6364136223846793005));
    for b in term {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    h as usize
}
