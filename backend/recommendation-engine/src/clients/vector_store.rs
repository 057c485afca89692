use crate::error::UpstreamError;
use crate::models::StoreId;
use crate::utils::parse_amount;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Key used for points stored with a single unnamed vector
pub const DEFAULT_VECTOR: &str = "";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: StoreId,
    pub vectors: HashMap<String, Vec<f32>>,
    #[serde(default)]
    pub payload: Value,
}

impl Point {
    pub fn new(id: StoreId, vector: Vec<f32>, payload: Value) -> Self {
        let mut vectors = HashMap::new();
        vectors.insert(DEFAULT_VECTOR.to_string(), vector);
        Self {
            id,
            vectors,
            payload,
        }
    }

    /// One vector stored under `name`, or in the unnamed slot
    pub fn single(id: StoreId, name: Option<&str>, vector: Vec<f32>, payload: Value) -> Self {
        let mut vectors = HashMap::new();
        vectors.insert(name.unwrap_or(DEFAULT_VECTOR).to_string(), vector);
        Self {
            id,
            vectors,
            payload,
        }
    }

    pub fn with_vector(mut self, name: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(name.into(), vector);
        self
    }

    /// Resolve the vector addressed by `using`.
    ///
    /// Without a name the unnamed vector is used, or the only vector when there is just one.
    pub fn vector(&self, using: Option<&str>) -> Option<&[f32]> {
        match using {
            Some(name) => self.vectors.get(name).map(Vec::as_slice),
            None => self
                .vectors
                .get(DEFAULT_VECTOR)
                .or_else(|| {
                    if self.vectors.len() == 1 {
                        self.vectors.values().next()
                    } else {
                        None
                    }
                })
                .map(Vec::as_slice),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: StoreId,
    pub score: f32,
    pub payload: Value,
}

/// Maximal marginal relevance settings for a query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mmr {
    /// 0.0 is pure relevance, 1.0 is pure diversity
    pub diversity: f32,
    pub candidates_limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Range {
        key: String,
        gte: Option<f64>,
        lte: Option<f64>,
    },
    Match {
        key: String,
        value: Value,
    },
    MatchAny {
        key: String,
        values: Vec<Value>,
    },
    HasId(Vec<StoreId>),
}

impl Condition {
    pub fn range(key: impl Into<String>, gte: Option<f64>, lte: Option<f64>) -> Self {
        Condition::Range {
            key: key.into(),
            gte,
            lte,
        }
    }

    pub fn matches(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Match {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn match_any(key: impl Into<String>, values: Vec<Value>) -> Self {
        Condition::MatchAny {
            key: key.into(),
            values,
        }
    }

    /// Evaluate against a point. Missing keys never match.
    pub fn check(&self, id: StoreId, payload: &Value) -> bool {
        match self {
            Condition::Range { key, gte, lte } => {
                match payload.get(key).and_then(parse_amount) {
                    Some(n) => gte.map_or(true, |g| n >= g) && lte.map_or(true, |l| n <= l),
                    None => false,
                }
            }
            Condition::Match { key, value } => payload
                .get(key)
                .map_or(false, |field| field_matches(field, value)),
            Condition::MatchAny { key, values } => payload
                .get(key)
                .map_or(false, |field| values.iter().any(|v| field_matches(field, v))),
            Condition::HasId(ids) => ids.contains(&id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub must: Vec<Condition>,
    pub must_not: Vec<Condition>,
}

impl Filter {
    pub fn must(mut self, condition: Condition) -> Self {
        self.must.push(condition);
        self
    }

    pub fn must_not(mut self, condition: Condition) -> Self {
        self.must_not.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    pub fn check(&self, id: StoreId, payload: &Value) -> bool {
        self.must.iter().all(|c| c.check(id, payload))
            && !self.must_not.iter().any(|c| c.check(id, payload))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub vector: Vec<f32>,
    /// Named vector to search against
    pub using: Option<String>,
    pub limit: usize,
    pub filter: Option<Filter>,
    pub score_threshold: Option<f32>,
    pub mmr: Option<Mmr>,
}

impl QueryRequest {
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector,
            using: None,
            limit,
            filter: None,
            score_threshold: None,
            mmr: None,
        }
    }

    pub fn using(mut self, name: Option<String>) -> Self {
        self.using = name;
        self
    }

    pub fn filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter.filter(|f| !f.is_empty());
        self
    }

    pub fn score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn mmr(mut self, mmr: Option<Mmr>) -> Self {
        self.mmr = mmr;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<Point>,
    /// Id to resume from, `None` when the collection is exhausted
    pub next_cursor: Option<StoreId>,
}

/// Nearest-neighbor store holding item and profile points
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<(), UpstreamError>;

    async fn query(
        &self,
        collection: &str,
        request: QueryRequest,
    ) -> Result<Vec<ScoredPoint>, UpstreamError>;

    async fn retrieve(
        &self,
        collection: &str,
        ids: &[StoreId],
        with_vectors: bool,
    ) -> Result<Vec<Point>, UpstreamError>;

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        cursor: Option<StoreId>,
        limit: usize,
    ) -> Result<ScrollPage, UpstreamError>;
}

fn field_matches(field: &Value, wanted: &Value) -> bool {
    match field {
        Value::Array(items) => items.iter().any(|item| scalar_eq(item, wanted)),
        other => scalar_eq(other, wanted),
    }
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (parse_amount(a), parse_amount(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => a == b,
    }
}
