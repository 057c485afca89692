//! Upstream collaborators consumed by the engine.
//!
//! Each seam is an async trait so deployments can plug a real vector database, embedding model
//! or event store. The in-memory implementations back the tests and the replay binary.
pub mod embedding;
pub mod interaction_log;
pub mod memory;
pub mod vector_store;

pub use embedding::{EmbeddingService, HashingEmbedder};
pub use interaction_log::{InMemoryInteractionLog, InteractionLog};
pub use memory::InMemoryVectorStore;
pub use vector_store::{
    Condition, Filter, Mmr, Point, QueryRequest, ScoredPoint, ScrollPage, VectorStore,
    DEFAULT_VECTOR,
};
