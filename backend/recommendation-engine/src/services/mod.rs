pub mod diversity;
pub mod id_mapper;
pub mod profile_builder;
pub mod query_builder;
pub mod ranking;
pub mod recall;
pub mod retrieval;

pub use diversity::DiversityLayer;
pub use id_mapper::to_store_id;
pub use profile_builder::{ProfileStore, ProfileUpdater, VectorProfileStore};
pub use query_builder::{QueryVector, QueryVectorBuilder, Seed};
pub use ranking::HybridScorer;
pub use recall::{
    Candidate, PersonalizedRecallStrategy, RecallContext, RecallStrategy, TrendingRecallStrategy,
    UserCfRecallStrategy,
};
pub use retrieval::{RetrievalAdapter, SearchRequest};
