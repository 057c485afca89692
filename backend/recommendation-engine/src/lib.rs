pub mod clients;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use engine::{Engine, SearchOptions};
pub use error::{EngineError, Result, UpstreamError};
pub use services::{DiversityLayer, HybridScorer, QueryVectorBuilder, RetrievalAdapter, Seed};
