// ============================================
// User Profile Builder
// ============================================
//
// Maintains one profile per user from the interaction stream:
// 1. Taste vector (unit length, same space as item vectors)
// 2. Budget estimate with a confidence
// 3. Category affinity counts
// 4. Bounded history of recent interactions
//
// Architecture:
// ┌──────────────────────────────────────────────┐
// │               ProfileUpdater                 │
// │   per-user lock -> get -> fold -> put        │
// └──────────────────────┬───────────────────────┘
//                        │
// ┌──────────────────────▼───────────────────────┐
// │         ProfileStore (VectorProfileStore)    │
// │   users collection, point id = to_store_id   │
// └──────────────────────────────────────────────┘
//
// The stored taste vector doubles as the query for similar-user lookups,
// so profiles are tagged with the embedding model they were built in.

mod profile_store;
mod profile_updater;

pub use profile_store::{ProfileStore, SimilarUser, VectorProfileStore};
pub use profile_updater::{ItemSignal, ProfileUpdater, ProfileUpdaterConfig};
