use anyhow::{bail, Context, Result};
use recommendation_engine::clients::{
    EmbeddingService, HashingEmbedder, InMemoryInteractionLog, InMemoryVectorStore, Point,
    VectorStore,
};
use recommendation_engine::models::{InteractionEvent, InteractionOutcome};
use recommendation_engine::services::to_store_id;
use recommendation_engine::{Config, Engine};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// One catalog entry of the replay input
#[derive(Debug, Deserialize)]
struct CatalogRecord {
    id: String,
    /// Embedded from name and description when absent
    #[serde(default)]
    vector: Option<Vec<f32>>,
    #[serde(default)]
    payload: Value,
}

async fn load_catalog(
    path: &str,
    store: &InMemoryVectorStore,
    embedder: &HashingEmbedder,
    config: &Config,
) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read catalog {}", path))?;
    let records: Vec<CatalogRecord> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid catalog JSON in {}", path))?;

    let mut points = Vec::with_capacity(records.len());
    for record in records {
        let mut payload = match record.payload {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                warn!(item_id = %record.id, payload = %other, "Catalog payload is not an object, skipping");
                continue;
            }
        };
        payload
            .entry("id")
            .or_insert_with(|| Value::String(record.id.clone()));

        let vector = match record.vector {
            Some(vector) => vector,
            None => {
                let text = ["name", "title", "description"]
                    .iter()
                    .filter_map(|key| payload.get(*key).and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(" ");
                match embedder.embed(&text).await {
                    Ok(vector) => vector,
                    Err(e) => {
                        warn!(item_id = %record.id, error = %e, "Cannot embed catalog item, skipping");
                        continue;
                    }
                }
            }
        };

        points.push(Point::single(
            to_store_id(&record.id),
            config.engine.item_vector.as_deref(),
            vector,
            Value::Object(payload),
        ));
    }

    let count = points.len();
    store
        .upsert(&config.engine.products_collection, points)
        .await
        .context("Failed to index catalog")?;
    Ok(count)
}

fn parse_events(raw: &str) -> Vec<InteractionEvent> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(line = n + 1, error = %e, "Skipping unreadable event");
                None
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env().context("Failed to load config")?;
    let replay = config.replay.clone();
    let (Some(catalog_path), Some(user_id)) = (replay.catalog_path, replay.user_id) else {
        bail!("RECO_CATALOG_PATH and RECO_USER_ID must be set");
    };

    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(HashingEmbedder::default());
    let interactions = Arc::new(InMemoryInteractionLog::new());

    let indexed = load_catalog(&catalog_path, &store, &embedder, &config).await?;
    info!(indexed, path = %catalog_path, "Catalog loaded");

    let engine = Engine::new(config, store, embedder, interactions);

    if let Some(events_path) = replay.events_path {
        let raw = tokio::fs::read_to_string(&events_path)
            .await
            .with_context(|| format!("Failed to read events {}", events_path))?;
        let events = parse_events(&raw);
        let total = events.len();

        let mut applied = 0usize;
        for event in events {
            match engine.apply_interaction(event).await {
                Ok(InteractionOutcome::Applied) => applied += 1,
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Event not applied"),
            }
        }
        info!(total, applied, "Events replayed");
    }

    let response = engine.recommend(&user_id, replay.limit, None).await;
    info!(
        user_id = %user_id,
        strategy = response.strategy.as_str(),
        degraded = response.degraded,
        count = response.results.len(),
        "Recommendations ready"
    );
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_events_skips_bad_lines() {
        let raw = r#"{"user_id":"u1","item_id":"a","type":"view"}

not json
{"user_id":"u1","type":"search","metadata":{"query":"shoes"}}"#;
        let events = parse_events(raw);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].item_id, None);
    }
}
