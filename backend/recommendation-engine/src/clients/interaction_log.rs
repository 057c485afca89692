use crate::error::UpstreamError;
use crate::models::InteractionEvent;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Append-only record of who did what to which item
#[async_trait]
pub trait InteractionLog: Send + Sync {
    async fn record(&self, event: InteractionEvent) -> Result<(), UpstreamError>;

    /// Most recent first
    async fn last_n(&self, user_id: &str, n: usize) -> Result<Vec<InteractionEvent>, UpstreamError>;
}

#[derive(Debug, Default)]
pub struct InMemoryInteractionLog {
    events: RwLock<HashMap<String, Vec<InteractionEvent>>>,
}

impl InMemoryInteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl InteractionLog for InMemoryInteractionLog {
    async fn record(&self, event: InteractionEvent) -> Result<(), UpstreamError> {
        self.events
            .write()
            .entry(event.user_id.clone())
            .or_default()
            .push(event);
        Ok(())
    }

    async fn last_n(&self, user_id: &str, n: usize) -> Result<Vec<InteractionEvent>, UpstreamError> {
        let events = self.events.read();
        let mut recent: Vec<InteractionEvent> = events
            .get(user_id)
            .map(|list| list.iter().rev().take(n).cloned().collect())
            .unwrap_or_default();
        // Appends can arrive out of timestamp order
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InteractionType;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_last_n_is_most_recent_first() {
        let log = InMemoryInteractionLog::new();
        let now = Utc::now();

        for (i, item) in ["a", "b", "c"].iter().enumerate() {
            log.record(
                InteractionEvent::new("u1", *item, InteractionType::View)
                    .at(now + Duration::seconds(i as i64)),
            )
            .await
            .unwrap();
        }
        log.record(InteractionEvent::new("u2", "z", InteractionType::Cart))
            .await
            .unwrap();

        let recent = log.last_n("u1", 2).await.unwrap();
        let ids: Vec<_> = recent.iter().filter_map(|e| e.item_id.as_deref()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(log.len(), 4);
        assert!(log.last_n("nobody", 5).await.unwrap().is_empty());
    }

    #[test]
    fn test_search_events_keep_their_query() {
        let log = InMemoryInteractionLog::new();
        tokio_test::block_on(log.record(InteractionEvent::search("u1", "linen shirt"))).unwrap();

        let recent = tokio_test::block_on(log.last_n("u1", 1)).unwrap();
        assert_eq!(recent[0].interaction_type, InteractionType::Search);
        assert_eq!(recent[0].metadata["query"], "linen shirt");
        assert!(recent[0].item_id.is_none());
    }
}
