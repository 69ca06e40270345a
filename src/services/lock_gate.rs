use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::EventCache;
use crate::adapters::CompetitionStore;
use crate::domain::{window_is_open, LockCategory, TenantId};
use crate::error::Result;

/// Answers "may this tenant submit for this category right now?"
#[derive(Clone)]
pub struct LockGate {
    store: Arc<dyn CompetitionStore>,
    cache: Arc<EventCache>,
}

impl LockGate {
    pub fn new(store: Arc<dyn CompetitionStore>, cache: Arc<EventCache>) -> Self {
        Self { store, cache }
    }

    /// Deadline for `category` in the cached current event, if any.
    pub fn deadline(&self, category: LockCategory) -> Option<DateTime<Utc>> {
        let snapshot = self.cache.current()?;
        match category {
            LockCategory::Race => snapshot.event.lock_at,
            LockCategory::Sprint => snapshot.event.sprint_lock_at,
            LockCategory::Season => None,
        }
    }

    pub async fn is_open(&self, tenant: TenantId, category: LockCategory, now: DateTime<Utc>) -> Result<bool> {
        let state = self.store.get_lock(tenant, category).await?;
        Ok(window_is_open(category, state, self.deadline(category), now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::domain::event::fixtures::{at, event};
    use crate::domain::{CurrentEvent, EventFormat, LockChange, LockOverride, Tenant};
    use chrono::Duration;

    async fn gate(format: EventFormat) -> (LockGate, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_tenant(&Tenant {
                id: 1,
                name: "paddock club".to_string(),
            })
            .await
            .unwrap();

        let cache = Arc::new(EventCache::new());
        cache.install(CurrentEvent {
            event: event(4, at(4, 19, 15), format),
            next_refresh: None,
            loaded_at: at(4, 1, 0),
        });
        (LockGate::new(store.clone(), cache), store)
    }

    #[tokio::test]
    async fn test_race_window_closes_at_qualifying() {
        let (gate, _) = gate(EventFormat::Standard).await;
        let lock_at = at(4, 18, 15);

        assert!(gate.is_open(1, LockCategory::Race, lock_at - Duration::minutes(1)).await.unwrap());
        assert!(!gate.is_open(1, LockCategory::Race, lock_at).await.unwrap());
        // Standard weekend has no sprint deadline
        assert!(!gate.is_open(1, LockCategory::Sprint, at(4, 10, 0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_override_beats_deadline() {
        let (gate, store) = gate(EventFormat::Sprint).await;
        store
            .set_lock(&LockChange {
                tenant_id: 1,
                category: LockCategory::Sprint,
                state: Some(LockOverride::Locked),
                actor: "steward".to_string(),
                at: at(4, 10, 0),
            })
            .await
            .unwrap();

        assert!(!gate.is_open(1, LockCategory::Sprint, at(4, 10, 0)).await.unwrap());
        assert!(gate.is_open(1, LockCategory::Race, at(4, 10, 0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_cache_closes_event_windows() {
        let store = Arc::new(MemoryStore::new());
        let gate = LockGate::new(store, Arc::new(EventCache::new()));
        assert!(!gate.is_open(1, LockCategory::Race, at(4, 10, 0)).await.unwrap());
    }
}
