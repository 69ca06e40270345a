use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};

use crate::domain::{CurrentEvent, Event};

/// Current-event snapshot shared by the watchers and the submission gate.
///
/// Writers replace the whole snapshot; readers get an `Arc` to whichever
/// snapshot was installed when they looked, never a half-updated one.
#[derive(Debug, Default)]
pub struct EventCache {
    current: ArcSwapOption<CurrentEvent>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, snapshot: CurrentEvent) {
        self.current.store(Some(Arc::new(snapshot)));
    }

    pub fn clear(&self) {
        self.current.store(None);
    }

    pub fn current(&self) -> Option<Arc<CurrentEvent>> {
        self.current.load_full()
    }

    pub fn event(&self) -> Option<Event> {
        self.current().map(|snapshot| snapshot.event.clone())
    }

    pub fn next_refresh(&self) -> Option<DateTime<Utc>> {
        self.current().and_then(|snapshot| snapshot.next_refresh)
    }
}
