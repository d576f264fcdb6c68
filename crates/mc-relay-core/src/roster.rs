//! Latest tick view of live entities, shared with the I/O side for lookups.

use std::sync::{PoisonError, RwLock};

use mc_relay_host_api::{EntityDirectory, LiveEntity};

/// Copy of the most recent complete tick view.
///
/// Written by the publisher at each tick boundary, read by the dispatcher
/// from the I/O task. Lookups never see a mix of two ticks.
#[derive(Debug, Default)]
pub struct Roster {
    entities: RwLock<Vec<LiveEntity>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the view with this tick's entities.
    pub fn replace(&self, entities: &[LiveEntity]) {
        let mut view = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        view.clear();
        view.extend_from_slice(entities);
    }

    pub fn len(&self) -> usize {
        self.entities.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntityDirectory for Roster {
    fn find_by_name(&self, name: &str) -> Option<LiveEntity> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.name == name)
            .cloned()
    }
}
