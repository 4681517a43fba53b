//! In-flight registry
//!
//! The transport only reports raw handle ids when something finishes. The
//! registry maps those ids back to the caller's user data.

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use super::error::SchedulerError;
use crate::transport::HandleId;

/// An admitted request
#[derive(Debug)]
pub struct InFlight<T> {
    pub user_data: Option<T>,
    pub admitted_at: Instant,
}

/// Table of admitted requests keyed by handle id
#[derive(Debug)]
pub struct InFlightRegistry<T> {
    entries: HashMap<HandleId, InFlight<T>>,
}

impl<T> InFlightRegistry<T> {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Record an admitted request
    pub fn admit(&mut self, id: HandleId, user_data: Option<T>) -> Result<(), SchedulerError> {
        if self.entries.contains_key(&id) {
            return Err(SchedulerError::DuplicateHandle(id));
        }
        debug!(%id, "InFlightRegistry::admit: called");
        self.entries.insert(
            id,
            InFlight {
                user_data,
                admitted_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Remove a finished request and hand back its entry
    pub fn resolve(&mut self, id: HandleId) -> Result<InFlight<T>, SchedulerError> {
        debug!(%id, "InFlightRegistry::resolve: called");
        self.entries.remove(&id).ok_or(SchedulerError::UnknownHandle(id))
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids currently in flight, in ascending order
    pub fn ids(&self) -> Vec<HandleId> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl<T> Default for InFlightRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
