use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::{Millis, RoundIndex};

/// Latest accepted plant time, shared between plant and boot tasks.
///
/// A boot cycle reads it right before submitting work, so a plant that lands
/// while the pow program runs still pushes the work window back.
#[derive(Clone, Default)]
pub struct PlantClock {
    inner: Arc<Mutex<Option<(RoundIndex, Millis)>>>,
}

impl PlantClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<(RoundIndex, Millis)>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record an accepted plant. Within one round only the latest time is kept.
    pub fn record(&self, index: RoundIndex, at: Millis) {
        let mut last = self.lock();
        match *last {
            Some((i, prev)) if i == index && prev >= at => {}
            _ => *last = Some((index, at)),
        }
    }

    /// Latest plant time seen for `index`.
    pub fn latest(&self, index: RoundIndex) -> Option<Millis> {
        match *self.lock() {
            Some((i, at)) if i == index => Some(at),
            _ => None,
        }
    }
}
