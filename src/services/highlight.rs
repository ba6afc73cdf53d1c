use crate::services::item_registry::ItemId;
use crate::services::region_registry::RegionId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Element that can flash briefly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HighlightTarget {
    ItemRow(ItemId),
    RegionBorder(RegionId),
}

/// Short-lived presentation flags; never touches item or region data.
///
/// Callers pass `now` explicitly so redraw loops and tests share one clock.
#[derive(Debug)]
pub struct HighlightTracker {
    duration: Duration,
    active: HashMap<HighlightTarget, Instant>,
}

impl HighlightTracker {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            active: HashMap::new(),
        }
    }

    /// Start (or restart) the highlight of a target
    pub fn flash(&mut self, target: HighlightTarget, now: Instant) {
        self.active.insert(target, now + self.duration);
    }

    pub fn is_active(&self, target: HighlightTarget, now: Instant) -> bool {
        self.active.get(&target).is_some_and(|until| now < *until)
    }

    /// Drop expired highlights and return them so the view can revert them
    pub fn expire(&mut self, now: Instant) -> Vec<HighlightTarget> {
        let expired: Vec<HighlightTarget> = self
            .active
            .iter()
            .filter(|(_, until)| now >= **until)
            .map(|(target, _)| *target)
            .collect();
        for target in &expired {
            self.active.remove(target);
        }
        expired
    }

    /// Forget a target whose element was deleted
    pub fn forget(&mut self, target: HighlightTarget) {
        self.active.remove(&target);
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Default for HighlightTracker {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}
