use crate::error::{KioskError, Result};
use crate::models::region::{Region, Surface};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Stable handle of a region overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(u64);

impl RegionId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionEvent {
    Added(RegionId),
    Removed(RegionId),
    /// Dragged or resized
    Moved(RegionId),
    /// Caption must be redrawn; geometry untouched
    LabelRefreshed(RegionId),
    Cleared,
}

pub trait RegionObserver: Send + Sync {
    fn regions_changed(&self, registry: &RegionRegistry, event: RegionEvent);
}

/// Ordered overlays; later regions are drawn on top
#[derive(Default)]
pub struct RegionRegistry {
    entries: Vec<(RegionId, Region)>,
    next_id: u64,
    observers: Vec<Arc<dyn RegionObserver>>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn RegionObserver>) {
        self.observers.push(observer);
    }

    pub fn add(&mut self, region: Region) -> RegionId {
        let id = RegionId(self.next_id);
        self.next_id += 1;
        debug!(%id, x = region.x, y = region.y, w = region.width, h = region.height, "region added");
        self.entries.push((id, region));
        self.notify(RegionEvent::Added(id));
        id
    }

    pub fn remove(&mut self, id: RegionId) -> Option<Region> {
        let position = self.entries.iter().position(|(i, _)| *i == id)?;
        let (_, region) = self.entries.remove(position);
        debug!(%id, "region removed");
        self.notify(RegionEvent::Removed(id));
        Some(region)
    }

    /// Replace geometry after a drag or resize
    pub fn set_geometry(&mut self, id: RegionId, region: Region) -> Result<()> {
        let slot = self
            .entries
            .iter_mut()
            .find(|(i, _)| *i == id)
            .ok_or(KioskError::UnknownRegion(id.raw()))?;
        slot.1 = region;
        self.notify(RegionEvent::Moved(id));
        Ok(())
    }

    /// Ask observers to redraw the caption of one region
    pub fn refresh_label(&self, id: RegionId) -> Result<()> {
        if self.get(id).is_none() {
            return Err(KioskError::UnknownRegion(id.raw()));
        }
        self.notify(RegionEvent::LabelRefreshed(id));
        Ok(())
    }

    /// Re-place every region for a resized display surface
    pub fn rescale(&mut self, from: Surface, to: Surface) -> Result<()> {
        for (_, region) in &mut self.entries {
            *region = region.scaled(from, to)?;
        }
        for id in self.ids() {
            self.notify(RegionEvent::Moved(id));
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Vec<RegionId> {
        let removed: Vec<RegionId> = self.entries.drain(..).map(|(id, _)| id).collect();
        self.notify(RegionEvent::Cleared);
        removed
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.entries.iter().find(|(i, _)| *i == id).map(|(_, r)| r)
    }

    /// Topmost region under a point
    pub fn hit_test(&self, x: f64, y: f64) -> Option<RegionId> {
        self.entries
            .iter()
            .rev()
            .find(|(_, region)| region.contains(x, y))
            .map(|(id, _)| *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &Region)> {
        self.entries.iter().map(|(id, region)| (*id, region))
    }

    pub fn ids(&self) -> Vec<RegionId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn notify(&self, event: RegionEvent) {
        for observer in &self.observers {
            observer.regions_changed(self, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct EventLog(Mutex<Vec<RegionEvent>>);

    impl RegionObserver for EventLog {
        fn regions_changed(&self, _registry: &RegionRegistry, event: RegionEvent) {
            self.0.lock().push(event);
        }
    }

    #[test]
    fn test_add_remove() {
        let mut registry = RegionRegistry::new();
        let a = registry.add(Region::new(0.0, 0.0, 10.0, 10.0));
        let b = registry.add(Region::new(5.0, 5.0, 10.0, 10.0));
        assert_eq!(registry.len(), 2);
        assert_ne!(a, b);

        assert_eq!(registry.remove(a), Some(Region::new(0.0, 0.0, 10.0, 10.0)));
        assert!(registry.remove(a).is_none());
        assert_eq!(registry.ids(), vec![b]);
    }

    #[test]
    fn test_hit_test_prefers_topmost() {
        let mut registry = RegionRegistry::new();
        let below = registry.add(Region::new(0.0, 0.0, 100.0, 100.0));
        let above = registry.add(Region::new(50.0, 50.0, 100.0, 100.0));

        assert_eq!(registry.hit_test(75.0, 75.0), Some(above));
        assert_eq!(registry.hit_test(10.0, 10.0), Some(below));
        assert_eq!(registry.hit_test(500.0, 500.0), None);
    }

    #[test]
    fn test_set_geometry_unknown() {
        let mut registry = RegionRegistry::new();
        let id = registry.add(Region::new(0.0, 0.0, 10.0, 10.0));
        registry.remove(id);
        let err = registry.set_geometry(id, Region::new(1.0, 1.0, 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, KioskError::UnknownRegion(_)));
    }

    #[test]
    fn test_rescale() {
        let mut registry = RegionRegistry::new();
        let id = registry.add(Region::new(80.0, 60.0, 320.0, 240.0));
        registry
            .rescale(Surface::new(800.0, 600.0), Surface::new(1600.0, 1200.0))
            .unwrap();
        let region = registry.get(id).unwrap();
        assert!((region.x - 160.0).abs() < 1e-9);
        assert!((region.height - 480.0).abs() < 1e-9);
    }

    #[test]
    fn test_events() {
        let mut registry = RegionRegistry::new();
        let log = Arc::new(EventLog::default());
        registry.subscribe(log.clone());

        let id = registry.add(Region::new(0.0, 0.0, 10.0, 10.0));
        registry.set_geometry(id, Region::new(1.0, 0.0, 10.0, 10.0)).unwrap();
        registry.refresh_label(id).unwrap();
        registry.remove(id);

        assert_eq!(
            *log.0.lock(),
            vec![
                RegionEvent::Added(id),
                RegionEvent::Moved(id),
                RegionEvent::LabelRefreshed(id),
                RegionEvent::Removed(id)
            ]
        );
    }
}
