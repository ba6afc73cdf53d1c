use crate::error::{KioskError, Result};
use crate::services::item_registry::ItemId;
use crate::services::region_registry::RegionId;
use std::collections::HashMap;

/// One-to-one optional association between items and regions.
///
/// Both directions are stored so either side can be resolved in O(1);
/// every mutation keeps the two maps mirror images of each other.
#[derive(Debug, Default)]
pub struct LinkTable {
    item_to_region: HashMap<ItemId, RegionId>,
    region_to_item: HashMap<RegionId, ItemId>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link both ways; fails if either side is already linked
    pub fn link(&mut self, item: ItemId, region: RegionId) -> Result<()> {
        if let Some(existing) = self.item_to_region.get(&item) {
            return Err(KioskError::AlreadyLinked(format!(
                "{} is already linked to {}",
                item, existing
            )));
        }
        if let Some(existing) = self.region_to_item.get(&region) {
            return Err(KioskError::AlreadyLinked(format!(
                "{} is already linked to {}",
                region, existing
            )));
        }
        self.item_to_region.insert(item, region);
        self.region_to_item.insert(region, item);
        Ok(())
    }

    /// Drop the link of an item, returning the region it pointed to
    pub fn unlink_item(&mut self, item: ItemId) -> Option<RegionId> {
        let region = self.item_to_region.remove(&item)?;
        self.region_to_item.remove(&region);
        Some(region)
    }

    /// Drop the link of a region, returning the item it pointed to
    pub fn unlink_region(&mut self, region: RegionId) -> Option<ItemId> {
        let item = self.region_to_item.remove(&region)?;
        self.item_to_region.remove(&item);
        Some(item)
    }

    pub fn region_for(&self, item: ItemId) -> Option<RegionId> {
        self.item_to_region.get(&item).copied()
    }

    pub fn item_for(&self, region: RegionId) -> Option<ItemId> {
        self.region_to_item.get(&region).copied()
    }

    pub fn len(&self) -> usize {
        self.item_to_region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_to_region.is_empty()
    }

    pub fn clear(&mut self) {
        self.item_to_region.clear();
        self.region_to_item.clear();
    }

    /// Each id appears in at most one link and both maps agree
    pub fn check_invariant(&self) -> bool {
        self.item_to_region.len() == self.region_to_item.len()
            && self
                .item_to_region
                .iter()
                .all(|(item, region)| self.region_to_item.get(region) == Some(item))
    }
}
