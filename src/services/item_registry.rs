use crate::error::{KioskError, Result};
use crate::models::item::{Item, ItemPatch};
use crate::models::menu::{MenuField, NutritionTotals};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Stable handle of an item in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(u64);

impl ItemId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// What changed in the list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEvent {
    Added(ItemId),
    Removed(ItemId),
    Changed(ItemId),
    Cleared,
}

/// Receives notifications after each registry mutation
pub trait ItemObserver: Send + Sync {
    /// Fields of one item were replaced
    fn item_changed(&self, registry: &ItemRegistry, id: ItemId) {
        self.list_changed(registry, ItemEvent::Changed(id));
    }

    /// The list gained, lost or replaced members
    fn list_changed(&self, registry: &ItemRegistry, event: ItemEvent);
}

/// Ordered checkout list with at most one selected item
#[derive(Default)]
pub struct ItemRegistry {
    entries: Vec<(ItemId, Item)>,
    next_id: u64,
    selected: Option<ItemId>,
    observers: Vec<Arc<dyn ItemObserver>>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn ItemObserver>) {
        self.observers.push(observer);
    }

    /// Append an item and return its handle
    pub fn add(&mut self, item: Item) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        debug!(%id, name = %item.display_name, price = item.price, "item added");
        self.entries.push((id, item));
        self.notify_list(ItemEvent::Added(id));
        id
    }

    /// Remove an item; clears the selection if it pointed there
    pub fn remove(&mut self, id: ItemId) -> Option<Item> {
        let position = self.position(id)?;
        let (_, item) = self.entries.remove(position);
        if self.selected == Some(id) {
            self.selected = None;
        }
        debug!(%id, "item removed");
        self.notify_list(ItemEvent::Removed(id));
        Some(item)
    }

    /// Replace the fields the patch carries
    pub fn update(&mut self, id: ItemId, patch: &ItemPatch) -> Result<()> {
        let position = self.position(id).ok_or(KioskError::UnknownItem(id.raw()))?;
        self.entries[position].1.apply(patch);
        debug!(%id, "item updated");
        for observer in &self.observers {
            observer.item_changed(self, id);
        }
        Ok(())
    }

    /// Drop every item, returning the removed handles in list order
    pub fn clear(&mut self) -> Vec<ItemId> {
        let removed: Vec<ItemId> = self.entries.drain(..).map(|(id, _)| id).collect();
        self.selected = None;
        self.notify_list(ItemEvent::Cleared);
        removed
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.entries.iter().find(|(i, _)| *i == id).map(|(_, item)| item)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: ItemId) -> Option<usize> {
        self.entries.iter().position(|(i, _)| *i == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &Item)> {
        self.entries.iter().map(|(id, item)| (*id, item))
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All items whose field equals `value` exactly, in list order
    pub fn find_by(&self, field: MenuField, value: &str) -> Vec<ItemId> {
        self.entries
            .iter()
            .filter(|(_, item)| item.field_value(field) == value)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn set_selected(&mut self, id: ItemId) -> Result<()> {
        if !self.contains(id) {
            return Err(KioskError::UnknownItem(id.raw()));
        }
        self.selected = Some(id);
        Ok(())
    }

    pub fn selected(&self) -> Option<ItemId> {
        self.selected
    }

    pub fn total_price(&self) -> i64 {
        self.entries.iter().map(|(_, item)| item.price).sum()
    }

    pub fn nutrition_totals(&self) -> NutritionTotals {
        let mut totals = NutritionTotals::default();
        for (_, item) in &self.entries {
            totals.accumulate(&item.nutrition);
        }
        totals
    }

    /// JAN codes of every item, in list order, for the register hand-off
    pub fn identifier_codes(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(_, item)| item.identifier_code.clone())
            .collect()
    }

    fn notify_list(&self, event: ItemEvent) {
        for observer in &self.observers {
            observer.list_changed(self, event);
        }
    }
}

/// Aggregates shown under the list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct TotalsSnapshot {
    pub item_count: usize,
    pub total_price: i64,
    pub nutrition: NutritionTotals,
}

/// Observer that recomputes the aggregates after every mutation
#[derive(Default)]
pub struct TotalsDisplay {
    latest: Mutex<TotalsSnapshot>,
}

impl TotalsDisplay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> TotalsSnapshot {
        *self.latest.lock()
    }
}

impl ItemObserver for TotalsDisplay {
    fn list_changed(&self, registry: &ItemRegistry, _event: ItemEvent) {
        *self.latest.lock() = TotalsSnapshot {
            item_count: registry.len(),
            total_price: registry.total_price(),
            nutrition: registry.nutrition_totals(),
        };
    }
}
