use crate::error::{KioskError, Result};
use crate::models::checkout::LoggedBox;
use crate::models::config::InteractionConfig;
use crate::models::detection::InferenceResponse;
use crate::models::item::{Item, ItemPatch};
use crate::models::menu::{MenuRecord, NutritionTotals};
use crate::models::region::{Region, Surface};
use crate::services::highlight::{HighlightTarget, HighlightTracker};
use crate::services::item_registry::{ItemId, ItemObserver, ItemRegistry};
use crate::services::links::LinkTable;
use crate::services::region_registry::{RegionId, RegionObserver, RegionRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Keeps the checkout list and the photo overlays in step.
///
/// All pairing goes through here: registries never reference each other,
/// and the link table is only mutated by this type.
pub struct SyncCoordinator {
    items: ItemRegistry,
    regions: RegionRegistry,
    links: LinkTable,
    surface: Option<Surface>,
    highlights: HighlightTracker,
    default_width: f64,
    default_height: f64,
}

impl SyncCoordinator {
    pub fn new(interaction: &InteractionConfig) -> Self {
        Self {
            items: ItemRegistry::new(),
            regions: RegionRegistry::new(),
            links: LinkTable::new(),
            surface: None,
            highlights: HighlightTracker::new(Duration::from_millis(interaction.highlight_ms)),
            default_width: interaction.default_region_width,
            default_height: interaction.default_region_height,
        }
    }

    pub fn subscribe_items(&mut self, observer: Arc<dyn ItemObserver>) {
        self.items.subscribe(observer);
    }

    pub fn subscribe_regions(&mut self, observer: Arc<dyn RegionObserver>) {
        self.regions.subscribe(observer);
    }

    pub fn surface(&self) -> Option<Surface> {
        self.surface
    }

    fn require_surface(&self) -> Result<Surface> {
        self.surface.ok_or(KioskError::InvalidSurface {
            width: 0.0,
            height: 0.0,
        })
    }

    /// Replace the current pairs with one pair per labelled detection,
    /// scaled to the current surface.
    ///
    /// Every box is checked before anything is cleared, so a malformed
    /// response leaves the previous state intact.
    pub fn ingest_detections(&mut self, response: &InferenceResponse) -> Result<Vec<(ItemId, RegionId)>> {
        let surface = self.require_surface()?;
        self.replace_detections(surface, response)
    }

    /// Like `ingest_detections`, for a newly shown photo: the surface only
    /// changes if the response is accepted
    pub fn replace_detections(
        &mut self,
        surface: Surface,
        response: &InferenceResponse,
    ) -> Result<Vec<(ItemId, RegionId)>> {
        surface.validate()?;

        let mut prepared = Vec::new();
        for detection in response.qualifying() {
            let xyxy = detection.validate()?;
            let region = Region::from_normalized(xyxy, surface)?;
            let item = match &detection.menu_object {
                Some(record) => Item::from(record),
                None => {
                    warn!(label = detection.label(), "detection without menu record");
                    Item::unresolved(detection.label())
                }
            };
            prepared.push((item, region));
        }

        self.reset();
        self.surface = Some(surface);

        let mut pairs = Vec::with_capacity(prepared.len());
        for (item, region) in prepared {
            pairs.push(self.insert_pair(item, region)?);
        }

        info!(
            detected = response.boxes.len(),
            paired = pairs.len(),
            "detections ingested"
        );
        Ok(pairs)
    }

    /// Add an item confirmed by hand, with a default-sized region at the origin
    pub fn add_manual(&mut self, record: &MenuRecord) -> Result<(ItemId, RegionId)> {
        let region = Region::new(0.0, 0.0, self.default_width, self.default_height);
        self.insert_pair(Item::from(record), region)
    }

    fn insert_pair(&mut self, item: Item, region: Region) -> Result<(ItemId, RegionId)> {
        let item_id = self.items.add(item);
        let region_id = self.regions.add(region);
        self.links.link(item_id, region_id)?;
        Ok((item_id, region_id))
    }

    /// Replace item fields; a linked region only gets its caption redrawn
    pub fn edit_item(&mut self, id: ItemId, patch: &ItemPatch) -> Result<()> {
        self.items.update(id, patch)?;
        if let Some(region) = self.links.region_for(id) {
            self.regions.refresh_label(region)?;
        }
        Ok(())
    }

    pub fn edit_selected(&mut self, patch: &ItemPatch) -> Result<ItemId> {
        let id = self.items.selected().ok_or(KioskError::NothingSelected)?;
        self.edit_item(id, patch)?;
        Ok(id)
    }

    /// Delete an item together with its region
    pub fn delete_item(&mut self, id: ItemId) -> Result<Option<RegionId>> {
        self.items.remove(id).ok_or(KioskError::UnknownItem(id.raw()))?;
        self.highlights.forget(HighlightTarget::ItemRow(id));

        let region = self.links.unlink_item(id);
        if let Some(region_id) = region {
            self.regions.remove(region_id);
            self.highlights.forget(HighlightTarget::RegionBorder(region_id));
        }
        debug!(%id, ?region, "item deleted");
        Ok(region)
    }

    /// Delete a region only; its item stays in the list, unlinked
    pub fn delete_region(&mut self, id: RegionId) -> Result<Option<ItemId>> {
        self.regions.remove(id).ok_or(KioskError::UnknownRegion(id.raw()))?;
        self.highlights.forget(HighlightTarget::RegionBorder(id));
        Ok(self.links.unlink_region(id))
    }

    /// Flash the list row of the item linked to a clicked region
    pub fn click_region(&mut self, id: RegionId, now: Instant) -> Result<Option<ItemId>> {
        if self.regions.get(id).is_none() {
            return Err(KioskError::UnknownRegion(id.raw()));
        }
        let item = self.links.item_for(id);
        if let Some(item_id) = item {
            self.highlights.flash(HighlightTarget::ItemRow(item_id), now);
        }
        Ok(item)
    }

    /// Select a list row and flash the border of its region
    pub fn select_item(&mut self, id: ItemId, now: Instant) -> Result<Option<RegionId>> {
        self.items.set_selected(id)?;
        let region = self.links.region_for(id);
        if let Some(region_id) = region {
            self.highlights.flash(HighlightTarget::RegionBorder(region_id), now);
        }
        Ok(region)
    }

    /// Store the geometry produced by a drag or resize.
    ///
    /// The box must keep a positive size and stay at least partly on the photo.
    pub fn move_region(&mut self, id: RegionId, region: Region) -> Result<()> {
        let invalid = |reason: &str| KioskError::InvalidBox {
            xyxy: [region.x, region.y, region.x2(), region.y2()],
            reason: reason.to_string(),
        };
        let values = [region.x, region.y, region.width, region.height];
        if values.iter().any(|v| !v.is_finite()) || !region.is_valid() {
            return Err(invalid("region geometry must be finite with a positive size"));
        }
        if let Some(surface) = self.surface {
            let photo = Region::new(0.0, 0.0, surface.width, surface.height);
            if !region.intersects(&photo) {
                return Err(invalid("region lies outside the photo"));
            }
        }
        self.regions.set_geometry(id, region)
    }

    /// Drag a region by a delta
    pub fn translate_region(&mut self, id: RegionId, dx: f64, dy: f64) -> Result<()> {
        let mut region = *self.regions.get(id).ok_or(KioskError::UnknownRegion(id.raw()))?;
        region.translate(dx, dy);
        self.move_region(id, region)
    }

    /// Resize a region from its bottom-right handle
    pub fn resize_region(&mut self, id: RegionId, width: f64, height: f64) -> Result<()> {
        let mut region = *self.regions.get(id).ok_or(KioskError::UnknownRegion(id.raw()))?;
        region.resize(width, height);
        self.move_region(id, region)
    }

    /// The photo element changed size; keep every region's relative placement
    pub fn resize_surface(&mut self, to: Surface) -> Result<()> {
        to.validate()?;
        if let Some(from) = self.surface {
            self.regions.rescale(from, to)?;
        }
        self.surface = Some(to);
        Ok(())
    }

    /// Caption drawn on a region: the linked item's name or detector label
    pub fn region_label(&self, id: RegionId) -> Option<&str> {
        let item = self.links.item_for(id)?;
        self.items.get(item).map(|item| item.caption())
    }

    /// Boxes of the listed items as fractions, labelled with the detector
    /// class, in list order. Items whose region was deleted have no box.
    pub fn submission_boxes(&self) -> Result<Vec<LoggedBox>> {
        let surface = self.require_surface()?;
        let mut boxes = Vec::new();
        for (item_id, item) in self.items.iter() {
            let Some(region) = self.links.region_for(item_id).and_then(|id| self.regions.get(id)) else {
                continue;
            };
            boxes.push(LoggedBox {
                label: item.detector_label.clone(),
                xyxy: region.to_normalized(surface)?,
            });
        }
        Ok(boxes)
    }

    pub fn is_highlighted(&self, target: HighlightTarget, now: Instant) -> bool {
        self.highlights.is_active(target, now)
    }

    pub fn expire_highlights(&mut self, now: Instant) -> Vec<HighlightTarget> {
        self.highlights.expire(now)
    }

    /// Drop every item, region and link
    pub fn reset(&mut self) {
        self.items.clear();
        self.regions.clear();
        self.links.clear();
        self.highlights.clear();
    }

    pub fn items(&self) -> &ItemRegistry {
        &self.items
    }

    pub fn regions(&self) -> &RegionRegistry {
        &self.regions
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    pub fn total_price(&self) -> i64 {
        self.items.total_price()
    }

    pub fn nutrition_totals(&self) -> NutritionTotals {
        self.items.nutrition_totals()
    }

    pub fn identifier_codes(&self) -> Vec<String> {
        self.items.identifier_codes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::detection::DetectionBox;
    use crate::services::region_registry::RegionEvent;
    use parking_lot::Mutex;

    fn coordinator() -> SyncCoordinator {
        let mut sync = SyncCoordinator::new(&InteractionConfig::default());
        sync.resize_surface(Surface::new(800.0, 600.0)).unwrap();
        sync
    }

    fn record(name: &str, label: &str, price: i64) -> MenuRecord {
        MenuRecord::new(name, label, label, format!("jan-{}", label), price)
    }

    fn detection(label: &str, xyxy: [f64; 4], menu: Option<MenuRecord>) -> DetectionBox {
        DetectionBox {
            label: Some(label.to_string()),
            osara_type: None,
            confidence: Some(0.9),
            xyxy,
            menu_object: menu,
        }
    }

    fn response(boxes: Vec<DetectionBox>) -> InferenceResponse {
        InferenceResponse {
            boxes,
            total: None,
            nutrition_totals: None,
            image: None,
            voice: None,
        }
    }

    fn assert_close(a: [f64; 4], b: [f64; 4]) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-9, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_ingest_creates_one_pair_per_labelled_box() {
        let mut sync = coordinator();
        let detections = response(vec![
            detection("curry", [0.1, 0.1, 0.5, 0.5], Some(record("カレー", "curry", 341))),
            detection("", [0.6, 0.6, 0.7, 0.7], None),
            detection("salad", [0.5, 0.2, 0.9, 0.4], Some(record("サラダ", "salad", 66))),
            detection("   ", [0.0, 0.0, 0.1, 0.1], None),
        ]);

        let pairs = sync.ingest_detections(&detections).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(sync.items().len(), 2);
        assert_eq!(sync.regions().len(), 2);
        assert_eq!(sync.total_price(), 407);
        assert!(sync.links().check_invariant());

        for (item, region) in pairs {
            assert_eq!(sync.links().region_for(item), Some(region));
        }
    }

    #[test]
    fn test_ingest_skips_unmatched_placeholder() {
        let mut sync = coordinator();
        let placeholder = MenuRecord::new("unknown", "", "", "", 0);
        let mut unnamed = detection("", [0.0, 0.0, 0.1, 0.1], None);
        unnamed.label = None;

        let pairs = sync
            .ingest_detections(&response(vec![
                unnamed,
                detection("212999", [0.2, 0.2, 0.4, 0.4], Some(placeholder)),
                detection("curry", [0.1, 0.1, 0.5, 0.5], Some(record("カレー", "curry", 341))),
            ]))
            .unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(sync.total_price(), 341);
    }

    #[test]
    fn test_ingest_scales_and_round_trips() {
        let mut sync = coordinator();
        let (_, region_id) = sync
            .ingest_detections(&response(vec![detection(
                "curry",
                [0.1, 0.1, 0.5, 0.5],
                Some(record("カレー", "curry", 341)),
            )]))
            .unwrap()[0];

        let region = *sync.regions().get(region_id).unwrap();
        assert!((region.x - 80.0).abs() < 1e-9);
        assert!((region.y - 60.0).abs() < 1e-9);
        assert!((region.width - 320.0).abs() < 1e-9);
        assert!((region.height - 240.0).abs() < 1e-9);

        let boxes = sync.submission_boxes().unwrap();
        assert_eq!(boxes[0].label, "curry");
        assert_close(boxes[0].xyxy, [0.1, 0.1, 0.5, 0.5]);
    }

    #[test]
    fn test_ingest_without_menu_keeps_label() {
        let mut sync = coordinator();
        let (item, region) =
            sync.ingest_detections(&response(vec![detection("mystery", [0.0, 0.0, 0.2, 0.2], None)]))
                .unwrap()[0];
        assert_eq!(sync.items().get(item).unwrap().detector_label, "mystery");
        assert_eq!(sync.region_label(region), Some("mystery"));
    }

    #[test]
    fn test_rescan_replaces_previous_pairs() {
        let mut sync = coordinator();
        sync.add_manual(&record("味噌汁", "miso", 50)).unwrap();
        sync.ingest_detections(&response(vec![detection(
            "curry",
            [0.1, 0.1, 0.5, 0.5],
            Some(record("カレー", "curry", 341)),
        )]))
        .unwrap();

        assert_eq!(sync.items().len(), 1);
        assert_eq!(sync.regions().len(), 1);
        assert_eq!(sync.total_price(), 341);
    }

    #[test]
    fn test_invalid_box_leaves_state_untouched() {
        let mut sync = coordinator();
        sync.add_manual(&record("味噌汁", "miso", 50)).unwrap();

        let err = sync
            .ingest_detections(&response(vec![
                detection("curry", [0.1, 0.1, 0.5, 0.5], None),
                detection("bad", [0.5, 0.5, 0.1, 0.1], None),
            ]))
            .unwrap_err();
        assert!(matches!(err, KioskError::InvalidBox { .. }));
        assert_eq!(sync.items().len(), 1);
        assert_eq!(sync.total_price(), 50);
    }

    #[test]
    fn test_ingest_requires_surface() {
        let mut sync = SyncCoordinator::new(&InteractionConfig::default());
        let err = sync.ingest_detections(&response(vec![])).unwrap_err();
        assert!(matches!(err, KioskError::InvalidSurface { .. }));
    }

    #[test]
    fn test_manual_add_default_placement() {
        let mut sync = coordinator();
        let (item, region) = sync.add_manual(&record("味噌汁", "miso", 50)).unwrap();

        assert_eq!(
            *sync.regions().get(region).unwrap(),
            Region::new(0.0, 0.0, 100.0, 100.0)
        );
        assert_eq!(sync.links().item_for(region), Some(item));
    }

    #[test]
    fn test_delete_item_cascades_to_region() {
        let mut sync = coordinator();
        let (item, region) = sync.add_manual(&record("味噌汁", "miso", 50)).unwrap();

        assert_eq!(sync.delete_item(item).unwrap(), Some(region));
        assert!(sync.regions().is_empty());
        assert!(sync.links().is_empty());
        assert!(matches!(sync.delete_item(item), Err(KioskError::UnknownItem(_))));
    }

    #[test]
    fn test_delete_region_keeps_item() {
        let mut sync = coordinator();
        let (item, region) = sync.add_manual(&record("味噌汁", "miso", 50)).unwrap();

        assert_eq!(sync.delete_region(region).unwrap(), Some(item));
        assert_eq!(sync.items().len(), 1);
        assert_eq!(sync.total_price(), 50);
        assert!(sync.links().region_for(item).is_none());

        // An unlinked item deletes cleanly
        assert_eq!(sync.delete_item(item).unwrap(), None);
    }

    #[derive(Default)]
    struct RegionLog(Mutex<Vec<RegionEvent>>);

    impl RegionObserver for RegionLog {
        fn regions_changed(&self, _registry: &RegionRegistry, event: RegionEvent) {
            self.0.lock().push(event);
        }
    }

    #[test]
    fn test_edit_refreshes_linked_label_only() {
        let mut sync = coordinator();
        let log = Arc::new(RegionLog::default());
        sync.subscribe_regions(log.clone());

        let (item, region) = sync.add_manual(&record("味噌汁", "miso", 50)).unwrap();
        let before = *sync.regions().get(region).unwrap();

        sync.edit_item(item, &ItemPatch::from(&record("豚汁", "tonjiru", 80)))
            .unwrap();

        assert_eq!(*sync.regions().get(region).unwrap(), before);
        assert_eq!(sync.region_label(region), Some("豚汁"));
        assert_eq!(log.0.lock().last(), Some(&RegionEvent::LabelRefreshed(region)));
        assert_eq!(sync.total_price(), 80);
    }

    #[test]
    fn test_edit_selected() {
        let mut sync = coordinator();
        let patch = ItemPatch {
            price: Some(120),
            ..ItemPatch::default()
        };
        assert!(matches!(sync.edit_selected(&patch), Err(KioskError::NothingSelected)));

        let (item, _) = sync.add_manual(&record("味噌汁", "miso", 50)).unwrap();
        sync.select_item(item, Instant::now()).unwrap();
        assert_eq!(sync.edit_selected(&patch).unwrap(), item);
        assert_eq!(sync.total_price(), 120);
    }

    #[test]
    fn test_click_and_select_highlight_the_other_side() {
        let mut sync = coordinator();
        let (item, region) = sync.add_manual(&record("味噌汁", "miso", 50)).unwrap();
        let now = Instant::now();

        assert_eq!(sync.click_region(region, now).unwrap(), Some(item));
        assert!(sync.is_highlighted(HighlightTarget::ItemRow(item), now));

        assert_eq!(sync.select_item(item, now).unwrap(), Some(region));
        assert!(sync.is_highlighted(HighlightTarget::RegionBorder(region), now));
        assert_eq!(sync.items().selected(), Some(item));

        let later = now + Duration::from_millis(500);
        let mut expired = sync.expire_highlights(later);
        expired.sort_by_key(|t| matches!(t, HighlightTarget::RegionBorder(_)));
        assert_eq!(
            expired,
            vec![HighlightTarget::ItemRow(item), HighlightTarget::RegionBorder(region)]
        );
    }

    #[test]
    fn test_move_region_validates() {
        let mut sync = coordinator();
        let (_, region) = sync.add_manual(&record("味噌汁", "miso", 50)).unwrap();

        sync.move_region(region, Region::new(40.0, 30.0, 80.0, 60.0)).unwrap();
        assert_eq!(sync.regions().get(region).unwrap().x, 40.0);

        let err = sync
            .move_region(region, Region::new(f64::NAN, 0.0, 10.0, 10.0))
            .unwrap_err();
        assert!(matches!(err, KioskError::InvalidBox { .. }));
    }

    #[test]
    fn test_resize_surface_keeps_fractions() {
        let mut sync = coordinator();
        sync.ingest_detections(&response(vec![detection(
            "curry",
            [0.1, 0.1, 0.5, 0.5],
            None,
        )]))
        .unwrap();

        sync.resize_surface(Surface::new(400.0, 300.0)).unwrap();
        let boxes = sync.submission_boxes().unwrap();
        assert_close(boxes[0].xyxy, [0.1, 0.1, 0.5, 0.5]);
        assert!(sync.resize_surface(Surface::new(0.0, 300.0)).is_err());
    }

    #[test]
    fn test_submission_skips_items_without_a_box() {
        let mut sync = coordinator();
        let (_, miso_region) = sync.add_manual(&record("味噌汁", "miso", 50)).unwrap();
        sync.add_manual(&record("カレー", "curry", 341)).unwrap();
        sync.delete_region(miso_region).unwrap();

        assert_eq!(sync.items().len(), 2);
        let boxes = sync.submission_boxes().unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].label, "curry");
        assert_close(boxes[0].xyxy, [0.0, 0.0, 0.125, 100.0 / 600.0]);
    }

    #[test]
    fn test_submission_after_cascade_delete() {
        let mut sync = coordinator();
        let (item, _) = sync.add_manual(&record("味噌汁", "miso", 50)).unwrap();
        sync.add_manual(&record("カレー", "curry", 341)).unwrap();
        sync.delete_item(item).unwrap();

        let boxes = sync.submission_boxes().unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].label, "curry");
    }

    #[test]
    fn test_replace_detections_keeps_state_on_bad_box() {
        let mut sync = coordinator();
        sync.add_manual(&record("味噌汁", "miso", 50)).unwrap();

        let bad = response(vec![detection("bad", [0.5, 0.5, 0.1, 0.1], None)]);
        assert!(sync.replace_detections(Surface::new(400.0, 300.0), &bad).is_err());
        assert_eq!(sync.items().len(), 1);
        assert_eq!(sync.surface(), Some(Surface::new(800.0, 600.0)));

        let good = response(vec![detection("curry", [0.1, 0.1, 0.5, 0.5], None)]);
        let (_, region) = sync.replace_detections(Surface::new(400.0, 300.0), &good).unwrap()[0];
        assert_eq!(sync.surface(), Some(Surface::new(400.0, 300.0)));
        assert!((sync.regions().get(region).unwrap().width - 160.0).abs() < 1e-9);
    }

    #[test]
    fn test_drag_and_resize_region() {
        let mut sync = coordinator();
        let (_, region) = sync.add_manual(&record("味噌汁", "miso", 50)).unwrap();

        sync.translate_region(region, 30.0, 20.0).unwrap();
        sync.resize_region(region, 150.0, 80.0).unwrap();
        assert_eq!(
            *sync.regions().get(region).unwrap(),
            Region::new(30.0, 20.0, 150.0, 80.0)
        );

        // Dragged entirely off the 800x600 photo
        assert!(sync.translate_region(region, 900.0, 0.0).is_err());
        // Collapsed to nothing
        assert!(sync.resize_region(region, 0.0, 80.0).is_err());
        assert_eq!(sync.regions().get(region).unwrap().x, 30.0);
    }
}
