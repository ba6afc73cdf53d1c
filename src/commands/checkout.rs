use crate::models::config::AppConfig;
use crate::models::item::Item;
use crate::models::menu::MenuRecord;
use crate::models::region::{Region, Surface};
use crate::services::backend::MenuServer;
use crate::services::capture::CapturedImage;
use crate::services::checkout::{CheckoutSession, EntryMode, ScanReport};
use crate::services::debounce::Autocomplete;
use crate::services::highlight::HighlightTarget;
use crate::services::item_registry::{ItemId, TotalsSnapshot};
use crate::services::realtime::{KioskChannel, RecordingChannel, SocketIoChannel};
use crate::services::region_registry::RegionId;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::warn;

/// Checkout session shared by all commands
pub struct CheckoutState(pub Arc<Mutex<CheckoutSession<KioskChannel>>>);

impl CheckoutState {
    /// Build the session, connecting and joining the realtime room when enabled
    pub async fn connect(config: &AppConfig) -> Result<Self, String> {
        let server = MenuServer::new(&config.server).map_err(|e| e.to_string())?;
        let channel = if config.realtime.enabled {
            KioskChannel::Socket(
                SocketIoChannel::connect(&config.realtime.url)
                    .await
                    .map_err(|e| e.to_string())?,
            )
        } else {
            warn!("realtime disabled; checkout events stay local");
            KioskChannel::Offline(RecordingChannel::new())
        };

        let session = CheckoutSession::new(config, server, channel);
        session.join().await.map_err(|e| e.to_string())?;
        Ok(Self::from_session(session))
    }

    pub fn from_session(session: CheckoutSession<KioskChannel>) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }
}

/// One row of the checkout list with its overlay, if any
#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    pub id: ItemId,
    pub item: Item,
    pub region_id: Option<RegionId>,
    pub region: Option<Region>,
    pub selected: bool,
    /// Row flashing after its region was clicked
    pub highlighted: bool,
    /// Region border flashing after the row was selected
    pub region_highlighted: bool,
}

/// Load a photo from disk and run detection on it
pub async fn scan_image(path: PathBuf, state: &CheckoutState) -> Result<ScanReport, String> {
    let image = CapturedImage::from_file(&path).map_err(|e| e.to_string())?;
    let mut session = state.0.lock().await;
    session.scan(&image).await.map_err(|e| e.to_string())
}

/// Current list in display order, with flashes that are still running
pub async fn list_items(state: &CheckoutState) -> Result<Vec<ItemView>, String> {
    let mut session = state.0.lock().await;
    let now = Instant::now();
    session.sync_mut().expire_highlights(now);
    let sync = session.sync();
    let selected = sync.items().selected();

    Ok(sync
        .items()
        .iter()
        .map(|(id, item)| {
            let region_id = sync.links().region_for(id);
            ItemView {
                id,
                item: item.clone(),
                region_id,
                region: region_id.and_then(|r| sync.regions().get(r).copied()),
                selected: selected == Some(id),
                highlighted: sync.is_highlighted(HighlightTarget::ItemRow(id), now),
                region_highlighted: region_id
                    .is_some_and(|r| sync.is_highlighted(HighlightTarget::RegionBorder(r), now)),
            }
        })
        .collect())
}

pub async fn get_totals(state: &CheckoutState) -> Result<TotalsSnapshot, String> {
    Ok(state.0.lock().await.totals())
}

pub async fn add_manual_item(name: String, price: String, state: &CheckoutState) -> Result<ItemId, String> {
    let mut session = state.0.lock().await;
    session
        .confirm_manual_entry(&name, &price, EntryMode::Add)
        .await
        .map_err(|e| e.to_string())
}

pub async fn edit_selected_item(name: String, price: String, state: &CheckoutState) -> Result<ItemId, String> {
    let mut session = state.0.lock().await;
    session
        .confirm_manual_entry(&name, &price, EntryMode::EditSelected)
        .await
        .map_err(|e| e.to_string())
}

pub async fn apply_cached_menu(id: ItemId, record: MenuRecord, state: &CheckoutState) -> Result<(), String> {
    let mut session = state.0.lock().await;
    session.apply_cached(id, &record).map_err(|e| e.to_string())
}

pub async fn recent_menus(state: &CheckoutState) -> Result<Vec<MenuRecord>, String> {
    let session = state.0.lock().await;
    session.recent_menus().await.map_err(|e| e.to_string())
}

/// Autocomplete for the manual-entry field; `None` when a newer keystroke won
pub async fn suggest_menu(query: String, state: &CheckoutState) -> Result<Option<Autocomplete>, String> {
    let suggester = state.0.lock().await.suggester();
    suggester.suggest(&query).await.map_err(|e| e.to_string())
}

pub async fn delete_item(id: ItemId, state: &CheckoutState) -> Result<Option<RegionId>, String> {
    let mut session = state.0.lock().await;
    session.sync_mut().delete_item(id).map_err(|e| e.to_string())
}

pub async fn delete_region(id: RegionId, state: &CheckoutState) -> Result<Option<ItemId>, String> {
    let mut session = state.0.lock().await;
    session.sync_mut().delete_region(id).map_err(|e| e.to_string())
}

pub async fn select_item(id: ItemId, state: &CheckoutState) -> Result<Option<RegionId>, String> {
    let mut session = state.0.lock().await;
    session
        .sync_mut()
        .select_item(id, Instant::now())
        .map_err(|e| e.to_string())
}

pub async fn click_region(id: RegionId, state: &CheckoutState) -> Result<Option<ItemId>, String> {
    let mut session = state.0.lock().await;
    session
        .sync_mut()
        .click_region(id, Instant::now())
        .map_err(|e| e.to_string())
}

pub async fn move_region(id: RegionId, region: Region, state: &CheckoutState) -> Result<(), String> {
    let mut session = state.0.lock().await;
    session.sync_mut().move_region(id, region).map_err(|e| e.to_string())
}

pub async fn drag_region(id: RegionId, dx: f64, dy: f64, state: &CheckoutState) -> Result<(), String> {
    let mut session = state.0.lock().await;
    session.sync_mut().translate_region(id, dx, dy).map_err(|e| e.to_string())
}

pub async fn resize_region(id: RegionId, width: f64, height: f64, state: &CheckoutState) -> Result<(), String> {
    let mut session = state.0.lock().await;
    session
        .sync_mut()
        .resize_region(id, width, height)
        .map_err(|e| e.to_string())
}

/// The photo element was resized by the layout
pub async fn resize_display(width: f64, height: f64, state: &CheckoutState) -> Result<(), String> {
    let mut session = state.0.lock().await;
    session
        .sync_mut()
        .resize_surface(Surface::new(width, height))
        .map_err(|e| e.to_string())
}

/// Confirm the order; returns the page to redirect to
pub async fn submit_order(state: &CheckoutState) -> Result<String, String> {
    let mut session = state.0.lock().await;
    session.submit().await.map_err(|e| e.to_string())
}

pub async fn cancel_order(state: &CheckoutState) -> Result<String, String> {
    Ok(state.0.lock().await.cancel())
}
