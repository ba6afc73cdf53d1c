use crate::error::{KioskError, Result};
use crate::models::checkout::{ExecutionRequest, JoinRoom, LoggingRecord, EXECUTION_EVENT, JOIN_EVENT};
use crate::models::config::AppConfig;
use crate::models::detection::VoiceClip;
use crate::models::item::ItemPatch;
use crate::models::menu::{MenuField, MenuRecord};
use crate::services::backend::MenuServer;
use crate::services::capture::CapturedImage;
use crate::services::debounce::{Autocomplete, Debouncer};
use crate::services::item_registry::{ItemId, TotalsDisplay, TotalsSnapshot};
use crate::services::realtime::EventChannel;
use crate::services::sync::SyncCoordinator;
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Whether a confirmed manual entry adds a line or replaces the selected one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    Add,
    EditSelected,
}

/// Outcome of one photo scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// Unix millis when the photo was sent
    pub scanned_at: i64,
    pub items: usize,
    pub total_price: i64,
    pub elapsed_secs: f64,
    pub voice: Option<VoiceClip>,
}

/// One customer's pass through the kiosk: scan, correct, pay
pub struct CheckoutSession<C: EventChannel> {
    server: MenuServer,
    channel: C,
    sync: SyncCoordinator,
    totals: Arc<TotalsDisplay>,
    debouncer: Debouncer,
    uuid: String,
    redirect_delay: Duration,
    photo_base64: Option<String>,
}

impl<C: EventChannel> CheckoutSession<C> {
    pub fn new(config: &AppConfig, server: MenuServer, channel: C) -> Self {
        let mut sync = SyncCoordinator::new(&config.interaction);
        let totals = TotalsDisplay::new();
        sync.subscribe_items(totals.clone());

        Self {
            server,
            channel,
            sync,
            totals,
            debouncer: Debouncer::new(Duration::from_millis(config.interaction.search_debounce_ms)),
            uuid: config.kiosk.uuid.clone(),
            redirect_delay: Duration::from_millis(config.kiosk.redirect_delay_ms),
            photo_base64: None,
        }
    }

    /// Join this kiosk's room on the realtime channel
    pub async fn join(&self) -> Result<()> {
        let payload = to_payload(&JoinRoom {
            room: self.uuid.clone(),
        })?;
        self.channel.emit(JOIN_EVENT, payload).await?;
        info!(uuid = %self.uuid, "joined kiosk room");
        Ok(())
    }

    /// Send a photo for inference and rebuild the list from the result.
    ///
    /// The previous list stays in place until a valid response arrives.
    pub async fn scan(&mut self, image: &CapturedImage) -> Result<ScanReport> {
        let started = Instant::now();
        let scanned_at = Utc::now().timestamp_millis();
        let surface = image.surface();
        surface.validate()?;

        let encoded = image.to_base64_jpeg()?;
        let response = self.server.start_inference(&encoded).await?;
        self.sync.replace_detections(surface, &response)?;
        self.photo_base64 = Some(encoded);

        let report = ScanReport {
            scanned_at,
            items: self.sync.items().len(),
            total_price: self.sync.total_price(),
            elapsed_secs: started.elapsed().as_secs_f64(),
            voice: response.voice,
        };
        info!(
            items = report.items,
            total = report.total_price,
            elapsed_secs = report.elapsed_secs,
            "scan complete"
        );
        Ok(report)
    }

    /// Resolve a typed name against the menu and add or replace a line.
    ///
    /// Both fields are required. The backend record is used as-is, so the
    /// typed price only gates the entry.
    pub async fn confirm_manual_entry(&mut self, name: &str, price_text: &str, mode: EntryMode) -> Result<ItemId> {
        let name = name.trim();
        let typed_price = parse_price(price_text);
        if name.is_empty() || typed_price.is_none() {
            return Err(KioskError::IncompleteEntry);
        }
        if mode == EntryMode::EditSelected && self.sync.items().selected().is_none() {
            return Err(KioskError::NothingSelected);
        }

        let records = self.server.search_menu(MenuField::DisplayName, name).await?;
        let record = records
            .first()
            .ok_or_else(|| KioskError::MenuNotFound(name.to_string()))?;
        if records.len() > 1 {
            warn!(name, matches = records.len(), "several menus share this name, using the first");
        }
        if typed_price != Some(record.price) {
            info!(name, ?typed_price, menu_price = record.price, "typed price differs from menu");
        }

        let id = match mode {
            EntryMode::Add => self.sync.add_manual(record)?.0,
            EntryMode::EditSelected => self.sync.edit_selected(&ItemPatch::from(record))?,
        };

        if let Err(e) = self.server.add_menu_cache(record).await {
            warn!(error = %e, "failed to update menu cache");
        }
        Ok(id)
    }

    /// Replace an item with a record picked from the recent-menu list
    pub fn apply_cached(&mut self, id: ItemId, record: &MenuRecord) -> Result<()> {
        self.sync.edit_item(id, &ItemPatch::from(record))
    }

    /// Debounced name search; `None` when superseded or the query is blank
    pub async fn suggest(&self, query: &str) -> Result<Option<Autocomplete>> {
        self.suggester().suggest(query).await
    }

    /// Handle for autocomplete that needs no access to the session
    pub fn suggester(&self) -> Suggester {
        Suggester {
            debouncer: self.debouncer.clone(),
            server: self.server.clone(),
        }
    }

    /// Recently ordered menus for the per-row pick list
    pub async fn recent_menus(&self) -> Result<Vec<MenuRecord>> {
        self.server.get_menu_cache().await
    }

    /// Hand the order to the register and return the page to go to next.
    ///
    /// The audit record is sent in the background; only the realtime
    /// hand-off can fail the checkout.
    pub async fn submit(&mut self) -> Result<String> {
        let request = ExecutionRequest {
            uuid: self.uuid.clone(),
            jan_codes: self.sync.identifier_codes(),
        };
        self.channel.emit(EXECUTION_EVENT, to_payload(&request)?).await?;
        info!(
            uuid = %self.uuid,
            items = request.jan_codes.len(),
            total = self.sync.total_price(),
            "checkout requested"
        );

        if let Some(image) = self.photo_base64.clone() {
            let record = LoggingRecord {
                image,
                items: self.sync.submission_boxes()?,
            };
            let server = self.server.clone();
            tokio::spawn(async move {
                if let Err(e) = server.log_result(&record).await {
                    warn!(error = %e, "failed to store logging record");
                }
            });
        }

        tokio::time::sleep(self.redirect_delay).await;
        Ok(self.finish())
    }

    /// Abandon the order
    pub fn cancel(&mut self) -> String {
        info!(uuid = %self.uuid, "checkout cancelled");
        self.finish()
    }

    fn finish(&mut self) -> String {
        self.sync.reset();
        self.photo_base64 = None;
        format!("/start/{}", self.uuid)
    }

    pub fn totals(&self) -> TotalsSnapshot {
        self.totals.snapshot()
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut SyncCoordinator {
        &mut self.sync
    }

    pub fn server(&self) -> &MenuServer {
        &self.server
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }
}

/// Debounced autocomplete sharing the session's debounce window.
///
/// Cloned out of the session so concurrent keystrokes can supersede each
/// other without waiting on the session lock.
#[derive(Clone)]
pub struct Suggester {
    debouncer: Debouncer,
    server: MenuServer,
}

impl Suggester {
    pub async fn suggest(&self, query: &str) -> Result<Option<Autocomplete>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }
        match self
            .debouncer
            .run(|| self.server.search_menu(MenuField::DisplayName, query))
            .await
        {
            Some(records) => Ok(Some(Autocomplete::from_results(query, records?))),
            None => Ok(None),
        }
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| KioskError::Channel(format!("Failed to encode payload: {}", e)))
}

/// Parse a typed price such as `341`, `¥1,000` or `￥ 66`; zero counts as missing
pub fn parse_price(text: &str) -> Option<i64> {
    static PRICE: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PRICE
        .get_or_init(|| Regex::new(r"^\s*[¥￥]?\s*([\d,]+)\s*$").ok())
        .as_ref()?;

    let digits: String = pattern
        .captures(text)?
        .get(1)?
        .as_str()
        .chars()
        .filter(|c| *c != ',')
        .collect();
    digits.parse::<i64>().ok().filter(|price| *price > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::ServerConfig;
    use crate::services::realtime::RecordingChannel;
    use image::{DynamicImage, Rgb, RgbImage};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn menu_json(name: &str, label: &str, jan: &str, price: i64) -> serde_json::Value {
        json!({
            "display_name": name,
            "romaji": label,
            "yolo_name": label,
            "jan_code": jan,
            "price": price
        })
    }

    fn session_for(mock: &MockServer) -> CheckoutSession<RecordingChannel> {
        let mut config = AppConfig::default();
        config.server.base_url = mock.uri();
        config.kiosk.redirect_delay_ms = 10;
        config.interaction.search_debounce_ms = 10;
        let server = MenuServer::new(&ServerConfig {
            base_url: mock.uri(),
            ..ServerConfig::default()
        })
        .unwrap();
        CheckoutSession::new(&config, server, RecordingChannel::new())
    }

    fn photo() -> CapturedImage {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(80, 60, Rgb([10, 200, 30])));
        let mut buf = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        CapturedImage::from_bytes(&buf).unwrap()
    }

    async fn mount_inference(mock: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/start_inference"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "boxes": [
                    {"label": "curry", "xyxy": [0.1, 0.1, 0.5, 0.5],
                     "menu_object": menu_json("カレー", "curry", "2121052120800", 341)},
                    {"label": "salad", "xyxy": [0.5, 0.5, 0.9, 0.9],
                     "menu_object": menu_json("サラダ", "salad", "2121052057441", 66)},
                    {"label": "", "xyxy": [0.0, 0.0, 0.1, 0.1], "menu_object": null}
                ],
                "total": 407
            })))
            .mount(mock)
            .await;
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("341"), Some(341));
        assert_eq!(parse_price(" ¥1,000 "), Some(1000));
        assert_eq!(parse_price("￥ 66"), Some(66));
        assert_eq!(parse_price("0"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("12a"), None);
        assert_eq!(parse_price("-5"), None);
    }

    #[tokio::test]
    async fn test_scan_builds_list() {
        let mock_server = MockServer::start().await;
        mount_inference(&mock_server).await;
        let mut session = session_for(&mock_server);

        let report = session.scan(&photo()).await.unwrap();
        assert_eq!(report.items, 2);
        assert_eq!(report.total_price, 407);
        assert!(report.elapsed_secs >= 0.0);
        assert!(report.scanned_at > 0);
        assert_eq!(session.totals().total_price, 407);
        assert_eq!(session.sync().regions().len(), 2);
    }

    #[tokio::test]
    async fn test_scan_failure_keeps_previous_list() {
        let mock_server = MockServer::start().await;
        mount_inference(&mock_server).await;
        let mut session = session_for(&mock_server);
        session.scan(&photo()).await.unwrap();
        mock_server.reset().await;

        Mock::given(method("POST"))
            .and(path("/start_inference"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
            .mount(&mock_server)
            .await;

        let err = session.scan(&photo()).await.unwrap_err();
        assert!(matches!(err, KioskError::InvalidResponse { .. }));
        assert_eq!(session.sync().items().len(), 2);
        assert_eq!(session.totals().total_price, 407);
    }

    #[tokio::test]
    async fn test_scan_skips_unmatched_and_unnamed_boxes() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/start_inference"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "boxes": [
                    {"label": "curry", "osara_type": "CURRY", "xyxy": [0.1, 0.1, 0.5, 0.5],
                     "menu_object": menu_json("カレー", "curry", "2121052120800", 341)},
                    {"label": "212999", "osara_type": "DON", "xyxy": [0.5, 0.5, 0.9, 0.9],
                     "menu_object": {"menu_code": null, "display_name": "unknown", "romaji": null,
                                     "yolo_name": null, "jan_code": null, "price": 0}},
                    {"label": null, "osara_type": "RICE", "xyxy": [0.0, 0.0, 0.1, 0.1], "menu_object": null}
                ],
                "total": 341
            })))
            .mount(&mock_server)
            .await;
        let mut session = session_for(&mock_server);

        let report = session.scan(&photo()).await.unwrap();
        assert_eq!(report.items, 1);
        assert_eq!(session.sync().identifier_codes(), vec!["2121052120800".to_string()]);
    }

    #[tokio::test]
    async fn test_manual_entry_adds_first_match() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search_menu"))
            .and(query_param("value", "味噌汁"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                menu_json("味噌汁", "miso", "111", 50),
                menu_json("味噌汁", "miso_large", "222", 80)
            ])))
            .mount(&mock_server)
            .await;
        // Cache failure must not undo the entry
        Mock::given(method("POST"))
            .and(path("/add_menu_cache"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;
        let mut session = session_for(&mock_server);

        let id = session
            .confirm_manual_entry(" 味噌汁 ", "¥50", EntryMode::Add)
            .await
            .unwrap();
        let item = session.sync().items().get(id).unwrap();
        assert_eq!(item.identifier_code, "111");
        assert_eq!(session.totals().total_price, 50);
        assert!(session.sync().links().region_for(id).is_some());
    }

    #[tokio::test]
    async fn test_manual_entry_requires_both_fields() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&mock_server)
            .await;
        let mut session = session_for(&mock_server);

        for (name, price) in [("", "100"), ("味噌汁", ""), ("味噌汁", "0")] {
            let err = session.confirm_manual_entry(name, price, EntryMode::Add).await.unwrap_err();
            assert!(matches!(err, KioskError::IncompleteEntry));
        }
        let err = session
            .confirm_manual_entry("味噌汁", "50", EntryMode::EditSelected)
            .await
            .unwrap_err();
        assert!(matches!(err, KioskError::NothingSelected));
    }

    #[tokio::test]
    async fn test_manual_entry_not_found() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search_menu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;
        let mut session = session_for(&mock_server);

        let err = session.confirm_manual_entry("謎", "100", EntryMode::Add).await.unwrap_err();
        assert!(matches!(err, KioskError::MenuNotFound(_)));
        assert!(session.sync().items().is_empty());
    }

    #[tokio::test]
    async fn test_edit_selected_replaces_fields() {
        let mock_server = MockServer::start().await;
        mount_inference(&mock_server).await;
        Mock::given(method("GET"))
            .and(path("/search_menu"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([menu_json("カツカレー", "katsu", "333", 550)])),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/add_menu_cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cache": []})))
            .mount(&mock_server)
            .await;
        let mut session = session_for(&mock_server);
        session.scan(&photo()).await.unwrap();

        let first = session.sync().items().ids()[0];
        session.sync_mut().select_item(first, Instant::now()).unwrap();
        let edited = session
            .confirm_manual_entry("カツカレー", "550", EntryMode::EditSelected)
            .await
            .unwrap();

        assert_eq!(edited, first);
        assert_eq!(session.totals().total_price, 616);
        let region = session.sync().links().region_for(first).unwrap();
        assert_eq!(session.sync().region_label(region), Some("カツカレー"));
    }

    #[tokio::test]
    async fn test_apply_cached() {
        let mock_server = MockServer::start().await;
        mount_inference(&mock_server).await;
        let mut session = session_for(&mock_server);
        session.scan(&photo()).await.unwrap();

        let second = session.sync().items().ids()[1];
        let record: MenuRecord = serde_json::from_value(menu_json("大サラダ", "salad_l", "444", 120)).unwrap();
        session.apply_cached(second, &record).unwrap();
        assert_eq!(session.totals().total_price, 461);
    }

    #[tokio::test]
    async fn test_suggest() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search_menu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([menu_json("カレー", "curry", "1", 341)])))
            .mount(&mock_server)
            .await;
        let session = session_for(&mock_server);

        let suggestions = session.suggest("カレー").await.unwrap().unwrap();
        assert_eq!(suggestions.autofill_price, Some(341));
        assert!(session.suggest("   ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_submit_emits_and_redirects() {
        let mock_server = MockServer::start().await;
        mount_inference(&mock_server).await;
        Mock::given(method("POST"))
            .and(path("/logging"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&mock_server)
            .await;
        let mut session = session_for(&mock_server);

        session.join().await.unwrap();
        session.scan(&photo()).await.unwrap();
        let next = session.submit().await.unwrap();

        assert_eq!(next, "/start/1234");
        assert!(session.sync().items().is_empty());
        wait_for_request(&mock_server, "/logging").await;
        assert_eq!(
            session.channel().events(),
            vec![
                ("join".to_string(), json!({"room": "1234"})),
                (
                    "request_python_execution".to_string(),
                    json!({"uuid": "1234", "jan_codes": ["2121052120800", "2121052057441"]})
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_submit_survives_logging_failure() {
        let mock_server = MockServer::start().await;
        mount_inference(&mock_server).await;
        Mock::given(method("POST"))
            .and(path("/logging"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;
        let mut session = session_for(&mock_server);
        session.scan(&photo()).await.unwrap();

        assert_eq!(session.submit().await.unwrap(), "/start/1234");
    }

    async fn wait_for_request(mock: &MockServer, route: &str) {
        for _ in 0..100 {
            let requests = mock.received_requests().await.unwrap_or_default();
            if requests.iter().any(|r| r.url.path() == route) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no request to {}", route);
    }

    #[tokio::test]
    async fn test_slow_logging_does_not_delay_submit() {
        let mock_server = MockServer::start().await;
        mount_inference(&mock_server).await;
        Mock::given(method("POST"))
            .and(path("/logging"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;
        let mut session = session_for(&mock_server);
        session.scan(&photo()).await.unwrap();

        let started = Instant::now();
        assert_eq!(session.submit().await.unwrap(), "/start/1234");
        assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_suggester_collapses_bursts() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search_menu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([menu_json("カレー", "curry", "1", 341)])))
            .expect(1)
            .mount(&mock_server)
            .await;
        let session = session_for(&mock_server);
        let first = session.suggester();
        let second = session.suggester();

        // Both keystrokes land inside one debounce window
        let (superseded, latest) = tokio::join!(first.suggest("カ"), second.suggest("カレー"));
        assert!(superseded.unwrap().is_none());
        assert_eq!(latest.unwrap().unwrap().autofill_price, Some(341));
    }

    #[tokio::test]
    async fn test_cancel() {
        let mock_server = MockServer::start().await;
        mount_inference(&mock_server).await;
        let mut session = session_for(&mock_server);
        session.scan(&photo()).await.unwrap();

        assert_eq!(session.cancel(), "/start/1234");
        assert_eq!(session.totals().item_count, 0);
        assert!(session.channel().events().is_empty());
    }
}
