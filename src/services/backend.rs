use crate::error::{KioskError, Result};
use crate::models::checkout::{LoggingRecord, SuccessResponse};
use crate::models::config::ServerConfig;
use crate::models::detection::{InferenceRequest, InferenceResponse};
use crate::models::menu::{MenuField, MenuRecord};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// HTTP client for the inference and menu backend
#[derive(Clone)]
pub struct MenuServer {
    client: reqwest::Client,
    base_url: String,
    inference_timeout: Duration,
    /// Last cache snapshot any cache call returned
    recent_cache: Arc<Mutex<Vec<MenuRecord>>>,
}

#[derive(Deserialize)]
struct CacheResponse {
    cache: Vec<MenuRecord>,
}

#[derive(Serialize)]
struct AddCacheRequest<'a> {
    item: &'a MenuRecord,
}

#[derive(Serialize)]
struct KeyValueRequest<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct PasswordRequest<'a> {
    password: &'a str,
}

impl MenuServer {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KioskError::Request {
                endpoint: config.base_url.clone(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            inference_timeout: Duration::from_secs(config.inference_timeout_secs),
            recent_cache: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Run detection on a base64 JPEG
    pub async fn start_inference(&self, image_base64: &str) -> Result<InferenceResponse> {
        const ENDPOINT: &str = "/start_inference";
        let started = Instant::now();

        let response = self
            .client
            .post(self.url(ENDPOINT))
            .timeout(self.inference_timeout)
            .json(&InferenceRequest { image: image_base64 })
            .send()
            .await
            .map_err(|e| request_error(ENDPOINT, e))?;

        let result: InferenceResponse = decode(ENDPOINT, response).await?;
        info!(
            boxes = result.boxes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "inference finished"
        );
        Ok(result)
    }

    /// Exact-match search on one menu field; a blank value finds nothing
    pub async fn search_menu(&self, field: MenuField, value: &str) -> Result<Vec<MenuRecord>> {
        const ENDPOINT: &str = "/search_menu";
        let value = value.trim();
        if value.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(self.url(ENDPOINT))
            .query(&[("key", field.as_key()), ("value", value)])
            .send()
            .await
            .map_err(|e| request_error(ENDPOINT, e))?;

        let records: Vec<MenuRecord> = decode(ENDPOINT, response).await?;
        debug!(%field, value, hits = records.len(), "menu search");
        Ok(records)
    }

    /// Recently ordered menus, most frequent first
    pub async fn get_menu_cache(&self) -> Result<Vec<MenuRecord>> {
        const ENDPOINT: &str = "/get_menu_cache";
        let response = self
            .client
            .get(self.url(ENDPOINT))
            .send()
            .await
            .map_err(|e| request_error(ENDPOINT, e))?;
        self.store_cache(decode(ENDPOINT, response).await?)
    }

    /// Record an order of `record` and return the updated cache
    pub async fn add_menu_cache(&self, record: &MenuRecord) -> Result<Vec<MenuRecord>> {
        const ENDPOINT: &str = "/add_menu_cache";
        let response = self
            .client
            .post(self.url(ENDPOINT))
            .json(&AddCacheRequest { item: record })
            .send()
            .await
            .map_err(|e| request_error(ENDPOINT, e))?;
        self.store_cache(decode(ENDPOINT, response).await?)
    }

    /// Drop cache entries whose field equals `value`
    pub async fn remove_menu_cache(&self, field: MenuField, value: &str) -> Result<Vec<MenuRecord>> {
        const ENDPOINT: &str = "/remove_menu_cache";
        let response = self
            .client
            .post(self.url(ENDPOINT))
            .json(&KeyValueRequest {
                key: field.as_key(),
                value,
            })
            .send()
            .await
            .map_err(|e| request_error(ENDPOINT, e))?;
        self.store_cache(decode(ENDPOINT, response).await?)
    }

    fn store_cache(&self, response: CacheResponse) -> Result<Vec<MenuRecord>> {
        debug!(entries = response.cache.len(), "menu cache refreshed");
        *self.recent_cache.lock() = response.cache.clone();
        Ok(response.cache)
    }

    /// Snapshot from the latest cache call, without a round trip
    pub fn recent_cache(&self) -> Vec<MenuRecord> {
        self.recent_cache.lock().clone()
    }

    /// Store the photo and corrected boxes for retraining
    pub async fn log_result(&self, record: &LoggingRecord) -> Result<()> {
        const ENDPOINT: &str = "/logging";
        let response = self
            .client
            .post(self.url(ENDPOINT))
            .json(record)
            .send()
            .await
            .map_err(|e| request_error(ENDPOINT, e))?;

        let answer: SuccessResponse = decode(ENDPOINT, response).await?;
        if !answer.success {
            warn!(items = record.items.len(), "server refused logging record");
        }
        Ok(())
    }

    /// Check the admin password; `false` means rejected
    pub async fn verify_password(&self, password: &str) -> Result<bool> {
        const ENDPOINT: &str = "/verify_password";
        let response = self
            .client
            .post(self.url(ENDPOINT))
            .json(&PasswordRequest { password })
            .send()
            .await
            .map_err(|e| request_error(ENDPOINT, e))?;

        let answer: SuccessResponse = decode(ENDPOINT, response).await?;
        Ok(answer.success)
    }

    /// Empty the recent-menu cache on the server
    pub async fn reset_menu_cache(&self) -> Result<bool> {
        const ENDPOINT: &str = "/reset_menu_cache";
        let response = self
            .client
            .post(self.url(ENDPOINT))
            .send()
            .await
            .map_err(|e| request_error(ENDPOINT, e))?;

        let answer: SuccessResponse = decode(ENDPOINT, response).await?;
        if answer.success {
            self.recent_cache.lock().clear();
        }
        Ok(answer.success)
    }
}

fn request_error(endpoint: &str, error: reqwest::Error) -> KioskError {
    KioskError::Request {
        endpoint: endpoint.to_string(),
        reason: error.to_string(),
    }
}

async fn decode<T: DeserializeOwned>(endpoint: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(KioskError::HttpStatus {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    let body = response.bytes().await.map_err(|e| request_error(endpoint, e))?;
    serde_json::from_slice(&body).map_err(|e| KioskError::InvalidResponse {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}
