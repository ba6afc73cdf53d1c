use crate::models::menu::MenuRecord;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Collapses bursts of calls so only the last one in a window runs
#[derive(Clone)]
pub struct Debouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wait out the window; `false` if a newer call arrived meanwhile
    pub async fn settle(&self) -> bool {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        self.generation.load(Ordering::SeqCst) == ticket
    }

    /// Run `action` only if no newer call superseded this one
    pub async fn run<F, Fut, T>(&self, action: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.settle().await {
            Some(action().await)
        } else {
            None
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Suggestions for the manual-entry name field
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct Autocomplete {
    pub query: String,
    /// Pick-list labels, one per search hit
    pub options: Vec<String>,
    pub records: Vec<MenuRecord>,
    /// Price of a hit whose name equals the query exactly
    pub autofill_price: Option<i64>,
}

impl Autocomplete {
    pub fn from_results(query: &str, records: Vec<MenuRecord>) -> Self {
        let query = query.trim();
        let options = records.iter().map(MenuRecord::option_label).collect();
        // Last exact hit wins, matching the order the list is filled in
        let autofill_price = records
            .iter()
            .rev()
            .find(|record| record.display_name == query)
            .map(|record| record.price);

        Self {
            query: query.to_string(),
            options,
            records,
            autofill_price,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
