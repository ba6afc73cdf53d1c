use crate::models::menu::{MenuField, MenuRecord, Nutrition};
use serde::{Deserialize, Serialize};

/// One line of the checkout list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Item {
    pub code: String,
    pub display_name: String,
    /// Romanized reading shown above the name
    pub phonetic_name: String,
    /// Class name the detector emits for this dish
    pub detector_label: String,
    /// JAN code handed to the register
    pub identifier_code: String,
    pub price: i64,
    pub nutrition: Nutrition,
}

/// Partial update for an item; `None` keeps the current value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ItemPatch {
    pub code: Option<String>,
    pub display_name: Option<String>,
    pub phonetic_name: Option<String>,
    pub detector_label: Option<String>,
    pub identifier_code: Option<String>,
    pub price: Option<i64>,
    pub nutrition: Option<Nutrition>,
}

impl Item {
    /// Placeholder for a detection the menu lookup could not resolve
    pub fn unresolved(label: &str) -> Self {
        Self {
            detector_label: label.to_string(),
            ..Self::default()
        }
    }

    /// Replace every field the patch carries
    pub fn apply(&mut self, patch: &ItemPatch) {
        if let Some(code) = &patch.code {
            self.code.clone_from(code);
        }
        if let Some(name) = &patch.display_name {
            self.display_name.clone_from(name);
        }
        if let Some(phonetic) = &patch.phonetic_name {
            self.phonetic_name.clone_from(phonetic);
        }
        if let Some(label) = &patch.detector_label {
            self.detector_label.clone_from(label);
        }
        if let Some(jan) = &patch.identifier_code {
            self.identifier_code.clone_from(jan);
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(nutrition) = &patch.nutrition {
            self.nutrition.merge(nutrition);
        }
    }

    /// Field rendered as text, for exact-match lookups
    pub fn field_value(&self, field: MenuField) -> String {
        match field {
            MenuField::Code => self.code.clone(),
            MenuField::DisplayName => self.display_name.clone(),
            MenuField::Romaji => self.phonetic_name.clone(),
            MenuField::YoloName => self.detector_label.clone(),
            MenuField::JanCode => self.identifier_code.clone(),
            MenuField::Price => self.price.to_string(),
        }
    }

    /// Text used for the overlay caption of the linked region
    pub fn caption(&self) -> &str {
        if self.display_name.is_empty() {
            &self.detector_label
        } else {
            &self.display_name
        }
    }

    /// Wire form for the menu cache service
    pub fn to_record(&self) -> MenuRecord {
        let mut record = MenuRecord::new(
            self.display_name.clone(),
            self.phonetic_name.clone(),
            self.detector_label.clone(),
            self.identifier_code.clone(),
            self.price,
        );
        if !self.code.is_empty() {
            record.code = Some(self.code.clone());
        }
        record.set_nutrition(&self.nutrition);
        record
    }
}

impl From<&MenuRecord> for Item {
    fn from(record: &MenuRecord) -> Self {
        let mut item = Item::default();
        item.apply(&ItemPatch::from(record));
        item
    }
}

impl From<&MenuRecord> for ItemPatch {
    fn from(record: &MenuRecord) -> Self {
        let nutrition = record.nutrition();
        Self {
            code: record.code.clone(),
            display_name: Some(record.display_name.clone()),
            phonetic_name: Some(record.romaji.clone()),
            detector_label: Some(record.yolo_name.clone()),
            identifier_code: Some(record.jan_code.clone()),
            price: Some(record.price),
            nutrition: (!nutrition.is_empty()).then_some(nutrition),
        }
    }
}
