use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Display name the inference backend gives a label it could not match
pub const UNKNOWN_MENU: &str = "unknown";

/// Menu-object record as exchanged with the inference and menu backends.
///
/// Decoding is strict: required fields must be present and unknown fields
/// are rejected, so a drifting backend fails loudly instead of producing
/// half-filled items. The text fields may be `null` (the backend's
/// placeholder for an unmatched label) and decode as empty strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct MenuRecord {
    #[serde(default, rename = "menu_code", alias = "code", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub display_name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub romaji: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub yolo_name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub jan_code: String,
    pub price: i64,
    /// Times ordered; only present on cache entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<NutritionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<NutritionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat: Option<NutritionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbohydrates: Option<NutritionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiber: Option<NutritionValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vegetables: Option<NutritionValue>,
}

impl MenuRecord {
    /// Record with the five required fields and nothing else
    pub fn new(
        display_name: impl Into<String>,
        romaji: impl Into<String>,
        yolo_name: impl Into<String>,
        jan_code: impl Into<String>,
        price: i64,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            romaji: romaji.into(),
            yolo_name: yolo_name.into(),
            jan_code: jan_code.into(),
            price,
            ..Self::default()
        }
    }

    pub fn nutrition(&self) -> Nutrition {
        Nutrition {
            energy: self.energy.clone(),
            protein: self.protein.clone(),
            fat: self.fat.clone(),
            carbohydrates: self.carbohydrates.clone(),
            fiber: self.fiber.clone(),
            vegetables: self.vegetables.clone(),
        }
    }

    /// Replace all nutrition fields
    pub fn set_nutrition(&mut self, nutrition: &Nutrition) {
        self.energy = nutrition.energy.clone();
        self.protein = nutrition.protein.clone();
        self.fat = nutrition.fat.clone();
        self.carbohydrates = nutrition.carbohydrates.clone();
        self.fiber = nutrition.fiber.clone();
        self.vegetables = nutrition.vegetables.clone();
    }

    /// The placeholder sent for a detection with no matching menu
    pub fn is_placeholder(&self) -> bool {
        self.display_name == UNKNOWN_MENU
    }

    /// Label shown in pick lists, e.g. `カレー  ¥341`
    pub fn option_label(&self) -> String {
        format!("{}  ¥{}", self.display_name, self.price)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A nutrition figure as the backend sends it: a number or a numeric string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NutritionValue {
    Number(f64),
    Text(String),
}

impl NutritionValue {
    /// Numeric value, or `None` when the text does not parse or is not finite
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for NutritionValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for NutritionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Optional nutrition fields of one item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Nutrition {
    pub energy: Option<NutritionValue>,
    pub protein: Option<NutritionValue>,
    pub fat: Option<NutritionValue>,
    pub carbohydrates: Option<NutritionValue>,
    pub fiber: Option<NutritionValue>,
    pub vegetables: Option<NutritionValue>,
}

impl Nutrition {
    pub fn is_empty(&self) -> bool {
        self.energy.is_none()
            && self.protein.is_none()
            && self.fat.is_none()
            && self.carbohydrates.is_none()
            && self.fiber.is_none()
            && self.vegetables.is_none()
    }

    /// Overwrite the fields `other` carries, keep the rest
    pub fn merge(&mut self, other: &Nutrition) {
        fn keep(slot: &mut Option<NutritionValue>, incoming: &Option<NutritionValue>) {
            if incoming.is_some() {
                slot.clone_from(incoming);
            }
        }
        keep(&mut self.energy, &other.energy);
        keep(&mut self.protein, &other.protein);
        keep(&mut self.fat, &other.fat);
        keep(&mut self.carbohydrates, &other.carbohydrates);
        keep(&mut self.fiber, &other.fiber);
        keep(&mut self.vegetables, &other.vegetables);
    }
}

/// Field-wise nutrition sums over the current tray
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct NutritionTotals {
    pub energy: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbohydrates: f64,
    pub fiber: f64,
    pub vegetables: f64,
}

impl NutritionTotals {
    /// Add one item's figures; missing or invalid values count as zero
    pub fn accumulate(&mut self, nutrition: &Nutrition) {
        fn value(v: &Option<NutritionValue>) -> f64 {
            v.as_ref().and_then(NutritionValue::as_f64).unwrap_or(0.0)
        }
        self.energy += value(&nutrition.energy);
        self.protein += value(&nutrition.protein);
        self.fat += value(&nutrition.fat);
        self.carbohydrates += value(&nutrition.carbohydrates);
        self.fiber += value(&nutrition.fiber);
        self.vegetables += value(&nutrition.vegetables);
    }
}

/// Searchable keys of a menu record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MenuField {
    Code,
    DisplayName,
    Romaji,
    YoloName,
    JanCode,
    Price,
}

impl MenuField {
    /// Key as the backend expects it in query strings and bodies
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Code => "menu_code",
            Self::DisplayName => "display_name",
            Self::Romaji => "romaji",
            Self::YoloName => "yolo_name",
            Self::JanCode => "jan_code",
            Self::Price => "price",
        }
    }
}

impl fmt::Display for MenuField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

impl FromStr for MenuField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "code" | "menu_code" => Ok(Self::Code),
            "display_name" | "name" => Ok(Self::DisplayName),
            "romaji" => Ok(Self::Romaji),
            "yolo_name" | "label" => Ok(Self::YoloName),
            "jan_code" | "jan" => Ok(Self::JanCode),
            "price" => Ok(Self::Price),
            other => Err(format!("Unknown menu field: {}", other)),
        }
    }
}
