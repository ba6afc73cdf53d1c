use crate::error::{KioskError, Result};
use crate::models::menu::{MenuRecord, NutritionTotals};
use serde::{Deserialize, Serialize};

/// Body of `POST /start_inference`
#[derive(Serialize)]
pub struct InferenceRequest<'a> {
    pub image: &'a str,
}

/// One detected dish with its normalized box
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DetectionBox {
    /// Detector class; `null` for boxes the detector could not name
    #[serde(default)]
    pub label: Option<String>,
    /// Plate type the detector paired the dish with
    #[serde(default)]
    pub osara_type: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// `[x0, y0, x1, y1]`, fractions of the photo size
    pub xyxy: [f64; 4],
    #[serde(default)]
    pub menu_object: Option<MenuRecord>,
}

impl DetectionBox {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or_default().trim()
    }

    /// Entries without a label are detector noise, and a label the menu
    /// could not match comes back as a placeholder; neither becomes an item
    pub fn is_qualifying(&self) -> bool {
        !self.label().is_empty() && !self.menu_object.as_ref().is_some_and(MenuRecord::is_placeholder)
    }

    /// Check geometry and return the box clamped into [0, 1]
    pub fn validate(&self) -> Result<[f64; 4]> {
        let [x0, y0, x1, y1] = self.xyxy;
        if self.xyxy.iter().any(|v| !v.is_finite()) {
            return Err(KioskError::InvalidBox {
                xyxy: self.xyxy,
                reason: "coordinates must be finite".to_string(),
            });
        }
        if x1 < x0 || y1 < y0 {
            return Err(KioskError::InvalidBox {
                xyxy: self.xyxy,
                reason: "box is inverted".to_string(),
            });
        }
        Ok(self.xyxy.map(|v| v.clamp(0.0, 1.0)))
    }
}

/// Spoken feedback the backend may attach to a result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VoiceClip {
    pub text: String,
    pub base64: String,
}

/// Response of `POST /start_inference`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InferenceResponse {
    pub boxes: Vec<DetectionBox>,
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub nutrition_totals: Option<NutritionTotals>,
    /// Annotated photo, base64 JPEG
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub voice: Option<VoiceClip>,
}

impl InferenceResponse {
    pub fn qualifying(&self) -> impl Iterator<Item = &DetectionBox> {
        self.boxes.iter().filter(|b| b.is_qualifying())
    }
}
