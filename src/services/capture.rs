use crate::error::{KioskError, Result};
use crate::models::region::Surface;
use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::path::Path;
use tracing::debug;

const JPEG_QUALITY: u8 = 90;

/// Photo of the tray, as shown on the correction screen
pub struct CapturedImage {
    image: DynamicImage,
}

impl CapturedImage {
    pub fn from_file(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .map_err(|e| KioskError::Image(format!("Failed to open {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), width = image.width(), height = image.height(), "photo loaded");
        Ok(Self { image })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| KioskError::Image(format!("Failed to decode image: {}", e)))?;
        Ok(Self { image })
    }

    /// Accepts plain base64 or a `data:image/...;base64,` URI
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = general_purpose::STANDARD
            .decode(strip_data_uri(encoded).trim())
            .map_err(|e| KioskError::Image(format!("Invalid base64 image: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Surface the photo is displayed on at its natural size
    pub fn surface(&self) -> Surface {
        Surface::new(self.image.width() as f64, self.image.height() as f64)
    }

    /// JPEG, base64 without a data-URI prefix, as the inference server expects
    pub fn to_base64_jpeg(&self) -> Result<String> {
        // JPEG has no alpha channel
        let rgb = DynamicImage::ImageRgb8(self.image.to_rgb8());
        let mut buffer = Vec::new();
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY))
            .map_err(|e| KioskError::Image(format!("Failed to encode image: {}", e)))?;
        Ok(general_purpose::STANDARD.encode(&buffer))
    }
}

/// Drop a `data:<mime>;base64,` prefix if present
pub fn strip_data_uri(encoded: &str) -> &str {
    match encoded.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
        None => encoded,
    }
}
