use crate::error::{KioskError, Result};
use serde::{Deserialize, Serialize};

/// Size of the element the photo is displayed in, in pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Surface {
    pub width: f64,
    pub height: f64,
}

impl Surface {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Reject zero, negative or non-finite dimensions
    pub fn validate(&self) -> Result<()> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        if ok(self.width) && ok(self.height) {
            Ok(())
        } else {
            Err(KioskError::InvalidSurface {
                width: self.width,
                height: self.height,
            })
        }
    }
}

/// Rectangular overlay on the displayed photo, in surface pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create region from bounds (x1, y1, x2, y2)
    pub fn from_bounds(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self> {
        if x2 < x1 || y2 < y1 {
            return Err(KioskError::InvalidBox {
                xyxy: [x1, y1, x2, y2],
                reason: "second corner must not precede the first".to_string(),
            });
        }

        Ok(Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }

    /// Scale a normalized `[x0, y0, x1, y1]` box onto a surface
    pub fn from_normalized(xyxy: [f64; 4], surface: Surface) -> Result<Self> {
        surface.validate()?;
        let [x0, y0, x1, y1] = xyxy;
        Self::from_bounds(
            x0 * surface.width,
            y0 * surface.height,
            x1 * surface.width,
            y1 * surface.height,
        )
    }

    /// Fractional `[x0, y0, x1, y1]` relative to the surface, clamped to [0, 1]
    pub fn to_normalized(&self, surface: Surface) -> Result<[f64; 4]> {
        surface.validate()?;
        let fx = |v: f64| (v / surface.width).clamp(0.0, 1.0);
        let fy = |v: f64| (v / surface.height).clamp(0.0, 1.0);
        Ok([fx(self.x), fy(self.y), fx(self.x2()), fy(self.y2())])
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    /// Half-open containment: the right and bottom edges are outside
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x2() && y >= self.y && y < self.y2()
    }

    pub fn intersects(&self, other: &Region) -> bool {
        self.x < other.x2() && self.x2() > other.x && self.y < other.y2() && self.y2() > other.y
    }

    /// Move by a drag delta
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    /// Resize from the bottom-right handle; sizes never go negative
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
    }

    /// Same relative placement on a differently sized surface
    pub fn scaled(&self, from: Surface, to: Surface) -> Result<Self> {
        let xyxy = self.to_normalized(from)?;
        Self::from_normalized(xyxy, to)
    }
}
