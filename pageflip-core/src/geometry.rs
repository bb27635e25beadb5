//! Fit-to-box sizing shared by the page and thumbnail renderers.

use serde::{Deserialize, Serialize};

/// Surfaces are rasterized at twice their logical size for sharpness.
pub const OVERSAMPLE: f32 = 2.0;

/// Logical width of a thumbnail in the page picker grid.
pub const THUMBNAIL_WIDTH: f32 = 110.0;

/// Native page size in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        is_positive(self.width) && is_positive(self.height)
    }
}

/// A target area in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxSize {
    pub width: f32,
    pub height: f32,
}

impl BoxSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        is_positive(self.width) && is_positive(self.height)
    }

    /// Shrinks `self` so that it fits within `cap` on both axes.
    pub fn capped(self, cap: Option<BoxSize>) -> Self {
        match cap {
            Some(cap) => Self {
                width: self.width.min(cap.width),
                height: self.height.min(cap.height),
            },
            None => self,
        }
    }
}

/// How one page is laid out on a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterPlan {
    /// Native points to logical pixels.
    pub fit_scale: f32,
    /// Native points to surface pixels (`fit_scale * oversample`).
    pub render_scale: f32,
    pub logical_width: f32,
    pub logical_height: f32,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl RasterPlan {
    fn from_scale(page: PageSize, fit_scale: f32, oversample: f32) -> Option<Self> {
        if !is_positive(fit_scale) || !is_positive(oversample) {
            return None;
        }
        let logical_width = page.width * fit_scale;
        let logical_height = page.height * fit_scale;
        let pixel_width = (logical_width * oversample).round().max(1.0) as u32;
        let pixel_height = (logical_height * oversample).round().max(1.0) as u32;
        Some(Self {
            fit_scale,
            render_scale: fit_scale * oversample,
            logical_width,
            logical_height,
            pixel_width,
            pixel_height,
        })
    }
}

/// The largest scale at which `page` still fits inside `target`.
pub fn fit_to_box(page: PageSize, target: BoxSize) -> Option<f32> {
    if !page.is_valid() || !target.is_valid() {
        return None;
    }
    Some((target.width / page.width).min(target.height / page.height))
}

pub fn plan_fit(page: PageSize, target: BoxSize, oversample: f32) -> Option<RasterPlan> {
    let scale = fit_to_box(page, target)?;
    RasterPlan::from_scale(page, scale, oversample)
}

/// Plans a surface of fixed logical `width`; height follows the aspect ratio.
pub fn plan_fixed_width(page: PageSize, width: f32, oversample: f32) -> Option<RasterPlan> {
    if !page.is_valid() || !is_positive(width) {
        return None;
    }
    RasterPlan::from_scale(page, width / page.width, oversample)
}

fn is_positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}
