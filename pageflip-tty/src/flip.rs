use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use pageflip_core::{Direction, RenderImage};

/// Darkening applied to the turning page at the end of the flip.
const FOLD_SHADE: f32 = 0.3;
/// Peak opacity of the shadow cast on the page underneath.
const SHADOW_ALPHA: f32 = 0.35;

/// Both pages of one flip, scaled once to the size the frames are shown at.
///
/// The incoming page lies underneath while the outgoing page folds toward
/// its hinge: the left edge when moving forward, the right edge when moving
/// backward.
pub struct FlipPages {
    outgoing: Option<RgbaImage>,
    /// Backdrop of every frame; white when the incoming page is missing.
    incoming: RgbaImage,
}

impl FlipPages {
    /// Returns `None` when neither page has pixels or the target is empty.
    pub fn new(
        outgoing: &RenderImage,
        incoming: &RenderImage,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let outgoing = to_rgba(outgoing);
        let incoming = to_rgba(incoming);
        if outgoing.is_none() && incoming.is_none() {
            return None;
        }
        let incoming = match incoming {
            Some(page) => fit(&page, width, height, FilterType::Triangle),
            None => RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])),
        };
        Some(Self {
            outgoing: outgoing.map(|page| fit(&page, width, height, FilterType::Triangle)),
            incoming,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.incoming.dimensions()
    }

    /// One animation frame; `progress` runs from 0 (outgoing page flat) to 1
    /// (fully turned).
    pub fn frame(&self, progress: f32, direction: Direction) -> RenderImage {
        let progress = if progress.is_finite() {
            progress.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut canvas = self.incoming.clone();
        let Some(outgoing) = self.outgoing.as_ref().filter(|_| progress < 1.0) else {
            return from_rgba(canvas);
        };

        let (width, height) = canvas.dimensions();
        let folded_width = ((width as f32) * (1.0 - progress)).round().max(1.0) as u32;
        let mut folded = fit(outgoing, folded_width, height, FilterType::Nearest);
        shade(&mut folded, 1.0 - FOLD_SHADE * progress);

        let (fold_x, free_edge) = match direction {
            Direction::Forward => (0, folded_width),
            Direction::Backward => (width - folded_width, width - folded_width),
        };
        cast_shadow(&mut canvas, free_edge, direction, 1.0 - progress);
        imageops::overlay(&mut canvas, &folded, i64::from(fold_x), 0);

        from_rgba(canvas)
    }
}

fn to_rgba(image: &RenderImage) -> Option<RgbaImage> {
    if image.is_empty() {
        return None;
    }
    RgbaImage::from_raw(image.width, image.height, image.pixels.clone())
}

fn from_rgba(image: RgbaImage) -> RenderImage {
    let (width, height) = image.dimensions();
    RenderImage {
        width,
        height,
        pixels: image.into_raw(),
    }
}

fn fit(page: &RgbaImage, width: u32, height: u32, filter: FilterType) -> RgbaImage {
    if page.dimensions() == (width, height) {
        page.clone()
    } else {
        imageops::resize(page, width, height, filter)
    }
}

fn shade(image: &mut RgbaImage, factor: f32) {
    for pixel in image.pixels_mut() {
        for channel in &mut pixel.0[..3] {
            *channel = (f32::from(*channel) * factor).round() as u8;
        }
    }
}

/// Darkens a band of the page underneath next to the free edge of the fold.
fn cast_shadow(canvas: &mut RgbaImage, edge: u32, direction: Direction, strength: f32) {
    let (width, height) = canvas.dimensions();
    let band = (width / 12).max(1);
    for offset in 0..band {
        let x = match direction {
            Direction::Forward => edge.checked_add(offset),
            Direction::Backward => edge.checked_sub(offset + 1),
        };
        let Some(x) = x.filter(|&x| x < width) else {
            break;
        };
        let alpha = SHADOW_ALPHA * strength * (1.0 - offset as f32 / band as f32);
        for y in 0..height {
            let pixel = canvas.get_pixel_mut(x, y);
            for channel in &mut pixel.0[..3] {
                *channel = (f32::from(*channel) * (1.0 - alpha)).round() as u8;
            }
        }
    }
}
