use std::collections::HashMap;
use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    terminal::{Clear, ClearType},
};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use png::{BitDepth, ColorType, Encoder};
use pageflip_core::RenderImage;

mod flip;
mod input;
mod layout;

pub use flip::FlipPages;
pub use input::{clean_dropped_text, EventMapper, InputMode, InputSubscription, UiEvent};
pub use layout::{HitTarget, Rect, ScreenLayout, ThumbnailGrid};

/// Kitty image id of the main page.
pub const PAGE_IMAGE_ID: u32 = 1;
/// Kitty image id of the flip animation frames.
pub const FLIP_IMAGE_ID: u32 = 2;
const THUMBNAIL_IMAGE_BASE: u32 = 100;
const CHUNK_SIZE: usize = 4096;

/// Kitty image id used for the thumbnail of `page_number`.
pub fn thumbnail_image_id(page_number: usize) -> u32 {
    THUMBNAIL_IMAGE_BASE.saturating_add(page_number as u32)
}

/// Writes kitty graphics commands.
///
/// Images shown through [`KittyRenderer::show`] are uploaded once per
/// revision and afterwards only placed again, so a redraw of an unchanged
/// page costs a few bytes.
pub struct KittyRenderer<W: Write> {
    writer: W,
    placement_id: u32,
    uploaded: HashMap<u32, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            placement_id: 1,
            uploaded: HashMap::new(),
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Places `image` at the cursor, uploading it first unless the terminal
    /// already holds `revision` of `image_id`.
    pub fn show(
        &mut self,
        image_id: u32,
        revision: u64,
        image: &RenderImage,
        params: DrawParams,
    ) -> Result<()> {
        if self.uploaded.get(&image_id) != Some(&revision) {
            self.transmit(image_id, image)?;
            self.uploaded.insert(image_id, revision);
        }
        self.place(image_id, params)
    }

    /// Uploads `image` as PNG under `image_id` without displaying it.
    pub fn transmit(&mut self, image_id: u32, image: &RenderImage) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let control = format!("a=t,f=100,q=2,i={}", image_id);
        self.send(&control, &buffer)
    }

    /// Displays an uploaded image at the cursor, replacing its earlier
    /// placement.
    pub fn place(&mut self, image_id: u32, params: DrawParams) -> Result<()> {
        write!(
            self.writer,
            "\u{1b}_Ga=p,C=1,q=2,i={},p={},c={},r={},z=-1\u{1b}\\",
            image_id, self.placement_id, params.columns, params.rows
        )?;
        Ok(())
    }

    /// Transmits and places `image` in one go as zlib-compressed RGBA.
    /// Used for animation frames, which are shown once and never reused.
    pub fn draw(&mut self, image_id: u32, image: &RenderImage, params: DrawParams) -> Result<()> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&image.pixels)?;
        let compressed = encoder.finish()?;

        let control = format!(
            "a=T,f=32,o=z,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1",
            image_id, self.placement_id, params.columns, params.rows, image.width, image.height
        );
        self.uploaded.remove(&image_id);
        self.send(&control, &compressed)
    }

    fn send(&mut self, control: &str, payload: &[u8]) -> Result<()> {
        let encoded = BASE64.encode(payload);
        let mut chunks = encoded.as_bytes().chunks(CHUNK_SIZE).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = if chunks.peek().is_some() { 1 } else { 0 };
            if first {
                write!(self.writer, "\u{1b}_G{},m={}", control, more)?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", more)?;
            }
            self.writer.write_all(b";")?;
            self.writer.write_all(chunk)?;
            write!(self.writer, "\u{1b}\\")?;
        }
        Ok(())
    }

    /// Removes every placement of `image_id` and frees its data.
    pub fn delete(&mut self, image_id: u32) -> Result<()> {
        self.uploaded.remove(&image_id);
        write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", image_id)?;
        Ok(())
    }

    /// Removes every placement from the screen; uploaded data stays.
    pub fn hide_all(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=a,q=2\u{1b}\\")?;
        Ok(())
    }

    pub fn delete_all(&mut self) -> Result<()> {
        self.uploaded.clear();
        write!(self.writer, "\u{1b}_Ga=d,d=A,q=2\u{1b}\\")?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Clears the entire screen, images included.
    pub fn clear_all(&mut self) -> Result<()> {
        self.delete_all()?;
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}
