use std::io::Write;
use std::time::Instant;

use anyhow::Result;
use crossterm::cursor;
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{Clear, ClearType};
use pageflip_core::{Phase, Surface, TaskId, Viewer};
use pageflip_tty::{
    thumbnail_image_id, write_status_line, DrawParams, FlipPages, KittyRenderer, Rect,
    ScreenLayout, ThumbnailGrid, FLIP_IMAGE_ID, PAGE_IMAGE_ID,
};

const DROP_ZONE_MESSAGE: &str = "Drop a PDF here or press o to open one";

/// Everything one redraw needs besides the renderer.
pub struct Frame<'a> {
    pub viewer: &'a Viewer,
    pub layout: &'a ScreenLayout,
    pub thumbnails: Option<&'a ThumbnailGrid>,
    /// Prompt or status text that replaces the hint line.
    pub message: Option<&'a str>,
    pub now: Instant,
}

/// Draws frames and keeps what can be reused between them.
#[derive(Default)]
pub struct Painter {
    flip: Option<(FlipKey, FlipPages)>,
}

/// The pixels and on-screen size a set of scaled flip pages was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FlipKey {
    outgoing: Option<TaskId>,
    incoming: Option<TaskId>,
    width: u32,
    height: u32,
}

impl Painter {
    pub fn draw<W: Write>(&mut self, renderer: &mut KittyRenderer<W>, frame: &Frame<'_>) -> Result<()> {
        renderer.begin_sync_update()?;
        renderer.hide_all()?;
        crossterm::queue!(renderer.writer(), Clear(ClearType::All))?;

        let viewer = frame.viewer;
        let mut flipping = false;
        if let Some(percent) = viewer.loading_percent() {
            draw_loading(renderer.writer(), frame.layout, percent)?;
        } else if viewer.document().is_none() {
            draw_drop_zone(renderer.writer(), frame.layout)?;
        } else {
            draw_header(renderer.writer(), frame)?;
            flipping = self.draw_page(renderer, frame)?;
            draw_progress(renderer.writer(), frame)?;
            if let Some(grid) = frame.thumbnails {
                draw_thumbnails(renderer, viewer, grid)?;
            }
        }
        if !flipping && self.flip.take().is_some() {
            renderer.delete(FLIP_IMAGE_ID)?;
        }
        draw_hints(renderer.writer(), frame)?;

        renderer.end_sync_update()
    }
}

    /// Returns true when a flip frame was drawn.
    fn image_rect(layout: &ScreenLayout, surface: &Surface) -> Rect {
    match surface.plan() {
        Some(plan) => layout.place_image(plan.logical_width, plan.logical_height),
        None => layout.page_area,
    }
}

fn draw_surface<W: Write>(
    renderer: &mut KittyRenderer<W>,
    layout: &ScreenLayout,
    surface: &Surface,
) -> Result<()> {
    draw_image_at(renderer, PAGE_IMAGE_ID, surface, image_rect(layout, surface))
}

fn draw_image_at<W: Write>(
    renderer: &mut KittyRenderer<W>,
    image_id: u32,
    surface: &Surface,
    rect: Rect,
) -> Result<()> {
    let (Some(image), Some(revision)) = (surface.image(), surface.revision()) else {
        return Ok(());
    };
    if image.is_empty() || rect.is_empty() {
        return Ok(());
    }
    crossterm::queue!(renderer.writer(), cursor::MoveTo(rect.col, rect.row))?;
    renderer.show(
        image_id,
        revision,
        image,
        DrawParams::clamped(u32::from(rect.cols), u32::from(rect.rows)),
    )
}

fn draw_progress(writer: &mut impl Write, frame: &Frame<'_>) -> Result<()> {
    let Some(bar) = frame.layout.progress else {
        return Ok(());
    };
    let width = usize::from(bar.cols);
    let filled = ((frame.viewer.progress_percent() / 100.0) * width as f32).round() as usize;
    let filled = filled.min(width);
    crossterm::queue!(
        writer,
        cursor::MoveTo(bar.col, bar.row),
        Print("━".repeat(filled)),
        SetAttribute(Attribute::Dim),
        Print("─".repeat(width - filled)),
        SetAttribute(Attribute::Reset)
    )?;
    Ok(())
}

fn draw_thumbnails<W: Write>(
    renderer: &mut KittyRenderer<W>,
    viewer: &Viewer,
    grid: &ThumbnailGrid,
) -> Result<()> {
    let panel = grid.panel;
    let blank = " ".repeat(usize::from(panel.cols));
    for row in panel.row..panel.row + panel.rows {
        crossterm::queue!(renderer.writer(), cursor::MoveTo(panel.col, row), Print(&blank))?;
    }

    for page in grid.visible_pages() {
        let Some(rect) = grid.image_rect(page) else {
            continue;
        };
        if let Some(surface) = viewer.thumbnails().get(page - 1) {
            draw_image_at(renderer, thumbnail_image_id(page), surface, rect)?;
        }
        let label = pad_to(format!("{:^width$}", page, width = usize::from(rect.cols)), rect.cols);
        let label_row = rect.row + rect.rows;
        if page == viewer.page() {
            print_inverted(renderer.writer(), rect.col, label_row, &label)?;
        } else {
            crossterm::queue!(renderer.writer(), cursor::MoveTo(rect.col, label_row), Print(&label))?;
        }
    }
    Ok(())
}

fn draw_hints(writer: &mut impl Write, frame: &Frame<'_>) -> Result<()> {
    let Some(hints) = frame.layout.hints else {
        return Ok(());
    };
    let text = match frame.message {
        Some(message) => message.to_string(),
        None => hint_text(frame.viewer),
    };
    crossterm::queue!(
        writer,
        cursor::MoveTo(hints.col, hints.row),
        Clear(ClearType::CurrentLine)
    )?;
    write_status_line(writer, &truncate_with_ellipsis(text, usize::from(hints.cols)))?;
    Ok(())
}

fn hint_text(viewer: &Viewer) -> String {
    let mut hints = Vec::new();
    if viewer.can_backward() {
        hints.push("← prev");
    }
    if viewer.can_forward() {
        hints.push("→ next");
    }
    if viewer.document().is_some() {
        hints.push("t thumbnails");
        hints.push("f fullscreen");
    }
    hints.push("o open");
    hints.push("q quit");
    hints.join("  ")
}

fn print_centered(writer: &mut impl Write, area: Rect, row: u16, content: &str) -> Result<()> {
    let content = truncate_with_ellipsis(content.to_string(), usize::from(area.cols));
    let width = content.chars().count() as u16;
    let col = area.col + area.cols.saturating_sub(width) / 2;
    crossterm::queue!(writer, cursor::MoveTo(col, row), Print(content))?;
    Ok(())
}

fn print_inverted(writer: &mut impl Write, col: u16, row: u16, content: &str) -> Result<()> {
    crossterm::queue!(
        writer,
        cursor::MoveTo(col, row),
        SetAttribute(Attribute::Reverse),
        Print(content),
        SetAttribute(Attribute::Reset)
    )?;
    Ok(())
}

fn pad_to(text: String, width: u16) -> String {
    let missing = usize::from(width).saturating_sub(text.chars().count());
    text + &" ".repeat(missing)
}

fn truncate_with_ellipsis(text: String, width: usize) -> String {
    if text.chars().count() <= width {
        return text;
    }
    if width == 0 {
        return String::new();
    }
    let mut truncated: String = text.chars().take(width - 1).collect();
    truncated.push('…');
    truncated
}
