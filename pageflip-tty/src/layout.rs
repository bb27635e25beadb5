use std::ops::Range;

use pageflip_core::BoxSize;

/// Cell size assumed when the terminal does not report its pixel size.
const FALLBACK_CELL_WIDTH: f32 = 8.0;
const FALLBACK_CELL_HEIGHT: f32 = 16.0;

/// Below this height there is no room for chrome around the page.
const MIN_ROWS_FOR_CHROME: u16 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub col: u16,
    pub row: u16,
    pub cols: u16,
    pub rows: u16,
}

impl Rect {
    pub fn new(col: u16, row: u16, cols: u16, rows: u16) -> Self {
        Self {
            col,
            row,
            cols,
            rows,
        }
    }

    pub fn contains(&self, col: u16, row: u16) -> bool {
        col >= self.col
            && row >= self.row
            && u32::from(col) < u32::from(self.col) + u32::from(self.cols)
            && u32::from(row) < u32::from(self.row) + u32::from(self.rows)
    }

    pub fn is_empty(&self) -> bool {
        self.cols == 0 || self.rows == 0
    }

    fn inset(self, cols: u16, rows: u16) -> Self {
        if self.cols <= cols * 2 || self.rows <= rows * 2 {
            return self;
        }
        Self {
            col: self.col + cols,
            row: self.row + rows,
            cols: self.cols - cols * 2,
            rows: self.rows - rows * 2,
        }
    }
}

/// What a click at a given cell lands on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitTarget {
    /// Left third of the page area.
    Backward,
    /// Right third of the page area.
    Forward,
    /// Middle of the page area.
    Page,
    Progress { ratio: f32 },
    Thumbnail { page: usize },
    /// Inside the thumbnail panel, between cells.
    Panel,
    OutsidePanel,
    Chrome,
}

/// Cell geometry of one frame: header, page area, progress bar and hints.
/// Fullscreen gives the whole window to the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenLayout {
    pub columns: u16,
    pub rows: u16,
    pub cell_width: f32,
    pub cell_height: f32,
    pub header: Option<Rect>,
    pub page_area: Rect,
    pub progress: Option<Rect>,
    pub hints: Option<Rect>,
}

impl ScreenLayout {
    pub fn compute(
        columns: u16,
        rows: u16,
        pixel_width: u16,
        pixel_height: u16,
        fullscreen: bool,
    ) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let (cell_width, cell_height) = if pixel_width > 0 && pixel_height > 0 {
            (
                f32::from(pixel_width) / f32::from(columns),
                f32::from(pixel_height) / f32::from(rows),
            )
        } else {
            (FALLBACK_CELL_WIDTH, FALLBACK_CELL_HEIGHT)
        };

        if fullscreen || rows < MIN_ROWS_FOR_CHROME {
            return Self {
                columns,
                rows,
                cell_width,
                cell_height,
                header: None,
                page_area: Rect::new(0, 0, columns, rows),
                progress: None,
                hints: None,
            };
        }

        Self {
            columns,
            rows,
            cell_width,
            cell_height,
            header: Some(Rect::new(0, 0, columns, 1)),
            page_area: Rect::new(0, 1, columns, rows - 3),
            progress: Some(Rect::new(1, rows - 2, columns.saturating_sub(2).max(1), 1)),
            hints: Some(Rect::new(0, rows - 1, columns, 1)),
        }
    }

    /// Size of the page area in logical pixels.
    pub fn page_box(&self) -> BoxSize {
        BoxSize::new(
            f32::from(self.page_area.cols) * self.cell_width,
            f32::from(self.page_area.rows) * self.cell_height,
        )
    }

    /// Cells covered by an image of the given logical size, centered in the
    /// page area.
    pub fn place_image(&self, logical_width: f32, logical_height: f32) -> Rect {
        let area = self.page_area;
        let cols = cells_for(logical_width, self.cell_width, area.cols);
        let rows = cells_for(logical_height, self.cell_height, area.rows);
        Rect::new(
            area.col + (area.cols - cols) / 2,
            area.row + (area.rows - rows) / 2,
            cols,
            rows,
        )
    }

    /// Pixels covered by `rect` on screen.
    pub fn pixel_size(&self, rect: Rect) -> (u32, u32) {
        let width = (f32::from(rect.cols) * self.cell_width).round().max(1.0);
        let height = (f32::from(rect.rows) * self.cell_height).round().max(1.0);
        (width as u32, height as u32)
    }

    pub fn hit_test(&self, col: u16, row: u16, thumbnails: Option<&ThumbnailGrid>) -> HitTarget {
        if let Some(grid) = thumbnails {
            if !grid.panel.contains(col, row) {
                return HitTarget::OutsidePanel;
            }
            return match grid.page_at(col, row) {
                Some(page) => HitTarget::Thumbnail { page },
                None => HitTarget::Panel,
            };
        }

        if let Some(bar) = self.progress.filter(|bar| bar.contains(col, row)) {
            let ratio = if bar.cols > 1 {
                f32::from(col - bar.col) / f32::from(bar.cols - 1)
            } else {
                0.0
            };
            return HitTarget::Progress { ratio };
        }

        let area = self.page_area;
        if !area.contains(col, row) {
            return HitTarget::Chrome;
        }
        let third = area.cols / 3;
        let offset = col - area.col;
        if offset < third {
            HitTarget::Backward
        } else if offset >= area.cols - third {
            HitTarget::Forward
        } else {
            HitTarget::Page
        }
    }
}

fn cells_for(logical: f32, cell: f32, available: u16) -> u16 {
    if !(logical.is_finite() && logical > 0.0 && cell > 0.0) {
        return available.max(1);
    }
    let cells = (logical / cell).round().max(1.0);
    (cells.min(f32::from(available.max(1)))) as u16
}

/// Grid of thumbnail cells laid over the page area, scrolled so the current
/// page is visible.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailGrid {
    pub panel: Rect,
    cell_cols: u16,
    cell_rows: u16,
    per_row: usize,
    visible_rows: usize,
    first_page: usize,
    page_count: usize,
}

impl ThumbnailGrid {
    /// `thumbnail` is the logical size of one thumbnail image; every cell
    /// reserves one extra column as gutter and one extra row for the label.
    pub fn new(
        layout: &ScreenLayout,
        thumbnail: BoxSize,
        page_count: usize,
        current_page: usize,
    ) -> Self {
        let panel = layout.page_area.inset(1, 0);
        let image_cols = cells_for(thumbnail.width, layout.cell_width, panel.cols);
        let image_rows = cells_for(thumbnail.height, layout.cell_height, panel.rows);
        let cell_cols = image_cols.saturating_add(1);
        let cell_rows = image_rows.saturating_add(1);
        let per_row = usize::from((panel.cols / cell_cols).max(1));
        let visible_rows = usize::from((panel.rows / cell_rows).max(1));

        let current_row = current_page.saturating_sub(1) / per_row;
        let first_row = (current_row + 1).saturating_sub(visible_rows);

        Self {
            panel,
            cell_cols,
            cell_rows,
            per_row,
            visible_rows,
            first_page: first_row * per_row + 1,
            page_count,
        }
    }

    pub fn visible_pages(&self) -> Range<usize> {
        let end = (self.first_page + self.per_row * self.visible_rows).min(self.page_count + 1);
        self.first_page..end.max(self.first_page)
    }

    /// Cells of the thumbnail image for `page`, without gutter and label.
    pub fn image_rect(&self, page: usize) -> Option<Rect> {
        if !self.visible_pages().contains(&page) {
            return None;
        }
        let index = page - self.first_page;
        let col = self.panel.col + (index % self.per_row) as u16 * self.cell_cols;
        let row = self.panel.row + (index / self.per_row) as u16 * self.cell_rows;
        Some(Rect::new(col, row, self.cell_cols - 1, self.cell_rows - 1))
    }

    pub fn page_at(&self, col: u16, row: u16) -> Option<usize> {
        if !self.panel.contains(col, row) {
            return None;
        }
        let grid_col = usize::from((col - self.panel.col) / self.cell_cols);
        let grid_row = usize::from((row - self.panel.row) / self.cell_rows);
        if grid_col >= self.per_row || grid_row >= self.visible_rows {
            return None;
        }
        let page = self.first_page + grid_row * self.per_row + grid_col;
        self.visible_pages().contains(&page).then_some(page)
    }
}
