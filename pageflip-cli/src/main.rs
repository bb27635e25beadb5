use std::fs;
use std::io::{self, Write};
use std::mem;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::event;
use crossterm::terminal;
use directories::ProjectDirs;
use pageflip_core::{
    BoxSize, Command, Direction, DocumentProvider, RenderOutcome, Viewer, ViewerConfig,
    ViewerEvent,
};
use pageflip_render::{PdfRenderFactory, PoolExecutor};
use pageflip_tty::{
    EventMapper, HitTarget, InputMode, InputSubscription, KittyRenderer, ScreenLayout,
    ThumbnailGrid, UiEvent,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod draw;
mod loader;
mod source;

use draw::{Frame, Painter};
use loader::{LoadMessage, Loader};
use source::parse_source;

/// Poll interval while nothing is animating or loading.
const IDLE_POLL: Duration = Duration::from_millis(100);
/// Aspect ratio assumed for thumbnails before any page size is known.
const LETTER_ASPECT: f32 = 792.0 / 612.0;

#[derive(Debug, Parser)]
#[command(
    name = "pageflip",
    version,
    about = "Page-flipping PDF viewer for kitty-compatible terminals"
)]
struct Args {
    /// PDF file or http(s) URL to open (defaults to `default_document` from the config)
    document: Option<String>,

    /// Config file (defaults to config.toml in the platform config directory)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Page to show once the document is loaded (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pageflip", "pageflip")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::load_or_default(&project_dirs.config_dir().join("config.toml"))?,
    };
    debug!(?config, "configuration loaded");

    let provider: Arc<dyn DocumentProvider> = Arc::new(
        PdfRenderFactory::new(config.pdfium_library.as_deref())
            .context("failed to initialise Pdfium")?,
    );
    let initial = parse_source(args.document.as_deref().unwrap_or(&config.default_document))?;

    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let executor = PoolExecutor::new(render_threads(), outcome_tx)?;
    let (load_tx, load_rx) = mpsc::unbounded_channel();
    let mut shell = Shell::new(&config, Loader::new(provider, load_tx), args.page);
    shell.open(initial);

    let _input = InputSubscription::acquire()?;
    let mut renderer = KittyRenderer::new(io::stdout());
    renderer.clear_all()?;

    let result = run(&mut shell, &mut renderer, &executor, outcome_rx, load_rx);

    renderer.clear_all()?;
    result
}

fn run(
    shell: &mut Shell,
    renderer: &mut KittyRenderer<io::Stdout>,
    executor: &PoolExecutor,
    mut outcomes: UnboundedReceiver<RenderOutcome>,
    mut loads: UnboundedReceiver<LoadMessage>,
) -> Result<()> {
    loop {
        shell.refresh_layout()?;
        while let Ok(message) = loads.try_recv() {
            shell.on_load_message(message);
        }
        while let Ok(outcome) = outcomes.try_recv() {
            shell.viewer.apply_outcome(outcome);
        }

        let now = Instant::now();
        if shell.viewer.tick(now) {
            shell.dirty = true;
        }
        shell.drain_viewer_events(now);
        shell.viewer.dispatch(executor);

        if shell.dirty {
            shell.redraw(renderer, now)?;
        }

        if event::poll(shell.poll_timeout(Instant::now()))? {
            let ui_event = shell.mapper.map_event(event::read()?);
            match shell.handle_event(ui_event, Instant::now()) {
                LoopAction::ContinueRedraw => shell.dirty = true,
                LoopAction::Continue => {}
                LoopAction::Quit => break,
            }
        }
    }
    Ok(())
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

/// Owns the viewer on the event-loop thread together with the terminal
/// state that belongs to it.
struct Shell {
    viewer: Viewer,
    mapper: EventMapper,
    loader: Loader,
    layout: ScreenLayout,
    painter: Painter,
    /// Set when a new document replaces the images held by the terminal.
    purge_images: bool,
    max_page_box: Option<BoxSize>,
    thumbnail_width: f32,
    thumbnail_aspect: f32,
    frame_interval: Duration,
    start_page: Option<usize>,
    status: Option<String>,
    dirty: bool,
}

impl Shell {
    fn new(config: &ViewerConfig, loader: Loader, start_page: Option<usize>) -> Self {
        Self {
            viewer: Viewer::new(config),
            mapper: EventMapper::new(),
            loader,
            layout: ScreenLayout::compute(80, 24, 0, 0, false),
            painter: Painter::default(),
            purge_images: false,
            max_page_box: config.max_page_box,
            thumbnail_width: config.thumbnail_width,
            thumbnail_aspect: LETTER_ASPECT,
            frame_interval: config.frame_interval,
            start_page,
            status: None,
            dirty: true,
        }
    }

    fn open(&mut self, source: pageflip_core::DocumentSource) {
        self.status = None;
        self.viewer.begin_loading();
        self.loader.start(source);
    }

    fn on_load_message(&mut self, message: LoadMessage) {
        match message {
            LoadMessage::Progress {
                generation,
                progress,
            } if self.loader.is_current(generation) => {
                self.viewer
                    .update_load_progress(progress.loaded, progress.total);
            }
            LoadMessage::Loaded {
                generation,
                document,
            } if self.loader.is_current(generation) => {
                self.viewer.finish_load(document);
            }
            LoadMessage::Failed {
                generation,
                source,
                error,
            } if self.loader.is_current(generation) => {
                warn!(%source, ?error, "failed to load document");
                self.status = Some(format!("Could not open {}: {:#}", source.display_name(), error));
                self.viewer.load_failed();
            }
            _ => debug!("dropping message from a superseded load"),
        }
    }

    fn drain_viewer_events(&mut self, now: Instant) {
        let events: Vec<ViewerEvent> = self.viewer.events().lock().drain(..).collect();
        for event in events {
            match event {
                ViewerEvent::RedrawNeeded | ViewerEvent::SurfaceReady(_) => self.dirty = true,
                ViewerEvent::DocumentLoaded(id) => {
                    debug!(%id, pages = self.viewer.page_count(), "document ready");
                    self.purge_images = true;
                    self.thumbnail_aspect = self
                        .viewer
                        .document()
                        .and_then(|document| document.page_size(1).ok())
                        .filter(|size| size.is_valid())
                        .map(|size| size.height / size.width)
                        .unwrap_or(LETTER_ASPECT);
                    if let Some(page) = self.start_page.take() {
                        let target = page.clamp(1, self.viewer.page_count().max(1));
                        self.viewer.jump_to(target, now);
                    }
                }
                ViewerEvent::PageChanged(page) => debug!(page, "page changed"),
            }
        }
    }

    fn refresh_layout(&mut self) -> Result<()> {
        let (columns, rows, width, height) = match terminal::window_size() {
            Ok(size) => (size.columns, size.rows, size.width, size.height),
            Err(_) => {
                let (columns, rows) = terminal::size()?;
                (columns, rows, 0, 0)
            }
        };
        let layout =
            ScreenLayout::compute(columns, rows, width, height, self.viewer.is_fullscreen());
        if layout != self.layout {
            self.layout = layout;
            self.viewer
                .set_page_box(layout.page_box().capped(self.max_page_box));
            self.dirty = true;
        }
        Ok(())
    }

    fn thumbnail_grid(&self) -> Option<ThumbnailGrid> {
        if !self.viewer.thumbnails_visible() {
            return None;
        }
        self.viewer.document()?;
        let thumbnail = BoxSize::new(
            self.thumbnail_width,
            self.thumbnail_width * self.thumbnail_aspect,
        );
        Some(ThumbnailGrid::new(
            &self.layout,
            thumbnail,
            self.viewer.page_count(),
            self.viewer.page(),
        ))
    }

    fn redraw<W: Write>(&mut self, renderer: &mut KittyRenderer<W>, now: Instant) -> Result<()> {
        if mem::take(&mut self.purge_images) {
            renderer.delete_all()?;
        }
        let grid = self.thumbnail_grid();
        let prompt = self.mapper.pending_input();
        let frame = Frame {
            viewer: &self.viewer,
            layout: &self.layout,
            thumbnails: grid.as_ref(),
            message: prompt.as_deref().or(self.status.as_deref()),
            now,
        };
        self.painter.draw(renderer, &frame)?;
        // Keep redrawing while the flip animates.
        self.dirty = self.viewer.is_busy();
        Ok(())
    }

    fn poll_timeout(&self, now: Instant) -> Duration {
        let mut timeout = if self.viewer.is_busy() || self.viewer.is_loading() {
            self.frame_interval
        } else if self.has_pending_renders() {
            self.frame_interval
        } else {
            IDLE_POLL
        };
        if let Some(deadline) = self.viewer.next_deadline() {
            timeout = timeout.min(deadline.saturating_duration_since(now));
        }
        timeout
    }

    fn has_pending_renders(&self) -> bool {
        self.viewer.page_surface().is_pending()
            || self
                .viewer
                .thumbnails()
                .iter()
                .any(|surface| surface.is_pending())
    }

    fn handle_event(&mut self, event: UiEvent, now: Instant) -> LoopAction {
        match event {
            UiEvent::Command(command) => {
                if self.viewer.apply(command, now) {
                    LoopAction::ContinueRedraw
                } else {
                    LoopAction::Continue
                }
            }
            UiEvent::Click { column, row } => self.handle_click(column, row, now),
            UiEvent::BeginOpen | UiEvent::PromptChanged { .. } | UiEvent::PromptCancel => {
                LoopAction::ContinueRedraw
            }
            UiEvent::OpenFile { path } => {
                match parse_source(&path) {
                    Ok(source) => {
                        info!(%source, "opening document");
                        self.open(source);
                    }
                    Err(err) => {
                        warn!(?err, input = %path, "rejected document input");
                        self.status = Some(format!("{:#}", err));
                    }
                }
                LoopAction::ContinueRedraw
            }
            UiEvent::Resize => LoopAction::ContinueRedraw,
            UiEvent::Quit => LoopAction::Quit,
            UiEvent::None => LoopAction::Continue,
        }
    }

    fn handle_click(&mut self, column: u16, row: u16, now: Instant) -> LoopAction {
        if self.viewer.document().is_none() {
            if self.viewer.is_loading() {
                return LoopAction::Continue;
            }
            // The drop zone doubles as an open button.
            self.mapper.set_mode(InputMode::OpenPrompt);
            return LoopAction::ContinueRedraw;
        }
        let grid = self.thumbnail_grid();
        let command = match self.layout.hit_test(column, row, grid.as_ref()) {
            HitTarget::Backward => Command::Navigate(Direction::Backward),
            HitTarget::Forward => Command::Navigate(Direction::Forward),
            HitTarget::Progress { ratio } => Command::Scrub { ratio },
            HitTarget::Thumbnail { page } => Command::JumpTo { page },
            HitTarget::OutsidePanel => Command::CloseThumbnails,
            HitTarget::Page | HitTarget::Panel | HitTarget::Chrome => {
                return LoopAction::Continue
            }
        };
        if self.viewer.apply(command, now) {
            LoopAction::ContinueRedraw
        } else {
            LoopAction::Continue
        }
    }
}

fn render_threads() -> usize {
    thread::available_parallelism()
        .map(|count| count.get().clamp(1, 4))
        .unwrap_or(2)
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pageflip.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // The terminal belongs to the viewer, so logs only go to the file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
