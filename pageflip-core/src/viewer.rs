//! The viewer shell: owns the document handle, the current page and the
//! single in-flight transition, and turns navigation commands into render
//! jobs.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ViewerConfig;
use crate::geometry::BoxSize;
use crate::render::{
    PageRenderer, RenderError, RenderExecutor, RenderJob, RenderKind, RenderOutcome, Surface,
    SurfaceId, TaskSequence, ThumbnailRenderer,
};
use crate::transition::{
    Direction, Phase, TransitionController, TransitionRecord, TransitionSignal,
    TransitionTimings,
};
use crate::{DocumentBackend, DocumentId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Navigate(Direction),
    JumpTo { page: usize },
    /// Jump to a horizontal position on the progress bar, `0.0..=1.0`.
    Scrub { ratio: f32 },
    ToggleThumbnails,
    CloseThumbnails,
    ToggleFullscreen,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    DocumentLoaded(DocumentId),
    PageChanged(usize),
    /// A page rasterization landed in its surface. Thumbnails report
    /// `RedrawNeeded` instead.
    SurfaceReady(SurfaceId),
    RedrawNeeded,
}

/// Position of `page` on the progress bar, in percent.
pub fn progress_percent(page: usize, page_count: usize) -> f32 {
    if page_count <= 1 {
        return 0.0;
    }
    let clamped = page.clamp(1, page_count);
    (clamped - 1) as f32 / (page_count - 1) as f32 * 100.0
}

/// Page selected by a click at `ratio` along the progress bar.
pub fn scrub_target(ratio: f32, page_count: usize) -> Option<usize> {
    if page_count == 0 || !ratio.is_finite() {
        return None;
    }
    let raw = (ratio * page_count as f32).round();
    Some((raw.max(1.0) as usize).min(page_count))
}

pub struct Viewer {
    timings: TransitionTimings,
    page_renderer: PageRenderer,
    thumbnail_renderer: ThumbnailRenderer,
    page_box: BoxSize,
    document: Option<Arc<dyn DocumentBackend>>,
    page: usize,
    transition: Option<TransitionController>,
    page_surface: Surface,
    thumbnails: Vec<Surface>,
    thumbnails_visible: bool,
    fullscreen: bool,
    loading: Option<u8>,
    tasks: TaskSequence,
    jobs: Vec<RenderJob>,
    events: Arc<Mutex<Vec<ViewerEvent>>>,
}

impl Viewer {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            timings: config.timings(),
            page_renderer: PageRenderer::new(config.oversample),
            thumbnail_renderer: ThumbnailRenderer::new(config.thumbnail_width, config.oversample),
            page_box: config
                .max_page_box
                .unwrap_or_else(|| BoxSize::new(900.0, 530.0)),
            document: None,
            page: 1,
            transition: None,
            page_surface: Surface::new(SurfaceId::Page),
            thumbnails: Vec::new(),
            thumbnails_visible: false,
            fullscreen: false,
            loading: None,
            tasks: TaskSequence::default(),
            jobs: Vec::new(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Arc<Mutex<Vec<ViewerEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn document(&self) -> Option<&Arc<dyn DocumentBackend>> {
        self.document.as_ref()
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.document
            .as_ref()
            .map(|doc| doc.page_count())
            .unwrap_or(0)
    }

    /// True while a transition is in flight; navigation is refused meanwhile.
    pub fn is_busy(&self) -> bool {
        self.transition.is_some()
    }

    pub fn transition(&self) -> Option<&TransitionController> {
        self.transition.as_ref()
    }

    pub fn page_surface(&self) -> &Surface {
        &self.page_surface
    }

    pub fn thumbnails(&self) -> &[Surface] {
        &self.thumbnails
    }

    pub fn thumbnails_visible(&self) -> bool {
        self.thumbnails_visible
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    pub fn loading_percent(&self) -> Option<u8> {
        self.loading
    }

    pub fn page_box(&self) -> BoxSize {
        self.page_box
    }

    pub fn can_forward(&self) -> bool {
        self.page < self.page_count()
    }

    pub fn can_backward(&self) -> bool {
        self.document.is_some() && self.page > 1
    }

    pub fn progress_percent(&self) -> f32 {
        progress_percent(self.page, self.page_count())
    }

    pub fn apply(&mut self, command: Command, now: Instant) -> bool {
        match command {
            Command::Navigate(direction) => self.navigate(direction, now),
            Command::JumpTo { page } => self.jump_to(page, now),
            Command::Scrub { ratio } => self.scrub(ratio, now),
            Command::ToggleThumbnails => {
                let visible = !self.thumbnails_visible;
                self.set_thumbnails_visible(visible)
            }
            Command::CloseThumbnails => self.set_thumbnails_visible(false),
            Command::ToggleFullscreen => {
                self.fullscreen = !self.fullscreen;
                self.push_event(ViewerEvent::RedrawNeeded);
                true
            }
        }
    }

    pub fn navigate(&mut self, direction: Direction, now: Instant) -> bool {
        if self.is_busy() {
            return false;
        }
        let to_page = match direction {
            Direction::Forward if self.can_forward() => self.page + 1,
            Direction::Backward if self.can_backward() => self.page - 1,
            _ => return false,
        };
        self.begin_transition(to_page, direction, now);
        true
    }

    pub fn jump_to(&mut self, target: usize, now: Instant) -> bool {
        if target == self.page || self.is_busy() {
            return false;
        }
        if !(1..=self.page_count()).contains(&target) {
            return false;
        }
        self.begin_transition(target, Direction::between(self.page, target), now);
        self.set_thumbnails_visible(false);
        true
    }

    pub fn scrub(&mut self, ratio: f32, now: Instant) -> bool {
        match scrub_target(ratio, self.page_count()) {
            Some(target) => self.jump_to(target, now),
            None => false,
        }
    }

    fn begin_transition(&mut self, to_page: usize, direction: Direction, now: Instant) {
        let record = TransitionRecord {
            from_page: self.page,
            to_page,
            direction,
        };
        debug!(?record, "starting page transition");
        self.transition = Some(TransitionController::new(record, self.timings, now));
        self.request_surface(SurfaceId::Outgoing, record.from_page);
        self.request_surface(SurfaceId::Incoming, record.to_page);
        self.push_event(ViewerEvent::RedrawNeeded);
    }

    /// Commits the in-flight transition. Does nothing when there is none.
    pub fn on_transition_done(&mut self) -> bool {
        let Some(mut controller) = self.transition.take() else {
            return false;
        };
        let record = controller.record();
        self.page = record.to_page;
        if !self.page_surface.take_painted(controller.incoming_mut()) {
            self.page_surface.clear();
            self.request_surface(SurfaceId::Page, self.page);
        }
        drop(controller);
        debug!(page = self.page, "page transition finished");
        self.push_event(ViewerEvent::PageChanged(self.page));
        self.push_event(ViewerEvent::RedrawNeeded);
        true
    }

    /// Advances the transition clock. Returns true when the screen is stale.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(controller) = self.transition.as_mut() else {
            return false;
        };
        match controller.tick(now) {
            Some(TransitionSignal::Done(_)) => self.on_transition_done(),
            Some(TransitionSignal::Animating) => true,
            None => controller.phase() == Phase::Animating,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.transition
            .as_ref()
            .and_then(TransitionController::next_deadline)
    }

    /// Resizes the page box and repaints the visible page surfaces.
    pub fn set_page_box(&mut self, page_box: BoxSize) {
        if !page_box.is_valid() || page_box == self.page_box {
            return;
        }
        self.page_box = page_box;
        if self.document.is_none() {
            return;
        }
        self.request_surface(SurfaceId::Page, self.page);
        if let Some(record) = self.transition.as_ref().map(TransitionController::record) {
            self.request_surface(SurfaceId::Outgoing, record.from_page);
            self.request_surface(SurfaceId::Incoming, record.to_page);
        }
    }

    pub fn begin_loading(&mut self) {
        self.loading = Some(0);
        self.push_event(ViewerEvent::RedrawNeeded);
    }

    /// Records byte progress; ignored while the total size is unknown.
    pub fn update_load_progress(&mut self, loaded: u64, total: Option<u64>) {
        let Some(total) = total.filter(|&total| total > 0) else {
            return;
        };
        let percent = ((loaded as f64 / total as f64) * 100.0).round().min(100.0) as u8;
        if self.loading.is_some() && self.loading != Some(percent) {
            self.loading = Some(percent);
            self.push_event(ViewerEvent::RedrawNeeded);
        }
    }

    /// Replaces the current document with `document` and shows its first page.
    pub fn finish_load(&mut self, document: Arc<dyn DocumentBackend>) {
        let info = document.info().clone();
        info!(
            source = %info.source,
            pages = info.page_count,
            "document loaded"
        );
        self.transition = None;
        self.page_surface.clear();
        self.thumbnails = (0..info.page_count)
            .map(|index| Surface::new(SurfaceId::Thumbnail(index)))
            .collect();
        self.jobs.clear();
        self.document = Some(document);
        self.page = 1;
        self.loading = None;
        self.request_surface(SurfaceId::Page, self.page);
        if self.thumbnails_visible {
            self.request_thumbnails();
        }
        self.push_event(ViewerEvent::DocumentLoaded(info.id));
        self.push_event(ViewerEvent::RedrawNeeded);
    }

    /// Leaves whatever was shown before the load attempt in place.
    pub fn load_failed(&mut self) {
        self.loading = None;
        self.push_event(ViewerEvent::RedrawNeeded);
    }

    /// Writes a finished rasterization into its surface if it is still wanted.
    pub fn apply_outcome(&mut self, outcome: RenderOutcome) -> bool {
        let current = self.document.as_ref().map(|doc| doc.info().id);
        if current != Some(outcome.document) {
            return false;
        }
        let Some(surface) = self.surface_mut(outcome.surface) else {
            return false;
        };
        match outcome.result {
            Ok(image) => {
                if !surface.accept(outcome.task, image) {
                    return false;
                }
                match outcome.kind {
                    RenderKind::Page => {
                        self.push_event(ViewerEvent::SurfaceReady(outcome.surface))
                    }
                    RenderKind::Thumbnail => self.push_event(ViewerEvent::RedrawNeeded),
                }
                true
            }
            Err(RenderError::Cancelled(_)) => {
                surface.settle(outcome.task);
                false
            }
            Err(RenderError::Backend(err)) => {
                let current = surface.settle(outcome.task);
                if current && outcome.kind == RenderKind::Page {
                    warn!(
                        ?err,
                        page = outcome.page_number,
                        surface = ?outcome.surface,
                        "failed to render page"
                    );
                }
                false
            }
        }
    }

    /// Hands queued render jobs to `executor`.
    pub fn dispatch(&mut self, executor: &dyn RenderExecutor) {
        let Some(document) = self.document.clone() else {
            self.jobs.clear();
            return;
        };
        for job in self.jobs.drain(..) {
            if job.token.is_cancelled() {
                continue;
            }
            executor.submit(Arc::clone(&document), job);
        }
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    fn set_thumbnails_visible(&mut self, visible: bool) -> bool {
        if self.thumbnails_visible == visible {
            return false;
        }
        self.thumbnails_visible = visible;
        if visible {
            self.request_thumbnails();
        } else {
            self.thumbnails.iter_mut().for_each(Surface::cancel);
        }
        self.push_event(ViewerEvent::RedrawNeeded);
        true
    }

    fn request_thumbnails(&mut self) {
        let wanted: Vec<usize> = self
            .thumbnails
            .iter()
            .enumerate()
            .filter(|(_, surface)| !surface.is_ready() && !surface.is_pending())
            .map(|(index, _)| index)
            .collect();
        for index in wanted {
            self.request_surface(SurfaceId::Thumbnail(index), index + 1);
        }
    }

    fn surface_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        match id {
            SurfaceId::Page => Some(&mut self.page_surface),
            SurfaceId::Outgoing | SurfaceId::Incoming => self
                .transition
                .as_mut()
                .and_then(|controller| controller.surface_mut(id)),
            SurfaceId::Thumbnail(index) => self.thumbnails.get_mut(index),
        }
    }

    fn request_surface(&mut self, id: SurfaceId, page_number: usize) {
        let Some(document) = self.document.clone() else {
            return;
        };
        let page_box = self.page_box;
        let page_renderer = self.page_renderer;
        let thumbnail_renderer = self.thumbnail_renderer;
        let mut tasks = std::mem::take(&mut self.tasks);
        let result = match self.surface_mut(id) {
            Some(surface) => match id {
                SurfaceId::Thumbnail(_) => thumbnail_renderer.request(
                    document.as_ref(),
                    surface,
                    &mut tasks,
                    page_number,
                ),
                _ => page_renderer.request(
                    document.as_ref(),
                    surface,
                    &mut tasks,
                    page_number,
                    page_box,
                ),
            },
            None => Ok(None),
        };
        self.tasks = tasks;
        match result {
            Ok(Some(job)) => self.jobs.push(job),
            Ok(None) => {}
            Err(err) => {
                if !matches!(id, SurfaceId::Thumbnail(_)) {
                    warn!(?err, page = page_number, "failed to plan page render");
                }
            }
        }
    }

    fn push_event(&self, event: ViewerEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::testing::FakeBackend;

    /// Runs every job immediately and keeps the outcomes for the test to apply.
    #[derive(Default)]
    struct InlineExecutor {
        outcomes: Mutex<Vec<RenderOutcome>>,
    }

    impl RenderExecutor for InlineExecutor {
        fn submit(&self, backend: Arc<dyn DocumentBackend>, job: RenderJob) {
            let outcome = job.execute(backend.as_ref());
            self.outcomes.lock().push(outcome);
        }
    }

    impl InlineExecutor {
        fn pump(&self, viewer: &mut Viewer) {
            viewer.dispatch(self);
            let outcomes: Vec<_> = self.outcomes.lock().drain(..).collect();
            for outcome in outcomes {
                viewer.apply_outcome(outcome);
            }
        }
    }

    fn loaded_viewer(pages: usize) -> Viewer {
        let mut viewer = Viewer::new(&ViewerConfig::default());
        viewer.begin_loading();
        viewer.finish_load(FakeBackend::with_pages(pages));
        viewer
    }

    fn finish(viewer: &mut Viewer, started: Instant) {
        assert!(viewer.tick(started + Duration::from_secs(1)));
        assert!(!viewer.is_busy());
    }

    #[test]
    fn load_resets_to_first_page_and_queues_render() {
        let viewer = loaded_viewer(4);
        assert_eq!(viewer.page(), 1);
        assert_eq!(viewer.page_count(), 4);
        assert!(!viewer.is_loading());
        assert_eq!(viewer.pending_jobs(), 1);
        assert!(viewer.page_surface().is_pending());
    }

    #[test]
    fn forward_twice_on_three_pages_reaches_last_page() {
        let mut viewer = loaded_viewer(3);
        let t0 = Instant::now();

        assert!(viewer.navigate(Direction::Forward, t0));
        finish(&mut viewer, t0);
        assert_eq!(viewer.page(), 2);

        let t1 = t0 + Duration::from_secs(2);
        assert!(viewer.navigate(Direction::Forward, t1));
        finish(&mut viewer, t1);
        assert_eq!(viewer.page(), 3);
        assert!(!viewer.can_forward());
        assert!(viewer.can_backward());
    }

    #[test]
    fn rapid_navigation_while_busy_honors_only_first() {
        let mut viewer = loaded_viewer(10);
        let t0 = Instant::now();

        assert!(viewer.navigate(Direction::Forward, t0));
        for _ in 0..5 {
            assert!(!viewer.navigate(Direction::Forward, t0));
            assert!(!viewer.navigate(Direction::Backward, t0));
        }
        assert_eq!(viewer.transition().unwrap().record().to_page, 2);

        finish(&mut viewer, t0);
        assert_eq!(viewer.page(), 2);
    }

    #[test]
    fn navigation_at_bounds_is_a_no_op() {
        let mut viewer = loaded_viewer(3);
        let t0 = Instant::now();
        assert!(!viewer.navigate(Direction::Backward, t0));
        assert!(viewer.transition().is_none());

        assert!(viewer.jump_to(3, t0));
        finish(&mut viewer, t0);
        assert!(!viewer.navigate(Direction::Forward, t0));
        assert!(viewer.transition().is_none());
        assert_eq!(viewer.page(), 3);
    }

    #[test]
    fn navigation_without_document_is_a_no_op() {
        let mut viewer = Viewer::new(&ViewerConfig::default());
        let t0 = Instant::now();
        assert!(!viewer.navigate(Direction::Forward, t0));
        assert!(!viewer.navigate(Direction::Backward, t0));
        assert!(!viewer.jump_to(2, t0));
        assert!(!viewer.scrub(0.5, t0));
        assert!(!viewer.can_forward());
        assert!(!viewer.can_backward());
    }

    #[test]
    fn jump_round_trip_lands_on_target() {
        for target in [1, 2, 5, 7] {
            let mut viewer = loaded_viewer(7);
            let t0 = Instant::now();
            if target != 1 {
                assert!(viewer.jump_to(target, t0));
                finish(&mut viewer, t0);
                assert_eq!(viewer.page(), target);
            } else {
                assert!(!viewer.jump_to(1, t0));
            }
        }
    }

    #[test]
    fn jump_derives_direction_and_closes_thumbnails() {
        let mut viewer = loaded_viewer(6);
        let t0 = Instant::now();
        viewer.apply(Command::ToggleThumbnails, t0);
        assert!(viewer.thumbnails_visible());

        assert!(viewer.jump_to(4, t0));
        assert_eq!(
            viewer.transition().unwrap().record(),
            TransitionRecord {
                from_page: 1,
                to_page: 4,
                direction: Direction::Forward,
            }
        );
        assert!(!viewer.thumbnails_visible());

        finish(&mut viewer, t0);
        assert!(viewer.jump_to(2, t0));
        assert_eq!(
            viewer.transition().unwrap().direction(),
            Direction::Backward
        );
    }

    #[test]
    fn jump_while_in_flight_is_ignored() {
        let mut viewer = loaded_viewer(5);
        let t0 = Instant::now();
        assert!(viewer.jump_to(2, t0));
        finish(&mut viewer, t0);

        let t1 = t0 + Duration::from_secs(2);
        assert!(viewer.navigate(Direction::Forward, t1));
        assert!(!viewer.jump_to(1, t1 + Duration::from_millis(100)));
        finish(&mut viewer, t1);
        assert_eq!(viewer.page(), 3);
    }

    #[test]
    fn out_of_range_jump_is_ignored() {
        let mut viewer = loaded_viewer(3);
        let t0 = Instant::now();
        assert!(!viewer.jump_to(0, t0));
        assert!(!viewer.jump_to(4, t0));
        assert!(!viewer.is_busy());
    }

    #[test]
    fn transition_done_without_record_is_harmless() {
        let mut viewer = loaded_viewer(3);
        assert!(!viewer.on_transition_done());
        assert_eq!(viewer.page(), 1);
    }

    #[test]
    fn progress_mapping_matches_page_position() {
        assert_eq!(progress_percent(1, 10), 0.0);
        assert_eq!(progress_percent(10, 10), 100.0);
        assert!((progress_percent(5, 10) - 44.444_443).abs() < 1e-3);
        assert_eq!(progress_percent(1, 1), 0.0);
        assert_eq!(progress_percent(1, 0), 0.0);
    }

    #[test]
    fn scrub_half_way_on_nine_pages_jumps_to_five() {
        assert_eq!(scrub_target(0.5, 9), Some(5));
        assert_eq!(scrub_target(0.0, 9), Some(1));
        assert_eq!(scrub_target(1.4, 9), Some(9));
        assert_eq!(scrub_target(0.5, 0), None);

        let mut viewer = loaded_viewer(9);
        let t0 = Instant::now();
        assert!(viewer.apply(Command::Scrub { ratio: 0.5 }, t0));
        finish(&mut viewer, t0);
        assert_eq!(viewer.page(), 5);
    }

    #[test]
    fn transition_renders_both_pages_and_reuses_incoming_pixels() {
        let backend = FakeBackend::with_pages(4);
        let mut viewer = Viewer::new(&ViewerConfig::default());
        viewer.finish_load(backend.clone());
        let executor = InlineExecutor::default();
        executor.pump(&mut viewer);
        assert!(viewer.page_surface().is_ready());

        let t0 = Instant::now();
        assert!(viewer.navigate(Direction::Forward, t0));
        executor.pump(&mut viewer);
        let controller = viewer.transition().unwrap();
        assert!(controller.outgoing().is_ready());
        assert!(controller.incoming().is_ready());

        let before = backend.rendered.lock().len();
        finish(&mut viewer, t0);
        assert_eq!(viewer.pending_jobs(), 0);
        assert!(viewer.page_surface().is_ready());
        assert_eq!(viewer.page_surface().image().unwrap().pixels[0], 2);
        assert_eq!(backend.rendered.lock().len(), before);
    }

    #[test]
    fn outcomes_for_replaced_document_are_dropped() {
        let mut viewer = Viewer::new(&ViewerConfig::default());
        viewer.finish_load(FakeBackend::with_pages(2));
        let executor = InlineExecutor::default();
        viewer.dispatch(&executor);
        let stale: Vec<_> = executor.outcomes.lock().drain(..).collect();

        viewer.finish_load(FakeBackend::with_pages(3));
        for outcome in stale {
            assert!(!viewer.apply_outcome(outcome));
        }
        assert!(!viewer.page_surface().is_ready());
        assert_eq!(viewer.page_count(), 3);
    }

    #[test]
    fn replacing_document_discards_in_flight_transition() {
        let mut viewer = loaded_viewer(5);
        let t0 = Instant::now();
        assert!(viewer.navigate(Direction::Forward, t0));
        let outgoing = viewer.jobs[viewer.jobs.len() - 2].token.clone();

        viewer.begin_loading();
        viewer.finish_load(FakeBackend::with_pages(2));
        assert!(!viewer.is_busy());
        assert!(outgoing.is_cancelled());
        assert_eq!(viewer.page(), 1);
        assert!(!viewer.tick(t0 + Duration::from_secs(1)));
        assert_eq!(viewer.page(), 1);
    }

    #[test]
    fn failed_load_keeps_previous_state() {
        let mut viewer = Viewer::new(&ViewerConfig::default());
        viewer.begin_loading();
        viewer.load_failed();
        assert!(!viewer.is_loading());
        assert!(viewer.document().is_none());

        let mut viewer = loaded_viewer(3);
        viewer.begin_loading();
        viewer.load_failed();
        assert_eq!(viewer.page_count(), 3);
    }

    #[test]
    fn load_progress_needs_known_total() {
        let mut viewer = Viewer::new(&ViewerConfig::default());
        viewer.begin_loading();
        viewer.update_load_progress(512, None);
        assert_eq!(viewer.loading_percent(), Some(0));
        viewer.update_load_progress(512, Some(0));
        assert_eq!(viewer.loading_percent(), Some(0));
        viewer.update_load_progress(1, Some(3));
        assert_eq!(viewer.loading_percent(), Some(33));
        viewer.update_load_progress(3, Some(3));
        assert_eq!(viewer.loading_percent(), Some(100));
    }

    #[test]
    fn thumbnails_render_on_open_and_failures_stay_silent() {
        let mut backend = FakeBackend::with_pages(3);
        Arc::get_mut(&mut backend).unwrap().failing_pages = vec![2];
        let mut viewer = Viewer::new(&ViewerConfig::default());
        viewer.finish_load(backend);
        let executor = InlineExecutor::default();
        executor.pump(&mut viewer);
        viewer.events().lock().clear();

        viewer.apply(Command::ToggleThumbnails, Instant::now());
        executor.pump(&mut viewer);
        let ready: Vec<bool> = viewer.thumbnails().iter().map(Surface::is_ready).collect();
        assert_eq!(ready, vec![true, false, true]);
        assert!(viewer.thumbnails().iter().all(|thumb| !thumb.is_pending()));
        assert!(!viewer
            .events()
            .lock()
            .iter()
            .any(|event| matches!(event, ViewerEvent::SurfaceReady(SurfaceId::Thumbnail(_)))));
    }

    fn drain_events(viewer: &Viewer) -> Vec<ViewerEvent> {
        viewer.events().lock().drain(..).collect()
    }

    #[test]
    fn finished_page_renders_report_their_surface() {
        let mut viewer = Viewer::new(&ViewerConfig::default());
        viewer.finish_load(FakeBackend::with_pages(3));
        drain_events(&viewer);
        let executor = InlineExecutor::default();

        executor.pump(&mut viewer);
        assert_eq!(
            drain_events(&viewer),
            vec![ViewerEvent::SurfaceReady(SurfaceId::Page)]
        );

        let t0 = Instant::now();
        assert!(viewer.navigate(Direction::Forward, t0));
        drain_events(&viewer);
        executor.pump(&mut viewer);
        let events = drain_events(&viewer);
        assert!(events.contains(&ViewerEvent::SurfaceReady(SurfaceId::Outgoing)));
        assert!(events.contains(&ViewerEvent::SurfaceReady(SurfaceId::Incoming)));

        finish(&mut viewer, t0);
        assert_eq!(
            drain_events(&viewer),
            vec![ViewerEvent::PageChanged(2), ViewerEvent::RedrawNeeded]
        );
    }

    #[test]
    fn stale_page_render_reports_nothing() {
        let mut viewer = Viewer::new(&ViewerConfig::default());
        viewer.finish_load(FakeBackend::with_pages(3));
        let executor = InlineExecutor::default();
        viewer.dispatch(&executor);
        viewer.set_page_box(BoxSize::new(300.0, 200.0));
        drain_events(&viewer);

        let stale: Vec<_> = executor.outcomes.lock().drain(..).collect();
        for outcome in stale {
            assert!(!viewer.apply_outcome(outcome));
        }
        assert!(drain_events(&viewer).is_empty());
    }

    #[test]
    fn escape_and_toggle_control_panel_visibility() {
        let mut viewer = loaded_viewer(2);
        let now = Instant::now();
        assert!(!viewer.apply(Command::CloseThumbnails, now));
        assert!(viewer.apply(Command::ToggleThumbnails, now));
        assert!(viewer.thumbnails_visible());
        assert!(viewer.apply(Command::CloseThumbnails, now));
        assert!(!viewer.thumbnails_visible());
        assert!(viewer.apply(Command::ToggleFullscreen, now));
        assert!(viewer.is_fullscreen());
    }

    #[test]
    fn resizing_page_box_rerenders_current_page() {
        let mut viewer = loaded_viewer(2);
        let executor = InlineExecutor::default();
        executor.pump(&mut viewer);
        viewer.set_page_box(BoxSize::new(400.0, 300.0));
        assert_eq!(viewer.pending_jobs(), 1);
        viewer.set_page_box(BoxSize::new(400.0, 300.0));
        assert_eq!(viewer.pending_jobs(), 1);
    }
}
