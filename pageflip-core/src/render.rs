//! Surfaces, render tasks and the page/thumbnail renderers.
//!
//! A [`Surface`] owns at most one in-flight [`RenderTask`]. Issuing a new
//! task cancels the previous one before the new one is stored, and a finished
//! rasterization is only written to the surface when it belongs to the task the
//! surface is still waiting on. Cancellation itself is advisory: a backend that
//! is already rasterizing runs to completion and its result is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::geometry::{self, BoxSize, RasterPlan, OVERSAMPLE, THUMBNAIL_WIDTH};
use crate::{DocumentBackend, DocumentId, RenderImage, RenderRequest};

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceId {
    Page,
    Outgoing,
    Incoming,
    Thumbnail(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
    Page,
    Thumbnail,
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct RenderTask {
    id: TaskId,
    token: CancelToken,
}

impl RenderTask {
    fn new(id: TaskId) -> Self {
        Self {
            id,
            token: CancelToken::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    fn cancel(&self) {
        self.token.cancel();
    }
}

/// Monotonic source of task ids, one per viewer.
#[derive(Debug, Default)]
pub struct TaskSequence {
    next: TaskId,
}

impl TaskSequence {
    pub fn next(&mut self) -> TaskId {
        self.next += 1;
        self.next
    }
}

/// A caller-owned pixel surface.
#[derive(Debug)]
pub struct Surface {
    id: SurfaceId,
    task: Option<RenderTask>,
    image: Option<RenderImage>,
    plan: Option<RasterPlan>,
    /// Task that produced `image`.
    revision: Option<TaskId>,
    ready: bool,
}

impl Surface {
    pub fn new(id: SurfaceId) -> Self {
        Self {
            id,
            task: None,
            image: None,
            plan: None,
            revision: None,
            ready: false,
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn image(&self) -> Option<&RenderImage> {
        self.image.as_ref()
    }

    pub fn plan(&self) -> Option<RasterPlan> {
        self.plan
    }

    /// Identifies the pixels currently held; changes whenever they do.
    pub fn revision(&self) -> Option<TaskId> {
        self.revision
    }

    /// True once the most recent request has been painted.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_pending(&self) -> bool {
        self.task.is_some()
    }

    pub fn pending_task(&self) -> Option<TaskId> {
        self.task.as_ref().map(RenderTask::id)
    }

    /// Cancels the in-flight task, if any. Previously painted pixels stay.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
    }

    pub fn clear(&mut self) {
        self.cancel();
        self.image = None;
        self.plan = None;
        self.revision = None;
        self.ready = false;
    }

    fn issue(&mut self, task: RenderTask, plan: RasterPlan) {
        self.cancel();
        self.task = Some(task);
        self.plan = Some(plan);
        self.ready = false;
    }

    /// Writes `image` if `task` is the one this surface is waiting on.
    pub(crate) fn accept(&mut self, task: TaskId, image: RenderImage) -> bool {
        match &self.task {
            Some(current) if current.id == task && !current.token.is_cancelled() => {
                self.task = None;
                self.image = Some(image);
                self.revision = Some(task);
                self.ready = true;
                true
            }
            _ => false,
        }
    }

    /// Forgets `task` after it failed; returns whether it was still current.
    pub(crate) fn settle(&mut self, task: TaskId) -> bool {
        if self.pending_task() == Some(task) {
            self.task = None;
            true
        } else {
            false
        }
    }

    /// Moves painted pixels out of `other`, leaving it empty.
    pub(crate) fn take_painted(&mut self, other: &mut Surface) -> bool {
        if !other.ready {
            return false;
        }
        let (Some(image), Some(plan)) = (other.image.take(), other.plan.take()) else {
            return false;
        };
        self.cancel();
        self.image = Some(image);
        self.plan = Some(plan);
        self.revision = other.revision.take();
        self.ready = true;
        other.ready = false;
        true
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Everything an executor needs to rasterize one page into one surface.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub document: DocumentId,
    pub surface: SurfaceId,
    pub task: TaskId,
    pub token: CancelToken,
    pub kind: RenderKind,
    pub page_number: usize,
    pub plan: RasterPlan,
    pub background: Option<[u8; 3]>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render task {0} was cancelled")]
    Cancelled(TaskId),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct RenderOutcome {
    pub document: DocumentId,
    pub surface: SurfaceId,
    pub task: TaskId,
    pub kind: RenderKind,
    pub page_number: usize,
    pub result: Result<RenderImage, RenderError>,
}

impl RenderJob {
    /// Runs the job on the calling thread.
    ///
    /// The token is checked before and after rasterizing; a job cancelled
    /// mid-way still costs the full rasterization but its pixels are dropped.
    pub fn execute(self, backend: &dyn DocumentBackend) -> RenderOutcome {
        let result = if self.token.is_cancelled() {
            Err(RenderError::Cancelled(self.task))
        } else {
            let request = RenderRequest {
                page_number: self.page_number,
                scale: self.plan.render_scale,
                background: self.background,
            };
            match backend.render_page(request) {
                Ok(_) if self.token.is_cancelled() => Err(RenderError::Cancelled(self.task)),
                Ok(image) => Ok(image),
                Err(err) => Err(RenderError::Backend(err)),
            }
        };
        RenderOutcome {
            document: self.document,
            surface: self.surface,
            task: self.task,
            kind: self.kind,
            page_number: self.page_number,
            result,
        }
    }
}

/// Runs render jobs somewhere and reports their outcomes back to the owner
/// of the surfaces.
pub trait RenderExecutor {
    fn submit(&self, backend: Arc<dyn DocumentBackend>, job: RenderJob);
}

/// Fit-to-box page rendering at a fixed oversampling factor.
#[derive(Debug, Clone, Copy)]
pub struct PageRenderer {
    oversample: f32,
}

impl Default for PageRenderer {
    fn default() -> Self {
        Self::new(OVERSAMPLE)
    }
}

impl PageRenderer {
    pub fn new(oversample: f32) -> Self {
        Self { oversample }
    }

    /// Plans `page_number` into `surface`, canceling whatever the surface was
    /// waiting on. Returns `Ok(None)` without touching the surface when the
    /// page is out of range or the box is degenerate.
    pub fn request(
        &self,
        backend: &dyn DocumentBackend,
        surface: &mut Surface,
        tasks: &mut TaskSequence,
        page_number: usize,
        target: BoxSize,
    ) -> Result<Option<RenderJob>, RenderError> {
        if !in_range(backend, page_number) {
            trace!(page_number, "ignoring out-of-range page request");
            return Ok(None);
        }
        let page = backend.page_size(page_number)?;
        let Some(plan) = geometry::plan_fit(page, target, self.oversample) else {
            return Ok(None);
        };
        Ok(Some(issue(
            backend,
            surface,
            tasks,
            page_number,
            plan,
            RenderKind::Page,
            None,
        )))
    }
}

/// Fixed-width thumbnails on a white background.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailRenderer {
    width: f32,
    oversample: f32,
}

impl Default for ThumbnailRenderer {
    fn default() -> Self {
        Self::new(THUMBNAIL_WIDTH, OVERSAMPLE)
    }
}

impl ThumbnailRenderer {
    const BACKGROUND: [u8; 3] = [255, 255, 255];

    pub fn new(width: f32, oversample: f32) -> Self {
        Self { width, oversample }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn request(
        &self,
        backend: &dyn DocumentBackend,
        surface: &mut Surface,
        tasks: &mut TaskSequence,
        page_number: usize,
    ) -> Result<Option<RenderJob>, RenderError> {
        if !in_range(backend, page_number) {
            return Ok(None);
        }
        let page = backend.page_size(page_number)?;
        let Some(plan) = geometry::plan_fixed_width(page, self.width, self.oversample) else {
            return Ok(None);
        };
        Ok(Some(issue(
            backend,
            surface,
            tasks,
            page_number,
            plan,
            RenderKind::Thumbnail,
            Some(Self::BACKGROUND),
        )))
    }
}

fn in_range(backend: &dyn DocumentBackend, page_number: usize) -> bool {
    (1..=backend.page_count()).contains(&page_number)
}

fn issue(
    backend: &dyn DocumentBackend,
    surface: &mut Surface,
    tasks: &mut TaskSequence,
    page_number: usize,
    plan: RasterPlan,
    kind: RenderKind,
    background: Option<[u8; 3]>,
) -> RenderJob {
    let task = RenderTask::new(tasks.next());
    let job = RenderJob {
        document: backend.info().id,
        surface: surface.id(),
        task: task.id(),
        token: task.token(),
        kind,
        page_number,
        plan,
        background,
    };
    surface.issue(task, plan);
    job
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    fn page_box() -> BoxSize {
        BoxSize::new(900.0, 530.0)
    }

    #[test]
    fn out_of_range_request_leaves_surface_untouched() {
        let backend = FakeBackend::with_pages(3);
        let renderer = PageRenderer::default();
        let mut tasks = TaskSequence::default();
        let mut surface = Surface::new(SurfaceId::Page);

        let job = renderer
            .request(backend.as_ref(), &mut surface, &mut tasks, 2, page_box())
            .unwrap()
            .unwrap();
        let painted = job.clone().execute(backend.as_ref()).result.unwrap();
        assert!(surface.accept(job.task, painted.clone()));

        for page in [0, 4, usize::MAX] {
            let result = renderer
                .request(backend.as_ref(), &mut surface, &mut tasks, page, page_box())
                .unwrap();
            assert!(result.is_none());
        }
        assert!(surface.is_ready());
        assert_eq!(surface.image(), Some(&painted));
        assert!(!surface.is_pending());
    }

    #[test]
    fn new_request_cancels_predecessor_before_issuing() {
        let backend = FakeBackend::with_pages(5);
        let renderer = PageRenderer::default();
        let mut tasks = TaskSequence::default();
        let mut surface = Surface::new(SurfaceId::Page);

        let first = renderer
            .request(backend.as_ref(), &mut surface, &mut tasks, 1, page_box())
            .unwrap()
            .unwrap();
        let second = renderer
            .request(backend.as_ref(), &mut surface, &mut tasks, 2, page_box())
            .unwrap()
            .unwrap();

        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());
        assert_eq!(surface.pending_task(), Some(second.task));
    }

    #[test]
    fn stale_result_is_not_written_after_newer_request() {
        let backend = FakeBackend::with_pages(5);
        let renderer = PageRenderer::default();
        let mut tasks = TaskSequence::default();
        let mut surface = Surface::new(SurfaceId::Page);

        let first = renderer
            .request(backend.as_ref(), &mut surface, &mut tasks, 1, page_box())
            .unwrap()
            .unwrap();
        // Simulate a backend that ignores cancellation and finishes anyway.
        let stale = backend
            .render_page(RenderRequest {
                page_number: 1,
                scale: first.plan.render_scale,
                background: None,
            })
            .unwrap();
        let second = renderer
            .request(backend.as_ref(), &mut surface, &mut tasks, 2, page_box())
            .unwrap()
            .unwrap();

        assert!(!surface.accept(first.task, stale));
        assert!(surface.image().is_none());
        assert_eq!(surface.revision(), None);

        let fresh = second.clone().execute(backend.as_ref()).result.unwrap();
        assert!(surface.accept(second.task, fresh));
        assert!(surface.is_ready());
        assert_eq!(surface.revision(), Some(second.task));
    }

    #[test]
    fn cancelled_job_skips_rasterization() {
        let backend = FakeBackend::with_pages(2);
        let renderer = PageRenderer::default();
        let mut tasks = TaskSequence::default();
        let mut surface = Surface::new(SurfaceId::Page);

        let job = renderer
            .request(backend.as_ref(), &mut surface, &mut tasks, 1, page_box())
            .unwrap()
            .unwrap();
        surface.cancel();

        let outcome = job.execute(backend.as_ref());
        assert!(matches!(outcome.result, Err(RenderError::Cancelled(_))));
        assert!(backend.rendered.lock().is_empty());
    }

    #[test]
    fn dropping_surface_cancels_in_flight_task() {
        let backend = FakeBackend::with_pages(2);
        let mut tasks = TaskSequence::default();
        let mut surface = Surface::new(SurfaceId::Incoming);
        let job = PageRenderer::default()
            .request(backend.as_ref(), &mut surface, &mut tasks, 2, page_box())
            .unwrap()
            .unwrap();
        drop(surface);
        assert!(job.token.is_cancelled());
    }

    #[test]
    fn page_job_uses_oversampled_fit_scale() {
        let backend = FakeBackend::with_pages(1);
        let mut tasks = TaskSequence::default();
        let mut surface = Surface::new(SurfaceId::Page);
        let job = PageRenderer::default()
            .request(
                backend.as_ref(),
                &mut surface,
                &mut tasks,
                1,
                BoxSize::new(306.0, 2000.0),
            )
            .unwrap()
            .unwrap();
        assert!((job.plan.render_scale - 1.0).abs() < 1e-6);

        let image = job.execute(backend.as_ref()).result.unwrap();
        assert_eq!((image.width, image.height), (612, 792));
    }

    #[test]
    fn thumbnail_job_is_white_backed_and_fixed_width() {
        let backend = FakeBackend::with_pages(4);
        let mut tasks = TaskSequence::default();
        let mut surface = Surface::new(SurfaceId::Thumbnail(0));
        let job = ThumbnailRenderer::default()
            .request(backend.as_ref(), &mut surface, &mut tasks, 1)
            .unwrap()
            .unwrap();
        assert_eq!(job.kind, RenderKind::Thumbnail);
        assert_eq!(job.background, Some([255, 255, 255]));
        assert_eq!(job.plan.pixel_width, 220);

        let none = ThumbnailRenderer::default()
            .request(backend.as_ref(), &mut surface, &mut tasks, 5)
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn backend_failure_is_reported_in_outcome() {
        let mut backend = FakeBackend::with_pages(3);
        Arc::get_mut(&mut backend).unwrap().failing_pages = vec![3];
        let mut tasks = TaskSequence::default();
        let mut surface = Surface::new(SurfaceId::Page);
        let job = PageRenderer::default()
            .request(backend.as_ref(), &mut surface, &mut tasks, 3, page_box())
            .unwrap()
            .unwrap();
        let outcome = job.execute(backend.as_ref());
        assert!(matches!(outcome.result, Err(RenderError::Backend(_))));
        assert!(surface.settle(outcome.task));
        assert!(!surface.is_pending());
    }
}
