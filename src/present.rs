//! Render-loop side of the passthrough: frame cycle bookkeeping, the quad
//! layer the camera texture is shown on, and the [`Passthrough`] driver that
//! ties capture, compositing and presentation together.

use std::time::Duration;

use crate::capture::CaptureEngine;
use crate::compositor::{Composed, Compositor, Swapchain};
use crate::config::{CaptureConfig, CompositorConfig, QuadConfig};
use crate::device::CameraManager;
use crate::diag::LogThrottle;
use crate::error::Error;
use crate::permission::CameraPermission;
use crate::types::{Rect, Size};

/// Where the render loop is within one display refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FramePhase {
    /// Between frames.
    #[default]
    Idle,
    /// `wait` returned; the frame has not begun.
    Waited,
    /// Inside begin..end; compositing is allowed.
    Begun,
}

impl FramePhase {
    fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waited => "waited",
            Self::Begun => "begun",
        }
    }
}

/// Enforces wait → begin → end ordering.
#[derive(Debug, Clone, Default)]
pub struct FrameCycle {
    phase: FramePhase,
}

impl FrameCycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn wait(&mut self) -> Result<(), Error> {
        self.advance("wait", FramePhase::Idle, FramePhase::Waited)
    }

    pub fn begin(&mut self) -> Result<(), Error> {
        self.advance("begin", FramePhase::Waited, FramePhase::Begun)
    }

    pub fn end(&mut self) -> Result<(), Error> {
        self.advance("end", FramePhase::Begun, FramePhase::Idle)
    }

    /// Abandon the current frame.
    pub fn reset(&mut self) {
        self.phase = FramePhase::Idle;
    }

    fn advance(&mut self, action: &'static str, from: FramePhase, to: FramePhase) -> Result<(), Error> {
        if self.phase != from {
            return Err(Error::CycleOrder {
                action,
                phase: self.phase.name(),
            });
        }
        self.phase = to;
        Ok(())
    }
}

/// Returned by [`PresentationSession::wait_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    pub predicted_display_time: Duration,
    /// `false` when the frame will not be shown, e.g. while the session is
    /// not visible. The frame must still be begun and ended.
    pub should_render: bool,
}

/// A head-locked quad showing a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadLayer {
    /// Position in meters, relative to the viewer.
    pub position: [f32; 3],
    /// Orientation quaternion (x, y, z, w).
    pub orientation: [f32; 4],
    pub width: f32,
    pub height: f32,
    /// Part of the swapchain image the quad samples.
    pub subimage: Rect,
}

impl QuadLayer {
    /// A quad `config.distance_m` in front of the viewer whose height keeps
    /// the aspect ratio of a texture of size `extent`.
    pub fn new(config: &QuadConfig, extent: Size) -> Option<Self> {
        if extent.is_empty() {
            return None;
        }
        let aspect = extent.width as f32 / extent.height as f32;
        Some(Self {
            position: [0.0, 0.0, -config.distance_m],
            orientation: [0.0, 0.0, 0.0, 1.0],
            width: config.width_m,
            height: config.width_m / aspect,
            subimage: Rect {
                x: 0,
                y: 0,
                width: extent.width,
                height: extent.height,
            },
        })
    }
}

/// The host XR/display session driving the render loop.
pub trait PresentationSession {
    type Error: core::error::Error + Send + Sync + 'static;

    /// Block until the next frame should be produced.
    fn wait_frame(&mut self) -> Result<FrameTiming, Self::Error>;
    fn begin_frame(&mut self) -> Result<(), Self::Error>;
    /// Submit the frame; `layers` is empty when nothing was rendered.
    fn end_frame(&mut self, timing: FrameTiming, layers: &[QuadLayer]) -> Result<(), Self::Error>;
}

/// Whether the camera is running after [`Passthrough::maybe_start_camera`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Running,
    /// Camera permission has not been granted yet.
    AwaitingPermission,
    /// The render size is not known yet.
    AwaitingRenderSize,
}

/// Drives camera passthrough from a render loop.
///
/// Call [`tick`](Self::tick) once per loop iteration. Capture starts lazily
/// once permission is granted and is sized to the render target.
pub struct Passthrough<M, S, P>
where
    M: CameraManager + 'static,
    S: Swapchain,
    P: PresentationSession,
{
    engine: CaptureEngine<M>,
    permission: CameraPermission,
    compositor: Compositor,
    swapchain: S,
    session: P,
    cycle: FrameCycle,
    quad: QuadConfig,
    render_size: Size,
    permission_log: LogThrottle,
    start_failure_log: LogThrottle,
}

impl<M, S, P> Passthrough<M, S, P>
where
    M: CameraManager + 'static,
    S: Swapchain,
    P: PresentationSession,
{
    /// The render size defaults to the swapchain extent.
    pub fn new(
        manager: M,
        permission: CameraPermission,
        swapchain: S,
        session: P,
        capture: CaptureConfig,
        compositor: CompositorConfig,
        quad: QuadConfig,
    ) -> Self {
        let render_size = swapchain.extent();
        Self {
            engine: CaptureEngine::new(manager, capture),
            permission,
            compositor: Compositor::new(compositor),
            swapchain,
            session,
            cycle: FrameCycle::new(),
            quad,
            render_size,
            permission_log: LogThrottle::new(1, 300),
            start_failure_log: LogThrottle::new(5, 300),
        }
    }

    pub fn with_render_size(mut self, size: Size) -> Self {
        self.render_size = size;
        self
    }

    pub fn engine(&self) -> &CaptureEngine<M> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut CaptureEngine<M> {
        &mut self.engine
    }

    pub fn permission(&self) -> &CameraPermission {
        &self.permission
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn swapchain(&self) -> &S {
        &self.swapchain
    }

    pub fn swapchain_mut(&mut self) -> &mut S {
        &mut self.swapchain
    }

    pub fn session(&self) -> &P {
        &self.session
    }

    pub fn cycle(&self) -> &FrameCycle {
        &self.cycle
    }

    pub fn render_size(&self) -> Size {
        self.render_size
    }

    /// Start capture if it is not running and everything it needs is
    /// available.
    pub fn maybe_start_camera(&mut self) -> Result<CameraState, Error> {
        if self.engine.is_running() {
            return Ok(CameraState::Running);
        }
        if !self.permission.is_granted() {
            if self.permission_log.hit() {
                tracing::info!("waiting for camera permission");
            }
            return Ok(CameraState::AwaitingPermission);
        }
        if self.render_size.is_empty() {
            return Ok(CameraState::AwaitingRenderSize);
        }
        self.engine
            .start(self.render_size.width, self.render_size.height)?;
        Ok(CameraState::Running)
    }

    /// Run one wait/begin/compose/end cycle.
    ///
    /// The frame is ended even when compositing fails; the compositing
    /// error is returned afterwards. Returns `None` if the session asked
    /// not to render.
    pub fn render_frame(&mut self) -> Result<Option<Composed>, Error> {
        self.cycle.wait()?;
        let timing = match self.session.wait_frame() {
            Ok(timing) => timing,
            Err(e) => {
                self.cycle.reset();
                return Err(Error::presentation(e));
            }
        };

        self.cycle.begin()?;
        if let Err(e) = self.session.begin_frame() {
            self.cycle.reset();
            return Err(Error::presentation(e));
        }

        let composed = if timing.should_render {
            self.compositor
                .compose(&self.engine, &mut self.swapchain)
                .map(Some)
        } else {
            Ok(None)
        };

        let layer = match &composed {
            Ok(Some(_)) => QuadLayer::new(&self.quad, self.swapchain.extent()),
            _ => None,
        };
        let layers = layer.as_slice();
        self.cycle.end()?;
        self.session
            .end_frame(timing, layers)
            .map_err(Error::presentation)?;
        composed
    }

    /// One render-loop iteration.
    ///
    /// A failed camera start is logged and retried next iteration;
    /// presentation errors are returned.
    pub fn tick(&mut self) -> Result<Option<Composed>, Error> {
        if let Err(e) = self.maybe_start_camera() {
            if self.start_failure_log.hit() {
                tracing::warn!(
                    error = &e as &dyn std::error::Error,
                    attempts = self.start_failure_log.count(),
                    "camera not started, will retry"
                );
            }
        }
        self.render_frame()
    }

    /// Stop capture. The render loop may keep running without a camera.
    pub fn shutdown(&mut self) {
        self.engine.stop();
    }
}

impl<M, S, P> core::fmt::Debug for Passthrough<M, S, P>
where
    M: CameraManager + 'static,
    S: Swapchain,
    P: PresentationSession,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Passthrough")
            .field("running", &self.engine.is_running())
            .field("permission", &self.permission.is_granted())
            .field("render_size", &self.render_size)
            .field("phase", &self.cycle.phase())
            .finish_non_exhaustive()
    }
}
