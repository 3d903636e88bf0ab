//! The capture engine: device selection, stream lifetime and the camera
//! callback that feeds the [`FrameSlot`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::CaptureConfig;
use crate::device::{CameraDevice, CameraManager};
use crate::diag::{FpsMeter, LogThrottle};
use crate::error::Error;
use crate::frame::{Frame, PackedFrame};
use crate::resample::FrameBuilder;
use crate::select::{select_device, select_stream};
use crate::slot::{FrameSlot, FrameSource};
use crate::stream::CameraStream;
use crate::teardown::ResourceStack;
use crate::types::{Size, StreamConfig};

type StreamOf<M> = <<M as CameraManager>::Device as CameraDevice>::Stream;

/// What [`CaptureEngine::start`] settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSelection {
    pub device_id: String,
    /// Size the camera streams at.
    pub camera_size: Size,
    /// Size of the packed frames handed to the render loop.
    pub output_size: Size,
}

/// Frames the camera callback has seen, by outcome.
#[derive(Debug, Default)]
pub struct CaptureCounters {
    converted: AtomicU64,
    discarded: AtomicU64,
    ignored: AtomicU64,
}

impl CaptureCounters {
    /// Frames converted and published.
    pub fn converted(&self) -> u64 {
        self.converted.load(Ordering::Relaxed)
    }

    /// Malformed frames dropped.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Frames that arrived after the session stopped.
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }
}

/// State owned by the camera callback of one session.
struct CaptureCallback {
    running: Arc<AtomicBool>,
    slot: Arc<FrameSlot>,
    counters: Arc<CaptureCounters>,
    builder: FrameBuilder,
    fps: FpsMeter,
    malformed_log: LogThrottle,
}

impl CaptureCallback {
    fn on_frame(&mut self, frame: &dyn Frame) {
        if !self.running.load(Ordering::Acquire) {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let packed = match self.builder.build(frame) {
            Ok(packed) => packed,
            Err(e) => {
                let n = self.counters.discarded.fetch_add(1, Ordering::Relaxed) + 1;
                if self.malformed_log.hit() {
                    tracing::warn!(error = %e, discarded = n, "discarding camera frame");
                }
                return;
            }
        };
        let size = packed.size();
        let center = packed.pixel(size.width / 2, size.height / 2);
        // stop may have landed while converting
        if !self.slot.publish_if(packed, &self.running) {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters.converted.fetch_add(1, Ordering::Relaxed);

        if let Some(fps) = self.fps.record(Instant::now()) {
            tracing::info!(fps, center_rgba = ?center, "camera frame rate");
        }
    }
}

/// Owns the camera for the passthrough view.
///
/// `start` selects a device and stream, opens it and installs the frame
/// callback; `latest_frame` hands out the newest converted frame without
/// blocking. Every resource acquired during `start` is recorded so `stop`
/// (or a failed `start`) releases them newest-first.
pub struct CaptureEngine<M: CameraManager + 'static> {
    manager: M,
    config: CaptureConfig,
    slot: Arc<FrameSlot>,
    counters: Arc<CaptureCounters>,
    running: Option<Arc<AtomicBool>>,
    stream: Option<StreamOf<M>>,
    resources: ResourceStack<Option<StreamOf<M>>>,
    selection: Option<CaptureSelection>,
}

impl<M: CameraManager + 'static> CaptureEngine<M> {
    pub fn new(manager: M, config: CaptureConfig) -> Self {
        Self {
            manager,
            config,
            slot: Arc::new(FrameSlot::new()),
            counters: Arc::new(CaptureCounters::default()),
            running: None,
            stream: None,
            resources: ResourceStack::new(),
            selection: None,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// The slot frames are published into.
    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    pub fn counters(&self) -> &CaptureCounters {
        &self.counters
    }

    /// Device and sizes of the running session.
    pub fn selection(&self) -> Option<&CaptureSelection> {
        self.selection.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.load(Ordering::Acquire))
    }

    /// Start capturing, producing frames of `width` x `height`.
    ///
    /// Does nothing if capture is already running. On failure everything
    /// acquired so far is released and capture stays stopped; the caller may
    /// retry later.
    pub fn start(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if self.is_running() {
            return Ok(());
        }
        let desired = Size::new(width, height);
        if desired.is_empty() {
            return Err(Error::InvalidSize(desired));
        }

        match self.try_start(desired) {
            Ok(selection) => {
                tracing::info!(
                    camera = %selection.device_id,
                    camera_width = selection.camera_size.width,
                    camera_height = selection.camera_size.height,
                    output_width = selection.output_size.width,
                    output_height = selection.output_size.height,
                    "capture started"
                );
                self.selection = Some(selection);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = &e as &dyn std::error::Error, "capture setup failed");
                self.release();
                Err(e)
            }
        }
    }

    fn try_start(&mut self, desired: Size) -> Result<CaptureSelection, Error> {
        let devices: Vec<_> = self
            .manager
            .discover_devices()
            .map_err(Error::enumerate)?
            .collect();
        let index = select_device(&devices).ok_or(Error::NoDevice)?;
        let Some(device) = devices.into_iter().nth(index) else {
            return Err(Error::NoDevice);
        };
        let device_id = device.id().to_owned();
        tracing::info!(camera = %device_id, "selected camera");

        let configurations: Vec<_> = device
            .stream_configurations()
            .map_err(Error::enumerate)?
            .collect();
        let format = self.config.pixel_format;
        let chosen = select_stream(&configurations, format, desired).ok_or_else(|| {
            Error::NoMatchingStream {
                device: device_id.clone(),
                format,
            }
        })?;
        tracing::info!(
            width = chosen.size.width,
            height = chosen.size.height,
            "selected camera stream size"
        );

        let slot = Arc::clone(&self.slot);
        slot.discard();
        self.resources.push("frame slot", move |_| slot.discard());

        let stream_config = StreamConfig {
            pixel_format: format,
            size: chosen.size,
            frame_rate: self.config.frame_rate,
        };
        let stream = self
            .stream
            .insert(device.open(&stream_config).map_err(Error::platform)?);
        self.resources.push("camera device", |stream| drop(stream.take()));

        let running = Arc::new(AtomicBool::new(true));
        self.running = Some(Arc::clone(&running));
        let mut callback = CaptureCallback {
            running,
            slot: Arc::clone(&self.slot),
            counters: Arc::clone(&self.counters),
            builder: FrameBuilder::new(desired, self.config.chroma_order),
            fps: FpsMeter::new(
                Duration::from_millis(self.config.fps_log_interval_ms),
                Instant::now(),
            ),
            malformed_log: LogThrottle::new(
                self.config.malformed_log_first,
                self.config.malformed_log_every,
            ),
        };
        stream
            .start(move |frame: &dyn Frame| callback.on_frame(frame))
            .map_err(Error::platform)?;
        self.resources.push("capture stream", |stream| {
            if let Some(stream) = stream.as_mut() {
                if let Err(e) = stream.stop() {
                    tracing::warn!(error = %e, "failed to stop camera stream");
                }
            }
        });

        Ok(CaptureSelection {
            device_id,
            camera_size: chosen.size,
            output_size: desired,
        })
    }

    fn release(&mut self) {
        // callbacks still in flight see this before anything is freed
        if let Some(running) = self.running.take() {
            running.store(false, Ordering::Release);
        }
        self.resources.unwind(&mut self.stream);
        self.stream = None;
        self.selection = None;
    }

    /// Stop capturing and release the camera. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.running.is_none() && self.resources.is_empty() {
            return;
        }
        self.release();
        tracing::info!("capture stopped");
    }

    /// Copy the newest unread frame into `out`, reusing its allocation.
    pub fn claim_frame(&self, out: &mut PackedFrame) -> bool {
        self.is_running() && self.slot.claim(out)
    }

    /// The newest unread frame, if one arrived since the last call.
    pub fn latest_frame(&self) -> Option<PackedFrame> {
        if !self.is_running() {
            return None;
        }
        self.slot.take_latest()
    }
}

impl<M: CameraManager + 'static> FrameSource for CaptureEngine<M> {
    fn claim_latest(&self, out: &mut PackedFrame) -> bool {
        self.claim_frame(out)
    }
}

impl<M: CameraManager + 'static> Drop for CaptureEngine<M> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<M: CameraManager + 'static> core::fmt::Debug for CaptureEngine<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CaptureEngine")
            .field("running", &self.is_running())
            .field("selection", &self.selection)
            .field("resources", &self.resources)
            .finish()
    }
}
