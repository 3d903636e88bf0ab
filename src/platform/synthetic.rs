//! In-process camera backend that delivers generated YUV 4:2:0 frames.
//!
//! Used by the demo and the tests, and on hosts without a camera. Frames are
//! pushed through a [`SyntheticFeed`] and reach whatever producer the open
//! stream was started with, on the pushing thread.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::convert::ChromaOrder;
use crate::device::{CameraDevice, CameraManager};
use crate::error::{Error, PlatformError};
use crate::frame::{Frame, PlanarFrame, Plane};
use crate::stream::{CameraStream, FrameProducer};
use crate::types::{
    LensFacing, PixelFormat, Size, StreamConfig, StreamConfiguration, StreamDirection,
};

/// Lifecycle events recorded by a synthetic device, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Opened(Size),
    Started,
    Stopped,
    Closed,
}

#[derive(Default)]
struct FeedInner {
    producer: Mutex<Option<Box<dyn FrameProducer>>>,
    events: Mutex<Vec<StreamEvent>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for pushing frames into a synthetic device's stream.
#[derive(Clone, Default)]
pub struct SyntheticFeed {
    inner: Arc<FeedInner>,
}

impl SyntheticFeed {
    /// Deliver `frame` to the running stream's producer. Returns `false` if
    /// no stream is running.
    pub fn deliver(&self, frame: &dyn Frame) -> bool {
        match lock(&self.inner.producer).as_mut() {
            Some(producer) => {
                producer.on_frame(frame);
                true
            }
            None => false,
        }
    }

    pub fn push(&self, image: &SyntheticImage) -> bool {
        self.deliver(&image.frame())
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.inner.producer).is_some()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        lock(&self.inner.events).clone()
    }

    fn record(&self, event: StreamEvent) {
        lock(&self.inner.events).push(event);
    }
}

impl core::fmt::Debug for SyntheticFeed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyntheticFeed")
            .field("streaming", &self.is_streaming())
            .finish()
    }
}

/// Camera manager over a fixed list of synthetic devices.
#[derive(Debug, Clone, Default)]
pub struct SyntheticCameraManager {
    devices: Vec<SyntheticDevice>,
    fail_enumeration: bool,
}

impl SyntheticCameraManager {
    pub fn new(devices: Vec<SyntheticDevice>) -> Self {
        Self {
            devices,
            fail_enumeration: false,
        }
    }

    /// Make device enumeration fail, as a camera service outage would.
    pub fn with_failing_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }
}

impl CameraManager for SyntheticCameraManager {
    type Device = SyntheticDevice;
    type Error = Error;

    fn discover_devices(&self) -> Result<impl Iterator<Item = Self::Device>, Self::Error> {
        if self.fail_enumeration {
            return Err(Error::Platform(PlatformError::Message(
                "camera id list unavailable".into(),
            )));
        }
        Ok(self.devices.clone().into_iter())
    }
}

/// A scripted camera device.
#[derive(Debug, Clone)]
pub struct SyntheticDevice {
    id: String,
    facing: LensFacing,
    readable: bool,
    configurations: Vec<StreamConfiguration>,
    fail_open: bool,
    fail_start: bool,
    feed: SyntheticFeed,
}

impl SyntheticDevice {
    /// A device offering a single 640x480 YUV 4:2:0 output stream.
    pub fn new(id: impl Into<String>, facing: LensFacing) -> Self {
        Self {
            id: id.into(),
            facing,
            readable: true,
            configurations: vec![StreamConfiguration {
                pixel_format: PixelFormat::Yuv420,
                size: Size::new(640, 480),
                direction: StreamDirection::Output,
            }],
            fail_open: false,
            fail_start: false,
            feed: SyntheticFeed::default(),
        }
    }

    pub fn with_configurations(mut self, configurations: Vec<StreamConfiguration>) -> Self {
        self.configurations = configurations;
        self
    }

    /// Characteristics queries (facing, stream table) fail.
    pub fn with_unreadable_characteristics(mut self) -> Self {
        self.readable = false;
        self
    }

    pub fn with_failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn with_failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// The feed shared by every clone of this device.
    pub fn feed(&self) -> SyntheticFeed {
        self.feed.clone()
    }

    fn characteristics(&self) -> Result<(), Error> {
        if self.readable {
            Ok(())
        } else {
            Err(Error::Platform(PlatformError::Message(format!(
                "characteristics unavailable for camera {}",
                self.id
            ))))
        }
    }
}

impl CameraDevice for SyntheticDevice {
    type Stream = SyntheticStream;
    type Error = Error;

    fn id(&self) -> &str {
        &self.id
    }

    fn facing(&self) -> Result<LensFacing, Self::Error> {
        self.characteristics()?;
        Ok(self.facing)
    }

    fn stream_configurations(
        &self,
    ) -> Result<impl Iterator<Item = StreamConfiguration>, Self::Error> {
        self.characteristics()?;
        Ok(self.configurations.clone().into_iter())
    }

    fn open(self, config: &StreamConfig) -> Result<Self::Stream, Self::Error> {
        if self.fail_open {
            return Err(Error::Platform(PlatformError::Message(format!(
                "failed to open camera {}",
                self.id
            ))));
        }
        if !self.configurations.iter().any(|c| {
            c.pixel_format == config.pixel_format
                && c.size == config.size
                && c.direction == StreamDirection::Output
        }) {
            return Err(Error::NoMatchingStream {
                device: self.id,
                format: config.pixel_format,
            });
        }
        self.feed.record(StreamEvent::Opened(config.size));
        Ok(SyntheticStream {
            feed: self.feed,
            fail_start: self.fail_start,
            running: false,
        })
    }
}

/// An open synthetic stream. Closing happens on drop.
#[derive(Debug)]
pub struct SyntheticStream {
    feed: SyntheticFeed,
    fail_start: bool,
    running: bool,
}

impl CameraStream for SyntheticStream {
    type Error = Error;

    fn start<P: FrameProducer>(&mut self, producer: P) -> Result<(), Self::Error> {
        if self.running {
            return Err(Error::AlreadyStarted);
        }
        if self.fail_start {
            return Err(Error::Platform(PlatformError::Message(
                "failed to start repeating request".into(),
            )));
        }
        *lock(&self.feed.inner.producer) = Some(Box::new(producer));
        self.running = true;
        self.feed.record(StreamEvent::Started);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        if !self.running {
            return Err(Error::NotStarted);
        }
        *lock(&self.feed.inner.producer) = None;
        self.running = false;
        self.feed.record(StreamEvent::Stopped);
        Ok(())
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        if self.running {
            let _ = self.stop();
        }
        self.feed.record(StreamEvent::Closed);
    }
}

/// Chroma storage of a [`SyntheticImage`].
#[derive(Debug, Clone)]
pub enum SyntheticChroma {
    /// Separate Cb and Cr planes, one byte per sample.
    Planar { cb: Vec<u8>, cr: Vec<u8> },
    /// One buffer of chroma pairs in `order`.
    Interleaved { pairs: Vec<u8>, order: ChromaOrder },
}

/// An owned YUV 4:2:0 image that can be described as a [`PlanarFrame`].
#[derive(Debug, Clone)]
pub struct SyntheticImage {
    size: Size,
    luma: Vec<u8>,
    chroma: SyntheticChroma,
}

fn chroma_size(size: Size) -> Size {
    Size::new(size.width.div_ceil(2), size.height.div_ceil(2))
}

impl SyntheticImage {
    /// An image with the same (Y, Cb, Cr) everywhere. `interleaved` selects
    /// a single aliased chroma buffer stored in the given order.
    pub fn uniform(size: Size, y: u8, cb: u8, cr: u8, interleaved: Option<ChromaOrder>) -> Self {
        let c = chroma_size(size).pixel_count();
        let chroma = match interleaved {
            None => SyntheticChroma::Planar {
                cb: vec![cb; c],
                cr: vec![cr; c],
            },
            Some(order) => {
                let pair = match order {
                    ChromaOrder::CbFirst => [cb, cr],
                    ChromaOrder::CrFirst => [cr, cb],
                };
                SyntheticChroma::Interleaved {
                    pairs: pair.repeat(c),
                    order,
                }
            }
        };
        Self {
            size,
            luma: vec![y; size.pixel_count()],
            chroma,
        }
    }

    /// Eight vertical color bars, rotated by `frame_num` so motion is
    /// visible.
    pub fn color_bars(size: Size, frame_num: u64) -> Self {
        const BARS: [[f32; 3]; 8] = [
            [235.0, 235.0, 235.0],
            [235.0, 235.0, 16.0],
            [16.0, 235.0, 235.0],
            [16.0, 235.0, 16.0],
            [235.0, 16.0, 235.0],
            [235.0, 16.0, 16.0],
            [16.0, 16.0, 235.0],
            [16.0, 16.0, 16.0],
        ];
        let bar_width = (size.width / 8).max(1);
        let bar_at = |col: u32| BARS[((col / bar_width) as usize + frame_num as usize) % BARS.len()];

        let mut luma = Vec::with_capacity(size.pixel_count());
        for _ in 0..size.height {
            for col in 0..size.width {
                let [r, g, b] = bar_at(col);
                luma.push((0.299 * r + 0.587 * g + 0.114 * b) as u8);
            }
        }

        let csize = chroma_size(size);
        let mut cb = Vec::with_capacity(csize.pixel_count());
        let mut cr = Vec::with_capacity(csize.pixel_count());
        for _ in 0..csize.height {
            for col in 0..csize.width {
                let [r, g, b] = bar_at(col * 2);
                cb.push((128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b).clamp(0.0, 255.0) as u8);
                cr.push((128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b).clamp(0.0, 255.0) as u8);
            }
        }

        Self {
            size,
            luma,
            chroma: SyntheticChroma::Planar { cb, cr },
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Borrow the image as a three-plane frame descriptor.
    pub fn frame(&self) -> PlanarFrame<'_> {
        let cw = chroma_size(self.size).width as usize;
        let luma = Plane::new(&self.luma, self.size.width as usize, 1);
        match &self.chroma {
            SyntheticChroma::Planar { cb, cr } => PlanarFrame::yuv420(
                self.size,
                luma,
                Plane::new(cb, cw, 1),
                Plane::new(cr, cw, 1),
            ),
            SyntheticChroma::Interleaved { pairs, .. } => {
                let chroma = Plane::new(pairs, cw * 2, 2);
                PlanarFrame::yuv420(self.size, luma, chroma, chroma)
            }
        }
    }
}
