#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use passthrough_camera::platform::synthetic::{
    SyntheticCameraManager, SyntheticDevice, SyntheticFeed,
};
use passthrough_camera::{
    CameraDevice, CameraManager, CameraStream, Frame, FrameProducer, LensFacing, PixelFormat,
    Size, StreamConfig, StreamConfiguration, StreamDirection,
};

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// A manager with one back camera offering only 640x480.
pub fn single_camera() -> (SyntheticCameraManager, SyntheticFeed) {
    let device = SyntheticDevice::new("back0", LensFacing::Back);
    let feed = device.feed();
    (SyntheticCameraManager::new(vec![device]), feed)
}

/// Every producer a [`LingeringManager`] stream was ever started with.
///
/// Stopping a lingering stream does not detach its producer, so tests can
/// deliver frames to a session after it was stopped, as a platform thread
/// racing `stop` would.
#[derive(Clone, Default)]
pub struct LateDelivery {
    producers: Arc<Mutex<Vec<SharedProducer>>>,
}

type SharedProducer = Arc<Mutex<Box<dyn FrameProducer>>>;

impl LateDelivery {
    /// Deliver `frame` to the producer of session `session` (0-based, in
    /// start order). Returns `false` if that session never started.
    ///
    /// Only the target producer stays locked during the call, so another
    /// thread may start a new session meanwhile.
    pub fn deliver_to(&self, session: usize, frame: &dyn Frame) -> bool {
        let producer = self
            .producers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session)
            .cloned();
        match producer {
            Some(producer) => {
                producer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .on_frame(frame);
                true
            }
            None => false,
        }
    }

    pub fn sessions(&self) -> usize {
        self.producers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[derive(Clone, Default)]
pub struct LingeringManager {
    pub late: LateDelivery,
}

impl CameraManager for LingeringManager {
    type Device = LingeringDevice;
    type Error = Infallible;

    fn discover_devices(&self) -> Result<impl Iterator<Item = Self::Device>, Self::Error> {
        Ok(std::iter::once(LingeringDevice {
            late: self.late.clone(),
        }))
    }
}

pub struct LingeringDevice {
    late: LateDelivery,
}

impl CameraDevice for LingeringDevice {
    type Stream = LingeringStream;
    type Error = Infallible;

    fn id(&self) -> &str {
        "lingering"
    }

    fn facing(&self) -> Result<LensFacing, Self::Error> {
        Ok(LensFacing::External)
    }

    fn stream_configurations(
        &self,
    ) -> Result<impl Iterator<Item = StreamConfiguration>, Self::Error> {
        Ok(std::iter::once(StreamConfiguration {
            pixel_format: PixelFormat::Yuv420,
            size: Size::new(8, 8),
            direction: StreamDirection::Output,
        }))
    }

    fn open(self, _config: &StreamConfig) -> Result<Self::Stream, Self::Error> {
        Ok(LingeringStream { late: self.late })
    }
}

pub struct LingeringStream {
    late: LateDelivery,
}

impl CameraStream for LingeringStream {
    type Error = Infallible;

    fn start<P: FrameProducer>(&mut self, producer: P) -> Result<(), Self::Error> {
        let producer: Box<dyn FrameProducer> = Box::new(producer);
        self.late
            .producers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(Mutex::new(producer)));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
