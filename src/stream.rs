use crate::frame::Frame;

/// Receives raw frames from a platform camera thread.
///
/// The frame is only valid for the duration of the call; implementations
/// copy out what they need before returning.
pub trait FrameProducer: Send + 'static {
    fn on_frame(&mut self, frame: &dyn Frame);
}

impl<F> FrameProducer for F
where
    F: FnMut(&dyn Frame) + Send + 'static,
{
    fn on_frame(&mut self, frame: &dyn Frame) {
        self(frame)
    }
}

/// Callback-based frame delivery.
pub trait CameraStream {
    type Error: core::error::Error + Send + Sync + 'static;

    /// Start streaming. The producer is invoked on a platform thread for each
    /// frame, possibly a different thread each time.
    fn start<P: FrameProducer>(&mut self, producer: P) -> Result<(), Self::Error>;

    /// Stop streaming and detach the producer.
    fn stop(&mut self) -> Result<(), Self::Error>;
}
