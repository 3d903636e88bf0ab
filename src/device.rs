use crate::stream::CameraStream;
use crate::types::{LensFacing, StreamConfig, StreamConfiguration};

/// Discover camera devices.
pub trait CameraManager {
    type Device: CameraDevice;
    type Error: core::error::Error + Send + Sync + 'static;

    /// Devices in discovery order.
    fn discover_devices(&self) -> Result<impl Iterator<Item = Self::Device>, Self::Error>;
}

/// A camera device that can be inspected and opened.
pub trait CameraDevice {
    type Stream: CameraStream;
    type Error: core::error::Error + Send + Sync + 'static;

    fn id(&self) -> &str;

    /// Lens facing from the device characteristics.
    fn facing(&self) -> Result<LensFacing, Self::Error>;

    /// Supported stream configuration table.
    fn stream_configurations(
        &self,
    ) -> Result<impl Iterator<Item = StreamConfiguration>, Self::Error>;

    fn open(self, config: &StreamConfig) -> Result<Self::Stream, Self::Error>;
}
