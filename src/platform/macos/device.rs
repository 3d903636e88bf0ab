use objc2::rc::Retained;
use objc2_av_foundation::{
    AVCaptureDevice, AVCaptureDeviceFormat, AVCaptureDevicePosition,
    AVCaptureDeviceTypeExternal, AVCaptureDeviceTypeExternalUnknown, AVMediaTypeVideo,
};
use objc2_core_media::CMVideoFormatDescriptionGetDimensions;

use crate::device::{CameraDevice, CameraManager};
use crate::error::Error;
use crate::platform::macos::platform_message;
use crate::platform::macos::stream::MacosCameraStream;
use crate::types::*;

/// macOS camera manager using AVFoundation.
#[derive(Debug, Default)]
pub struct MacosCameraManager;

impl CameraManager for MacosCameraManager {
    type Device = MacosCameraDevice;
    type Error = Error;

    fn discover_devices(&self) -> Result<impl Iterator<Item = Self::Device>, Self::Error> {
        let media_type = unsafe { AVMediaTypeVideo }
            .ok_or_else(|| platform_message("AVMediaTypeVideo not available"))?;

        #[allow(deprecated)]
        let devices: Vec<_> = unsafe { AVCaptureDevice::devicesWithMediaType(media_type) }
            .iter()
            .map(|d| MacosCameraDevice::new(d.clone()))
            .collect();

        Ok(devices.into_iter())
    }
}

/// Wraps an `AVCaptureDevice`.
pub struct MacosCameraDevice {
    pub(crate) device: Retained<AVCaptureDevice>,
    id_cache: String,
}

impl MacosCameraDevice {
    pub(crate) fn new(device: Retained<AVCaptureDevice>) -> Self {
        let id_cache = unsafe { device.uniqueID() }.to_string();
        MacosCameraDevice { device, id_cache }
    }

    /// Access the underlying `AVCaptureDevice`.
    pub fn av_device(&self) -> &AVCaptureDevice {
        &self.device
    }
}

impl core::fmt::Debug for MacosCameraDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MacosCameraDevice")
            .field("id", &self.id_cache)
            .finish_non_exhaustive()
    }
}

fn format_to_configuration(format: &AVCaptureDeviceFormat) -> Option<StreamConfiguration> {
    let desc = unsafe { format.formatDescription() };
    let pixel_format = fourcc_to_pixel_format(unsafe { desc.media_sub_type() })?;
    let dims = unsafe { CMVideoFormatDescriptionGetDimensions(&desc) };
    Some(StreamConfiguration {
        pixel_format,
        size: Size::new(dims.width as u32, dims.height as u32),
        direction: StreamDirection::Output,
    })
}

/// USB and Continuity cameras report an external device type and usually an
/// unspecified position.
fn is_external(device: &AVCaptureDevice) -> bool {
    let device_type = unsafe { device.deviceType() };
    #[allow(deprecated)]
    let external = unsafe { [AVCaptureDeviceTypeExternal, AVCaptureDeviceTypeExternalUnknown] };
    external.into_iter().flatten().any(|t| t == &*device_type)
}

fn facing_from(external: bool, position: AVCaptureDevicePosition) -> LensFacing {
    if external {
        return LensFacing::External;
    }
    match position {
        AVCaptureDevicePosition::Back => LensFacing::Back,
        AVCaptureDevicePosition::Front => LensFacing::Front,
        _ => LensFacing::Unknown,
    }
}

/// Bi-planar 4:2:0 buffers are reported as [`PixelFormat::Yuv420`]; frames
/// expose them as three planes.
pub(crate) fn fourcc_to_pixel_format(fourcc: u32) -> Option<PixelFormat> {
    // kCVPixelFormatType values
    #[allow(clippy::mistyped_literal_suffixes)]
    match fourcc {
        0x34_32_30_76 => Some(PixelFormat::Yuv420), // '420v'
        0x34_32_30_66 => Some(PixelFormat::Yuv420), // '420f'
        0x79_75_76_73 => Some(PixelFormat::Yuyv),   // 'yuvs'
        0x42_47_52_41 => Some(PixelFormat::Bgra32), // 'BGRA'
        0x6A_70_65_67 => Some(PixelFormat::Jpeg),   // 'jpeg'
        _ => None,
    }
}

pub(crate) fn pixel_format_to_fourcc(pf: PixelFormat) -> Option<u32> {
    #[allow(clippy::mistyped_literal_suffixes)]
    match pf {
        PixelFormat::Yuv420 | PixelFormat::Nv12 => Some(0x34_32_30_76), // '420v'
        PixelFormat::Yuyv => Some(0x79_75_76_73),                       // 'yuvs'
        PixelFormat::Bgra32 => Some(0x42_47_52_41),                     // 'BGRA'
        PixelFormat::Jpeg => Some(0x6A_70_65_67),                       // 'jpeg'
        _ => None,
    }
}

impl CameraDevice for MacosCameraDevice {
    type Stream = MacosCameraStream;
    type Error = Error;

    fn id(&self) -> &str {
        &self.id_cache
    }

    fn facing(&self) -> Result<LensFacing, Self::Error> {
        let position = unsafe { self.device.position() };
        Ok(facing_from(is_external(&self.device), position))
    }

    fn stream_configurations(
        &self,
    ) -> Result<impl Iterator<Item = StreamConfiguration>, Self::Error> {
        let mut configurations: Vec<StreamConfiguration> = Vec::new();
        for format in unsafe { self.device.formats() }.iter() {
            if let Some(c) = format_to_configuration(&format) {
                // '420v' and '420f' variants of one size collapse to one entry
                if !configurations.contains(&c) {
                    configurations.push(c);
                }
            }
        }
        Ok(configurations.into_iter())
    }

    fn open(self, config: &StreamConfig) -> Result<Self::Stream, Self::Error> {
        MacosCameraStream::new(self.device, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_device_type_wins_over_position() {
        assert_eq!(
            facing_from(true, AVCaptureDevicePosition::Unspecified),
            LensFacing::External
        );
        assert_eq!(facing_from(true, AVCaptureDevicePosition::Front), LensFacing::External);
        assert_eq!(facing_from(false, AVCaptureDevicePosition::Back), LensFacing::Back);
        assert_eq!(facing_from(false, AVCaptureDevicePosition::Front), LensFacing::Front);
        assert_eq!(
            facing_from(false, AVCaptureDevicePosition::Unspecified),
            LensFacing::Unknown
        );
    }

    #[test]
    fn bi_planar_formats_read_as_yuv420() {
        assert_eq!(fourcc_to_pixel_format(0x34_32_30_76), Some(PixelFormat::Yuv420));
        assert_eq!(fourcc_to_pixel_format(0x34_32_30_66), Some(PixelFormat::Yuv420));
        assert_eq!(fourcc_to_pixel_format(0), None);
    }
}
