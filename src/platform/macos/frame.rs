use std::ffi::c_void;
use std::time::Duration;

use arrayvec::ArrayVec;
use objc2_core_media::CMTime;
use objc2_core_video::{
    CVPixelBuffer, CVPixelBufferGetBaseAddress, CVPixelBufferGetBaseAddressOfPlane,
    CVPixelBufferGetBytesPerRow, CVPixelBufferGetBytesPerRowOfPlane, CVPixelBufferGetHeight,
    CVPixelBufferGetHeightOfPlane, CVPixelBufferGetPixelFormatType, CVPixelBufferGetPlaneCount,
    CVPixelBufferGetWidth,
};

use crate::frame::{Frame, Plane};
use crate::platform::macos::device::fourcc_to_pixel_format;
use crate::types::{PixelFormat, Size};

/// Presentation time of a sample buffer; invalid or negative times map to zero.
pub(crate) fn cm_time_to_duration(time: CMTime) -> Duration {
    if time.timescale <= 0 || time.value < 0 {
        return Duration::ZERO;
    }
    let scale = time.timescale as u64;
    let value = time.value as u64;
    Duration::from_secs(value / scale) + Duration::from_nanos((value % scale) * 1_000_000_000 / scale)
}

/// A video frame backed by a locked `CVPixelBuffer`.
/// Only valid within the callback scope.
///
/// Bi-planar 4:2:0 buffers are exposed as luma plus two chroma planes that
/// share the interleaved CbCr memory with a pixel stride of 2.
pub struct MacosFrame<'a> {
    pixel_buffer: &'a CVPixelBuffer,
    planes: ArrayVec<Plane<'a>, 3>,
    pixel_format: PixelFormat,
    size: Size,
    timestamp: Duration,
}

impl<'a> MacosFrame<'a> {
    /// Create a frame from a locked pixel buffer.
    /// SAFETY: The pixel buffer base address must be locked for the lifetime 'a.
    pub(crate) unsafe fn from_locked_pixel_buffer(
        pixel_buffer: &'a CVPixelBuffer,
        timestamp: Duration,
    ) -> Self {
        let width = CVPixelBufferGetWidth(pixel_buffer);
        let height = CVPixelBufferGetHeight(pixel_buffer);
        let fourcc = CVPixelBufferGetPixelFormatType(pixel_buffer);
        let plane_count = CVPixelBufferGetPlaneCount(pixel_buffer);
        let mut planes = ArrayVec::new();

        // unknown formats go through as Jpeg, which the converter rejects
        let pixel_format = fourcc_to_pixel_format(fourcc).unwrap_or(PixelFormat::Jpeg);

        if plane_count == 0 {
            let base = CVPixelBufferGetBaseAddress(pixel_buffer);
            if !base.is_null() {
                let bytes_per_row = CVPixelBufferGetBytesPerRow(pixel_buffer);
                let data =
                    unsafe { std::slice::from_raw_parts(base as *const u8, bytes_per_row * height) };
                planes.push(Plane::new(data, bytes_per_row, 4));
            }
        } else if plane_count == 2 {
            let luma = unsafe { plane_slice(pixel_buffer, 0) };
            let chroma = unsafe { plane_slice(pixel_buffer, 1) };
            if let (Some((luma, luma_stride)), Some((chroma, chroma_stride))) = (luma, chroma) {
                planes.push(Plane::new(luma, luma_stride, 1));
                planes.push(Plane::new(chroma, chroma_stride, 2));
                planes.push(Plane::new(chroma, chroma_stride, 2));
            }
        } else {
            for i in 0..plane_count.min(3) {
                if let Some((data, stride)) = unsafe { plane_slice(pixel_buffer, i) } {
                    planes.push(Plane::new(data, stride, 1));
                }
            }
        }

        MacosFrame {
            pixel_buffer,
            planes,
            pixel_format,
            size: Size::new(width as u32, height as u32),
            timestamp,
        }
    }

    /// Raw pointer to the backing `CVPixelBuffer` (escape hatch).
    pub fn pixel_buffer_ptr(&self) -> *const c_void {
        self.pixel_buffer as *const CVPixelBuffer as *const c_void
    }
}

/// SAFETY: the pixel buffer base address must be locked for `'a`.
unsafe fn plane_slice<'a>(pixel_buffer: &'a CVPixelBuffer, plane: usize) -> Option<(&'a [u8], usize)> {
    let base = CVPixelBufferGetBaseAddressOfPlane(pixel_buffer, plane);
    if base.is_null() {
        return None;
    }
    let bytes_per_row = CVPixelBufferGetBytesPerRowOfPlane(pixel_buffer, plane);
    let rows = CVPixelBufferGetHeightOfPlane(pixel_buffer, plane);
    let data = unsafe { std::slice::from_raw_parts(base as *const u8, bytes_per_row * rows) };
    Some((data, bytes_per_row))
}

impl Frame for MacosFrame<'_> {
    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn size(&self) -> Size {
        self.size
    }

    fn planes(&self) -> &[Plane<'_>] {
        &self.planes
    }

    fn timestamp(&self) -> Duration {
        self.timestamp
    }
}
