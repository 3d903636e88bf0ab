use core::time::Duration;

use arrayvec::ArrayVec;

use crate::types::{PixelFormat, Size};

/// Bytes per packed output pixel.
pub const PACKED_CHANNELS: usize = 4;

/// Fill value for pixels no source sample was written to.
pub const OPAQUE_BLACK: [u8; 4] = [0, 0, 0, 255];

/// A single plane of image data.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of consecutive rows.
    pub row_stride: usize,
    /// Bytes between horizontally adjacent samples within a row.
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Base address, used to detect planes that alias one buffer.
    pub fn base_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Byte offset of sample `(row, col)`, or `None` if the column runs past
    /// the row stride or the offset lies outside the plane.
    pub fn offset(&self, row: u32, col: u32) -> Option<usize> {
        let col_off = (col as usize).checked_mul(self.pixel_stride)?;
        if col_off >= self.row_stride {
            return None;
        }
        let off = (row as usize)
            .checked_mul(self.row_stride)?
            .checked_add(col_off)?;
        (off < self.data.len()).then_some(off)
    }

    pub fn sample(&self, row: u32, col: u32) -> Option<u8> {
        self.offset(row, col).map(|off| self.data[off])
    }
}

/// A borrowed video frame. Lifetime tied to callback scope (zero-copy).
pub trait Frame {
    fn pixel_format(&self) -> PixelFormat;
    fn size(&self) -> Size;
    fn planes(&self) -> &[Plane<'_>];
    fn timestamp(&self) -> Duration;
}

/// Plain planar frame descriptor over borrowed plane memory.
///
/// Platform backends that already hold plane slices can hand this to a
/// [`FrameProducer`](crate::stream::FrameProducer) directly.
#[derive(Debug, Clone)]
pub struct PlanarFrame<'a> {
    pub pixel_format: PixelFormat,
    pub size: Size,
    pub planes: ArrayVec<Plane<'a>, 3>,
    pub timestamp: Duration,
}

impl<'a> PlanarFrame<'a> {
    /// Describe a 4:2:0 frame from its luma and two chroma planes.
    pub fn yuv420(size: Size, luma: Plane<'a>, cb: Plane<'a>, cr: Plane<'a>) -> Self {
        Self {
            pixel_format: PixelFormat::Yuv420,
            size,
            planes: ArrayVec::from([luma, cb, cr]),
            timestamp: Duration::ZERO,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl Frame for PlanarFrame<'_> {
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

/// An owned, tightly packed RGBA frame (row-major, no padding, alpha 255).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedFrame {
    pixels: Vec<u8>,
    size: Size,
}

impl PackedFrame {
    /// An opaque black frame of the given size.
    pub fn new(size: Size) -> Self {
        Self {
            pixels: OPAQUE_BLACK.repeat(size.pixel_count()),
            size,
        }
    }

    /// Wrap existing RGBA bytes; `None` if the length does not match `size`.
    pub fn from_pixels(size: Size, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == size.pixel_count() * PACKED_CHANNELS).then_some(Self { pixels, size })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Bytes per row.
    pub fn row_stride(&self) -> usize {
        self.size.width as usize * PACKED_CHANNELS
    }

    /// Reshape to `size`, keeping the allocation where possible. Existing
    /// bytes are left as they are when the size does not change; otherwise
    /// the whole frame becomes opaque black.
    pub fn resize(&mut self, size: Size) {
        if self.size != size {
            self.pixels.resize(size.pixel_count() * PACKED_CHANNELS, 0);
            self.fill(OPAQUE_BLACK);
            self.size = size;
        }
    }

    /// Set every pixel to `px`.
    pub fn fill(&mut self, px: [u8; 4]) {
        for dst in self.pixels.chunks_exact_mut(PACKED_CHANNELS) {
            dst.copy_from_slice(&px);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let i = (y as usize * self.size.width as usize + x as usize) * PACKED_CHANNELS;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[i..i + PACKED_CHANNELS]);
        Some(px)
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, px: [u8; 4]) {
        if x < self.size.width && y < self.size.height {
            let i = (y as usize * self.size.width as usize + x as usize) * PACKED_CHANNELS;
            self.pixels[i..i + PACKED_CHANNELS].copy_from_slice(&px);
        }
    }

    /// Swap the red and blue channel of every pixel (RGBA <-> BGRA).
    pub fn swap_red_blue(&mut self) {
        for px in self.pixels.chunks_exact_mut(PACKED_CHANNELS) {
            px.swap(0, 2);
        }
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}
