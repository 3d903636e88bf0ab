use std::sync::OnceLock;

use crate::convert::{ChromaLayout, ChromaOrder, yuv_to_rgba};
use crate::error::FrameError;
use crate::frame::{Frame, OPAQUE_BLACK, PACKED_CHANNELS, PackedFrame, Plane};
use crate::types::Size;

/// Source index for destination index `dst` when stretching `src_len`
/// samples over `dst_len`: `floor(dst * src_len / dst_len)`.
pub fn source_index(dst: u32, dst_len: u32, src_len: u32) -> u32 {
    (u64::from(dst) * u64::from(src_len) / u64::from(dst_len)) as u32
}

/// Check a raw frame before any pixel is touched.
pub fn validate<F: Frame + ?Sized>(frame: &F) -> Result<(), FrameError> {
    if !frame.pixel_format().is_yuv420() {
        return Err(FrameError::UnsupportedFormat(frame.pixel_format()));
    }
    let planes = frame.planes();
    if planes.len() < 3 {
        return Err(FrameError::MissingPlanes(planes.len()));
    }
    for (i, plane) in planes.iter().take(3).enumerate() {
        if plane.row_stride == 0 {
            return Err(FrameError::ZeroRowStride(i));
        }
        if plane.pixel_stride == 0 {
            return Err(FrameError::ZeroPixelStride(i));
        }
    }
    if frame.size().is_empty() {
        return Err(FrameError::EmptySource);
    }
    Ok(())
}

/// Convert `source` planes into `out`, resampling to `out`'s size.
///
/// Pixels whose luma sample lies outside the luma plane become opaque black.
pub fn convert_into(
    source: Size,
    [luma, cb, cr]: [&Plane<'_>; 3],
    layout: ChromaLayout,
    out: &mut PackedFrame,
) {
    let output = out.size();
    if source.is_empty() || output.is_empty() {
        return;
    }
    let row_bytes = out.row_stride();
    for (y, row) in out.pixels_mut().chunks_exact_mut(row_bytes).enumerate() {
        let src_y = source_index(y as u32, output.height, source.height);
        for (x, px) in row.chunks_exact_mut(PACKED_CHANNELS).enumerate() {
            let src_x = source_index(x as u32, output.width, source.width);
            let Some(luma) = luma.sample(src_y, src_x) else {
                px.copy_from_slice(&OPAQUE_BLACK);
                continue;
            };
            let (u, v) = layout.sample(cb, cr, src_y / 2, src_x / 2);
            px.copy_from_slice(&yuv_to_rgba(luma, u, v));
        }
    }
}

/// Drives conversion for one capture session.
///
/// Owns the scratch buffer frames are converted into and the chroma layout
/// decided on the first valid frame.
#[derive(Debug)]
pub struct FrameBuilder {
    output: Size,
    chroma_order: ChromaOrder,
    layout: OnceLock<ChromaLayout>,
    scratch: PackedFrame,
}

impl FrameBuilder {
    pub fn new(output: Size, chroma_order: ChromaOrder) -> Self {
        Self {
            output,
            chroma_order,
            layout: OnceLock::new(),
            scratch: PackedFrame::new(output),
        }
    }

    pub fn output_size(&self) -> Size {
        self.output
    }

    /// The layout frozen for this session, once a frame has been seen.
    pub fn layout(&self) -> Option<ChromaLayout> {
        self.layout.get().copied()
    }

    /// Validate and convert `frame` into the scratch buffer.
    ///
    /// On error nothing is written.
    pub fn build<F: Frame + ?Sized>(&mut self, frame: &F) -> Result<&mut PackedFrame, FrameError> {
        if self.output.is_empty() {
            return Err(FrameError::NoOutputSize);
        }
        validate(frame)?;
        let planes = frame.planes();
        let (luma, cb, cr) = (&planes[0], &planes[1], &planes[2]);

        let order = self.chroma_order;
        let layout = *self.layout.get_or_init(|| {
            let layout = ChromaLayout::detect(cb, cr, order);
            for (name, plane) in [("y", luma), ("u", cb), ("v", cr)] {
                tracing::info!(
                    plane = name,
                    row_stride = plane.row_stride,
                    pixel_stride = plane.pixel_stride,
                    len = plane.data.len(),
                    "camera plane layout"
                );
            }
            tracing::info!(?layout, "chroma layout fixed for session");
            tracing::debug!(first_luma = ?&luma.data[..luma.data.len().min(8)], "first luma samples");
            layout
        });

        self.scratch.resize(self.output);
        convert_into(frame.size(), [luma, cb, cr], layout, &mut self.scratch);
        Ok(&mut self.scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PlanarFrame;
    use crate::types::PixelFormat;

    #[test]
    fn identity_mapping_when_sizes_match() {
        for len in [1u32, 2, 7, 480, 641] {
            for i in 0..len {
                assert_eq!(source_index(i, len, len), i);
            }
        }
    }

    #[test]
    fn upscale_and_downscale_mapping() {
        // 2 -> 4: each source column repeated twice
        let cols: Vec<_> = (0..4).map(|x| source_index(x, 4, 2)).collect();
        assert_eq!(cols, [0, 0, 1, 1]);
        // 4 -> 2: every other column
        let cols: Vec<_> = (0..2).map(|x| source_index(x, 2, 4)).collect();
        assert_eq!(cols, [0, 2]);
        // 480 -> 1024 never reaches past the last source row
        assert_eq!(source_index(1023, 1024, 480), 479);
    }

    #[test]
    fn mapping_does_not_overflow() {
        assert_eq!(source_index(u32::MAX - 1, u32::MAX, u32::MAX), u32::MAX - 1);
    }

    fn gradient_frame(size: Size) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let y = (0..size.pixel_count()).map(|i| i as u8).collect();
        let c = (size.width as usize / 2) * (size.height as usize / 2);
        (y, vec![128; c], vec![128; c])
    }

    #[test]
    fn same_size_conversion_copies_luma() {
        let size = Size::new(4, 4);
        let (y, u, v) = gradient_frame(size);
        let frame = PlanarFrame::yuv420(
            size,
            Plane::new(&y, 4, 1),
            Plane::new(&u, 2, 1),
            Plane::new(&v, 2, 1),
        );
        let mut builder = FrameBuilder::new(size, ChromaOrder::CbFirst);
        let out = builder.build(&frame).unwrap();
        for py in 0..4 {
            for px in 0..4 {
                let l = (py * 4 + px) as u8;
                assert_eq!(out.pixel(px, py), Some([l, l, l, 255]));
            }
        }
        assert_eq!(builder.layout(), Some(ChromaLayout::Planar));
    }

    #[test]
    fn row_stride_padding_is_skipped() {
        let size = Size::new(2, 2);
        // rows padded to 3 bytes; the pad byte must never be read
        let y = [10u8, 20, 99, 30, 40, 99];
        let u = [128u8];
        let v = [128u8];
        let frame = PlanarFrame::yuv420(
            size,
            Plane::new(&y, 3, 1),
            Plane::new(&u, 1, 1),
            Plane::new(&v, 1, 1),
        );
        let mut builder = FrameBuilder::new(size, ChromaOrder::CbFirst);
        let out = builder.build(&frame).unwrap();
        let lumas: Vec<_> = (0..4).map(|i| out.pixel(i % 2, i / 2).unwrap()[0]).collect();
        assert_eq!(lumas, [10, 20, 30, 40]);
    }

    #[test]
    fn rows_past_a_short_luma_plane_are_opaque_black() {
        let size = Size::new(4, 4);
        // only two luma rows arrived
        let y = [60u8; 8];
        let c = [128u8; 4];
        let frame = PlanarFrame::yuv420(
            size,
            Plane::new(&y, 4, 1),
            Plane::new(&c, 2, 1),
            Plane::new(&c, 2, 1),
        );
        let mut builder = FrameBuilder::new(size, ChromaOrder::CbFirst);
        // stale bytes from an earlier frame must not survive
        builder.build(&PlanarFrame::yuv420(
            size,
            Plane::new(&[90u8; 16], 4, 1),
            Plane::new(&c, 2, 1),
            Plane::new(&c, 2, 1),
        ))
        .unwrap();

        let out = builder.build(&frame).unwrap();
        assert_eq!(out.pixel(0, 0), Some([60, 60, 60, 255]));
        assert_eq!(out.pixel(3, 1), Some([60, 60, 60, 255]));
        assert_eq!(out.pixel(0, 2), Some(OPAQUE_BLACK));
        assert_eq!(out.pixel(3, 3), Some(OPAQUE_BLACK));
    }

    #[test]
    fn malformed_frames_are_rejected_without_writing() {
        let y = [1u8; 16];
        let c = [128u8; 4];
        let mut builder = FrameBuilder::new(Size::new(4, 4), ChromaOrder::CbFirst);

        let mut frame = PlanarFrame::yuv420(
            Size::new(4, 4),
            Plane::new(&y, 4, 0),
            Plane::new(&c, 2, 1),
            Plane::new(&c, 2, 1),
        );
        assert_eq!(builder.build(&frame).unwrap_err(), FrameError::ZeroPixelStride(0));

        frame.planes[0].pixel_stride = 1;
        frame.planes[2].row_stride = 0;
        assert_eq!(builder.build(&frame).unwrap_err(), FrameError::ZeroRowStride(2));

        frame.planes[2].row_stride = 2;
        frame.pixel_format = PixelFormat::Jpeg;
        assert_eq!(
            builder.build(&frame).unwrap_err(),
            FrameError::UnsupportedFormat(PixelFormat::Jpeg)
        );

        frame.pixel_format = PixelFormat::Yuv420;
        frame.planes.pop();
        assert_eq!(builder.build(&frame).unwrap_err(), FrameError::MissingPlanes(2));

        // no layout decided from rejected frames
        assert_eq!(builder.layout(), None);
    }

    #[test]
    fn zero_sizes_do_not_write() {
        let y = [1u8; 4];
        let c = [128u8; 1];
        let frame = PlanarFrame::yuv420(
            Size::new(0, 2),
            Plane::new(&y, 2, 1),
            Plane::new(&c, 1, 1),
            Plane::new(&c, 1, 1),
        );
        let mut builder = FrameBuilder::new(Size::new(2, 2), ChromaOrder::CbFirst);
        assert_eq!(builder.build(&frame).unwrap_err(), FrameError::EmptySource);

        let mut unsized_builder = FrameBuilder::new(Size::default(), ChromaOrder::CbFirst);
        assert_eq!(unsized_builder.build(&frame).unwrap_err(), FrameError::NoOutputSize);
    }

    #[test]
    fn layout_is_frozen_after_first_frame() {
        let size = Size::new(2, 2);
        let y = [200u8; 4];
        let uv = [100u8, 150];
        let interleaved = PlanarFrame::yuv420(
            size,
            Plane::new(&y, 2, 1),
            Plane::new(&uv, 2, 2),
            Plane::new(&uv, 2, 2),
        );
        let mut builder = FrameBuilder::new(size, ChromaOrder::CbFirst);
        builder.build(&interleaved).unwrap();
        let frozen = builder.layout();
        assert_eq!(frozen, Some(ChromaLayout::Interleaved(ChromaOrder::CbFirst)));

        let u = [100u8];
        let v = [150u8];
        let planar = PlanarFrame::yuv420(
            size,
            Plane::new(&y, 2, 1),
            Plane::new(&u, 1, 1),
            Plane::new(&v, 1, 1),
        );
        builder.build(&planar).unwrap();
        assert_eq!(builder.layout(), frozen);
    }
}
