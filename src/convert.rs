use serde::{Deserialize, Serialize};

use crate::frame::Plane;

/// Chroma value substituted when a sample cannot be read.
pub const NEUTRAL_CHROMA: u8 = 128;

/// Byte order of an interleaved chroma pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChromaOrder {
    /// Cb then Cr (NV12 style).
    #[default]
    CbFirst,
    /// Cr then Cb (NV21 style).
    CrFirst,
}

/// How the two chroma planes of a capture session are laid out.
///
/// Decided from the first valid frame of a session and never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChromaLayout {
    /// Both chroma planes alias one buffer; pairs are read from the first
    /// chroma plane in the given order.
    Interleaved(ChromaOrder),
    /// Each chroma plane is sampled on its own.
    Planar,
}

impl ChromaLayout {
    /// Classify by comparing chroma base pointers. `order` is the guess
    /// applied when the planes alias; it is not checked against metadata.
    pub fn detect(cb: &Plane<'_>, cr: &Plane<'_>, order: ChromaOrder) -> Self {
        if cb.base_ptr() == cr.base_ptr() {
            Self::Interleaved(order)
        } else {
            Self::Planar
        }
    }

    /// Read the (Cb, Cr) pair for chroma sample `(row, col)`. Samples that
    /// fall outside their plane stay at [`NEUTRAL_CHROMA`].
    pub fn sample(&self, cb: &Plane<'_>, cr: &Plane<'_>, row: u32, col: u32) -> (u8, u8) {
        match *self {
            Self::Interleaved(order) => {
                let pair = cb
                    .offset(row, col)
                    .filter(|&off| off + 1 < cb.data.len())
                    .map(|off| (cb.data[off], cb.data[off + 1]));
                match (pair, order) {
                    (Some((first, second)), ChromaOrder::CbFirst) => (first, second),
                    (Some((first, second)), ChromaOrder::CrFirst) => (second, first),
                    (None, _) => (NEUTRAL_CHROMA, NEUTRAL_CHROMA),
                }
            }
            Self::Planar => (
                cb.sample(row, col).unwrap_or(NEUTRAL_CHROMA),
                cr.sample(row, col).unwrap_or(NEUTRAL_CHROMA),
            ),
        }
    }
}

fn clamp_to_byte(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Convert one luma sample and its chroma pair to an opaque RGBA pixel.
///
/// Full-range BT.601 coefficients; each channel is truncated toward zero and
/// then clamped to `0..=255`.
pub fn yuv_to_rgba(luma: u8, cb: u8, cr: u8) -> [u8; 4] {
    let y = f32::from(luma);
    let u = f32::from(cb) - 128.0;
    let v = f32::from(cr) - 128.0;

    let r = (y + 1.402 * v) as i32;
    let g = (y - 0.344136 * u - 0.714136 * v) as i32;
    let b = (y + 1.772 * u) as i32;

    [clamp_to_byte(r), clamp_to_byte(g), clamp_to_byte(b), 255]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_is_gray() {
        for luma in 0..=255u8 {
            assert_eq!(yuv_to_rgba(luma, 128, 128), [luma, luma, luma, 255]);
        }
    }

    #[test]
    fn channels_saturate() {
        assert_eq!(yuv_to_rgba(255, 128, 255)[0], 255);
        assert_eq!(yuv_to_rgba(0, 128, 0)[0], 0);
        assert_eq!(yuv_to_rgba(255, 255, 128)[2], 255);
        assert_eq!(yuv_to_rgba(0, 0, 128)[2], 0);
        for &(y, u, v) in &[(0, 0, 0), (255, 255, 255), (0, 255, 0), (255, 0, 255)] {
            assert_eq!(yuv_to_rgba(y, u, v)[3], 255);
        }
    }

    #[test]
    fn conversion_truncates() {
        // v = 1: 100 + 1.402 = 101.402 -> 101; g = 100 - 0.714136 = 99.28 -> 99
        assert_eq!(yuv_to_rgba(100, 128, 129), [101, 99, 100, 255]);
        // u = 1: b = 101.772 -> 101; g = 99.655 -> 99
        assert_eq!(yuv_to_rgba(100, 129, 128), [100, 99, 101, 255]);
    }

    #[test]
    fn aliased_planes_are_interleaved() {
        let uv = [10u8, 20, 30, 40];
        let a = Plane::new(&uv, 4, 2);
        let b = Plane::new(&uv, 4, 2);
        assert_eq!(
            ChromaLayout::detect(&a, &b, ChromaOrder::CbFirst),
            ChromaLayout::Interleaved(ChromaOrder::CbFirst)
        );

        let u = [1u8; 4];
        let v = [2u8; 4];
        assert_eq!(
            ChromaLayout::detect(&Plane::new(&u, 2, 1), &Plane::new(&v, 2, 1), ChromaOrder::CbFirst),
            ChromaLayout::Planar
        );
    }

    #[test]
    fn interleaved_order_picks_pair_order() {
        let uv = [10u8, 20, 30, 40];
        let plane = Plane::new(&uv, 4, 2);
        let cb_first = ChromaLayout::Interleaved(ChromaOrder::CbFirst);
        let cr_first = ChromaLayout::Interleaved(ChromaOrder::CrFirst);
        assert_eq!(cb_first.sample(&plane, &plane, 0, 1), (30, 40));
        assert_eq!(cr_first.sample(&plane, &plane, 0, 1), (40, 30));
    }

    #[test]
    fn out_of_bounds_chroma_is_neutral() {
        // Last pair is truncated: the second byte is missing.
        let uv = [10u8, 20, 30];
        let plane = Plane::new(&uv, 4, 2);
        let layout = ChromaLayout::Interleaved(ChromaOrder::CbFirst);
        assert_eq!(layout.sample(&plane, &plane, 0, 0), (10, 20));
        assert_eq!(layout.sample(&plane, &plane, 0, 1), (128, 128));
        assert_eq!(layout.sample(&plane, &plane, 5, 0), (128, 128));

        let u = [50u8; 2];
        let v = [60u8; 4];
        let (cb, cr) = (Plane::new(&u, 2, 1), Plane::new(&v, 2, 1));
        assert_eq!(ChromaLayout::Planar.sample(&cb, &cr, 1, 0), (128, 60));
    }
}
