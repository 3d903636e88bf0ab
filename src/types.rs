use serde::{Deserialize, Serialize};

/// Pixel formats encountered across camera platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum PixelFormat {
    /// Flexible YUV 4:2:0: three planes with arbitrary row and pixel strides.
    Yuv420,
    /// Y plane followed by an interleaved CbCr plane.
    Nv12,
    /// Y plane followed by an interleaved CrCb plane.
    Nv21,
    /// Y, Cb and Cr in three tightly packed planes.
    I420,
    Yuyv,
    Bgra32,
    Jpeg,
}

impl PixelFormat {
    /// Whether frames of this format can be fed to the 4:2:0 converter.
    pub fn is_yuv420(&self) -> bool {
        matches!(self, Self::Yuv420 | Self::Nv12 | Self::Nv21 | Self::I420)
    }
}

/// Pixel dimensions of a frame or texture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// L1 distance between two sizes, used to rank stream configurations.
    pub fn l1_distance(&self, other: Size) -> u64 {
        u64::from(self.width.abs_diff(other.width)) + u64::from(self.height.abs_diff(other.height))
    }
}

/// A rational number (numerator / denominator).
///
/// Used to represent frame rates (e.g. 30000/1000 = 30 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: u32,
    pub denominator: u32,
}

impl Ratio {
    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Self {
            numerator: 30000,
            denominator: 1000,
        }
    }
}

/// Which way a camera lens points relative to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LensFacing {
    /// External or pass-through camera; preferred for passthrough views.
    External,
    Back,
    Front,
    /// The platform reported nothing usable.
    Unknown,
}

impl LensFacing {
    /// Selection priority; higher wins.
    pub fn priority(&self) -> u8 {
        match self {
            Self::External => 3,
            Self::Back => 2,
            Self::Front => 1,
            Self::Unknown => 0,
        }
    }
}

/// Declared purpose of a stream configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamDirection {
    /// An image stream the camera can produce.
    Output,
    /// A reprocessing input stream.
    Input,
}

/// One entry from a device's supported stream configuration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamConfiguration {
    pub pixel_format: PixelFormat,
    pub size: Size,
    pub direction: StreamDirection,
}

/// Configuration for opening a camera stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub pixel_format: PixelFormat,
    pub size: Size,
    pub frame_rate: Ratio,
}

/// Pixel format tag of a destination texture. Only channel order matters here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    /// A graphics-API specific format code the pipeline does not interpret.
    Other(i64),
}

impl TextureFormat {
    /// Whether the format stores red and blue swapped relative to RGBA.
    pub fn is_bgra(&self) -> bool {
        matches!(self, Self::Bgra8Unorm | Self::Bgra8Srgb)
    }
}

/// An axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.width && y - self.y < self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facing_priority_orders_external_first() {
        let mut facings = [
            LensFacing::Unknown,
            LensFacing::Front,
            LensFacing::External,
            LensFacing::Back,
        ];
        facings.sort_by_key(|f| std::cmp::Reverse(f.priority()));
        assert_eq!(
            facings,
            [
                LensFacing::External,
                LensFacing::Back,
                LensFacing::Front,
                LensFacing::Unknown
            ]
        );
    }

    #[test]
    fn l1_distance_is_symmetric() {
        let a = Size::new(640, 480);
        let b = Size::new(1024, 1024);
        assert_eq!(a.l1_distance(b), 384 + 544);
        assert_eq!(b.l1_distance(a), a.l1_distance(b));
    }

    #[test]
    fn only_bgra_formats_swap() {
        assert!(TextureFormat::Bgra8Srgb.is_bgra());
        assert!(TextureFormat::Bgra8Unorm.is_bgra());
        assert!(!TextureFormat::Rgba8Srgb.is_bgra());
        assert!(!TextureFormat::Other(44).is_bgra());
    }

    #[test]
    fn rect_contains_is_half_open() {
        let r = Rect {
            x: 80,
            y: 0,
            width: 640,
            height: 480,
        };
        assert!(r.contains(80, 0));
        assert!(r.contains(719, 479));
        assert!(!r.contains(79, 0));
        assert!(!r.contains(720, 0));
        assert!(!r.contains(80, 480));
    }
}
