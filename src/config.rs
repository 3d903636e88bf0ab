use serde::{Deserialize, Serialize};

use crate::convert::ChromaOrder;
use crate::types::{PixelFormat, Ratio};

/// Capture engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Planar format requested from the camera.
    pub pixel_format: PixelFormat,
    /// Chroma pair order assumed when the chroma planes are interleaved.
    pub chroma_order: ChromaOrder,
    pub frame_rate: Ratio,
    /// How often the measured frame rate is logged.
    pub fps_log_interval_ms: u64,
    /// Discarded frames logged before the log is throttled.
    pub malformed_log_first: u64,
    pub malformed_log_every: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Yuv420,
            chroma_order: ChromaOrder::CbFirst,
            frame_rate: Ratio::default(),
            fps_log_interval_ms: 2000,
            malformed_log_first: 5,
            malformed_log_every: 300,
        }
    }
}

/// Texture upload settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// RGBA color used when no camera frame has arrived yet.
    pub background: [u8; 4],
    pub upload_log_first: u64,
    pub upload_log_every: u64,
    pub clear_log_first: u64,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            background: [0, 0, 0, 255],
            upload_log_first: 3,
            upload_log_every: 100,
            clear_log_first: 5,
        }
    }
}

/// Placement of the head-locked passthrough quad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadConfig {
    /// Quad width in meters; height follows the texture aspect ratio.
    pub width_m: f32,
    /// Distance in front of the viewer in meters.
    pub distance_m: f32,
}

impl Default for QuadConfig {
    fn default() -> Self {
        Self {
            width_m: 1.0,
            distance_m: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: CaptureConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CaptureConfig::default());
        let config: CompositorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.background, [0, 0, 0, 255]);
    }

    #[test]
    fn partial_overrides() {
        let config: CaptureConfig =
            serde_json::from_str(r#"{"pixel_format":"nv12","chroma_order":"cr_first"}"#).unwrap();
        assert_eq!(config.pixel_format, PixelFormat::Nv12);
        assert_eq!(config.chroma_order, ChromaOrder::CrFirst);
        assert_eq!(config.fps_log_interval_ms, 2000);

        let quad: QuadConfig = serde_json::from_str(r#"{"distance_m":2.5}"#).unwrap();
        assert_eq!(quad.distance_m, 2.5);
        assert_eq!(quad.width_m, 1.0);
    }
}
