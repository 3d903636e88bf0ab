//! Camera passthrough pipeline for head-mounted displays.
//!
//! Raw planar YUV 4:2:0 frames arrive on a platform camera thread, are
//! converted and resampled into packed RGBA, handed to the render loop through
//! a newest-wins [`FrameSlot`], and uploaded centered into a swapchain image
//! by the [`Compositor`].

pub mod capture;
pub mod compositor;
pub mod config;
pub mod convert;
pub mod device;
pub mod diag;
pub mod error;
pub mod frame;
pub mod permission;
pub mod platform;
pub mod present;
pub mod resample;
pub mod select;
pub mod slot;
pub mod stream;
pub mod teardown;
pub mod types;

// Re-exports
pub use capture::*;
pub use compositor::*;
pub use config::*;
pub use convert::{ChromaLayout, ChromaOrder};
pub use device::*;
pub use error::*;
pub use frame::*;
pub use permission::*;
pub use present::*;
pub use resample::FrameBuilder;
pub use slot::*;
pub use stream::*;
pub use types::*;
