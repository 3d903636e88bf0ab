//! Camera backends implementing the [`device`](crate::device) and
//! [`stream`](crate::stream) traits.

#[cfg(target_os = "macos")]
pub mod macos;
pub mod synthetic;
