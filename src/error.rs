use std::fmt;

use crate::types::{PixelFormat, Size};

/// Platform-specific error details.
///
/// A backend error is displayed as-is and its own source becomes this
/// error's source, so each message appears once in a source chain.
#[derive(Debug)]
#[non_exhaustive]
pub enum PlatformError {
    Message(String),
    Backend(Box<dyn core::error::Error + Send + Sync + 'static>),
}

impl PlatformError {
    pub fn backend(e: impl core::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(e))
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => f.write_str(msg),
            Self::Backend(e) => write!(f, "{e}"),
        }
    }
}

impl core::error::Error for PlatformError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Message(_) => None,
            Self::Backend(e) => e.source(),
        }
    }
}

/// Top-level crate error.
///
/// Everything here is a setup or presentation failure; malformed frames on
/// the camera thread are reported as [`FrameError`] and never escape the
/// callback.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("no camera device found")]
    NoDevice,
    #[error("camera {device} has no {format:?} output stream")]
    NoMatchingStream { device: String, format: PixelFormat },
    #[error("invalid capture size {}x{}", .0.width, .0.height)]
    InvalidSize(Size),
    #[error("failed to enumerate cameras")]
    Enumerate(#[source] PlatformError),
    #[error("stream already started")]
    AlreadyStarted,
    #[error("stream not started")]
    NotStarted,
    #[error("frame cycle out of order: cannot {action} while {phase}")]
    CycleOrder {
        action: &'static str,
        phase: &'static str,
    },
    #[error("presentation error")]
    Presentation(#[source] PlatformError),
    #[error("platform error")]
    Platform(#[from] PlatformError),
}

impl Error {
    pub(crate) fn enumerate(e: impl core::error::Error + Send + Sync + 'static) -> Self {
        Self::Enumerate(PlatformError::backend(e))
    }

    pub(crate) fn platform(e: impl core::error::Error + Send + Sync + 'static) -> Self {
        Self::Platform(PlatformError::backend(e))
    }

    pub(crate) fn presentation(e: impl core::error::Error + Send + Sync + 'static) -> Self {
        Self::Presentation(PlatformError::backend(e))
    }
}

/// Why a delivered raw frame was discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum FrameError {
    #[error("unsupported pixel format {0:?}")]
    UnsupportedFormat(PixelFormat),
    #[error("expected 3 planes, got {0}")]
    MissingPlanes(usize),
    #[error("plane {0} has a zero row stride")]
    ZeroRowStride(usize),
    #[error("plane {0} has a zero pixel stride")]
    ZeroPixelStride(usize),
    #[error("source frame has no pixels")]
    EmptySource,
    #[error("output size is not known yet")]
    NoOutputSize,
}

#[cfg(test)]
mod tests {
    use core::error::Error as _;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("device busy")]
    struct Busy;

    fn chain(err: &(dyn core::error::Error + 'static)) -> Vec<String> {
        std::iter::successors(Some(err), |&e| e.source())
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn source_chain_names_each_cause_once() {
        assert_eq!(chain(&Error::platform(Busy)), ["platform error", "device busy"]);
        assert_eq!(
            chain(&Error::enumerate(Busy)),
            ["failed to enumerate cameras", "device busy"]
        );
        assert_eq!(
            chain(&Error::Presentation(PlatformError::Message("lost".into()))),
            ["presentation error", "lost"]
        );
    }

    #[test]
    fn backend_exposes_the_wrapped_cause() {
        #[derive(Debug, thiserror::Error)]
        #[error("open failed")]
        struct Open(#[source] Busy);

        let err = PlatformError::backend(Open(Busy));
        assert_eq!(err.to_string(), "open failed");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("device busy"));
    }
}
