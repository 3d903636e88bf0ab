use crate::error::{Error, PlatformError};

pub mod device;
pub mod frame;
pub mod stream;

pub use device::{MacosCameraDevice, MacosCameraManager};
pub use frame::MacosFrame;
pub use stream::MacosCameraStream;

/// Run `f`, turning a raised Objective-C exception into an error.
pub(crate) fn catch_objc<R>(f: impl FnOnce() -> R + std::panic::UnwindSafe) -> Result<R, Error> {
    objc2::exception::catch(f).map_err(|exception| {
        let msg = exception
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown Objective-C exception".into());
        Error::Platform(PlatformError::Message(msg))
    })
}

pub(crate) fn platform_message(msg: impl Into<String>) -> Error {
    Error::Platform(PlatformError::Message(msg.into()))
}
