use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide camera permission, written by the platform permission
/// callback and polled by the render loop. Starts out not granted.
#[derive(Debug, Clone, Default)]
pub struct CameraPermission {
    granted: Arc<AtomicBool>,
}

impl CameraPermission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry point for the platform's permission result.
    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::Release);
        tracing::info!(granted, "camera permission result");
    }

    pub fn is_granted(&self) -> bool {
        self.granted.load(Ordering::Acquire)
    }
}
