//! Runs the passthrough loop against an in-memory swapchain.
//!
//! Uses a synthetic color-bar camera by default; on macOS `--camera` uses the
//! first AVFoundation device instead. `RUST_LOG` controls the output.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use passthrough_camera::platform::synthetic::{SyntheticCameraManager, SyntheticDevice, SyntheticImage};
use passthrough_camera::{
    CameraManager, CameraPermission, CaptureConfig, Composed, CompositorConfig, CpuSwapchain,
    FrameTiming, LensFacing, Passthrough, PresentationSession, QuadConfig, QuadLayer, Size,
    TextureFormat,
};

const FRAMES: u64 = 180;
const REFRESH: Duration = Duration::from_millis(11);

/// Paces frames at a fixed refresh interval.
struct PacedSession {
    start: Instant,
    frame: u64,
}

impl PresentationSession for PacedSession {
    type Error = Infallible;

    fn wait_frame(&mut self) -> Result<FrameTiming, Infallible> {
        self.frame += 1;
        let due = self.start + REFRESH * self.frame as u32;
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        Ok(FrameTiming {
            predicted_display_time: due.duration_since(self.start) + REFRESH,
            should_render: true,
        })
    }

    fn begin_frame(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn end_frame(&mut self, _: FrameTiming, layers: &[QuadLayer]) -> Result<(), Infallible> {
        if self.frame == 1 {
            if let Some(quad) = layers.first() {
                tracing::info!(width = quad.width, height = quad.height, "quad layer");
            }
        }
        Ok(())
    }
}

fn run<M: CameraManager + 'static>(manager: M, permission: CameraPermission) {
    let swapchain = CpuSwapchain::new(TextureFormat::Bgra8Srgb, Size::new(1024, 768), 3);
    let session = PacedSession {
        start: Instant::now(),
        frame: 0,
    };
    let mut passthrough = Passthrough::new(
        manager,
        permission,
        swapchain,
        session,
        CaptureConfig::default(),
        CompositorConfig::default(),
        QuadConfig::default(),
    );

    let mut uploads = 0;
    for _ in 0..FRAMES {
        match passthrough.tick() {
            Ok(Some(Composed::Uploaded { fresh: true, .. })) => uploads += 1,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = &e as &dyn std::error::Error, "frame failed");
                break;
            }
        }
    }
    passthrough.shutdown();

    let counters = passthrough.engine().counters();
    tracing::info!(
        frames = FRAMES,
        uploads,
        converted = counters.converted(),
        discarded = counters.discarded(),
        stats = ?passthrough.engine().slot().stats(),
        "done"
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let permission = CameraPermission::new();

    #[cfg(target_os = "macos")]
    if std::env::args().any(|a| a == "--camera") {
        use passthrough_camera::platform::macos::MacosCameraManager;

        // AVFoundation prompts on first use; treat launch as consent
        permission.set_granted(true);
        run(MacosCameraManager, permission);
        return;
    }

    let device = SyntheticDevice::new("synthetic-back", LensFacing::Back);
    let feed = device.feed();
    let manager = SyntheticCameraManager::new(vec![device]);

    let done = Arc::new(AtomicBool::new(false));
    let camera = {
        let done = Arc::clone(&done);
        let permission = permission.clone();
        thread::spawn(move || {
            let mut n = 0;
            while !done.load(Ordering::Relaxed) {
                // the permission result arrives a little after launch
                if n == 10 {
                    permission.set_granted(true);
                }
                feed.push(&SyntheticImage::color_bars(Size::new(640, 480), n / 15));
                n += 1;
                thread::sleep(Duration::from_millis(33));
            }
        })
    };

    run(manager, permission);
    done.store(true, Ordering::Relaxed);
    if camera.join().is_err() {
        tracing::error!("camera thread panicked");
    }
}
