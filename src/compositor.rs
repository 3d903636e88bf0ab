//! Uploads the newest camera frame into a swapchain image, centered and
//! unscaled.

use crate::config::CompositorConfig;
use crate::diag::LogThrottle;
use crate::error::Error;
use crate::frame::{PACKED_CHANNELS, PackedFrame};
use crate::slot::FrameSource;
use crate::types::{Rect, Size, TextureFormat};

/// Where a source frame lands in a destination image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Region of the source frame that is copied.
    pub src: Rect,
    /// Region of the destination that receives it; everything outside is
    /// left untouched.
    pub dst: Rect,
}

/// Center `source` in `dest` without scaling.
///
/// Along an axis where the source is smaller the destination gets equal
/// borders on both sides; where it is larger the source is cropped around
/// its center. `None` if either size is empty.
pub fn centered_placement(source: Size, dest: Size) -> Option<Placement> {
    if source.is_empty() || dest.is_empty() {
        return None;
    }
    let width = source.width.min(dest.width);
    let height = source.height.min(dest.height);
    Some(Placement {
        src: Rect {
            x: (source.width - width) / 2,
            y: (source.height - height) / 2,
            width,
            height,
        },
        dst: Rect {
            x: (dest.width - width) / 2,
            y: (dest.height - height) / 2,
            width,
            height,
        },
    })
}

/// The swapchain the passthrough quad samples from.
///
/// Images are identified by the index `acquire` returns; each acquired
/// image must be released exactly once.
pub trait Swapchain {
    type Error: core::error::Error + Send + Sync + 'static;

    fn format(&self) -> TextureFormat;
    fn extent(&self) -> Size;
    fn image_count(&self) -> usize;

    fn acquire(&mut self) -> Result<usize, Self::Error>;
    /// Wait until the acquired image may be written.
    fn wait(&mut self, index: usize) -> Result<(), Self::Error>;
    /// Copy `placement.src` of a tightly packed `source_size` frame into
    /// `placement.dst` of image `index`.
    fn upload(
        &mut self,
        index: usize,
        pixels: &[u8],
        source_size: Size,
        placement: Placement,
    ) -> Result<(), Self::Error>;
    /// Fill image `index` with `color` (in the image's channel order).
    fn clear(&mut self, index: usize, color: [u8; 4]) -> Result<(), Self::Error>;
    fn release(&mut self, index: usize) -> Result<(), Self::Error>;
}

/// What a compose pass did to the acquired image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composed {
    /// A camera frame was uploaded; `fresh` if it arrived this cycle.
    Uploaded { index: usize, fresh: bool },
    /// No frame yet; the image was cleared to the background.
    Cleared { index: usize },
}

/// Moves camera frames into swapchain images once per display frame.
///
/// The last claimed frame is kept and uploaded again on cycles where the
/// camera produced nothing new. Frames are converted to the swapchain's
/// channel order once, when they are claimed.
#[derive(Debug)]
pub struct Compositor {
    config: CompositorConfig,
    cached: PackedFrame,
    has_cached: bool,
    upload_log: LogThrottle,
    clear_log: LogThrottle,
}

impl Compositor {
    pub fn new(config: CompositorConfig) -> Self {
        let upload_log = LogThrottle::new(config.upload_log_first, config.upload_log_every);
        let clear_log = LogThrottle::new(config.clear_log_first, 0);
        Self {
            config,
            cached: PackedFrame::default(),
            has_cached: false,
            upload_log,
            clear_log,
        }
    }

    /// The frame that will be uploaded, already in destination channel order.
    pub fn cached_frame(&self) -> Option<&PackedFrame> {
        self.has_cached.then_some(&self.cached)
    }

    /// Pull a new frame from `source` if there is one.
    fn refresh(&mut self, source: &impl FrameSource, format: TextureFormat) -> bool {
        if !source.claim_latest(&mut self.cached) {
            return false;
        }
        if self.cached.is_empty() {
            self.has_cached = false;
            return false;
        }
        if format.is_bgra() {
            self.cached.swap_red_blue();
        }
        self.has_cached = true;
        true
    }

    /// Acquire an image, fill it with the newest frame (or the background),
    /// and release it.
    ///
    /// The image is released even when writing it fails.
    pub fn compose<S: Swapchain>(
        &mut self,
        source: &impl FrameSource,
        swapchain: &mut S,
    ) -> Result<Composed, Error> {
        let index = swapchain.acquire().map_err(Error::presentation)?;
        let drawn = self.draw(source, swapchain, index);
        let released = swapchain.release(index).map_err(Error::presentation);
        let composed = drawn.map_err(Error::presentation)?;
        released?;
        Ok(composed)
    }

    fn draw<S: Swapchain>(
        &mut self,
        source: &impl FrameSource,
        swapchain: &mut S,
        index: usize,
    ) -> Result<Composed, S::Error> {
        swapchain.wait(index)?;
        let format = swapchain.format();
        let extent = swapchain.extent();
        let fresh = self.refresh(source, format);

        let placement = if self.has_cached {
            centered_placement(self.cached.size(), extent)
        } else {
            None
        };
        match placement {
            Some(placement) => {
                swapchain.upload(index, self.cached.pixels(), self.cached.size(), placement)?;
                if self.upload_log.hit() {
                    tracing::debug!(
                        upload = self.upload_log.count(),
                        src_width = self.cached.size().width,
                        src_height = self.cached.size().height,
                        dst_width = extent.width,
                        dst_height = extent.height,
                        ?format,
                        "uploaded camera frame"
                    );
                }
                Ok(Composed::Uploaded { index, fresh })
            }
            None => {
                let mut color = self.config.background;
                if format.is_bgra() {
                    color.swap(0, 2);
                }
                swapchain.clear(index, color)?;
                if self.clear_log.hit() {
                    tracing::debug!(clear = self.clear_log.count(), "no camera frame yet, cleared");
                }
                Ok(Composed::Cleared { index })
            }
        }
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(CompositorConfig::default())
    }
}

/// Error from [`CpuSwapchain`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CpuSwapchainError {
    #[error("image {0} is already acquired")]
    AlreadyAcquired(usize),
    #[error("image {0} is not acquired")]
    NotAcquired(usize),
    #[error("source buffer too small for {0}x{1}")]
    ShortSource(u32, u32),
}

/// A swapchain of in-memory RGBA/BGRA images.
///
/// Hands out images round-robin, one at a time.
#[derive(Debug, Clone)]
pub struct CpuSwapchain {
    format: TextureFormat,
    extent: Size,
    images: Vec<PackedFrame>,
    next: usize,
    acquired: Option<usize>,
    released: u64,
}

impl CpuSwapchain {
    pub fn new(format: TextureFormat, extent: Size, image_count: usize) -> Self {
        Self {
            format,
            extent,
            images: vec![PackedFrame::new(extent); image_count.max(1)],
            next: 0,
            acquired: None,
            released: 0,
        }
    }

    pub fn image(&self, index: usize) -> Option<&PackedFrame> {
        self.images.get(index)
    }

    pub fn image_mut(&mut self, index: usize) -> Option<&mut PackedFrame> {
        self.images.get_mut(index)
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired.is_some()
    }

    /// Number of completed acquire/release cycles.
    pub fn released_count(&self) -> u64 {
        self.released
    }

    fn check_acquired(&self, index: usize) -> Result<(), CpuSwapchainError> {
        if self.acquired == Some(index) {
            Ok(())
        } else {
            Err(CpuSwapchainError::NotAcquired(index))
        }
    }
}

impl Swapchain for CpuSwapchain {
    type Error = CpuSwapchainError;

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn extent(&self) -> Size {
        self.extent
    }

    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn acquire(&mut self) -> Result<usize, Self::Error> {
        if let Some(index) = self.acquired {
            return Err(CpuSwapchainError::AlreadyAcquired(index));
        }
        let index = self.next;
        self.next = (self.next + 1) % self.images.len();
        self.acquired = Some(index);
        Ok(index)
    }

    fn wait(&mut self, index: usize) -> Result<(), Self::Error> {
        self.check_acquired(index)
    }

    fn upload(
        &mut self,
        index: usize,
        pixels: &[u8],
        source_size: Size,
        placement: Placement,
    ) -> Result<(), Self::Error> {
        self.check_acquired(index)?;
        let src_stride = source_size.width as usize * PACKED_CHANNELS;
        if pixels.len() < src_stride * source_size.height as usize {
            return Err(CpuSwapchainError::ShortSource(
                source_size.width,
                source_size.height,
            ));
        }
        let image = &mut self.images[index];
        let dst_stride = image.row_stride();
        let row_bytes = placement.src.width as usize * PACKED_CHANNELS;
        let dst = image.pixels_mut();
        for row in 0..placement.src.height as usize {
            let s = (placement.src.y as usize + row) * src_stride
                + placement.src.x as usize * PACKED_CHANNELS;
            let d = (placement.dst.y as usize + row) * dst_stride
                + placement.dst.x as usize * PACKED_CHANNELS;
            dst[d..d + row_bytes].copy_from_slice(&pixels[s..s + row_bytes]);
        }
        Ok(())
    }

    fn clear(&mut self, index: usize, color: [u8; 4]) -> Result<(), Self::Error> {
        self.check_acquired(index)?;
        self.images[index].fill(color);
        Ok(())
    }

    fn release(&mut self, index: usize) -> Result<(), Self::Error> {
        self.check_acquired(index)?;
        self.acquired = None;
        self.released += 1;
        Ok(())
    }
}
