use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use objc2::rc::Retained;
use objc2::runtime::AnyObject;
use objc2::runtime::ProtocolObject;
use objc2::{AllocAnyThread, DefinedClass, define_class, msg_send};
use objc2_av_foundation::{
    AVCaptureConnection, AVCaptureDevice, AVCaptureDeviceFormat, AVCaptureDeviceInput,
    AVCaptureOutput, AVCaptureSession, AVCaptureVideoDataOutput,
    AVCaptureVideoDataOutputSampleBufferDelegate,
};
use objc2_core_media::CMSampleBuffer;
use objc2_core_video::{
    CVPixelBufferLockBaseAddress, CVPixelBufferLockFlags, CVPixelBufferUnlockBaseAddress,
    kCVPixelBufferPixelFormatTypeKey,
};
use objc2_foundation::{NSDictionary, NSNumber, NSObjectProtocol, NSString};

use crate::error::Error;
use crate::frame::Frame;
use crate::platform::macos::device::{fourcc_to_pixel_format, pixel_format_to_fourcc};
use crate::platform::macos::frame::{MacosFrame, cm_time_to_duration};
use crate::platform::macos::{catch_objc, platform_message};
use crate::stream::{CameraStream, FrameProducer};
use crate::types::StreamConfig;

type SharedProducer = Arc<Mutex<Option<Box<dyn FrameProducer>>>>;

struct DelegateIvars {
    producer: SharedProducer,
}

define_class!(
    #[unsafe(super(objc2_foundation::NSObject))]
    #[ivars = DelegateIvars]
    #[name = "PassthroughSampleBufferDelegate"]
    struct SampleBufferDelegate;

    impl SampleBufferDelegate {
    }

    unsafe impl NSObjectProtocol for SampleBufferDelegate {}

    unsafe impl AVCaptureVideoDataOutputSampleBufferDelegate for SampleBufferDelegate {
        #[unsafe(method(captureOutput:didOutputSampleBuffer:fromConnection:))]
        #[allow(non_snake_case)]
        unsafe fn captureOutput_didOutputSampleBuffer_fromConnection(
            &self,
            _output: &AVCaptureOutput,
            sample_buffer: &CMSampleBuffer,
            _connection: &AVCaptureConnection,
        ) {
            let Some(pixel_buffer) = (unsafe { sample_buffer.image_buffer() }) else {
                return;
            };
            let timestamp =
                cm_time_to_duration(unsafe { sample_buffer.presentation_time_stamp() });

            let lock_flags = CVPixelBufferLockFlags::ReadOnly;
            unsafe {
                CVPixelBufferLockBaseAddress(&pixel_buffer, lock_flags);
            }

            let frame = unsafe { MacosFrame::from_locked_pixel_buffer(&pixel_buffer, timestamp) };

            forward(&self.ivars().producer, &frame);

            unsafe {
                CVPixelBufferUnlockBaseAddress(&pixel_buffer, lock_flags);
            }
        }
    }
);

/// Hand `frame` to the installed producer, if any. Returns whether one was.
fn forward(producer: &SharedProducer, frame: &dyn Frame) -> bool {
    let mut guard = producer.lock().unwrap_or_else(PoisonError::into_inner);
    match guard.as_mut() {
        Some(producer) => {
            producer.on_frame(frame);
            true
        }
        None => false,
    }
}

/// Remove the installed producer; waits for an in-flight callback to return.
fn take_producer(producer: &SharedProducer) -> Option<Box<dyn FrameProducer>> {
    producer.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl SampleBufferDelegate {
    fn new(producer: SharedProducer) -> Retained<Self> {
        let ivars = DelegateIvars { producer };
        let obj = Self::alloc().set_ivars(ivars);
        unsafe { msg_send![super(obj), init] }
    }
}

/// macOS camera stream backed by `AVCaptureSession`.
pub struct MacosCameraStream {
    session: Retained<AVCaptureSession>,
    device: Retained<AVCaptureDevice>,
    output: Retained<AVCaptureVideoDataOutput>,
    delegate: Option<Retained<SampleBufferDelegate>>,
    producer: SharedProducer,
    /// True while the device config lock is held (between open and start).
    config_locked: bool,
    running: bool,
}

impl MacosCameraStream {
    pub(crate) fn new(
        device: Retained<AVCaptureDevice>,
        config: &StreamConfig,
    ) -> Result<Self, Error> {
        let session = unsafe { AVCaptureSession::new() };

        let input = unsafe { AVCaptureDeviceInput::deviceInputWithDevice_error(&device) }
            .map_err(|e| platform_message(e.to_string()))?;

        let output = unsafe { AVCaptureVideoDataOutput::new() };

        // Tell the output to deliver frames in the requested pixel format
        // rather than its own default (which is typically UYVY).
        let target_fourcc =
            pixel_format_to_fourcc(config.pixel_format).ok_or_else(|| Error::NoMatchingStream {
                device: unsafe { device.uniqueID() }.to_string(),
                format: config.pixel_format,
            })?;
        unsafe {
            let key: &NSString = std::mem::transmute::<&objc2_core_foundation::CFString, &NSString>(
                kCVPixelBufferPixelFormatTypeKey,
            );
            let value = NSNumber::new_u32(target_fourcc);
            let settings: Retained<NSDictionary<NSString, AnyObject>> =
                NSDictionary::dictionaryWithObject_forKey(&value, ProtocolObject::from_ref(key));
            output.setVideoSettings(Some(&settings));
        }

        let formats = unsafe { device.formats() };
        let mut matched_format: Option<Retained<AVCaptureDeviceFormat>> = None;

        for format in formats.iter() {
            let desc = unsafe { format.formatDescription() };
            let sub_type = unsafe { desc.media_sub_type() };
            let dims = unsafe { objc2_core_media::CMVideoFormatDescriptionGetDimensions(&desc) };

            // '420f' is the full-range variant of the same layout
            let same_layout = fourcc_to_pixel_format(sub_type)
                .and_then(pixel_format_to_fourcc)
                == Some(target_fourcc);
            if same_layout
                && dims.width as u32 == config.size.width
                && dims.height as u32 == config.size.height
            {
                matched_format = Some(format.clone());
                break;
            }
        }

        let matched = matched_format.ok_or_else(|| Error::NoMatchingStream {
            device: unsafe { device.uniqueID() }.to_string(),
            format: config.pixel_format,
        })?;

        let frame_duration = objc2_core_media::CMTime {
            value: config.frame_rate.denominator as i64,
            timescale: config.frame_rate.numerator as i32,
            flags: objc2_core_media::CMTimeFlags(1), // kCMTimeFlags_Valid
            epoch: 0,
        };

        catch_objc(AssertUnwindSafe(|| unsafe {
            session.beginConfiguration();

            // Add input
            if !session.canAddInput(&input) {
                session.commitConfiguration();
                return Err(platform_message("cannot add input to session"));
            }
            session.addInput(&input);

            // Add output
            if !session.canAddOutput(&output) {
                session.commitConfiguration();
                return Err(platform_message("cannot add output to session"));
            }
            session.addOutput(&output);

            session.commitConfiguration();
            Ok::<(), Error>(())
        }))??;

        // the config lock is held until startRunning, otherwise the session
        // preset replaces the active format
        unsafe { device.lockForConfiguration() }.map_err(|e| platform_message(e.to_string()))?;

        catch_objc(AssertUnwindSafe(|| unsafe {
            device.setActiveFormat(&matched);
            device.setActiveVideoMinFrameDuration(frame_duration);
            device.setActiveVideoMaxFrameDuration(frame_duration);
        }))?;

        Ok(MacosCameraStream {
            session,
            device,
            output,
            delegate: None,
            producer: Arc::new(Mutex::new(None)),
            config_locked: true,
            running: false,
        })
    }
}

impl CameraStream for MacosCameraStream {
    type Error = Error;

    fn start<P: FrameProducer>(&mut self, producer: P) -> Result<(), Self::Error> {
        if self.running {
            return Err(Error::AlreadyStarted);
        }

        *self.producer.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(producer));
        let delegate = SampleBufferDelegate::new(Arc::clone(&self.producer));

        let queue = dispatch2::DispatchQueue::new(
            "passthrough-camera.frames",
            dispatch2::DispatchQueueAttr::SERIAL,
        );

        unsafe {
            self.output.setSampleBufferDelegate_queue(
                Some(ProtocolObject::from_ref(&*delegate)),
                Some(&queue),
            );
        }

        self.delegate = Some(delegate);

        if let Err(e) = catch_objc(AssertUnwindSafe(|| unsafe { self.session.startRunning() })) {
            self.detach();
            return Err(e);
        }
        self.running = true;

        if self.config_locked {
            unsafe { self.device.unlockForConfiguration() };
            self.config_locked = false;
        }

        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        if !self.running {
            return Err(Error::NotStarted);
        }

        unsafe { self.session.stopRunning() };
        self.detach();
        self.running = false;

        Ok(())
    }
}

impl MacosCameraStream {
    /// Unhook the delegate and drop the producer.
    fn detach(&mut self) {
        unsafe {
            self.output.setSampleBufferDelegate_queue(None, None);
        }
        drop(take_producer(&self.producer));
        self.delegate = None;
    }
}

impl Drop for MacosCameraStream {
    fn drop(&mut self) {
        if self.running {
            if let Err(e) = self.stop() {
                tracing::warn!(error = %e, "failed to stop capture session");
            }
        }
        if self.config_locked {
            unsafe { self.device.unlockForConfiguration() };
            self.config_locked = false;
        }
    }
}
