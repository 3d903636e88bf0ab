use crate::device::CameraDevice;
use crate::types::{PixelFormat, Size, StreamConfiguration, StreamDirection};

/// Pick the device best suited to a passthrough view.
///
/// External cameras beat back-facing ones, which beat front-facing ones,
/// which beat unknown facing; ties go to the device discovered first.
/// Devices whose characteristics cannot be read are skipped. If none could
/// be read, the first device is used. `None` only when `devices` is empty.
pub fn select_device<D: CameraDevice>(devices: &[D]) -> Option<usize> {
    tracing::info!(count = devices.len(), "found cameras");
    let mut best: Option<(usize, u8)> = None;
    for (index, device) in devices.iter().enumerate() {
        let facing = match device.facing() {
            Ok(facing) => facing,
            Err(e) => {
                tracing::warn!(camera = device.id(), error = %e, "cannot read camera characteristics");
                continue;
            }
        };
        tracing::info!(camera = device.id(), ?facing, "camera lens facing");
        let score = facing.priority();
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }

    match best {
        Some((index, _)) => Some(index),
        None if !devices.is_empty() => {
            tracing::info!(camera = devices[0].id(), "no camera reported a facing, using the first");
            Some(0)
        }
        None => None,
    }
}

/// Pick the output configuration in `format` closest to `desired` by L1
/// distance over (width, height). The earliest entry wins ties.
pub fn select_stream(
    configurations: &[StreamConfiguration],
    format: PixelFormat,
    desired: Size,
) -> Option<StreamConfiguration> {
    configurations
        .iter()
        .filter(|c| c.pixel_format == format && c.direction == StreamDirection::Output)
        .min_by_key(|c| c.size.l1_distance(desired))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::synthetic::SyntheticDevice;
    use crate::types::LensFacing;

    fn cfg(format: PixelFormat, w: u32, h: u32, direction: StreamDirection) -> StreamConfiguration {
        StreamConfiguration {
            pixel_format: format,
            size: Size::new(w, h),
            direction,
        }
    }

    #[test]
    fn external_beats_back_beats_front() {
        let devices = vec![
            SyntheticDevice::new("front", LensFacing::Front),
            SyntheticDevice::new("back", LensFacing::Back),
            SyntheticDevice::new("external", LensFacing::External),
            SyntheticDevice::new("back2", LensFacing::Back),
        ];
        assert_eq!(select_device(&devices), Some(2));
        assert_eq!(select_device(&devices[..2]), Some(1));
    }

    #[test]
    fn first_discovered_wins_ties() {
        let devices = vec![
            SyntheticDevice::new("a", LensFacing::Back),
            SyntheticDevice::new("b", LensFacing::Back),
        ];
        assert_eq!(select_device(&devices), Some(0));
    }

    #[test]
    fn front_beats_unknown() {
        let devices = vec![
            SyntheticDevice::new("unknown", LensFacing::Unknown),
            SyntheticDevice::new("front", LensFacing::Front),
        ];
        assert_eq!(select_device(&devices), Some(1));
    }

    #[test]
    fn unreadable_devices_fall_back_to_first() {
        let devices = vec![
            SyntheticDevice::new("a", LensFacing::Back).with_unreadable_characteristics(),
            SyntheticDevice::new("b", LensFacing::Back).with_unreadable_characteristics(),
        ];
        assert_eq!(select_device(&devices), Some(0));

        let mixed = vec![
            SyntheticDevice::new("a", LensFacing::External).with_unreadable_characteristics(),
            SyntheticDevice::new("b", LensFacing::Front),
        ];
        assert_eq!(select_device(&mixed), Some(1));
    }

    #[test]
    fn no_devices_selects_nothing() {
        let devices: Vec<SyntheticDevice> = Vec::new();
        assert_eq!(select_device(&devices), None);
    }

    #[test]
    fn stream_minimises_l1_distance() {
        let configs = [
            cfg(PixelFormat::Yuv420, 1920, 1080, StreamDirection::Output),
            cfg(PixelFormat::Yuv420, 1280, 960, StreamDirection::Output),
            cfg(PixelFormat::Yuv420, 640, 480, StreamDirection::Output),
            cfg(PixelFormat::Jpeg, 1024, 1024, StreamDirection::Output),
            cfg(PixelFormat::Yuv420, 1024, 1024, StreamDirection::Input),
        ];
        let chosen = select_stream(&configs, PixelFormat::Yuv420, Size::new(1024, 1024)).unwrap();
        assert_eq!(chosen.size, Size::new(1280, 960));
    }

    #[test]
    fn stream_ties_keep_first() {
        let configs = [
            cfg(PixelFormat::Yuv420, 1100, 1000, StreamDirection::Output),
            cfg(PixelFormat::Yuv420, 1000, 1100, StreamDirection::Output),
        ];
        let chosen = select_stream(&configs, PixelFormat::Yuv420, Size::new(1000, 1000)).unwrap();
        assert_eq!(chosen.size, Size::new(1100, 1000));
    }

    #[test]
    fn no_matching_format_selects_nothing() {
        let configs = [cfg(PixelFormat::Jpeg, 640, 480, StreamDirection::Output)];
        assert!(select_stream(&configs, PixelFormat::Yuv420, Size::new(640, 480)).is_none());
    }
}
