//! Enumerates the hardware acceleration device types libav was built with.
//! Detection runs once per process and is cached; the engine treats the
//! result as read-only afterwards. The libav iteration API has no safe
//! wrapper, so the unsafe call is isolated here.

use std::sync::OnceLock;

use ffmpeg_next::ffi::{av_hwdevice_iterate_types, AVHWDeviceType};

/// Accelerator kinds the engine knows how to name. `None` (pure software)
/// is always available and always listed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwAccel {
    None,
    Cuda,
    Vaapi,
    Dxva2,
    D3d11va,
    Qsv,
    VideoToolbox,
    Vulkan,
}

impl HwAccel {
    /// Stable lowercase label for logs and UI display.
    pub fn label(&self) -> &'static str {
        match self {
            HwAccel::None => "none",
            HwAccel::Cuda => "cuda",
            HwAccel::Vaapi => "vaapi",
            HwAccel::Dxva2 => "dxva2",
            HwAccel::D3d11va => "d3d11va",
            HwAccel::Qsv => "qsv",
            HwAccel::VideoToolbox => "videotoolbox",
            HwAccel::Vulkan => "vulkan",
        }
    }

    fn from_device_type(kind: AVHWDeviceType) -> Option<Self> {
        // Unlisted device types (DRM, OpenCL, MediaCodec, ...) are skipped:
        // the engine has no decode path for them.
        match kind {
            AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA => Some(HwAccel::Cuda),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI => Some(HwAccel::Vaapi),
            AVHWDeviceType::AV_HWDEVICE_TYPE_DXVA2 => Some(HwAccel::Dxva2),
            AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA => Some(HwAccel::D3d11va),
            AVHWDeviceType::AV_HWDEVICE_TYPE_QSV => Some(HwAccel::Qsv),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX => Some(HwAccel::VideoToolbox),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VULKAN => Some(HwAccel::Vulkan),
            _ => None,
        }
    }
}

impl std::fmt::Display for HwAccel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

static DETECTED: OnceLock<Vec<HwAccel>> = OnceLock::new();

/// All accelerators available in this process, software first. Cached for
/// the process lifetime; there is no re-detection.
pub fn detect() -> &'static [HwAccel] {
    DETECTED.get_or_init(|| {
        let mut found = vec![HwAccel::None];
        let mut kind = AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;
        loop {
            kind = unsafe { av_hwdevice_iterate_types(kind) };
            if kind == AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
                break;
            }
            if let Some(accel) = HwAccel::from_device_type(kind) {
                if !found.contains(&accel) {
                    found.push(accel);
                }
            }
        }
        if found.len() == 1 {
            tracing::warn!("no hardware accelerators detected; running software-only");
        } else {
            tracing::debug!(?found, "hardware accelerators detected");
        }
        found
    })
}

/// Whether the given accelerator was detected at startup.
pub fn is_available(accel: HwAccel) -> bool {
    detect().contains(&accel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_entry_is_always_first() {
        let accels = detect();
        assert_eq!(accels.first(), Some(&HwAccel::None));
    }

    #[test]
    fn detection_is_cached() {
        let a = detect().as_ptr();
        let b = detect().as_ptr();
        assert_eq!(a, b);
    }

    #[test]
    fn software_is_always_available() {
        assert!(is_available(HwAccel::None));
    }

    #[test]
    fn labels_are_lowercase_and_stable() {
        assert_eq!(HwAccel::VideoToolbox.label(), "videotoolbox");
        assert_eq!(HwAccel::None.to_string(), "none");
    }
}
