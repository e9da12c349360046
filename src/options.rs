//! Conversion options: the user-requested transform for one job.
//! Validated synchronously at submission, before any libav resource is
//! allocated, so bad requests fail fast and cheaply.

use crate::error::{EngineError, Result};
use crate::hwaccel::HwAccel;

/// Requested output parameters for a transcode job. Every field except the
/// hardware preference is optional; `None` means "keep the source value"
/// (or the engine default where the source has none).
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    /// Encoder name, e.g. "libx264", "hevc", "vp9". Default H.264.
    pub video_codec: Option<String>,
    /// Encoder name, e.g. "aac", "libopus". Default AAC.
    pub audio_codec: Option<String>,
    /// Video bitrate in bits per second.
    pub video_bitrate: Option<usize>,
    /// Audio bitrate in bits per second.
    pub audio_bitrate: Option<usize>,
    /// Output width/height in pixels. Both or neither.
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Output frame rate.
    pub frame_rate: Option<f64>,
    /// Output pixel format name, e.g. "yuv420p". Must be supported by the
    /// chosen encoder; unset picks from the encoder's supported list.
    pub pixel_format: Option<String>,
    /// x264/x265-style speed preset, e.g. "fast".
    pub preset: Option<String>,
    /// Constant rate factor, 0..=51.
    pub crf: Option<u32>,
    /// Output audio sample rate in Hz.
    pub sample_rate: Option<i32>,
    /// Output channel count.
    pub channels: Option<u16>,
    /// Container short name, e.g. "mp4", "matroska". Unset guesses from
    /// the output file extension.
    pub container: Option<String>,
    /// Hardware accelerator preference. `HwAccel::None` is software.
    pub hw_accel: HwAccel,
    /// Custom video filter expression, e.g. "hue=s=0,hflip". Empty means
    /// no filter graph is built.
    pub filters: Option<String>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            video_codec: None,
            audio_codec: None,
            video_bitrate: None,
            audio_bitrate: None,
            width: None,
            height: None,
            frame_rate: None,
            pixel_format: None,
            preset: None,
            crf: None,
            sample_rate: None,
            channels: None,
            container: None,
            hw_accel: HwAccel::None,
            filters: None,
        }
    }
}

impl ConversionOptions {
    /// Sanity-check the request. This is the cheap, libav-free half of
    /// validation; encoder-name resolution happens in the pipeline right
    /// after (still before any file I/O).
    pub fn validate(&self) -> Result<()> {
        match (self.width, self.height) {
            (Some(0), _) | (_, Some(0)) => {
                return Err(EngineError::InvalidParameters(
                    "output dimensions must be non-zero".into(),
                ));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(EngineError::InvalidParameters(
                    "width and height must be set together".into(),
                ));
            }
            _ => {}
        }
        if let Some(fps) = self.frame_rate {
            if !fps.is_finite() || fps <= 0.0 {
                return Err(EngineError::InvalidParameters(format!(
                    "invalid frame rate: {fps}"
                )));
            }
        }
        if let Some(crf) = self.crf {
            if crf > 51 {
                return Err(EngineError::InvalidParameters(format!(
                    "CRF out of range (0..=51): {crf}"
                )));
            }
        }
        if let Some(rate) = self.sample_rate {
            if rate <= 0 {
                return Err(EngineError::InvalidParameters(format!(
                    "invalid sample rate: {rate}"
                )));
            }
        }
        if self.channels == Some(0) {
            return Err(EngineError::InvalidParameters(
                "channel count must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        assert!(ConversionOptions::default().validate().is_ok());
    }

    #[test]
    fn zero_dimensions_rejected() {
        let opts = ConversionOptions {
            width: Some(0),
            height: Some(480),
            ..Default::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(EngineError::InvalidParameters(_))
        ));
    }

    #[test]
    fn lone_width_rejected() {
        let opts = ConversionOptions {
            width: Some(640),
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn crf_range_enforced() {
        let opts = ConversionOptions {
            crf: Some(52),
            ..Default::default()
        };
        assert!(opts.validate().is_err());
        let opts = ConversionOptions {
            crf: Some(51),
            ..Default::default()
        };
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn negative_frame_rate_rejected() {
        let opts = ConversionOptions {
            frame_rate: Some(-24.0),
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }
}
