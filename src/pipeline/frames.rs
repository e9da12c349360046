//! Interval frame extraction: decode the video stream once, writing an
//! image every `interval_seconds` of presentation time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use ffmpeg_next as ffmpeg;
use ffmpeg::{codec, frame, media};

use crate::error::{ff, EngineError, Result, Stage};
use crate::pipeline::{still, transcode};
use crate::probe;

/// Extract one frame per interval into `output_dir` as `frame_%04d.<ext>`.
/// Returns the written paths in capture order. On cancellation the files
/// written so far are deleted and `EngineError::Cancelled` is returned.
pub fn extract_frames(
    input: &Path,
    output_dir: &Path,
    interval_seconds: f64,
    format: &str,
    cancel: &AtomicBool,
) -> Result<Vec<PathBuf>> {
    if !interval_seconds.is_finite() || interval_seconds <= 0.0 {
        return Err(EngineError::InvalidParameters(format!(
            "frame interval {interval_seconds} must be positive"
        )));
    }
    let ext = match format.to_ascii_lowercase().as_str() {
        "png" => "png",
        "jpg" | "jpeg" => "jpg",
        other => {
            return Err(EngineError::InvalidParameters(format!(
                "unsupported image format '{other}' (expected png or jpg)"
            )))
        }
    };

    let mut ictx = probe::open_input(input)?;
    let stream_index = probe::find_stream(&ictx, media::Type::Video)?;
    let (time_base, fps) = {
        let ist = ictx
            .stream(stream_index)
            .ok_or_else(|| EngineError::InvalidFile("video stream vanished".into()))?;
        let fps: f64 = ist.avg_frame_rate().into();
        (f64::from(ist.time_base()), fps)
    };
    let mut decoder = {
        let ist = ictx
            .stream(stream_index)
            .ok_or_else(|| EngineError::InvalidFile("video stream vanished".into()))?;
        codec::context::Context::from_parameters(ist.parameters())
            .map_err(ff(Stage::Decode))?
            .decoder()
            .video()
            .map_err(ff(Stage::Decode))?
    };

    std::fs::create_dir_all(output_dir)
        .map_err(|e| EngineError::Io(format!("creating {}: {e}", output_dir.display())))?;

    let mut extractor = Extractor {
        output_dir,
        ext,
        time_base,
        fps,
        interval: interval_seconds,
        next_capture: 0.0,
        frame_index: 0,
        written: Vec::new(),
    };

    let mut cancelled = false;
    let mut decoded = frame::Video::empty();
    for (stream, packet) in ictx.packets() {
        if cancel.load(Ordering::Relaxed) {
            cancelled = true;
            break;
        }
        if stream.index() != stream_index {
            continue;
        }
        decoder.send_packet(&packet).map_err(ff(Stage::Decode))?;
        drain(&mut decoder, &mut decoded, &mut extractor)?;
    }
    if !cancelled {
        decoder.send_eof().map_err(ff(Stage::Decode))?;
        drain(&mut decoder, &mut decoded, &mut extractor)?;
    }

    if cancelled || cancel.load(Ordering::Relaxed) {
        for path in &extractor.written {
            let _ = std::fs::remove_file(path);
        }
        return Err(EngineError::Cancelled);
    }
    Ok(extractor.written)
}

fn drain(
    decoder: &mut ffmpeg::decoder::Video,
    decoded: &mut frame::Video,
    extractor: &mut Extractor<'_>,
) -> Result<()> {
    loop {
        match decoder.receive_frame(decoded) {
            Ok(()) => extractor.consider(decoded)?,
            Err(ref err) if transcode::decode_drained(err) => return Ok(()),
            Err(err) => return Err(ff(Stage::Decode)(err)),
        }
    }
}

struct Extractor<'a> {
    output_dir: &'a Path,
    ext: &'static str,
    time_base: f64,
    fps: f64,
    interval: f64,
    next_capture: f64,
    frame_index: u64,
    written: Vec<PathBuf>,
}

impl Extractor<'_> {
    fn consider(&mut self, decoded: &frame::Video) -> Result<()> {
        let seconds = match decoded.timestamp() {
            Some(ts) => ts as f64 * self.time_base,
            // No timestamp at all: fall back to the frame counter.
            None if self.fps > 0.0 => self.frame_index as f64 / self.fps,
            None => self.frame_index as f64,
        };
        self.frame_index += 1;
        if seconds + 1e-9 < self.next_capture {
            return Ok(());
        }
        self.next_capture += self.interval;
        let path = self
            .output_dir
            .join(format!("frame_{:04}.{}", self.written.len() + 1, self.ext));
        still::write_still(decoded, decoded.width(), decoded.height(), &path)?;
        self.written.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_interval_is_rejected() {
        let cancel = AtomicBool::new(false);
        let err = extract_frames(Path::new("in.mp4"), Path::new("/tmp/x"), 0.0, "png", &cancel)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters(_)));
    }

    #[test]
    fn cancelled_extraction_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = crate::testutil::sample_png(dir.path());
        let out_dir = dir.path().join("frames");
        let cancel = AtomicBool::new(true);
        let err = extract_frames(&input, &out_dir, 1.0, "png", &cancel).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        let leftover = std::fs::read_dir(&out_dir).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn single_image_yields_one_capture() {
        let dir = tempfile::tempdir().unwrap();
        let input = crate::testutil::sample_png(dir.path());
        let out_dir = dir.path().join("frames");
        let cancel = AtomicBool::new(false);
        let written = extract_frames(&input, &out_dir, 1.0, "png", &cancel).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].ends_with("frame_0001.png"));
        assert!(written[0].exists());
    }

    #[test]
    fn unknown_image_format_is_rejected() {
        let cancel = AtomicBool::new(false);
        let err = extract_frames(Path::new("in.mp4"), Path::new("/tmp/x"), 1.0, "tiff", &cancel)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters(_)));
    }
}
