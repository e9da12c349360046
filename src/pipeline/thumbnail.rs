//! Thumbnail generation: seek near the requested time, decode one frame,
//! scale it, write a single image.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use ffmpeg_next as ffmpeg;
use ffmpeg::{codec, frame, media};

use crate::error::{ff, EngineError, Result, Stage};
use crate::pipeline::still;
use crate::probe;

/// Grab the frame nearest `time_seconds` and write it to `output`.
///
/// The seek is backward-biased, so it lands on the keyframe at or before
/// the target; a time past the end of the file clamps to the duration and
/// still yields the last reachable keyframe instead of failing.
pub fn generate_thumbnail(
    input: &Path,
    output: &Path,
    time_seconds: f64,
    width: Option<u32>,
    height: Option<u32>,
    cancel: &AtomicBool,
) -> Result<PathBuf> {
    if !time_seconds.is_finite() || time_seconds < 0.0 {
        return Err(EngineError::InvalidParameters(format!(
            "thumbnail time {time_seconds} is not a valid position"
        )));
    }

    let mut ictx = probe::open_input(input)?;
    let stream_index = probe::find_stream(&ictx, media::Type::Video)?;

    let mut target = (time_seconds * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
    let duration = ictx.duration();
    if duration > 0 {
        target = target.min(duration);
    }
    // Broken indexes make the seek itself fail; decoding from the start
    // still produces a usable frame, so the error is not fatal.
    if ictx.seek(target, ..target).is_err() {
        tracing::debug!(?input, time_seconds, "seek failed, decoding from start");
    }

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

    let mut decoded = frame::Video::empty();
    let mut got_frame = false;
    for (stream, packet) in ictx.packets() {
        if cancel.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled);
        }
        if stream.index() != stream_index {
            continue;
        }
        decoder.send_packet(&packet).map_err(ff(Stage::Decode))?;
        if decoder.receive_frame(&mut decoded).is_ok() {
            got_frame = true;
            break;
        }
    }
    if !got_frame {
        decoder.send_eof().map_err(ff(Stage::Decode))?;
        got_frame = decoder.receive_frame(&mut decoded).is_ok();
    }
    if !got_frame {
        return Err(EngineError::DecodingFailed(
            "no decodable frame at or before the requested time".into(),
        ));
    }

    let (w, h) = still::target_size(decoded.width(), decoded.height(), width, height);
    still::write_still(&decoded, w, h, output)?;
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn negative_time_is_rejected() {
        let cancel = AtomicBool::new(false);
        let err = generate_thumbnail(
            Path::new("in.mp4"),
            Path::new("out.png"),
            -1.0,
            None,
            None,
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameters(_)));
    }

    #[test]
    fn time_past_the_end_still_yields_a_frame() {
        let dir = tempfile::tempdir().unwrap();
        let input = crate::testutil::sample_png(dir.path());
        let output = dir.path().join("thumb.png");
        let cancel = AtomicBool::new(false);
        let written =
            generate_thumbnail(&input, &output, 120.0, Some(32), None, &cancel).unwrap();
        assert_eq!(written, output);
        assert!(std::fs::metadata(&output).unwrap().len() > 0);
    }

    #[test]
    fn junk_input_is_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let junk = dir.path().join("junk.mp4");
        let mut f = std::fs::File::create(&junk).unwrap();
        f.write_all(b"this is not a movie").unwrap();
        let cancel = AtomicBool::new(false);
        let err = generate_thumbnail(
            &junk,
            &dir.path().join("out.png"),
            0.0,
            None,
            None,
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidFile(_)));
    }
}
