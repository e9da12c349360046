//! Opens containers and probes stream metadata. The opened input handle
//! is an RAII wrapper; whichever code path takes it is responsible for
//! nothing beyond letting it drop.

use std::collections::HashMap;
use std::ffi::CStr;
use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, media};

use crate::error::{check_input_path, ff, EngineError, Result, Stage};
use crate::probe::media_info::{AudioStreamInfo, MediaFileInfo, VideoStreamInfo};

/// Open a container for reading. Fails with `InvalidFile` before touching
/// libav when the path is missing or empty.
pub fn open_input(path: &Path) -> Result<format::context::Input> {
    check_input_path(path)?;
    crate::ffmpeg_init()?;
    format::input(&path).map_err(ff(Stage::Open))
}

/// Index of the first stream of the given kind, in container order. The
/// first stream (not the "best" one) is the representative stream by
/// contract.
pub fn find_stream(ictx: &format::context::Input, kind: media::Type) -> Result<usize> {
    ictx.streams()
        .find(|s| s.parameters().medium() == kind)
        .map(|s| s.index())
        .ok_or_else(|| EngineError::InvalidFile(format!("no {kind:?} stream in container")))
}

/// Descriptive name for a codec id, straight from the libav registry.
pub(crate) fn codec_name(id: codec::Id) -> String {
    unsafe {
        let name = ffmpeg::ffi::avcodec_get_name(id.into());
        if name.is_null() {
            "unknown".to_string()
        } else {
            CStr::from_ptr(name).to_string_lossy().into_owned()
        }
    }
}

/// Probe a file and return an immutable metadata snapshot.
pub fn analyze(path: &Path) -> Result<MediaFileInfo> {
    let ictx = open_input(path)?;

    let container_duration = if ictx.duration() > 0 {
        ictx.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
    } else {
        0.0
    };

    let mut info = MediaFileInfo {
        path: path.to_path_buf(),
        container: ictx.format().name().to_string(),
        container_long: ictx.format().description().to_string(),
        duration_seconds: container_duration,
        bit_rate: ictx.bit_rate(),
        video: None,
        audio: None,
        tags: ictx
            .metadata()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
        is_valid: false,
    };

    for stream in ictx.streams() {
        let params = stream.parameters();
        match params.medium() {
            media::Type::Video if info.video.is_none() => {
                info.video = probe_video(&stream, container_duration);
            }
            media::Type::Audio if info.audio.is_none() => {
                info.audio = probe_audio(&stream, container_duration);
            }
            _ => {}
        }
    }

    // Valid iff something in the file can actually be decoded.
    info.is_valid = info.video.is_some() || info.audio.is_some();
    Ok(info)
}

fn stream_duration(stream: &format::stream::Stream, container_duration: f64) -> f64 {
    let ts = stream.duration();
    if ts > 0 {
        ts as f64 * f64::from(stream.time_base())
    } else {
        container_duration
    }
}

fn stream_fps(stream: &format::stream::Stream) -> f64 {
    let avg = f64::from(stream.avg_frame_rate());
    if avg.is_finite() && avg > 0.0 {
        avg
    } else {
        f64::from(stream.rate())
    }
}

fn probe_video(stream: &format::stream::Stream, container_duration: f64) -> Option<VideoStreamInfo> {
    let params = stream.parameters();
    let id = params.id();
    // No registered decoder means the stream cannot be represented; the
    // validity flag stays driven by the streams we can decode.
    ffmpeg::decoder::find(id)?;

    let decoder = codec::context::Context::from_parameters(params)
        .ok()?
        .decoder()
        .video()
        .ok()?;

    let duration = stream_duration(stream, container_duration);
    let fps = stream_fps(stream);
    let total_frames = if stream.frames() > 0 {
        stream.frames() as u64
    } else {
        (duration * fps).round() as u64
    };

    Some(VideoStreamInfo {
        index: stream.index(),
        codec_name: codec_name(id),
        width: decoder.width(),
        height: decoder.height(),
        fps,
        pixel_format: decoder
            .format()
            .descriptor()
            .map(|d| d.name().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        bit_rate: decoder.bit_rate(),
        duration_seconds: duration,
        total_frames,
    })
}

fn probe_audio(stream: &format::stream::Stream, container_duration: f64) -> Option<AudioStreamInfo> {
    let params = stream.parameters();
    let id = params.id();
    ffmpeg::decoder::find(id)?;

    let decoder = codec::context::Context::from_parameters(params)
        .ok()?
        .decoder()
        .audio()
        .ok()?;

    Some(AudioStreamInfo {
        index: stream.index(),
        codec_name: codec_name(id),
        sample_rate: decoder.rate(),
        channels: decoder.channels(),
        sample_format: decoder.format().name().to_string(),
        bit_rate: decoder.bit_rate(),
        duration_seconds: stream_duration(stream, container_duration),
    })
}
