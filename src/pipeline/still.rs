//! Single-image encoding shared by thumbnailing and frame extraction.
//! One output context per image, through the image2 muxer; the codec and
//! pixel format are picked from the destination extension.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::software::scaling;
use ffmpeg::{codec, encoder, format, frame, Dictionary, Packet, Rational};

use crate::error::{ff, EngineError, Result, Stage};

fn still_codec(path: &Path) -> (codec::Id, format::Pixel) {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => (codec::Id::MJPEG, format::Pixel::YUVJ420P),
        _ => (codec::Id::PNG, format::Pixel::RGB24),
    }
}

/// Scale `src` to `width` x `height` and write it to `path` as one image.
pub(crate) fn write_still(src: &frame::Video, width: u32, height: u32, path: &Path) -> Result<()> {
    let (codec_id, pix_fmt) = still_codec(path);
    // Chroma-subsampled jpeg needs even geometry.
    let (width, height) = if pix_fmt == format::Pixel::YUVJ420P {
        (width.max(2) & !1, height.max(2) & !1)
    } else {
        (width.max(1), height.max(1))
    };
    let codec = encoder::find(codec_id).ok_or_else(|| {
        EngineError::UnsupportedFormat(format!("no encoder for {codec_id:?}"))
    })?;

    let mut scaler = scaling::Context::get(
        src.format(),
        src.width(),
        src.height(),
        pix_fmt,
        width,
        height,
        scaling::Flags::BILINEAR,
    )
    .map_err(ff(Stage::Filter))?;
    let mut scaled = frame::Video::empty();
    scaler.run(src, &mut scaled).map_err(ff(Stage::Filter))?;
    scaled.set_pts(Some(0));

    let mut octx = format::output_as(&path, "image2").map_err(ff(Stage::Open))?;
    let mut enc = codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()
        .map_err(ff(Stage::Encode))?;
    enc.set_width(width);
    enc.set_height(height);
    enc.set_format(pix_fmt);
    enc.set_time_base(Rational::new(1, 25));
    let mut opened = enc.open_with(Dictionary::new()).map_err(ff(Stage::Encode))?;
    let mut ost = octx.add_stream(codec).map_err(ff(Stage::Mux))?;
    ost.set_parameters(&opened);

    octx.write_header().map_err(ff(Stage::Mux))?;
    opened.send_frame(&scaled).map_err(ff(Stage::Encode))?;
    opened.send_eof().map_err(ff(Stage::Encode))?;
    let mut packet = Packet::empty();
    while opened.receive_packet(&mut packet).is_ok() {
        packet.set_stream(0);
        packet.write_interleaved(&mut octx).map_err(ff(Stage::Mux))?;
    }
    octx.write_trailer().map_err(ff(Stage::Mux))
}

/// Output geometry: explicit dimensions win, a lone dimension keeps the
/// source aspect ratio, nothing requested keeps the source size.
pub(crate) fn target_size(
    src_w: u32,
    src_h: u32,
    width: Option<u32>,
    height: Option<u32>,
) -> (u32, u32) {
    let (w, h) = match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, (w as u64 * src_h as u64 / src_w.max(1) as u64) as u32),
        (None, Some(h)) => ((h as u64 * src_w as u64 / src_h.max(1) as u64) as u32, h),
        (None, None) => (src_w, src_h),
    };
    (w.max(1), h.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn extension_picks_codec() {
        assert_eq!(still_codec(&PathBuf::from("a.jpg")).0, codec::Id::MJPEG);
        assert_eq!(still_codec(&PathBuf::from("a.JPEG")).0, codec::Id::MJPEG);
        assert_eq!(still_codec(&PathBuf::from("a.png")).0, codec::Id::PNG);
        assert_eq!(still_codec(&PathBuf::from("noext")).0, codec::Id::PNG);
    }

    #[test]
    fn lone_dimension_keeps_aspect() {
        assert_eq!(target_size(1920, 1080, Some(640), None), (640, 360));
        assert_eq!(target_size(1920, 1080, None, Some(540)), (960, 540));
        assert_eq!(target_size(1920, 1080, None, None), (1920, 1080));
        assert_eq!(target_size(1920, 1080, Some(100), Some(100)), (100, 100));
    }
}
