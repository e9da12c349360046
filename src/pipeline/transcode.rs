//! The transcode pipeline.
//!
//! A single blocking state machine per job: Opening -> StreamSetup ->
//! Transcoding -> Flushing -> Finalizing. Only the first video stream and
//! the first audio stream of the input are carried; everything else is
//! dropped. Video timestamps are rescaled from the input stream time base
//! into the encoder time base, so wall-clock duration survives a frame
//! rate change; frames without a usable timestamp fall back to a counter.
//! Audio timestamps are a running sample index in 1/rate.

use std::path::PathBuf;

use ffmpeg_next as ffmpeg;
use ffmpeg::software::scaling;
use ffmpeg::{codec, decoder, encoder, format, frame, media, ChannelLayout, Dictionary, Packet, Rational, Rescale};

use crate::audio::{AudioResampler, AudioTarget, FramePacker};
use crate::error::{ff, EngineError, Result, Stage};
use crate::events::{EngineEvent, EventBus};
use crate::filter::{FilterInput, VideoFilterGraph};
use crate::hwaccel::{self, HwAccel};
use crate::ops::{OperationContext, ProgressTracker};
use crate::probe;

/// Which input streams a transcode carries into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSelection {
    /// First video stream and first audio stream.
    All,
    /// First audio stream only; video is dropped entirely.
    AudioOnly,
}

/// Runs a transcode job to completion, cancellation, or failure.
///
/// On success the output path is returned. On cancellation the partially
/// written output is deleted before `EngineError::Cancelled` is returned.
/// On failure the partial output is left on disk for inspection.
pub fn run_transcode(
    ctx: &OperationContext,
    events: &EventBus,
    selection: MediaSelection,
    progress_interval: u64,
) -> Result<PathBuf> {
    // Fail-fast validation, before any file is touched.
    ctx.options.validate()?;
    crate::ffmpeg_init()?;
    let video_codec = match selection {
        MediaSelection::AudioOnly => None,
        MediaSelection::All => Some(resolve_encoder(
            ctx.options.video_codec.as_deref(),
            codec::Id::H264,
        )?),
    };
    let audio_codec = resolve_encoder(ctx.options.audio_codec.as_deref(), codec::Id::AAC)?;
    if ctx.options.hw_accel != HwAccel::None && !hwaccel::is_available(ctx.options.hw_accel) {
        return Err(EngineError::Hardware(format!(
            "{} acceleration is not available on this machine",
            ctx.options.hw_accel
        )));
    }

    // Opening.
    let mut ictx = probe::open_input(&ctx.input)?;
    let mut octx = match ctx.options.container.as_deref() {
        Some(container) => format::output_as(&ctx.output, container),
        None => format::output(&ctx.output),
    }
    .map_err(ff(Stage::Open))?;
    let global_header = octx
        .format()
        .flags()
        .contains(format::flag::Flags::GLOBAL_HEADER);

    // StreamSetup.
    let video_in = match selection {
        MediaSelection::All => probe::find_stream(&ictx, media::Type::Video).ok(),
        MediaSelection::AudioOnly => None,
    };
    let audio_in = probe::find_stream(&ictx, media::Type::Audio).ok();
    if selection == MediaSelection::AudioOnly && audio_in.is_none() {
        return Err(EngineError::InvalidFile(
            "input has no audio stream to extract".into(),
        ));
    }
    if video_in.is_none() && audio_in.is_none() {
        return Err(EngineError::InvalidFile(
            "input has no decodable video or audio stream".into(),
        ));
    }

    let total_frames = video_in
        .map(|idx| estimate_total_frames(&ictx, idx))
        .unwrap_or(0);

    let mut video = match (video_in, video_codec) {
        (Some(idx), Some(codec)) => Some(VideoLane::new(&ictx, idx, codec, ctx, &mut octx, global_header)?),
        _ => None,
    };
    let mut audio = match audio_in {
        Some(idx) => Some(AudioLane::new(&ictx, idx, audio_codec, ctx, &mut octx, global_header)?),
        None => None,
    };

    octx.write_header().map_err(ff(Stage::Mux))?;
    if let Some(lane) = video.as_mut() {
        lane.bind_output(&octx);
    }
    if let Some(lane) = audio.as_mut() {
        lane.bind_output(&octx);
    }

    // Transcoding.
    let mut progress = ProgressTracker::new(ctx.id, total_frames, progress_interval);
    let mut reported: u64 = 0;
    let mut cancelled = false;
    for (stream, packet) in ictx.packets() {
        if ctx.is_cancelled() {
            cancelled = true;
            break;
        }
        let index = stream.index();
        if let Some(lane) = video.as_mut() {
            if index == lane.stream_index {
                lane.send_packet(&packet, &mut octx)?;
                // One decoder packet can yield zero or several frames.
                for _ in reported..lane.frames_done() {
                    if let Some(info) = progress.tick("transcoding") {
                        events.publish(EngineEvent::Progress(info));
                    }
                }
                reported = lane.frames_done();
                continue;
            }
        }
        if let Some(lane) = audio.as_mut() {
            if index == lane.stream_index {
                lane.send_packet(&packet, &mut octx)?;
            }
        }
    }

    // Flushing. Skipped on cancellation; the output is discarded anyway.
    if !cancelled {
        if let Some(lane) = video.as_mut() {
            lane.flush(&mut octx)?;
            for _ in reported..lane.frames_done() {
                let _ = progress.tick("flushing");
            }
            events.publish(EngineEvent::Progress(progress.snapshot("flushing")));
        }
        if let Some(lane) = audio.as_mut() {
            lane.flush(&mut octx)?;
        }
        octx.write_trailer().map_err(ff(Stage::Mux))?;
    }

    // Finalizing. The flag is re-checked so a cancel that lands after the
    // packet loop saw end-of-stream still wins.
    if cancelled || ctx.is_cancelled() {
        drop(octx);
        let _ = std::fs::remove_file(&ctx.output);
        return Err(EngineError::Cancelled);
    }
    Ok(ctx.output.clone())
}

fn resolve_encoder(name: Option<&str>, default: codec::Id) -> Result<ffmpeg::Codec> {
    match name {
        Some(name) => encoder::find_by_name(name).ok_or_else(|| {
            EngineError::UnsupportedFormat(format!("no encoder named '{name}'"))
        }),
        None => encoder::find(default).ok_or_else(|| {
            EngineError::UnsupportedFormat(format!("no encoder for {default:?}"))
        }),
    }
}

/// Frame count for progress reporting: the container's count when it knows
/// it, otherwise duration times frame rate, otherwise zero (indeterminate).
fn estimate_total_frames(ictx: &format::context::Input, stream_index: usize) -> u64 {
    let stream = match ictx.stream(stream_index) {
        Some(stream) => stream,
        None => return 0,
    };
    let counted = stream.frames();
    if counted > 0 {
        return counted as u64;
    }
    let fps: f64 = stream.avg_frame_rate().into();
    let duration = stream.duration() as f64 * f64::from(stream.time_base());
    if fps > 0.0 && duration > 0.0 {
        (duration * fps).round() as u64
    } else {
        0
    }
}

fn fps_to_rational(fps: f64) -> Rational {
    if (fps - fps.round()).abs() < 1e-3 {
        Rational::new(fps.round() as i32, 1)
    } else {
        // Covers the NTSC family (23.976, 29.97, 59.94).
        Rational::new((fps * 1001.0).round() as i32, 1001)
    }
}

/// Maps a decoded video timestamp into the encoder time base.
///
/// Returns `None` for a frame that lands on or before the previously
/// emitted timestamp; at a reduced output rate those frames are dropped,
/// which keeps duration intact instead of stretching it. A frame with no
/// usable timestamp continues one tick past the last emitted one.
fn map_video_pts(
    timestamp: Option<i64>,
    in_tb: Rational,
    enc_tb: Rational,
    last: Option<i64>,
) -> Option<i64> {
    let pts = match timestamp {
        Some(ts) => ts.rescale(in_tb, enc_tb),
        None => return Some(last.map_or(0, |prev| prev + 1)),
    };
    match last {
        Some(prev) if pts <= prev => None,
        _ => Some(pts),
    }
}

/// True when `receive_frame` has simply run out of frames (needs more
/// input, or end of stream) rather than hit a real decode failure.
pub(crate) fn decode_drained(err: &ffmpeg::Error) -> bool {
    matches!(
        err,
        ffmpeg::Error::Eof | ffmpeg::Error::Other { errno: libc::EAGAIN }
    )
}

struct VideoLane {
    stream_index: usize,
    ost_index: usize,
    decoder: decoder::Video,
    encoder: encoder::video::Encoder,
    filter: Option<VideoFilterGraph>,
    scaler: Option<scaling::Context>,
    out_width: u32,
    out_height: u32,
    out_format: format::Pixel,
    in_tb: Rational,
    enc_tb: Rational,
    ost_tb: Rational,
    last_pts: Option<i64>,
    frames_done: u64,
}

impl VideoLane {
    fn new(
        ictx: &format::context::Input,
        stream_index: usize,
        codec: ffmpeg::Codec,
        ctx: &OperationContext,
        octx: &mut format::context::Output,
        global_header: bool,
    ) -> Result<Self> {
        let ist = ictx
            .stream(stream_index)
            .ok_or_else(|| EngineError::InvalidFile("video stream vanished".into()))?;
        let decoder = codec::context::Context::from_parameters(ist.parameters())
            .map_err(ff(Stage::Decode))?
            .decoder()
            .video()
            .map_err(ff(Stage::Decode))?;

        let width = ctx.options.width.unwrap_or(decoder.width());
        let height = ctx.options.height.unwrap_or(decoder.height());
        let fps = ctx.options.frame_rate.unwrap_or_else(|| {
            let rate: f64 = ist.avg_frame_rate().into();
            if rate > 0.0 {
                rate
            } else {
                30.0
            }
        });
        let format = pick_pixel_format(codec, &ctx.options.pixel_format, decoder.format())?;
        let enc_tb = fps_to_rational(fps).invert();

        let mut enc = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(ff(Stage::Encode))?;
        enc.set_width(width);
        enc.set_height(height);
        enc.set_format(format);
        enc.set_time_base(enc_tb);
        enc.set_frame_rate(Some(fps_to_rational(fps)));
        if let Some(bit_rate) = ctx.options.video_bitrate {
            enc.set_bit_rate(bit_rate);
        }
        if global_header {
            enc.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        let mut opts = Dictionary::new();
        if let Some(crf) = ctx.options.crf {
            opts.set("crf", &crf.to_string());
        }
        if let Some(preset) = ctx.options.preset.as_deref() {
            opts.set("preset", preset);
        }
        let encoder = enc.open_with(opts).map_err(ff(Stage::Encode))?;

        let mut ost = octx.add_stream(codec).map_err(ff(Stage::Mux))?;
        ost.set_parameters(&encoder);
        ost.set_time_base(enc_tb);
        let ost_index = ost.index();

        let filter = match ctx.options.filters.as_deref() {
            Some(spec) if !spec.trim().is_empty() => {
                let input = FilterInput {
                    width: decoder.width(),
                    height: decoder.height(),
                    pixel_format: decoder.format(),
                    time_base: ist.time_base(),
                    frame_rate: fps_to_rational(fps),
                };
                Some(VideoFilterGraph::build(spec, input, format)?)
            }
            _ => None,
        };

        Ok(Self {
            stream_index,
            ost_index,
            decoder,
            encoder,
            filter,
            scaler: None,
            out_width: width,
            out_height: height,
            out_format: format,
            in_tb: ist.time_base(),
            enc_tb,
            ost_tb: enc_tb,
            last_pts: None,
            frames_done: 0,
        })
    }

    /// Picks up the muxer-assigned stream time base after the header write.
    fn bind_output(&mut self, octx: &format::context::Output) {
        if let Some(ost) = octx.stream(self.ost_index) {
            self.ost_tb = ost.time_base();
        }
    }

    /// Decoded frames handled so far, counting rate-dropped ones, so the
    /// progress counter tracks the input frame estimate.
    fn frames_done(&self) -> u64 {
        self.frames_done
    }

    fn send_packet(&mut self, packet: &Packet, octx: &mut format::context::Output) -> Result<()> {
        self.decoder.send_packet(packet).map_err(ff(Stage::Decode))?;
        self.drain_decoder(octx)
    }

    fn drain_decoder(&mut self, octx: &mut format::context::Output) -> Result<()> {
        let mut decoded = frame::Video::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => self.route_frame(&decoded, octx)?,
                Err(ref err) if decode_drained(err) => return Ok(()),
                Err(err) => return Err(ff(Stage::Decode)(err)),
            }
        }
    }

    fn route_frame(&mut self, decoded: &frame::Video, octx: &mut format::context::Output) -> Result<()> {
        if let Some(filter) = self.filter.as_mut() {
            filter.push(decoded)?;
        } else {
            return self.scale_and_encode(decoded, octx);
        }
        self.drain_filter(octx)
    }

    fn drain_filter(&mut self, octx: &mut format::context::Output) -> Result<()> {
        loop {
            let filtered = match self.filter.as_mut() {
                Some(filter) => filter.pull()?,
                None => None,
            };
            match filtered {
                Some(frame) => self.scale_and_encode(&frame, octx)?,
                None => return Ok(()),
            }
        }
    }

    /// Every frame passes through the scaler so the encoder always sees its
    /// configured geometry and pixel format, even when a filter resized the
    /// picture mid-graph.
    fn scale_and_encode(&mut self, input: &frame::Video, octx: &mut format::context::Output) -> Result<()> {
        let rebuild = match &self.scaler {
            Some(scaler) => {
                scaler.input().format != input.format()
                    || scaler.input().width != input.width()
                    || scaler.input().height != input.height()
            }
            None => true,
        };
        if rebuild {
            self.scaler = Some(
                scaling::Context::get(
                    input.format(),
                    input.width(),
                    input.height(),
                    self.out_format,
                    self.out_width,
                    self.out_height,
                    scaling::Flags::BILINEAR,
                )
                .map_err(ff(Stage::Filter))?,
            );
        }
        self.frames_done += 1;
        let pts = match map_video_pts(input.timestamp(), self.in_tb, self.enc_tb, self.last_pts) {
            Some(pts) => pts,
            None => return Ok(()),
        };
        let mut scaled = frame::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.run(input, &mut scaled).map_err(ff(Stage::Filter))?;
        }
        scaled.set_pts(Some(pts));
        self.last_pts = Some(pts);
        self.encoder.send_frame(&scaled).map_err(ff(Stage::Encode))?;
        self.write_packets(octx)
    }

    fn write_packets(&mut self, octx: &mut format::context::Output) -> Result<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.ost_index);
            packet.rescale_ts(self.enc_tb, self.ost_tb);
            packet.write_interleaved(octx).map_err(ff(Stage::Mux))?;
        }
        Ok(())
    }

    fn flush(&mut self, octx: &mut format::context::Output) -> Result<()> {
        self.decoder.send_eof().map_err(ff(Stage::Decode))?;
        self.drain_decoder(octx)?;
        if let Some(filter) = self.filter.as_mut() {
            filter.flush()?;
        }
        self.drain_filter(octx)?;
        self.encoder.send_eof().map_err(ff(Stage::Encode))?;
        self.write_packets(octx)
    }
}

struct AudioLane {
    stream_index: usize,
    ost_index: usize,
    decoder: decoder::Audio,
    encoder: encoder::audio::Encoder,
    resampler: AudioResampler,
    packer: Option<FramePacker>,
    enc_tb: Rational,
    ost_tb: Rational,
    next_pts: i64,
}

impl AudioLane {
    fn new(
        ictx: &format::context::Input,
        stream_index: usize,
        requested: ffmpeg::Codec,
        ctx: &OperationContext,
        octx: &mut format::context::Output,
        global_header: bool,
    ) -> Result<Self> {
        let ist = ictx
            .stream(stream_index)
            .ok_or_else(|| EngineError::InvalidFile("audio stream vanished".into()))?;
        let decoder = codec::context::Context::from_parameters(ist.parameters())
            .map_err(ff(Stage::Decode))?
            .decoder()
            .audio()
            .map_err(ff(Stage::Decode))?;

        // A requested encoder that fails to open gets exactly one fallback
        // attempt with AAC before the job is failed.
        let (codec, encoder) = match Self::open_encoder(requested, &decoder, ctx, global_header) {
            Ok(encoder) => (requested, encoder),
            Err(err) if requested.id() != codec::Id::AAC => {
                tracing::warn!(
                    codec = requested.name(),
                    error = %err,
                    "audio encoder failed to open, falling back to aac"
                );
                let aac = encoder::find(codec::Id::AAC).ok_or_else(|| {
                    EngineError::UnsupportedFormat("no aac encoder available".into())
                })?;
                (aac, Self::open_encoder(aac, &decoder, ctx, global_header)?)
            }
            Err(err) => return Err(err),
        };

        let mut ost = octx.add_stream(codec).map_err(ff(Stage::Mux))?;
        ost.set_parameters(&encoder);
        let enc_tb = Rational::new(1, encoder.rate() as i32);
        ost.set_time_base(enc_tb);
        let ost_index = ost.index();

        let target = AudioTarget {
            format: encoder.format(),
            layout: encoder.channel_layout(),
            rate: encoder.rate(),
        };
        let resampler = AudioResampler::new(&decoder, target)?;
        let packer = FramePacker::new(
            encoder.frame_size() as usize,
            encoder.format(),
            encoder.channel_layout(),
            encoder.rate(),
        );

        Ok(Self {
            stream_index,
            ost_index,
            decoder,
            encoder,
            resampler,
            packer,
            enc_tb,
            ost_tb: enc_tb,
            next_pts: 0,
        })
    }

    fn open_encoder(
        codec: ffmpeg::Codec,
        decoder: &decoder::Audio,
        ctx: &OperationContext,
        global_header: bool,
    ) -> Result<encoder::audio::Encoder> {
        let caps = codec.audio().map_err(ff(Stage::Encode))?;

        let requested_rate = ctx.options.sample_rate.unwrap_or(decoder.rate() as i32);
        let rate = match caps.rates() {
            Some(rates) => {
                let supported: Vec<i32> = rates.collect();
                if supported.contains(&requested_rate) {
                    requested_rate
                } else {
                    supported.first().copied().unwrap_or(requested_rate)
                }
            }
            None => requested_rate,
        };

        let channels = ctx
            .options
            .channels
            .map(|ch| ch as i32)
            .unwrap_or_else(|| decoder.channels() as i32);
        let layout = caps
            .channel_layouts()
            .map(|layouts| layouts.best(channels))
            .unwrap_or_else(|| ChannelLayout::default(channels));

        let format = caps
            .formats()
            .and_then(|mut formats| formats.next())
            .unwrap_or_else(|| decoder.format());

        let mut enc = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(ff(Stage::Encode))?;
        enc.set_rate(rate);
        enc.set_channel_layout(layout);
        enc.set_format(format);
        enc.set_time_base(Rational::new(1, rate));
        if let Some(bit_rate) = ctx.options.audio_bitrate {
            enc.set_bit_rate(bit_rate);
        }
        if global_header {
            enc.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        enc.open_as_with(codec, Dictionary::new())
            .map_err(ff(Stage::Encode))
    }

    fn bind_output(&mut self, octx: &format::context::Output) {
        if let Some(ost) = octx.stream(self.ost_index) {
            self.ost_tb = ost.time_base();
        }
    }

    fn send_packet(&mut self, packet: &Packet, octx: &mut format::context::Output) -> Result<()> {
        self.decoder.send_packet(packet).map_err(ff(Stage::Decode))?;
        self.drain_decoder(octx)
    }

    fn drain_decoder(&mut self, octx: &mut format::context::Output) -> Result<()> {
        let mut decoded = frame::Audio::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let converted = self.resampler.convert(&decoded)?;
                    self.pack_and_encode(converted, octx)?;
                }
                Err(ref err) if decode_drained(err) => return Ok(()),
                Err(err) => return Err(ff(Stage::Decode)(err)),
            }
        }
    }

    fn pack_and_encode(&mut self, frame: frame::Audio, octx: &mut format::context::Output) -> Result<()> {
        // Rate conversion can buffer a whole input frame and emit nothing.
        if frame.samples() == 0 {
            return Ok(());
        }
        match self.packer.as_mut() {
            Some(packer) => {
                for packed in packer.pack(frame) {
                    self.encode(packed, octx)?;
                }
                Ok(())
            }
            None => self.encode(frame, octx),
        }
    }

    fn encode(&mut self, mut frame: frame::Audio, octx: &mut format::context::Output) -> Result<()> {
        frame.set_pts(Some(self.next_pts));
        self.next_pts += frame.samples() as i64;
        self.encoder.send_frame(&frame).map_err(ff(Stage::Encode))?;
        self.write_packets(octx)
    }

    fn write_packets(&mut self, octx: &mut format::context::Output) -> Result<()> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.ost_index);
            packet.rescale_ts(self.enc_tb, self.ost_tb);
            packet.write_interleaved(octx).map_err(ff(Stage::Mux))?;
        }
        Ok(())
    }

    fn flush(&mut self, octx: &mut format::context::Output) -> Result<()> {
        self.decoder.send_eof().map_err(ff(Stage::Decode))?;
        self.drain_decoder(octx)?;
        while let Some(frame) = self.resampler.flush()? {
            self.pack_and_encode(frame, octx)?;
        }
        if let Some(tail) = self.packer.as_mut().and_then(|packer| packer.flush()) {
            self.encode(tail, octx)?;
        }
        self.encoder.send_eof().map_err(ff(Stage::Encode))?;
        self.write_packets(octx)
    }
}

fn pick_pixel_format(
    codec: ffmpeg::Codec,
    requested: &Option<String>,
    decoded: format::Pixel,
) -> Result<format::Pixel> {
    let preferred = match requested.as_deref() {
        Some(name) => name.parse::<format::Pixel>().map_err(|_| {
            EngineError::InvalidParameters(format!("unknown pixel format '{name}'"))
        })?,
        None => decoded,
    };
    let caps = codec.video().map_err(ff(Stage::Encode))?;
    match caps.formats() {
        Some(formats) => {
            let supported: Vec<format::Pixel> = formats.collect();
            if supported.contains(&preferred) {
                Ok(preferred)
            } else if requested.is_some() {
                Err(EngineError::InvalidParameters(format!(
                    "pixel format {preferred:?} is not supported by {}",
                    codec.name()
                )))
            } else {
                supported
                    .first()
                    .copied()
                    .ok_or_else(|| EngineError::EncodingFailed("encoder reports no pixel formats".into()))
            }
        }
        None => Ok(preferred),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use uuid::Uuid;

    use crate::options::ConversionOptions;
    use crate::testutil;

    fn job(input: &Path, output: &Path, cancelled: bool) -> OperationContext {
        let mut options = ConversionOptions::default();
        // Always-built native encoder, so the tests do not depend on a
        // libx264-enabled ffmpeg.
        options.video_codec = Some("mpeg4".to_string());
        OperationContext::new(
            Uuid::new_v4(),
            input.to_path_buf(),
            output.to_path_buf(),
            options,
            Arc::new(AtomicBool::new(cancelled)),
        )
    }

    #[test]
    fn rate_halving_drops_frames_but_keeps_clock() {
        // 30 fps input timestamps into a 15 fps encoder base: every other
        // frame lands on the previous tick and is dropped, so ten input
        // frames cover the same one third of a second either way.
        let in_tb = Rational::new(1, 30);
        let enc_tb = Rational::new(1, 15);
        let mut last = None;
        let mut emitted = Vec::new();
        for ts in 0..10 {
            if let Some(pts) = map_video_pts(Some(ts), in_tb, enc_tb, last) {
                last = Some(pts);
                emitted.push(pts);
            }
        }
        assert_eq!(emitted, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn matching_rates_pass_timestamps_through() {
        let tb = Rational::new(1, 25);
        assert_eq!(map_video_pts(Some(7), tb, tb, Some(6)), Some(7));
        assert_eq!(map_video_pts(Some(7), tb, tb, Some(7)), None);
    }

    #[test]
    fn missing_timestamp_continues_from_last() {
        let tb = Rational::new(1, 25);
        assert_eq!(map_video_pts(None, tb, tb, None), Some(0));
        assert_eq!(map_video_pts(None, tb, tb, Some(41)), Some(42));
    }

    #[test]
    fn drain_stops_on_starvation_not_on_errors() {
        assert!(decode_drained(&ffmpeg::Error::Eof));
        assert!(decode_drained(&ffmpeg::Error::Other { errno: libc::EAGAIN }));
        assert!(!decode_drained(&ffmpeg::Error::InvalidData));
    }

    #[test]
    fn audio_only_without_audio_stream_names_the_gap() {
        let dir = tempfile::tempdir().unwrap();
        let input = testutil::sample_png(dir.path());
        let ctx = job(&input, &dir.path().join("out.aac"), false);
        match run_transcode(&ctx, &EventBus::new(), MediaSelection::AudioOnly, 25) {
            Err(EngineError::InvalidFile(msg)) => assert!(msg.contains("no audio stream")),
            other => panic!("expected InvalidFile, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_job_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = testutil::sample_png(dir.path());
        let output = dir.path().join("out.mp4");
        let ctx = job(&input, &output, true);
        match run_transcode(&ctx, &EventBus::new(), MediaSelection::All, 25) {
            Err(EngineError::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }
        assert!(!output.exists());
    }

    #[test]
    fn single_frame_input_survives_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let input = testutil::sample_png(dir.path());
        let output = dir.path().join("out.mp4");
        let ctx = job(&input, &output, false);
        let written = run_transcode(&ctx, &EventBus::new(), MediaSelection::All, 25).unwrap();
        assert_eq!(written, output);

        let info = crate::probe::analyze(&output).unwrap();
        assert!(info.is_valid);
        let video = info.video.expect("converted file has a video stream");
        assert_eq!((video.width, video.height), (64, 48));
    }

    #[test]
    fn integer_and_ntsc_rates() {
        assert_eq!(fps_to_rational(30.0), Rational::new(30, 1));
        assert_eq!(fps_to_rational(25.0), Rational::new(25, 1));
        assert_eq!(fps_to_rational(29.97), Rational::new(30000, 1001));
    }

    #[test]
    fn unknown_encoder_name_is_rejected_before_io() {
        crate::ffmpeg_init().unwrap();
        match resolve_encoder(Some("definitely-not-a-codec"), codec::Id::H264) {
            Err(EngineError::UnsupportedFormat(_)) => {}
            Err(other) => panic!("wrong error: {other}"),
            Ok(_) => panic!("nonexistent encoder resolved"),
        }
    }

    #[test]
    fn default_video_encoder_resolves() {
        crate::ffmpeg_init().unwrap();
        match resolve_encoder(None, codec::Id::H264) {
            Ok(codec) => assert_eq!(codec.id(), codec::Id::H264),
            Err(err) => panic!("h264 encoder missing: {err}"),
        }
    }
}
