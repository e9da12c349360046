//! Sample-format/rate/layout conversion between a decoder and the target
//! encoder, wrapping libswresample. The context is owned by one job and
//! released when the pipeline's stack frame drops it.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::Sample;
use ffmpeg_next::{decoder, frame};

use crate::error::{ff, Result, Stage};

/// The sample format/rate/layout an encoder requires.
#[derive(Debug, Clone, Copy)]
pub struct AudioTarget {
    pub format: Sample,
    pub layout: ChannelLayout,
    pub rate: u32,
}

/// Safe wrapper around a configured `SwrContext`.
pub struct AudioResampler {
    ctx: resampling::Context,
    target: AudioTarget,
}

impl AudioResampler {
    /// Configure a resampler from the decoder's native output to `target`.
    pub fn new(decoder: &decoder::Audio, target: AudioTarget) -> Result<Self> {
        // Decoders for some codecs leave the layout unset; derive the
        // default layout for the channel count so swresample does not
        // misread the input.
        let src_layout = if decoder.channel_layout().is_empty() {
            ChannelLayout::default(i32::from(decoder.channels()))
        } else {
            decoder.channel_layout()
        };

        let ctx = resampling::Context::get(
            decoder.format(),
            src_layout,
            decoder.rate(),
            target.format,
            target.layout,
            target.rate,
        )
        .map_err(ff(Stage::Decode))?;

        Ok(Self { ctx, target })
    }

    /// Convert one decoded frame to the target format.
    pub fn convert(&mut self, input: &frame::Audio) -> Result<frame::Audio> {
        let mut output = frame::Audio::empty();
        self.ctx.run(input, &mut output).map_err(ff(Stage::Decode))?;
        output.set_rate(self.target.rate);
        Ok(output)
    }

    /// Drain samples swresample buffered internally (rate conversions hold
    /// a fractional tail). Returns `None` once nothing is left.
    pub fn flush(&mut self) -> Result<Option<frame::Audio>> {
        let mut output = frame::Audio::empty();
        match self.ctx.flush(&mut output) {
            Ok(_) if output.samples() > 0 => {
                output.set_rate(self.target.rate);
                Ok(Some(output))
            }
            Ok(_) => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(ff(Stage::Decode)(e)),
        }
    }
}
