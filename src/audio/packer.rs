//! Repacks resampled audio into frames of the exact sample count a
//! fixed-frame-size encoder requires (AAC and friends reject anything
//! else). Decoded audio arrives in arbitrary chunk sizes, so samples are
//! carried over in a per-plane byte FIFO; full frames are popped off the
//! front and the tail is zero-padded at flush time.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::frame;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::Sample;

/// Frame packer for one fixed-frame-size audio encoder.
///
/// Byte math: per-sample width comes from the target sample format; planar
/// layouts copy once per channel plane, packed layouts copy a single
/// interleaved run of `samples × width × channels` bytes.
pub struct FramePacker {
    frame_size: usize,
    format: Sample,
    layout: ChannelLayout,
    rate: u32,
    /// One FIFO per plane: `channels` planes for planar formats, one for
    /// packed.
    planes: Vec<Vec<u8>>,
    /// Bytes per sample per plane.
    stride: usize,
}

impl FramePacker {
    /// `None` when the encoder accepts arbitrary frame sizes
    /// (`frame_size == 0`) — packing is unnecessary and frames pass
    /// through the pipeline untouched.
    pub fn new(frame_size: usize, format: Sample, layout: ChannelLayout, rate: u32) -> Option<Self> {
        if frame_size == 0 {
            return None;
        }
        let channels = layout.channels().max(1) as usize;
        let (plane_count, stride) = if format.is_planar() {
            (channels, format.bytes())
        } else {
            (1, format.bytes() * channels)
        };
        Some(Self {
            frame_size,
            format,
            layout,
            rate,
            planes: vec![Vec::new(); plane_count],
            stride,
        })
    }

    /// Samples currently buffered (per channel).
    pub fn buffered(&self) -> usize {
        self.planes[0].len() / self.stride
    }

    /// Feed one resampled frame; returns every full encoder-sized frame
    /// that can be produced so far.
    ///
    /// Fallback policy: if an output frame buffer cannot be allocated, the
    /// original frame is returned unpacked rather than failing the job;
    /// callers tolerate the occasional wrong-sized frame in that case.
    pub fn pack(&mut self, frame: frame::Audio) -> Vec<frame::Audio> {
        // Fast path: an exactly-sized frame with nothing carried over
        // needs no repacking at all.
        if self.buffered() == 0 && frame.samples() == self.frame_size {
            return vec![frame];
        }

        let pre_len: Vec<usize> = self.planes.iter().map(Vec::len).collect();
        self.append(&frame);

        let mut out = Vec::new();
        while self.buffered() >= self.frame_size {
            match self.alloc_frame(self.frame_size) {
                Some(mut packed) => {
                    self.pop_into(&mut packed, self.frame_size);
                    out.push(packed);
                }
                None => {
                    // Best effort: undo the append and hand the caller the
                    // original frame so already-popped frames stay intact.
                    tracing::warn!("audio frame allocation failed; passing frame through unpacked");
                    for (plane, len) in self.planes.iter_mut().zip(&pre_len) {
                        plane.truncate(*len);
                    }
                    out.push(frame);
                    return out;
                }
            }
        }
        out
    }

    /// Zero-pad and emit whatever remains. Called once at end of stream so
    /// the final partial frame still has the exact required size.
    pub fn flush(&mut self) -> Option<frame::Audio> {
        let remaining = self.buffered();
        if remaining == 0 {
            return None;
        }
        let mut packed = self.alloc_frame(self.frame_size)?;
        self.pop_into(&mut packed, remaining);
        for plane in &mut self.planes {
            plane.clear();
        }
        Some(packed)
    }

    fn append(&mut self, frame: &frame::Audio) {
        let bytes = frame.samples() * self.stride;
        for (i, fifo) in self.planes.iter_mut().enumerate() {
            // data() may be longer than the payload because of alignment
            // padding; only the sample bytes are queued.
            fifo.extend_from_slice(&frame.data(i)[..bytes]);
        }
    }

    /// Move up to `samples` buffered samples into `packed`; anything the
    /// FIFO cannot cover stays zeroed (the frame is freshly allocated).
    fn pop_into(&mut self, packed: &mut frame::Audio, samples: usize) {
        let bytes = samples.min(self.buffered()) * self.stride;
        for (i, fifo) in self.planes.iter_mut().enumerate() {
            packed.data_mut(i)[..bytes].copy_from_slice(&fifo[..bytes]);
            fifo.drain(..bytes);
        }
    }

    /// Checked frame allocation. `frame::Audio::new` aborts on failure, so
    /// the buffer is requested through the raw API and the error observed.
    fn alloc_frame(&self, samples: usize) -> Option<frame::Audio> {
        unsafe {
            let mut frame = frame::Audio::empty();
            frame.set_format(self.format);
            frame.set_channel_layout(self.layout);
            frame.set_samples(samples);
            frame.set_rate(self.rate);
            let ret = ffmpeg::ffi::av_frame_get_buffer(frame.as_mut_ptr(), 0);
            if ret < 0 {
                return None;
            }
            // av_frame_get_buffer does not zero; padding must be silence.
            let bytes = samples * self.stride;
            for i in 0..self.planes.len() {
                frame.data_mut(i)[..bytes].fill(0);
            }
            Some(frame)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg_next::format::sample::Type as SampleType;

    const RATE: u32 = 44_100;

    fn packer(frame_size: usize, format: Sample) -> FramePacker {
        FramePacker::new(frame_size, format, ChannelLayout::STEREO, RATE).unwrap()
    }

    fn f32_frame(format: Sample, samples: usize, fill: f32) -> frame::Audio {
        let mut frame = frame::Audio::new(format, samples, ChannelLayout::STEREO);
        frame.set_rate(RATE);
        let planes = if format.is_planar() { 2 } else { 1 };
        let per_plane = if format.is_planar() { samples } else { samples * 2 };
        for p in 0..planes {
            let data = frame.data_mut(p);
            let floats = unsafe {
                std::slice::from_raw_parts_mut(data.as_mut_ptr() as *mut f32, per_plane)
            };
            floats.fill(fill);
        }
        frame
    }

    #[test]
    fn variable_frame_size_disables_packing() {
        assert!(FramePacker::new(0, Sample::F32(SampleType::Planar), ChannelLayout::STEREO, RATE)
            .is_none());
    }

    #[test]
    fn exact_frame_passes_through() {
        let mut p = packer(1024, Sample::F32(SampleType::Planar));
        let out = p.pack(f32_frame(Sample::F32(SampleType::Planar), 1024, 0.5));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].samples(), 1024);
        assert_eq!(p.buffered(), 0);
    }

    #[test]
    fn oversized_planar_frame_splits_and_carries_over() {
        let mut p = packer(1024, Sample::F32(SampleType::Planar));
        let out = p.pack(f32_frame(Sample::F32(SampleType::Planar), 1500, 1.0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].samples(), 1024);
        assert_eq!(p.buffered(), 476);

        let tail = p.flush().unwrap();
        assert_eq!(tail.samples(), 1024);
        // First 476 samples are payload, the rest is zero padding.
        let plane = tail.data(0);
        let floats =
            unsafe { std::slice::from_raw_parts(plane.as_ptr() as *const f32, 1024) };
        assert!(floats[..476].iter().all(|&s| s == 1.0));
        assert!(floats[476..].iter().all(|&s| s == 0.0));
        assert_eq!(p.buffered(), 0);
    }

    #[test]
    fn undersized_frames_accumulate_before_emitting() {
        let mut p = packer(1024, Sample::F32(SampleType::Packed));
        assert!(p
            .pack(f32_frame(Sample::F32(SampleType::Packed), 512, 0.25))
            .is_empty());
        let out = p.pack(f32_frame(Sample::F32(SampleType::Packed), 512, 0.25));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].samples(), 1024);
        assert_eq!(p.buffered(), 0);
    }

    #[test]
    fn packed_layout_interleaves_both_channels() {
        let mut p = packer(256, Sample::F32(SampleType::Packed));
        let out = p.pack(f32_frame(Sample::F32(SampleType::Packed), 256, 2.0));
        assert_eq!(out.len(), 1);
        let data = out[0].data(0);
        let floats =
            unsafe { std::slice::from_raw_parts(data.as_ptr() as *const f32, 256 * 2) };
        assert!(floats.iter().all(|&s| s == 2.0));
    }

    #[test]
    fn flush_on_empty_fifo_yields_nothing() {
        let mut p = packer(1024, Sample::F32(SampleType::Planar));
        assert!(p.flush().is_none());
    }
}
