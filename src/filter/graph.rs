//! Builds and drives a named video filter chain: buffer source → user
//! filters → buffer sink. Pulling is non-blocking from the caller's point
//! of view; "no frame available yet" is a normal outcome while the graph
//! buffers, distinct from a genuine filtering failure.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::format::Pixel;
use ffmpeg_next::util::rational::Rational;
use ffmpeg_next::{filter, frame};

use crate::error::{EngineError, Result};

/// Geometry and timing of the frames entering the graph.
#[derive(Debug, Clone, Copy)]
pub struct FilterInput {
    pub width: u32,
    pub height: u32,
    pub pixel_format: Pixel,
    pub time_base: Rational,
    pub frame_rate: Rational,
}

/// A configured filter graph owned by one job.
pub struct VideoFilterGraph {
    graph: filter::Graph,
}

impl VideoFilterGraph {
    /// Parse `spec` (an FFmpeg filter expression such as "hue=s=0,hflip")
    /// between a buffer source matching the input and a sink constrained
    /// to `out_format`. An empty spec becomes the no-op "null" filter.
    pub fn build(spec: &str, input: FilterInput, out_format: Pixel) -> Result<Self> {
        let spec = if spec.trim().is_empty() { "null" } else { spec };
        Self::build_inner(spec, input, out_format)
            .map_err(|e| EngineError::FilteringFailed(format!("filter '{spec}': {e}")))
    }

    fn build_inner(
        spec: &str,
        input: FilterInput,
        out_format: Pixel,
    ) -> std::result::Result<Self, ffmpeg::Error> {
        let mut graph = filter::Graph::new();

        let pix_fmt = input
            .pixel_format
            .descriptor()
            .map(|d| d.name())
            .unwrap_or("yuv420p");
        let args = format!(
            "video_size={}x{}:pix_fmt={}:time_base={}:pixel_aspect=1/1:frame_rate={}",
            input.width, input.height, pix_fmt, input.time_base, input.frame_rate,
        );

        let buffer = filter::find("buffer").ok_or(ffmpeg::Error::FilterNotFound)?;
        let buffersink = filter::find("buffersink").ok_or(ffmpeg::Error::FilterNotFound)?;

        graph.add(&buffer, "in", &args)?;
        graph.add(&buffersink, "out", "")?;

        {
            let mut out = graph.get("out").expect("buffersink was just added");
            out.set_pixel_format(out_format);
        }

        graph.output("in", 0)?.input("out", 0)?.parse(spec)?;
        graph.validate()?;

        Ok(Self { graph })
    }

    /// Feed one decoded frame into the source.
    pub fn push(&mut self, frame: &frame::Video) -> Result<()> {
        self.graph
            .get("in")
            .expect("graph has a source")
            .source()
            .add(frame)
            .map_err(|e| EngineError::FilteringFailed(format!("push frame: {e}")))
    }

    /// Signal end of input so buffered frames drain on subsequent pulls.
    pub fn flush(&mut self) -> Result<()> {
        self.graph
            .get("in")
            .expect("graph has a source")
            .source()
            .flush()
            .map_err(|e| EngineError::FilteringFailed(format!("flush source: {e}")))
    }

    /// Pull the next filtered frame. `Ok(None)` means the graph needs more
    /// input (or is fully drained) — not an error.
    pub fn pull(&mut self) -> Result<Option<frame::Video>> {
        let mut filtered = frame::Video::empty();
        let mut sink_ctx = self.graph.get("out").expect("graph has a sink");
        match sink_ctx.sink().frame(&mut filtered) {
            Ok(()) => Ok(Some(filtered)),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(ffmpeg::Error::Other { errno: libc::EAGAIN }) => Ok(None),
            Err(e) => Err(EngineError::FilteringFailed(format!("pull frame: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_640x480() -> FilterInput {
        FilterInput {
            width: 640,
            height: 480,
            pixel_format: Pixel::YUV420P,
            time_base: Rational::new(1, 30),
            frame_rate: Rational::new(30, 1),
        }
    }

    #[test]
    fn empty_spec_builds_null_graph() {
        crate::ffmpeg_init().unwrap();
        assert!(VideoFilterGraph::build("", input_640x480(), Pixel::YUV420P).is_ok());
    }

    #[test]
    fn real_filter_chain_builds() {
        crate::ffmpeg_init().unwrap();
        assert!(VideoFilterGraph::build("hflip,hue=s=0", input_640x480(), Pixel::YUV420P).is_ok());
    }

    #[test]
    fn garbage_spec_is_filtering_failure() {
        crate::ffmpeg_init().unwrap();
        let err = VideoFilterGraph::build("nonsense=???", input_640x480(), Pixel::YUV420P)
            .err().unwrap();
        assert!(matches!(err, EngineError::FilteringFailed(_)));
    }

    #[test]
    fn null_graph_passes_frames_through() {
        crate::ffmpeg_init().unwrap();
        let mut graph = VideoFilterGraph::build("", input_640x480(), Pixel::YUV420P).unwrap();

        let mut frame = frame::Video::new(Pixel::YUV420P, 640, 480);
        frame.set_pts(Some(0));
        graph.push(&frame).unwrap();

        let out = graph.pull().unwrap().expect("null filter forwards immediately");
        assert_eq!(out.width(), 640);
        assert_eq!(out.height(), 480);
    }

    #[test]
    fn pull_without_input_reports_no_frame() {
        crate::ffmpeg_init().unwrap();
        let mut graph = VideoFilterGraph::build("", input_640x480(), Pixel::YUV420P).unwrap();
        assert!(graph.pull().unwrap().is_none());
    }
}
