//! Static capability queries: which containers and codecs this build of
//! libav can read and write. The iteration APIs have no safe wrappers, so
//! the unsafe enumeration is isolated here; results are cached for the
//! process lifetime.

use std::ffi::CStr;
use std::os::raw::c_void;
use std::ptr;
use std::sync::OnceLock;

use ffmpeg_next::ffi;

/// One demuxer or muxer as reported by libavformat.
#[derive(Debug, Clone)]
pub struct FormatDescriptor {
    pub name: String,
    pub description: String,
    pub extensions: Vec<String>,
}

/// One encoder as reported by libavcodec.
#[derive(Debug, Clone)]
pub struct CodecDescriptor {
    pub name: String,
    pub description: String,
}

fn cstr_or_empty(ptr: *const std::os::raw::c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() }
    }
}

fn split_extensions(raw: String) -> Vec<String> {
    raw.split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Containers this build can demux.
pub fn input_formats() -> &'static [FormatDescriptor] {
    static CACHE: OnceLock<Vec<FormatDescriptor>> = OnceLock::new();
    CACHE.get_or_init(|| {
        let _ = crate::ffmpeg_init();
        let mut formats = Vec::new();
        let mut opaque: *mut c_void = ptr::null_mut();
        unsafe {
            loop {
                let fmt = ffi::av_demuxer_iterate(&mut opaque);
                if fmt.is_null() {
                    break;
                }
                formats.push(FormatDescriptor {
                    name: cstr_or_empty((*fmt).name),
                    description: cstr_or_empty((*fmt).long_name),
                    extensions: split_extensions(cstr_or_empty((*fmt).extensions)),
                });
            }
        }
        formats
    })
}

/// Containers this build can mux.
pub fn output_formats() -> &'static [FormatDescriptor] {
    static CACHE: OnceLock<Vec<FormatDescriptor>> = OnceLock::new();
    CACHE.get_or_init(|| {
        let _ = crate::ffmpeg_init();
        let mut formats = Vec::new();
        let mut opaque: *mut c_void = ptr::null_mut();
        unsafe {
            loop {
                let fmt = ffi::av_muxer_iterate(&mut opaque);
                if fmt.is_null() {
                    break;
                }
                formats.push(FormatDescriptor {
                    name: cstr_or_empty((*fmt).name),
                    description: cstr_or_empty((*fmt).long_name),
                    extensions: split_extensions(cstr_or_empty((*fmt).extensions)),
                });
            }
        }
        formats
    })
}

fn encoders_of(kind: ffi::AVMediaType) -> Vec<CodecDescriptor> {
    let _ = crate::ffmpeg_init();
    let mut codecs = Vec::new();
    let mut opaque: *mut c_void = ptr::null_mut();
    unsafe {
        loop {
            let codec = ffi::av_codec_iterate(&mut opaque);
            if codec.is_null() {
                break;
            }
            if (*codec).type_ == kind && ffi::av_codec_is_encoder(codec) != 0 {
                codecs.push(CodecDescriptor {
                    name: cstr_or_empty((*codec).name),
                    description: cstr_or_empty((*codec).long_name),
                });
            }
        }
    }
    codecs
}

/// Video encoders available in this build.
pub fn video_encoders() -> &'static [CodecDescriptor] {
    static CACHE: OnceLock<Vec<CodecDescriptor>> = OnceLock::new();
    CACHE.get_or_init(|| encoders_of(ffi::AVMediaType::AVMEDIA_TYPE_VIDEO))
}

/// Audio encoders available in this build.
pub fn audio_encoders() -> &'static [CodecDescriptor] {
    static CACHE: OnceLock<Vec<CodecDescriptor>> = OnceLock::new();
    CACHE.get_or_init(|| encoders_of(ffi::AVMediaType::AVMEDIA_TYPE_AUDIO))
}

fn lib_version(v: u32) -> String {
    format!("{}.{}.{}", v >> 16, (v >> 8) & 0xff, v & 0xff)
}

/// Free-form version string for the underlying libraries.
pub fn version() -> String {
    unsafe {
        format!(
            "lavf {} / lavc {} / lavu {}",
            lib_version(ffi::avformat_version()),
            lib_version(ffi::avcodec_version()),
            lib_version(ffi::avutil_version()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_containers_are_listed() {
        let inputs = input_formats();
        assert!(!inputs.is_empty());
        assert!(inputs.iter().any(|f| f.name.contains("mp4")));

        let outputs = output_formats();
        assert!(outputs.iter().any(|f| f.name == "mp4"));
    }

    #[test]
    fn baseline_encoders_are_listed() {
        assert!(audio_encoders().iter().any(|c| c.name == "aac"));
        assert!(!video_encoders().is_empty());
    }

    #[test]
    fn version_string_has_all_three_libs() {
        let v = version();
        assert!(v.contains("lavf"));
        assert!(v.contains("lavc"));
        assert!(v.contains("lavu"));
    }

    #[test]
    fn queries_are_cached() {
        assert_eq!(input_formats().as_ptr(), input_formats().as_ptr());
    }
}
