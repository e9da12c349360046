//! Closed error taxonomy for the engine, plus the translator that maps
//! libav error codes onto it. Every fallible operation in this crate
//! returns `Result<T, EngineError>`; nothing leaks raw FFmpeg errors.

use std::path::PathBuf;

use ffmpeg_next as ffmpeg;

/// Alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Exhaustive error classification. Every libav error code maps to exactly
/// one member; codes with no mapping become `Unknown` and are logged with
/// the original code for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid or unreadable file: {0}")]
    InvalidFile(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    #[error("decoding failed: {0}")]
    DecodingFailed(String),
    #[error("encoding failed: {0}")]
    EncodingFailed(String),
    #[error("filtering failed: {0}")]
    FilteringFailed(String),
    #[error("allocation failed: {0}")]
    AllocationFailed(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("hardware acceleration error: {0}")]
    Hardware(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation timed out")]
    Timeout,
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl EngineError {
    /// Error for a path that does not exist or is empty, raised before any
    /// libav resource is touched.
    pub fn missing_file(path: &std::path::Path) -> Self {
        EngineError::InvalidFile(format!("no such file: {}", path.display()))
    }
}

/// Pipeline stage in which a libav error occurred. The same code means
/// different things in different stages (EOF while opening is a broken
/// file; EOF while decoding is normal drain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Open,
    Decode,
    Encode,
    Filter,
    Mux,
}

impl Stage {
    fn wrap(self, detail: String) -> EngineError {
        match self {
            Stage::Open => EngineError::InvalidFile(detail),
            Stage::Decode => EngineError::DecodingFailed(detail),
            Stage::Encode => EngineError::EncodingFailed(detail),
            Stage::Filter => EngineError::FilteringFailed(detail),
            Stage::Mux => EngineError::EncodingFailed(detail),
        }
    }
}

/// Map a libav error to the engine taxonomy, given the stage it came from.
/// The libav detail string rides along so user-visible messages keep the
/// native diagnosis.
pub fn translate(err: ffmpeg::Error, stage: Stage) -> EngineError {
    use ffmpeg::Error as E;

    let detail = err.to_string();
    match err {
        E::DecoderNotFound | E::DemuxerNotFound | E::BsfNotFound => {
            EngineError::UnsupportedFormat(detail)
        }
        E::EncoderNotFound | E::MuxerNotFound | E::ProtocolNotFound => {
            EngineError::UnsupportedFormat(detail)
        }
        E::StreamNotFound => EngineError::InvalidFile(detail),
        E::FilterNotFound => EngineError::FilteringFailed(detail),
        E::OptionNotFound => EngineError::InvalidParameters(detail),
        E::InvalidData => match stage {
            Stage::Open => EngineError::InvalidFile(detail),
            _ => stage.wrap(detail),
        },
        E::InputChanged | E::OutputChanged => stage.wrap(detail),
        E::BufferTooSmall => EngineError::AllocationFailed(detail),
        E::Experimental => EngineError::UnsupportedFormat(detail),
        E::Eof => stage.wrap(format!("unexpected end of stream: {detail}")),
        E::Other { errno } => translate_errno(errno, detail, stage),
        E::Bug | E::Bug2 | E::PatchWelcome | E::Unknown | E::External | E::Exit => {
            tracing::warn!(code = ?err, %detail, "unmapped libav error");
            EngineError::Unknown(detail)
        }
        _ => {
            tracing::warn!(code = ?err, %detail, "unmapped libav error");
            EngineError::Unknown(detail)
        }
    }
}

fn translate_errno(errno: libc::c_int, detail: String, stage: Stage) -> EngineError {
    match errno {
        libc::ENOMEM => EngineError::AllocationFailed(detail),
        libc::ENOENT | libc::EACCES | libc::EIO | libc::EPIPE | libc::ENOSPC => {
            EngineError::Io(detail)
        }
        libc::EINVAL => EngineError::InvalidParameters(detail),
        libc::EAGAIN => stage.wrap(format!("resource temporarily unavailable: {detail}")),
        _ => {
            tracing::warn!(errno, %detail, "unmapped errno from libav");
            EngineError::Unknown(detail)
        }
    }
}

/// Shorthand for `.map_err(|e| translate(e, stage))` call sites.
pub(crate) fn ff(stage: Stage) -> impl Fn(ffmpeg::Error) -> EngineError {
    move |e| translate(e, stage)
}

/// Report whether the given path exists and is a regular file; used by the
/// fail-fast checks that run before any native resource is allocated.
pub(crate) fn check_input_path(path: &std::path::Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() || !path.is_file() {
        return Err(EngineError::missing_file(path));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffmpeg_next::Error as FfError;

    #[test]
    fn decoder_not_found_is_unsupported_format() {
        let err = translate(FfError::DecoderNotFound, Stage::Open);
        assert!(matches!(err, EngineError::UnsupportedFormat(_)));
    }

    #[test]
    fn invalid_data_maps_by_stage() {
        assert!(matches!(
            translate(FfError::InvalidData, Stage::Open),
            EngineError::InvalidFile(_)
        ));
        assert!(matches!(
            translate(FfError::InvalidData, Stage::Decode),
            EngineError::DecodingFailed(_)
        ));
        assert!(matches!(
            translate(FfError::InvalidData, Stage::Encode),
            EngineError::EncodingFailed(_)
        ));
    }

    #[test]
    fn enomem_is_allocation_failure() {
        let err = translate(FfError::Other { errno: libc::ENOMEM }, Stage::Decode);
        assert!(matches!(err, EngineError::AllocationFailed(_)));
    }

    #[test]
    fn io_errnos_map_to_io() {
        for errno in [libc::ENOENT, libc::EACCES, libc::EIO, libc::ENOSPC] {
            let err = translate(FfError::Other { errno }, Stage::Mux);
            assert!(matches!(err, EngineError::Io(_)), "errno {errno}");
        }
    }

    #[test]
    fn unmapped_code_becomes_unknown() {
        let err = translate(FfError::Bug, Stage::Filter);
        assert!(matches!(err, EngineError::Unknown(_)));
    }

    #[test]
    fn missing_path_fails_before_libav() {
        let err = check_input_path(std::path::Path::new("/definitely/not/here.mp4"));
        assert!(matches!(err, Err(EngineError::InvalidFile(_))));
    }

    #[test]
    fn display_is_human_readable() {
        let msg = EngineError::UnsupportedFormat("no decoder for av9".into()).to_string();
        assert!(msg.contains("unsupported format"));
        assert!(msg.contains("av9"));
    }
}
