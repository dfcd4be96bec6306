// crates/edl2ffmpeg-core/src/error.rs
//
// Error taxonomy for the render pipeline. Each variant matches one of the
// kinds the design assigns a distinct failure mode and exit code: ConfigError
// and SourceError surface before any output byte is written, AllocationError/
// ConvertError/EncodeError are fatal mid-render, Cancelled is cooperative.
//
// `edl2ffmpeg-media` converts `ffmpeg_the_third::Error` into `Source`/
// `Convert`/`Encode` variants at the point it's caught (carrying the
// formatted message through, since this crate has no `ffmpeg` dependency to
// reference the source error's concrete type), so the CLI can match on
// `exit_code()` without parsing messages.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EdlError {
    /// Invalid or out-of-bounds EDL values: negative durations, overlapping
    /// clips on the same track, unknown effect type, malformed JSON.
    #[error("config error at {path}: {message}")]
    Config { path: String, message: String },

    /// File not found, unsupported codec, stream not present, seek out of
    /// range, or too many consecutive decode failures for one source.
    #[error("source error for '{uri}': {message}")]
    Source { uri: String, message: String },

    /// Frame allocation failed — fatal to the render.
    #[error("allocation error: {message}")]
    Allocation { message: String },

    /// Scaler initialization or per-frame pixel conversion failed.
    #[error("convert error: {message}")]
    Convert { message: String },

    /// Encoder rejection or I/O failure while writing the output container.
    #[error("encode error: {message}")]
    Encode { message: String },

    /// Cooperative cancellation was requested.
    #[error("render cancelled")]
    Cancelled,
}

impl EdlError {
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        EdlError::Config { path: path.into(), message: message.into() }
    }

    pub fn source(uri: impl Into<String>, message: impl Into<String>) -> Self {
        EdlError::Source { uri: uri.into(), message: message.into() }
    }

    pub fn allocation(message: impl Into<String>) -> Self {
        EdlError::Allocation { message: message.into() }
    }

    pub fn convert(message: impl Into<String>) -> Self {
        EdlError::Convert { message: message.into() }
    }

    pub fn encode(message: impl Into<String>) -> Self {
        EdlError::Encode { message: message.into() }
    }

    /// CLI process exit code per the `edl2ffmpeg` contract: 0 success (not an
    /// error path), 1 parse/validation, 2 source open failure, 3 encode
    /// failure (also covers allocation/convert — all mid-render and fatal).
    pub fn exit_code(&self) -> i32 {
        match self {
            EdlError::Config { .. } => 1,
            EdlError::Source { .. } => 2,
            EdlError::Allocation { .. } | EdlError::Convert { .. } | EdlError::Encode { .. } => 3,
            EdlError::Cancelled => 130,
        }
    }

    /// A single-line diagnostic naming the kind and the offending clip index
    /// or URI, per the user-visible error contract.
    pub fn diagnostic(&self) -> String {
        match self {
            EdlError::Config { path, message } => format!("ConfigError at {path}: {message}"),
            EdlError::Source { uri, message } => format!("SourceError for '{uri}': {message}"),
            EdlError::Allocation { message } => format!("AllocationError: {message}"),
            EdlError::Convert { message } => format!("ConvertError: {message}"),
            EdlError::Encode { message } => format!("EncodeError: {message}"),
            EdlError::Cancelled => "Cancelled: render cancelled".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_cli_contract() {
        assert_eq!(EdlError::config("$.fps", "negative").exit_code(), 1);
        assert_eq!(EdlError::source("file.mp4", "not found").exit_code(), 2);
        assert_eq!(EdlError::allocation("oom").exit_code(), 3);
        assert_eq!(EdlError::convert("scale failed").exit_code(), 3);
        assert_eq!(EdlError::encode("write failed").exit_code(), 3);
    }

    #[test]
    fn diagnostic_names_kind_and_offender() {
        let e = EdlError::source("clip://0", "seek out of range");
        assert!(e.diagnostic().contains("SourceError"));
        assert!(e.diagnostic().contains("clip://0"));
    }
}
