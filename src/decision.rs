//! Compression mode selection.
//!
//! The decision runs exactly once per exchange, at commit time, against
//! a snapshot of everything the handler has declared so far. Its
//! outcome is fixed for the rest of the exchange.

use crate::config::GzipConfig;
use crate::interceptor::ResponseState;
use http::{HeaderMap, header};

/// Body delivery mode, fixed at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    /// No byte has been written yet; the mode is still open.
    Undecided,
    /// Body is gzip encoded; Content-Length is omitted.
    Compress,
    /// Body is forwarded unchanged.
    Passthrough,
}

/// What forced the commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommitCause {
    /// First body write.
    Write,
    /// Explicit stream flush before any write.
    Flush,
    /// Completion with no body bytes at all.
    Complete,
}

/// Picks the delivery mode for an exchange. Never returns `Undecided`.
///
/// Priority order: client refusal, empty body, upstream encoding/range
/// guards, then declared-length thresholds, then the content-type
/// exclusion list for length-unknown responses.
pub(crate) fn decide(
    state: &ResponseState,
    headers: &HeaderMap,
    config: &GzipConfig,
    cause: CommitCause,
) -> CompressionMode {
    if !state.gzip_accepted {
        return CompressionMode::Passthrough;
    }

    // A commit forced by completion means no body byte was ever
    // written; an empty body is never compressed.
    if cause == CommitCause::Complete {
        return CompressionMode::Passthrough;
    }

    if headers.contains_key(header::CONTENT_ENCODING) {
        return CompressionMode::Passthrough;
    }

    if headers.contains_key(header::CONTENT_RANGE) {
        return CompressionMode::Passthrough;
    }

    match state.declared_length {
        Some(len) if len < config.min_gzip_size => CompressionMode::Passthrough,
        Some(_) => CompressionMode::Compress,
        None => {
            let excluded = state
                .content_type
                .as_deref()
                .is_some_and(|ct| is_excluded_content_type(ct, config));
            if excluded {
                CompressionMode::Passthrough
            } else {
                CompressionMode::Compress
            }
        }
    }
}

/// Checks the content type against the configured exclusion prefixes.
fn is_excluded_content_type(content_type: &str, config: &GzipConfig) -> bool {
    // SVG is text and stays compressible even though image/ is excluded
    if content_type.starts_with("image/svg+xml") {
        return false;
    }

    config
        .excluded_content_types
        .iter()
        .any(|prefix| content_type.starts_with(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ResponseState {
        ResponseState::new(true)
    }

    fn decide_for(state: &ResponseState, cause: CommitCause) -> CompressionMode {
        decide(state, &HeaderMap::new(), &GzipConfig::new(), cause)
    }

    #[test]
    fn test_below_min_size_passes_through() {
        let mut s = state();
        s.declared_length = Some(100);
        assert_eq!(
            decide_for(&s, CommitCause::Write),
            CompressionMode::Passthrough
        );
    }

    #[test]
    fn test_above_min_size_compresses() {
        let mut s = state();
        s.declared_length = Some(4096);
        assert_eq!(
            decide_for(&s, CommitCause::Write),
            CompressionMode::Compress
        );
    }

    #[test]
    fn test_exactly_min_size_compresses() {
        let mut s = state();
        s.declared_length = Some(crate::config::DEFAULT_MIN_GZIP_SIZE);
        assert_eq!(
            decide_for(&s, CommitCause::Write),
            CompressionMode::Compress
        );
    }

    #[test]
    fn test_unknown_length_compresses_by_default() {
        assert_eq!(
            decide_for(&state(), CommitCause::Write),
            CompressionMode::Compress
        );
    }

    #[test]
    fn test_unknown_length_excluded_type_passes_through() {
        let mut s = state();
        s.content_type = Some("audio/mpeg".to_owned());
        assert_eq!(
            decide_for(&s, CommitCause::Write),
            CompressionMode::Passthrough
        );
    }

    #[test]
    fn test_svg_not_excluded() {
        let mut s = state();
        s.content_type = Some("image/svg+xml; charset=utf-8".to_owned());
        assert_eq!(
            decide_for(&s, CommitCause::Write),
            CompressionMode::Compress
        );
    }

    #[test]
    fn test_png_excluded_when_length_unknown() {
        let mut s = state();
        s.content_type = Some("image/png".to_owned());
        assert_eq!(
            decide_for(&s, CommitCause::Write),
            CompressionMode::Passthrough
        );
    }

    #[test]
    fn test_empty_body_never_compressed() {
        assert_eq!(
            decide_for(&state(), CommitCause::Complete),
            CompressionMode::Passthrough
        );
    }

    #[test]
    fn test_flush_commit_treated_like_write() {
        assert_eq!(
            decide_for(&state(), CommitCause::Flush),
            CompressionMode::Compress
        );
    }

    #[test]
    fn test_client_refusal_passes_through() {
        let mut s = ResponseState::new(false);
        s.declared_length = Some(1 << 20);
        assert_eq!(
            decide_for(&s, CommitCause::Write),
            CompressionMode::Passthrough
        );
    }

    #[test]
    fn test_existing_content_encoding_passes_through() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_ENCODING,
            header::HeaderValue::from_static("identity"),
        );
        assert_eq!(
            decide(&state(), &headers, &GzipConfig::new(), CommitCause::Write),
            CompressionMode::Passthrough
        );
    }

    #[test]
    fn test_range_response_passes_through() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_RANGE,
            header::HeaderValue::from_static("bytes 0-99/200"),
        );
        assert_eq!(
            decide(&state(), &headers, &GzipConfig::new(), CommitCause::Write),
            CompressionMode::Passthrough
        );
    }

    #[test]
    fn test_custom_exclusion_prefix() {
        let config = GzipConfig::new().exclude_content_type("application/zip");
        let mut s = state();
        s.content_type = Some("application/zip".to_owned());
        assert_eq!(
            decide(&s, &HeaderMap::new(), &config, CommitCause::Write),
            CompressionMode::Passthrough
        );
    }
}
