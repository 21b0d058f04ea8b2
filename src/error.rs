use std::io;
use thiserror::Error;

/// Errors produced while intercepting, framing, or dispatching a response.
///
/// Framing violations (`ContentLengthOverrun`, `ContentLengthMismatch`,
/// `StreamAbort`) are fatal to the exchange: bytes may already be on the
/// wire, so the response is surfaced as failed and never retried.
#[derive(Error, Debug)]
pub enum GzipError {
    /// A header was mutated after the response head was committed.
    #[error("header `{name}` set after response commit")]
    LateHeader {
        /// Name of the offending header.
        name: String,
    },

    /// Cumulative body bytes would exceed the declared Content-Length.
    #[error("content length overrun: declared {declared}, attempted {attempted}")]
    ContentLengthOverrun {
        /// Length fixed at commit time.
        declared: u64,
        /// Cumulative byte count the write would have reached.
        attempted: u64,
    },

    /// The response completed at a byte count other than the declared one.
    #[error("content length mismatch: declared {declared}, wrote {written}")]
    ContentLengthMismatch {
        /// Length fixed at commit time.
        declared: u64,
        /// Bytes actually written before completion.
        written: u64,
    },

    /// `suspend` was requested while a suspension is already pending.
    #[error("exchange already suspended")]
    DoubleSuspend,

    /// A suspension was resumed more than once.
    #[error("suspension already resumed")]
    DoubleResume,

    /// The named content does not exist.
    #[error("content not found: {0}")]
    NotFound(String),

    /// The transport failed mid-stream; in gzip mode the trailer is omitted.
    #[error("stream aborted: {0}")]
    StreamAbort(#[source] io::Error),

    /// The exchange was driven through an invalid state transition.
    #[error("illegal exchange state: {0}")]
    IllegalState(&'static str),

    /// An I/O failure outside the transport write path.
    #[error(transparent)]
    Io(#[from] io::Error),
}
