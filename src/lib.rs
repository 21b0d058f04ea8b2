//! Gzip response compression middleware with suspendable exchange
//! dispatch.
//!
//! This crate wraps an outgoing HTTP response in a
//! [`ResponseInterceptor`] that buffers header mutations until the
//! first body write, then commits a delivery mode exactly once and
//! frames every subsequent byte — either through a streaming gzip
//! encoder or as a length-checked passthrough. Handlers may park an
//! [`Exchange`] mid-request and resume it later, either explicitly or
//! through an expiry timer supplied by an injected [`Scheduler`].
//!
//! # Example
//!
//! ```ignore
//! use gzip_exchange::{DispatchOutcome, Exchange, GzipConfig};
//!
//! let exchange = Exchange::new(GzipConfig::new(), sink, handler, scheduler);
//! match exchange.dispatch()? {
//!     DispatchOutcome::Completed => {}
//!     DispatchOutcome::Suspended(token) => {
//!         // hand `token` to whatever will wake the exchange up
//!     }
//! }
//! ```
//!
//! # Compression Rules
//!
//! The commit will **not** compress a response when:
//! - The request's `Accept-Encoding` does not admit gzip
//! - The body completed without a single byte (empty bodies are never
//!   compressed; they get `Content-Length: 0`)
//! - `Content-Encoding` is already set, or `Content-Range` is present
//! - The declared `Content-Length` is below the minimum size threshold
//!   (default: 860 bytes) — the declared length is then emitted exactly
//! - The length is unknown and the `Content-Type` matches an excluded
//!   prefix (default: `audio/`, `video/`, `image/` except
//!   `image/svg+xml`)
//!
//! # Response Modifications
//!
//! When compression is applied:
//! - `Content-Encoding` is set to `gzip`
//! - `Content-Length` is removed (compressed size is unknown)
//! - `Accept-Ranges` is removed
//! - `Vary` includes `Accept-Encoding`
//!
//! `ETag` is always forwarded verbatim, before or after the commit,
//! independent of the delivery mode.

#![deny(missing_docs)]

mod accept;
mod config;
mod content;
mod decision;
mod dispatch;
mod error;
mod exchange;
mod framing;
mod interceptor;
mod scheduler;
mod sink;

pub use config::{DEFAULT_BUFFER_SIZE, DEFAULT_MIN_GZIP_SIZE, GzipConfig};
pub use content::{ContentStore, MemoryStore, content_type_for, weak_etag};
pub use decision::CompressionMode;
pub use dispatch::{DispatchState, ResumeReason};
pub use error::GzipError;
pub use exchange::{Context, DispatchOutcome, Exchange, Handler, SuspendToken};
pub use interceptor::{ResponseInterceptor, ResponseState};
pub use scheduler::{CancelToken, ManualScheduler, Scheduler};
pub use sink::{BufferSink, ResponseSink};
