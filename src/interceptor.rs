//! Response interception: buffered head, one-time commit, framed body.

use crate::config::GzipConfig;
use crate::decision::{self, CommitCause, CompressionMode};
use crate::error::GzipError;
use crate::framing::FramedWriter;
use crate::sink::ResponseSink;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use tracing::debug;

/// Typed snapshot of everything the handler has declared so far.
///
/// Once `mode` leaves [`CompressionMode::Undecided`] it is immutable
/// for the rest of the exchange.
#[derive(Debug, Clone)]
pub struct ResponseState {
    pub(crate) headers_committed: bool,
    pub(crate) declared_length: Option<u64>,
    pub(crate) content_type: Option<String>,
    pub(crate) mode: CompressionMode,
    pub(crate) bytes_written: u64,
    pub(crate) etag: Option<String>,
    pub(crate) gzip_accepted: bool,
}

impl ResponseState {
    pub(crate) fn new(gzip_accepted: bool) -> Self {
        Self {
            headers_committed: false,
            declared_length: None,
            content_type: None,
            mode: CompressionMode::Undecided,
            bytes_written: 0,
            etag: None,
            gzip_accepted,
        }
    }

    /// Whether the head has been committed.
    pub fn is_committed(&self) -> bool {
        self.headers_committed
    }

    /// Content-Length declared by the handler, if any.
    pub fn declared_length(&self) -> Option<u64> {
        self.declared_length
    }

    /// Content type declared by the handler, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Delivery mode; `Undecided` until the commit.
    pub fn mode(&self) -> CompressionMode {
        self.mode
    }

    /// Uncompressed body bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// ETag declared by the handler, if any.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}

enum Output<S> {
    /// Head not committed yet; the sink is idle.
    Buffered(S),
    /// Head committed; all bytes flow through the framing writer.
    Streaming(FramedWriter<S>),
    /// Completed or aborted.
    Closed,
}

/// Wraps the outgoing response: buffers header mutations until the
/// first body write, then commits a delivery mode exactly once and
/// becomes a thin shell around the framing writer.
pub struct ResponseInterceptor<S: ResponseSink> {
    config: GzipConfig,
    status: StatusCode,
    headers: HeaderMap,
    state: ResponseState,
    output: Output<S>,
    trailers: Option<HeaderMap>,
    completed: bool,
}

impl<S: ResponseSink> ResponseInterceptor<S> {
    pub(crate) fn new(config: GzipConfig, sink: S, gzip_accepted: bool) -> Self {
        Self {
            config,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            state: ResponseState::new(gzip_accepted),
            output: Output::Buffered(sink),
            trailers: None,
            completed: false,
        }
    }

    /// Current response state snapshot.
    pub fn state(&self) -> &ResponseState {
        &self.state
    }

    /// Sets the response status. Only valid before the commit.
    pub fn set_status(&mut self, status: StatusCode) -> Result<(), GzipError> {
        if self.state.headers_committed {
            return Err(GzipError::IllegalState("status line already committed"));
        }
        self.status = status;
        Ok(())
    }

    /// Sets a response header.
    ///
    /// Before the commit the header is buffered; `Content-Length` and
    /// `Content-Type` are routed into their typed setters. After the
    /// commit every header fails with [`GzipError::LateHeader`] except
    /// `ETag`, which is always accepted verbatim and delivered as a
    /// trailer.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), GzipError> {
        if name == header::ETAG {
            self.state.etag = value.to_str().ok().map(str::to_owned);
            if self.state.headers_committed {
                self.trailers
                    .get_or_insert_with(HeaderMap::new)
                    .insert(name, value);
            } else {
                self.headers.insert(name, value);
            }
            return Ok(());
        }

        if self.state.headers_committed {
            return Err(GzipError::LateHeader {
                name: name.as_str().to_owned(),
            });
        }

        if name == header::CONTENT_LENGTH {
            let parsed = value
                .to_str()
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .ok_or(GzipError::IllegalState("unparsable content-length value"))?;
            return self.set_content_length(parsed);
        }

        if name == header::CONTENT_TYPE {
            let parsed = value
                .to_str()
                .map_err(|_| GzipError::IllegalState("content-type is not valid UTF-8"))?
                .to_owned();
            self.state.content_type = Some(parsed);
        }

        self.headers.insert(name, value);
        Ok(())
    }

    /// Declares the uncompressed body length. Only valid before the commit.
    ///
    /// The declared value is only emitted on the wire when the response
    /// passes through; a compressed response drops it.
    pub fn set_content_length(&mut self, length: u64) -> Result<(), GzipError> {
        if self.state.headers_committed {
            return Err(GzipError::LateHeader {
                name: header::CONTENT_LENGTH.as_str().to_owned(),
            });
        }
        self.state.declared_length = Some(length);
        Ok(())
    }

    /// Declares the content type. Only valid before the commit.
    pub fn set_content_type(&mut self, value: &str) -> Result<(), GzipError> {
        if self.state.headers_committed {
            return Err(GzipError::LateHeader {
                name: header::CONTENT_TYPE.as_str().to_owned(),
            });
        }
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| GzipError::IllegalState("content-type is not a valid header value"))?;
        self.headers.insert(header::CONTENT_TYPE, header_value);
        self.state.content_type = Some(value.to_owned());
        Ok(())
    }

    /// Writes body bytes, committing the response on the first call.
    pub fn write(&mut self, data: &[u8]) -> Result<(), GzipError> {
        if self.completed {
            return Err(GzipError::IllegalState("write after completion"));
        }
        self.ensure_committed(CommitCause::Write)?;
        let Output::Streaming(writer) = &mut self.output else {
            return Err(GzipError::IllegalState("response output unavailable"));
        };
        writer.write(data)?;
        self.state.bytes_written = writer.written();
        Ok(())
    }

    /// Flushes buffered output, committing the response if needed.
    pub fn flush(&mut self) -> Result<(), GzipError> {
        if self.completed {
            return Err(GzipError::IllegalState("flush after completion"));
        }
        self.ensure_committed(CommitCause::Flush)?;
        let Output::Streaming(writer) = &mut self.output else {
            return Err(GzipError::IllegalState("response output unavailable"));
        };
        writer.flush()
    }

    /// Completes the response.
    ///
    /// With no prior bytes this still forces a commit; the body is
    /// delivered empty and uncompressed with `Content-Length: 0`.
    pub fn complete(&mut self) -> Result<(), GzipError> {
        if self.completed {
            return Err(GzipError::IllegalState("response already completed"));
        }
        self.ensure_committed(CommitCause::Complete)?;
        self.completed = true;
        match std::mem::replace(&mut self.output, Output::Closed) {
            Output::Streaming(writer) => writer.finish(self.trailers.take()),
            _ => Err(GzipError::IllegalState("response output unavailable")),
        }
    }

    /// Whether the response has been completed or aborted.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Tears the response down without a trailer. Used on handler
    /// failure and transport aborts.
    pub(crate) fn abort(&mut self) {
        self.completed = true;
        self.output = Output::Closed;
    }

    fn ensure_committed(&mut self, cause: CommitCause) -> Result<(), GzipError> {
        if self.state.headers_committed {
            return Ok(());
        }

        let mode = decision::decide(&self.state, &self.headers, &self.config, cause);
        self.state.mode = mode;
        self.state.headers_committed = true;

        let mut headers = std::mem::take(&mut self.headers);
        let mut passthrough_length = None;
        match mode {
            CompressionMode::Compress => {
                headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                // Compressed size is unknown ahead of time
                headers.remove(header::CONTENT_LENGTH);
                headers.remove(header::ACCEPT_RANGES);
                add_vary_accept_encoding(&mut headers);
            }
            CompressionMode::Passthrough => {
                passthrough_length = match self.state.declared_length {
                    Some(len) => Some(len),
                    // Completion with no bytes: an empty body
                    None if cause == CommitCause::Complete => Some(0),
                    // Unknown length stays chunked
                    None => None,
                };
                if let Some(len) = passthrough_length {
                    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
                } else {
                    headers.remove(header::CONTENT_LENGTH);
                }
            }
            CompressionMode::Undecided => unreachable!("decision always picks a mode"),
        }

        debug!(
            ?mode,
            declared = ?self.state.declared_length,
            content_type = ?self.state.content_type,
            "response committed"
        );

        let Output::Buffered(mut sink) = std::mem::replace(&mut self.output, Output::Closed)
        else {
            return Err(GzipError::IllegalState("response output unavailable"));
        };
        sink.send_head(self.status, headers)
            .map_err(GzipError::StreamAbort)?;

        let writer = match mode {
            CompressionMode::Compress => FramedWriter::gzip(sink, self.config.buffer_size),
            _ => FramedWriter::passthrough(sink, passthrough_length),
        };
        self.output = Output::Streaming(writer);
        Ok(())
    }
}

/// Adds Accept-Encoding to the Vary header if not already present.
fn add_vary_accept_encoding(headers: &mut HeaderMap) {
    for vary in headers.get_all(header::VARY) {
        if let Ok(vary_str) = vary.to_str() {
            let covered = vary_str.split(',').any(|v| {
                let v = v.trim();
                v.eq_ignore_ascii_case("*") || v.eq_ignore_ascii_case("accept-encoding")
            });
            if covered {
                return;
            }
        }
    }

    headers.append(
        header::VARY,
        HeaderValue::from_static("accept-encoding"),
    );
}
