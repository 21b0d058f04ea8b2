//! Transport-facing response sink.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// Receives the committed response head and framed body bytes.
///
/// Implementations map onto the underlying transport. Calls may block
/// or report backpressure through their `io::Result`; write and flush
/// failures are treated as a transport abort by the framing layer.
pub trait ResponseSink: Send {
    /// Sends the response head. Called exactly once, at commit.
    fn send_head(&mut self, status: StatusCode, headers: HeaderMap) -> io::Result<()>;

    /// Sends one chunk of framed body bytes.
    fn send_data(&mut self, data: Bytes) -> io::Result<()>;

    /// Propagates a flush down the transport.
    fn flush(&mut self) -> io::Result<()>;

    /// Sends trailing headers after the last body byte.
    fn send_trailers(&mut self, trailers: HeaderMap) -> io::Result<()>;

    /// Marks the response as delivered in full.
    fn finish(&mut self) -> io::Result<()>;
}

/// In-memory sink that records everything it receives.
///
/// Clones share the same record, so a test can keep one handle while
/// the exchange owns the other.
#[derive(Clone, Default)]
pub struct BufferSink {
    shared: Arc<Mutex<SinkRecord>>,
}

#[derive(Default)]
struct SinkRecord {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<Bytes>,
    trailers: Option<HeaderMap>,
    flushes: usize,
    finished: bool,
}

impl BufferSink {
    /// Creates an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Status sent with the head, if the response committed.
    pub fn status(&self) -> Option<StatusCode> {
        self.shared.lock().status
    }

    /// A committed head header, rendered as a string.
    pub fn header(&self, name: &str) -> Option<String> {
        self.shared
            .lock()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    /// Whether the committed head carries the named header.
    pub fn has_header(&self, name: &str) -> bool {
        self.shared.lock().headers.contains_key(name)
    }

    /// All body bytes received so far, concatenated.
    pub fn body(&self) -> Vec<u8> {
        let record = self.shared.lock();
        let mut out = Vec::new();
        for chunk in &record.body {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Number of body chunks received so far.
    pub fn chunk_count(&self) -> usize {
        self.shared.lock().body.len()
    }

    /// A trailer received after the body, rendered as a string.
    pub fn trailer(&self, name: &str) -> Option<String> {
        self.shared
            .lock()
            .trailers
            .as_ref()
            .and_then(|t| t.get(name))
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    /// Number of flushes propagated to the transport.
    pub fn flushes(&self) -> usize {
        self.shared.lock().flushes
    }

    /// Whether the response finished normally.
    pub fn is_finished(&self) -> bool {
        self.shared.lock().finished
    }
}

impl ResponseSink for BufferSink {
    fn send_head(&mut self, status: StatusCode, headers: HeaderMap) -> io::Result<()> {
        let mut record = self.shared.lock();
        record.status = Some(status);
        record.headers = headers;
        Ok(())
    }

    fn send_data(&mut self, data: Bytes) -> io::Result<()> {
        self.shared.lock().body.push(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.shared.lock().flushes += 1;
        Ok(())
    }

    fn send_trailers(&mut self, trailers: HeaderMap) -> io::Result<()> {
        self.shared.lock().trailers = Some(trailers);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.shared.lock().finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_record() {
        let sink = BufferSink::new();
        let mut writer = sink.clone();

        writer.send_data(Bytes::from_static(b"hello ")).unwrap();
        writer.send_data(Bytes::from_static(b"world")).unwrap();
        writer.finish().unwrap();

        assert_eq!(sink.body(), b"hello world");
        assert_eq!(sink.chunk_count(), 2);
        assert!(sink.is_finished());
    }

    #[test]
    fn test_head_recorded() {
        let sink = BufferSink::new();
        let mut writer = sink.clone();

        let mut headers = HeaderMap::new();
        headers.insert("content-length", "5".parse().unwrap());
        writer.send_head(StatusCode::OK, headers).unwrap();

        assert_eq!(sink.status(), Some(StatusCode::OK));
        assert_eq!(sink.header("content-length").as_deref(), Some("5"));
        assert!(!sink.has_header("content-encoding"));
    }
}
