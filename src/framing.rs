//! Body framing: streaming gzip container or length-checked passthrough.

use crate::error::GzipError;
use crate::sink::ResponseSink;
use bytes::Bytes;
use compression_codecs::{EncodeV2, gzip::GzipEncoder};
use compression_core::Level;
use compression_core::util::{PartialBuffer, WriteBuffer};
use http::HeaderMap;
use std::io;

/// Sole byte path for a committed response.
///
/// In gzip mode the writer produces a single well-formed gzip stream
/// across any sequence of partial writes and flushes; `finish` emits
/// the CRC32/ISIZE trailer. In passthrough mode bytes are forwarded
/// unchanged and, when a length was declared up front, the cumulative
/// count is enforced on every write and again at completion.
pub(crate) struct FramedWriter<S> {
    sink: S,
    mode: FrameMode,
    output_buffer: Vec<u8>,
    written: u64,
}

enum FrameMode {
    Gzip { encoder: GzipEncoder },
    Passthrough { declared: Option<u64> },
}

impl<S: ResponseSink> FramedWriter<S> {
    /// Creates a writer that gzip-encodes everything it receives.
    pub(crate) fn gzip(sink: S, buffer_size: usize) -> Self {
        Self {
            sink,
            mode: FrameMode::Gzip {
                encoder: GzipEncoder::new(Level::Default.into()),
            },
            output_buffer: vec![0u8; buffer_size],
            written: 0,
        }
    }

    /// Creates a writer that forwards bytes unchanged.
    pub(crate) fn passthrough(sink: S, declared: Option<u64>) -> Self {
        Self {
            sink,
            mode: FrameMode::Passthrough { declared },
            output_buffer: Vec::new(),
            written: 0,
        }
    }

    /// Uncompressed bytes accepted so far.
    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    /// Accepts one chunk of handler output.
    pub(crate) fn write(&mut self, input: &[u8]) -> Result<(), GzipError> {
        let Self {
            sink,
            mode,
            output_buffer,
            written,
        } = self;

        match mode {
            FrameMode::Passthrough { declared } => {
                if let Some(declared) = *declared {
                    let attempted = *written + input.len() as u64;
                    if attempted > declared {
                        return Err(GzipError::ContentLengthOverrun {
                            declared,
                            attempted,
                        });
                    }
                }
                if !input.is_empty() {
                    sink.send_data(Bytes::copy_from_slice(input))
                        .map_err(GzipError::StreamAbort)?;
                    *written += input.len() as u64;
                }
                Ok(())
            }

            FrameMode::Gzip { encoder } => {
                let mut input_buf = PartialBuffer::new(input);

                // Keep encoding until all input is consumed
                loop {
                    let mut output = WriteBuffer::new_initialized(output_buffer.as_mut_slice());

                    encoder
                        .encode(&mut input_buf, &mut output)
                        .map_err(|e| GzipError::Io(io::Error::other(e)))?;

                    let produced = output.written_len();
                    if produced > 0 {
                        sink.send_data(Bytes::copy_from_slice(&output_buffer[..produced]))
                            .map_err(GzipError::StreamAbort)?;
                    }

                    if input_buf.written_len() >= input.len() {
                        break;
                    }

                    // Safety check to prevent infinite loop
                    if produced == 0 && input_buf.written_len() == 0 {
                        break;
                    }
                }

                *written += input.len() as u64;
                Ok(())
            }
        }
    }

    /// Drains buffered encoder output and flushes the transport.
    ///
    /// In gzip mode this is a sync flush: bytes written so far become
    /// decodable without closing the stream.
    pub(crate) fn flush(&mut self) -> Result<(), GzipError> {
        let Self {
            sink,
            mode,
            output_buffer,
            ..
        } = self;

        if let FrameMode::Gzip { encoder } = mode {
            loop {
                let mut output = WriteBuffer::new_initialized(output_buffer.as_mut_slice());

                let done = encoder
                    .flush(&mut output)
                    .map_err(|e| GzipError::Io(io::Error::other(e)))?;

                let produced = output.written_len();
                if produced > 0 {
                    sink.send_data(Bytes::copy_from_slice(&output_buffer[..produced]))
                        .map_err(GzipError::StreamAbort)?;
                }

                if done {
                    break;
                }
            }
        }

        sink.flush().map_err(GzipError::StreamAbort)
    }

    /// Closes the frame and the sink on normal completion.
    ///
    /// Gzip mode emits the container trailer; passthrough mode enforces
    /// the declared length. Dropping the writer instead skips both,
    /// which is the abort path.
    pub(crate) fn finish(mut self, trailers: Option<HeaderMap>) -> Result<(), GzipError> {
        match &mut self.mode {
            FrameMode::Passthrough { declared } => {
                if let Some(declared) = *declared
                    && self.written != declared
                {
                    return Err(GzipError::ContentLengthMismatch {
                        declared,
                        written: self.written,
                    });
                }
            }

            FrameMode::Gzip { encoder } => loop {
                let mut output = WriteBuffer::new_initialized(self.output_buffer.as_mut_slice());

                let done = encoder
                    .finish(&mut output)
                    .map_err(|e| GzipError::Io(io::Error::other(e)))?;

                let produced = output.written_len();
                if produced > 0 {
                    self.sink
                        .send_data(Bytes::copy_from_slice(&self.output_buffer[..produced]))
                        .map_err(GzipError::StreamAbort)?;
                }

                if done {
                    break;
                }
            },
        }

        if let Some(trailers) = trailers {
            self.sink
                .send_trailers(trailers)
                .map_err(GzipError::StreamAbort)?;
        }

        self.sink.finish().map_err(GzipError::StreamAbort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BufferSink;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_gzip_roundtrip_single_write() {
        let sink = BufferSink::new();
        let mut writer = FramedWriter::gzip(sink.clone(), 8 * 1024);

        writer.write(b"hello gzip world").unwrap();
        writer.finish(None).unwrap();

        let body = sink.body();
        assert_eq!(&body[..2], &[0x1f, 0x8b]);
        assert_eq!(gunzip(&body), b"hello gzip world");
        assert!(sink.is_finished());
    }

    #[test]
    fn test_gzip_roundtrip_partial_writes() {
        let sink = BufferSink::new();
        let mut writer = FramedWriter::gzip(sink.clone(), 64);

        let chunk = vec![b'a'; 4096];
        let mut expected = Vec::new();
        for _ in 0..8 {
            writer.write(&chunk).unwrap();
            expected.extend_from_slice(&chunk);
        }
        writer.finish(None).unwrap();

        assert_eq!(writer_output(&sink), expected);
    }

    fn writer_output(sink: &BufferSink) -> Vec<u8> {
        gunzip(&sink.body())
    }

    #[test]
    fn test_gzip_flush_emits_bytes_mid_stream() {
        let sink = BufferSink::new();
        let mut writer = FramedWriter::gzip(sink.clone(), 8 * 1024);

        writer.write(b"first segment").unwrap();
        let before = sink.body().len();
        writer.flush().unwrap();
        let after = sink.body().len();

        // A sync flush pushes out everything buffered so far
        assert!(after > before);
        assert_eq!(sink.flushes(), 1);

        writer.write(b" second segment").unwrap();
        writer.finish(None).unwrap();
        assert_eq!(gunzip(&sink.body()), b"first segment second segment");
    }

    #[test]
    fn test_gzip_empty_input_still_wellformed() {
        let sink = BufferSink::new();
        let writer = FramedWriter::gzip(sink.clone(), 8 * 1024);

        writer.finish(None).unwrap();
        assert_eq!(gunzip(&sink.body()), b"");
    }

    #[test]
    fn test_gzip_abort_skips_trailer() {
        let sink = BufferSink::new();
        let mut writer = FramedWriter::gzip(sink.clone(), 8 * 1024);

        writer.write(b"interrupted").unwrap();
        drop(writer);

        assert!(!sink.is_finished());
        let mut out = Vec::new();
        // Without the trailer the stream must not decode to completion
        assert!(
            GzDecoder::new(sink.body().as_slice())
                .read_to_end(&mut out)
                .is_err()
        );
    }

    #[test]
    fn test_passthrough_exact_length() {
        let sink = BufferSink::new();
        let mut writer = FramedWriter::passthrough(sink.clone(), Some(11));

        writer.write(b"hello").unwrap();
        writer.write(b" world").unwrap();
        writer.finish(None).unwrap();

        assert_eq!(sink.body(), b"hello world");
        assert!(sink.is_finished());
    }

    #[test]
    fn test_passthrough_overrun() {
        let sink = BufferSink::new();
        let mut writer = FramedWriter::passthrough(sink.clone(), Some(4));

        writer.write(b"ab").unwrap();
        let err = writer.write(b"cde").unwrap_err();
        assert!(matches!(
            err,
            GzipError::ContentLengthOverrun {
                declared: 4,
                attempted: 5
            }
        ));
        // The overrunning chunk never reaches the transport
        assert_eq!(sink.body(), b"ab");
    }

    #[test]
    fn test_passthrough_short_completion() {
        let sink = BufferSink::new();
        let mut writer = FramedWriter::passthrough(sink.clone(), Some(10));

        writer.write(b"short").unwrap();
        let err = writer.finish(None).unwrap_err();
        assert!(matches!(
            err,
            GzipError::ContentLengthMismatch {
                declared: 10,
                written: 5
            }
        ));
        assert!(!sink.is_finished());
    }

    #[test]
    fn test_passthrough_unbounded() {
        let sink = BufferSink::new();
        let mut writer = FramedWriter::passthrough(sink.clone(), None);

        writer.write(&vec![0u8; 1 << 16]).unwrap();
        writer.finish(None).unwrap();
        assert_eq!(sink.body().len(), 1 << 16);
    }

    #[test]
    fn test_trailers_delivered_after_body() {
        let sink = BufferSink::new();
        let mut writer = FramedWriter::gzip(sink.clone(), 8 * 1024);

        writer.write(b"payload").unwrap();
        let mut trailers = HeaderMap::new();
        trailers.insert("etag", "W/etag-payload.txt".parse().unwrap());
        writer.finish(Some(trailers)).unwrap();

        assert_eq!(sink.trailer("etag").as_deref(), Some("W/etag-payload.txt"));
        assert_eq!(gunzip(&sink.body()), b"payload");
    }

    /// Sink whose data path fails after a set number of chunks.
    struct FailingSink {
        inner: BufferSink,
        remaining: usize,
    }

    impl ResponseSink for FailingSink {
        fn send_head(
            &mut self,
            status: http::StatusCode,
            headers: HeaderMap,
        ) -> std::io::Result<()> {
            self.inner.send_head(status, headers)
        }

        fn send_data(&mut self, data: Bytes) -> std::io::Result<()> {
            if self.remaining == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "peer closed",
                ));
            }
            self.remaining -= 1;
            self.inner.send_data(data)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.inner.flush()
        }

        fn send_trailers(&mut self, trailers: HeaderMap) -> std::io::Result<()> {
            self.inner.send_trailers(trailers)
        }

        fn finish(&mut self) -> std::io::Result<()> {
            self.inner.finish()
        }
    }

    #[test]
    fn test_transport_abort_surfaces_stream_abort() {
        let record = BufferSink::new();
        let sink = FailingSink {
            inner: record.clone(),
            remaining: 0,
        };
        let mut writer = FramedWriter::gzip(sink, 64);

        // Incompressible input, so the encoder must produce output
        // (and hit the dead transport) before the write returns
        let mut seed = 0x2545_f491u32;
        let noise: Vec<u8> = (0..256 * 1024)
            .map(|_| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (seed >> 24) as u8
            })
            .collect();

        let result = writer.write(&noise);
        assert!(matches!(result, Err(GzipError::StreamAbort(_))));
        assert!(!record.is_finished());
    }
}
