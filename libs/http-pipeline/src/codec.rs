//! Gzip codec used by [`CompressionLayer`](crate::CompressionLayer).
//!
//! Both directions are streaming copies from a reader into a writer: the
//! codec never needs the whole payload in one buffer, and it never closes
//! or rewinds the caller's source.

use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Gzip codec failures
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CodecError {
    /// Input is not a valid gzip stream (bad header, corrupt deflate data,
    /// checksum mismatch, truncated trailer)
    #[error("malformed gzip stream: {0}")]
    Malformed(#[source] io::Error),

    /// Reading the source or writing the destination failed
    #[error("I/O error during gzip copy: {0}")]
    Io(#[source] io::Error),

    /// Decoded output exceeded the configured limit
    #[error("decoded body exceeds limit of {limit} bytes")]
    TooLarge { limit: usize },
}

/// Gzip-compress everything readable from `source` into `destination`.
///
/// The encoder is finished before returning, so the gzip trailer is present
/// in the returned destination. `source` is only read, never closed.
///
/// # Errors
/// Returns `CodecError::Io` if reading the source or writing the destination fails.
pub fn compress<R, W>(source: &mut R, destination: W) -> Result<W, CodecError>
where
    R: Read + ?Sized,
    W: Write,
{
    let mut encoder = GzEncoder::new(destination, Compression::default());
    io::copy(source, &mut encoder).map_err(CodecError::Io)?;
    encoder.finish().map_err(CodecError::Io)
}

/// Gzip-decode `source` into `destination` until the source is exhausted.
///
/// Returns the number of decoded bytes written.
///
/// # Errors
/// Returns `CodecError::Malformed` for invalid gzip input and
/// `CodecError::Io` for failures of the underlying streams.
pub fn decompress<R, W>(source: R, destination: &mut W) -> Result<u64, CodecError>
where
    R: Read,
    W: Write + ?Sized,
{
    let mut decoder = GzDecoder::new(Tracked::new(source));
    let mut sink = Tracked::new(destination);
    let result = io::copy(&mut decoder, &mut sink);
    result.map_err(|e| classify(e, decoder.get_ref(), &sink))
}

/// Same as [`decompress`], but stops with `CodecError::TooLarge` as soon as
/// more than `limit` decoded bytes are produced.
///
/// # Errors
/// See [`decompress`]; additionally returns `CodecError::TooLarge`.
pub fn decompress_limited<R, W>(
    source: R,
    destination: &mut W,
    limit: usize,
) -> Result<u64, CodecError>
where
    R: Read,
    W: Write + ?Sized,
{
    let limit_u64 = u64::try_from(limit).unwrap_or(u64::MAX);
    let mut decoder = GzDecoder::new(Tracked::new(source));
    let mut sink = Tracked::new(destination);
    let result = io::copy(
        &mut Read::take(&mut decoder, limit_u64.saturating_add(1)),
        &mut sink,
    );
    let copied = result.map_err(|e| classify(e, decoder.get_ref(), &sink))?;
    if copied > limit_u64 {
        return Err(CodecError::TooLarge { limit });
    }
    Ok(copied)
}

/// Compress an in-memory payload.
///
/// # Errors
/// Returns `CodecError::Io` if the encoder fails.
pub fn compress_bytes(data: &[u8]) -> Result<Bytes, CodecError> {
    let mut source = data;
    let compressed = compress(&mut source, Vec::new())?;
    Ok(Bytes::from(compressed))
}

/// Decode an in-memory gzip payload, rejecting output larger than `limit`.
///
/// # Errors
/// Returns `CodecError::Malformed` for invalid input and
/// `CodecError::TooLarge` when the decoded size exceeds `limit`.
pub fn decompress_bytes(data: &[u8], limit: usize) -> Result<Bytes, CodecError> {
    let mut decoded = Vec::new();
    decompress_limited(data, &mut decoded, limit)?;
    Ok(Bytes::from(decoded))
}

/// Stream wrapper that remembers whether the wrapped reader or writer itself
/// failed, so decoder errors and stream errors can be told apart after `io::copy`.
struct Tracked<T> {
    inner: T,
    failed: bool,
}

impl<T> Tracked<T> {
    fn new(inner: T) -> Self {
        Self {
            inner,
            failed: false,
        }
    }
}

impl<R: Read> Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|_| self.failed = true)
    }
}

impl<W: Write> Write for Tracked<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf).inspect_err(|_| self.failed = true)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().inspect_err(|_| self.failed = true)
    }
}

fn classify<R, W>(err: io::Error, source: &Tracked<R>, sink: &Tracked<W>) -> CodecError {
    if source.failed || sink.failed {
        CodecError::Io(err)
    } else {
        CodecError::Malformed(err)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"))
        }
    }

    #[test]
    fn test_round_trip_various_payloads() {
        let all_bytes: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let zeros = vec![0u8; 100_000];
        let payloads: [&[u8]; 5] = [
            b"",
            b"hello",
            br#"{"a":1}"#,
            &all_bytes,
            &zeros,
        ];

        for payload in payloads {
            let compressed = compress_bytes(payload).unwrap();
            let restored = decompress_bytes(&compressed, usize::MAX).unwrap();
            assert_eq!(restored.as_ref(), payload, "round trip must be lossless");
        }
    }

    #[test]
    fn test_compress_emits_gzip_magic_and_trailer() {
        let compressed = compress_bytes(b"hello").unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        // ISIZE trailer: little-endian length of the original input
        let isize_bytes = &compressed[compressed.len() - 4..];
        assert_eq!(isize_bytes, &5u32.to_le_bytes());
    }

    #[test]
    fn test_compress_leaves_source_usable() {
        let mut source = Cursor::new(b"some request body".to_vec());
        let compressed = compress(&mut source, Vec::new()).unwrap();

        assert_eq!(source.position(), 17, "source is read to the end");
        assert_eq!(source.get_ref().as_slice(), b"some request body");
        assert!(!compressed.is_empty());
    }

    #[test]
    fn test_decompress_streams_into_destination() {
        let compressed = compress_bytes(b"hello").unwrap();
        let mut out = Vec::new();
        let written = decompress(Cursor::new(compressed), &mut out).unwrap();
        assert_eq!(written, 5);
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_decompress_rejects_non_gzip_input() {
        let result = decompress_bytes(b"definitely not gzip", usize::MAX);
        assert!(
            matches!(result, Err(CodecError::Malformed(_))),
            "expected Malformed, got: {result:?}"
        );
    }

    #[test]
    fn test_decompress_rejects_truncated_stream() {
        let compressed = compress_bytes(&b"truncate me ".repeat(50)).unwrap();
        let truncated = &compressed[..compressed.len() - 6];
        let result = decompress_bytes(truncated, usize::MAX);
        assert!(
            matches!(result, Err(CodecError::Malformed(_))),
            "expected Malformed, got: {result:?}"
        );
    }

    #[test]
    fn test_source_failure_is_io_error() {
        let mut out = Vec::new();
        let result = decompress(FailingReader, &mut out);
        assert!(
            matches!(result, Err(CodecError::Io(_))),
            "expected Io, got: {result:?}"
        );

        let result = compress(&mut FailingReader, Vec::new());
        assert!(
            matches!(result, Err(CodecError::Io(_))),
            "expected Io, got: {result:?}"
        );
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_destination_failure_is_io_error() {
        let compressed = compress_bytes(b"payload").unwrap();
        let result = decompress(compressed.as_ref(), &mut FailingWriter);
        assert!(
            matches!(result, Err(CodecError::Io(_))),
            "expected Io, got: {result:?}"
        );
    }

    #[test]
    fn test_decompress_limit() {
        let payload = vec![b'x'; 10_000];
        let compressed = compress_bytes(&payload).unwrap();

        let exact = decompress_bytes(&compressed, 10_000).unwrap();
        assert_eq!(exact.len(), 10_000);

        let result = decompress_bytes(&compressed, 9_999);
        assert!(
            matches!(result, Err(CodecError::TooLarge { limit: 9_999 })),
            "expected TooLarge, got: {result:?}"
        );
    }
}
