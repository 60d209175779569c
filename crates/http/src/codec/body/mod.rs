//! Body framing, content encoding and request body construction.

mod chunked_decoder;
mod content;
mod length_decoder;

pub(crate) use content::build_content;

use crate::protocol::{ParseError, SendError, has_token};
use crate::utils::ensure;
use bytes::{Bytes, BytesMut};
use chunked_decoder::ChunkedDecoder;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use http::{HeaderMap, header};
use length_decoder::LengthDecoder;
use std::io;
use std::io::{Read, Write};
use tokio_util::codec::Decoder;

/// Default upper bound of a collected body, after any content decoding.
pub const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

/// One step of body decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PayloadItem {
    Chunk(Bytes),
    Eof,
}

impl PayloadItem {
    #[cfg(test)]
    pub(crate) fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Chunk(bytes) => Some(bytes),
            Self::Eof => None,
        }
    }
}

/// How the body of a message is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyFraming {
    Empty,
    Length(u64),
    Chunked,
}

impl BodyFraming {
    /// Chunked transfer encoding wins over `Content-Length`; with neither the body is empty.
    pub(crate) fn from_headers(headers: &HeaderMap) -> Result<Self, ParseError> {
        if has_token(headers, &header::TRANSFER_ENCODING, "chunked") {
            return Ok(Self::Chunked);
        }

        match headers.get(header::CONTENT_LENGTH) {
            None => Ok(Self::Empty),
            Some(value) => {
                let length = value
                    .to_str()
                    .map_err(ParseError::invalid_content_length)?
                    .trim()
                    .parse::<u64>()
                    .map_err(ParseError::invalid_content_length)?;
                Ok(if length == 0 { Self::Empty } else { Self::Length(length) })
            }
        }
    }
}

/// Collects a whole body according to its [`BodyFraming`].
#[derive(Debug)]
pub(crate) struct BodyReader {
    decoder: PayloadDecoder,
    collected: BytesMut,
    max_size: usize,
}

#[derive(Debug)]
enum PayloadDecoder {
    Empty,
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
}

impl BodyReader {
    /// Fails up front when a declared length already exceeds `max_size`.
    pub(crate) fn new(framing: BodyFraming, max_size: usize) -> Result<Self, ParseError> {
        let decoder = match framing {
            BodyFraming::Empty => PayloadDecoder::Empty,
            BodyFraming::Length(length) => {
                ensure!(
                    usize::try_from(length).is_ok_and(|length| length <= max_size),
                    ParseError::too_large_body(length, max_size)
                );
                PayloadDecoder::Length(LengthDecoder::new(length))
            }
            BodyFraming::Chunked => PayloadDecoder::Chunked(ChunkedDecoder::new()),
        };
        Ok(Self { decoder, collected: BytesMut::new(), max_size })
    }

    /// Returns the full body once all of it has arrived.
    pub(crate) fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ParseError> {
        loop {
            let item = match &mut self.decoder {
                PayloadDecoder::Empty => Some(PayloadItem::Eof),
                PayloadDecoder::Length(decoder) => decoder.decode(src)?,
                PayloadDecoder::Chunked(decoder) => decoder.decode(src)?,
            };

            match item {
                Some(PayloadItem::Chunk(bytes)) => {
                    let size = self.collected.len() + bytes.len();
                    ensure!(size <= self.max_size, ParseError::too_large_body(size as u64, self.max_size));
                    self.collected.extend_from_slice(&bytes);
                }
                Some(PayloadItem::Eof) => return Ok(Some(self.collected.split().freeze())),
                None => return Ok(None),
            }
        }
    }
}

fn content_encoding(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

/// Undoes a gzip `Content-Encoding`, inflating at most `max_size` bytes. Other encodings
/// are passed through untouched.
pub(crate) fn decode_content(headers: &HeaderMap, body: Bytes, max_size: usize) -> Result<Bytes, ParseError> {
    if body.is_empty() || content_encoding(headers).as_deref() != Some("gzip") {
        return Ok(body);
    }

    let mut decoded = Vec::with_capacity(body.len().saturating_mul(4).min(max_size));
    let limit = (max_size as u64).saturating_add(1);
    GzDecoder::new(body.as_ref()).take(limit).read_to_end(&mut decoded).map_err(ParseError::invalid_body)?;
    ensure!(decoded.len() <= max_size, ParseError::too_large_body(decoded.len() as u64, max_size));
    Ok(Bytes::from(decoded))
}

/// Applies the `Content-Encoding` named in `headers`; only gzip is supported.
pub(crate) fn encode_content(headers: &HeaderMap, body: &Bytes) -> Result<Bytes, SendError> {
    if body.is_empty() {
        return Ok(body.clone());
    }

    match content_encoding(headers).as_deref() {
        None | Some("identity") => Ok(body.clone()),
        Some("gzip") => {
            let mut encoder = GzEncoder::new(Writer::new(), Compression::default());
            encoder.write_all(body)?;
            Ok(encoder.finish()?.take())
        }
        Some(other) => Err(SendError::unsupported_encoding(other)),
    }
}

// collects encoder output into a BytesMut
struct Writer {
    buf: BytesMut,
}

impl Writer {
    fn new() -> Self {
        Self { buf: BytesMut::with_capacity(4096) }
    }

    fn take(mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_framing() {
        let mut headers = HeaderMap::new();
        assert_eq!(BodyFraming::from_headers(&headers).unwrap(), BodyFraming::Empty);

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        assert_eq!(BodyFraming::from_headers(&headers).unwrap(), BodyFraming::Length(12));

        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("gzip, chunked"));
        assert_eq!(BodyFraming::from_headers(&headers).unwrap(), BodyFraming::Chunked);

        headers.remove(header::TRANSFER_ENCODING);
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("abc"));
        assert!(BodyFraming::from_headers(&headers).is_err());
    }

    #[test]
    fn test_gzip_round_trip() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("GZIP"));

        let body = Bytes::from("hello hello hello hello");
        let encoded = encode_content(&headers, &body).unwrap();
        assert_ne!(encoded, body);
        assert_eq!(decode_content(&headers, encoded, MAX_BODY_SIZE).unwrap(), body);
    }

    #[test]
    fn test_unsupported_encoding() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("br"));
        let result = encode_content(&headers, &Bytes::from_static(b"x"));
        assert!(matches!(result, Err(SendError::UnsupportedEncoding { .. })));
    }

    #[test]
    fn test_body_reader_waits_for_length() {
        let mut reader = BodyReader::new(BodyFraming::Length(5), MAX_BODY_SIZE).unwrap();
        let mut buf = BytesMut::from(&b"he"[..]);
        assert!(reader.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"llo!");
        assert_eq!(reader.decode(&mut buf).unwrap().unwrap().as_ref(), b"hello");
        assert_eq!(&buf[..], b"!");
    }

    #[test]
    fn test_declared_length_over_limit() {
        let result = BodyReader::new(BodyFraming::Length(11), 10);
        assert!(matches!(result, Err(ParseError::TooLargeBody { size: 11, max_size: 10 })));
        assert!(BodyReader::new(BodyFraming::Length(10), 10).is_ok());
    }

    #[test]
    fn test_chunked_body_over_limit() {
        let mut reader = BodyReader::new(BodyFraming::Chunked, 8).unwrap();
        let mut buf = BytesMut::from(&b"5\r\nhello\r\n5\r\nworld\r\n0\r\n\r\n"[..]);
        assert!(matches!(reader.decode(&mut buf), Err(ParseError::TooLargeBody { max_size: 8, .. })));
    }

    #[test]
    fn test_gzip_inflate_over_limit() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));

        let body = Bytes::from(vec![b'a'; 4096]);
        let encoded = encode_content(&headers, &body).unwrap();
        assert!(encoded.len() < 100);

        let result = decode_content(&headers, encoded.clone(), 1024);
        assert!(matches!(result, Err(ParseError::TooLargeBody { max_size: 1024, .. })));
        assert_eq!(decode_content(&headers, encoded, 4096).unwrap(), body);
    }
}
