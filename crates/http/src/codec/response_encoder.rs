//! Server side response serialization.

use crate::codec::body::encode_content;
use crate::codec::header::{FastWrite, INIT_HEADER_SIZE, write_headers};
use crate::protocol::{Response, SendError};
use bytes::{BufMut, BytesMut};
use http::{HeaderValue, Method, StatusCode, header};
use std::io::Write;
use tokio_util::codec::Encoder;

/// Writes a complete response: status line, headers and the (possibly gzip encoded) body.
///
/// `Content-Length` is always emitted, except for informational and `204` responses which
/// must not carry one. An answer to `HEAD` keeps the length of the content it would have
/// sent but writes no body bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseEncoder {
    head_request: bool,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Self { head_request: false }
    }

    /// Encoder for the answer to a request with `method`.
    pub fn for_method(method: &Method) -> Self {
        Self { head_request: *method == Method::HEAD }
    }
}

impl Encoder<Response> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, mut response: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let status = response.status().ok_or_else(|| SendError::invalid_header("response has no status"))?;

        let content = encode_content(response.headers(), response.content())?;
        let headers = response.headers_mut();
        if status.is_informational() || status == StatusCode::NO_CONTENT {
            headers.remove(header::CONTENT_LENGTH);
        } else {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content.len()));
        }

        let body: &[u8] = if self.head_request { &[] } else { &content };
        dst.reserve(INIT_HEADER_SIZE + body.len());
        write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", status.as_u16(), status.canonical_reason().unwrap_or("Unknown"))?;
        write_headers(response.headers(), dst);
        dst.put_slice(b"\r\n");
        dst.put_slice(body);
        Ok(())
    }
}
