//! Client side response parsing.

use crate::codec::body::{BodyFraming, BodyReader, MAX_BODY_SIZE, decode_content};
use crate::codec::header::{parse_head, take_head};
use crate::protocol::{ParseError, Response};
use crate::utils::ensure;
use bytes::BytesMut;
use http::{HeaderMap, Method, StatusCode};
use tokio_util::codec::Decoder;
use tracing::trace;

/// Decodes one response at a time; a decoder is reusable once it has yielded.
#[derive(Debug)]
pub struct ResponseDecoder {
    head_request: bool,
    max_body_size: usize,
    pending: Option<(StatusCode, HeaderMap, BodyReader)>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self { head_request: false, max_body_size: MAX_BODY_SIZE, pending: None }
    }

    /// Decoder for the response to a request with `method`; answers to `HEAD` carry no body.
    pub fn for_method(method: &Method) -> Self {
        Self { head_request: *method == Method::HEAD, max_body_size: MAX_BODY_SIZE, pending: None }
    }

    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    fn framing(&self, status: StatusCode, headers: &HeaderMap) -> Result<BodyFraming, ParseError> {
        let bodiless = self.head_request
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED;
        if bodiless { Ok(BodyFraming::Empty) } else { BodyFraming::from_headers(headers) }
    }
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_status_line(line: &str) -> Result<StatusCode, ParseError> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    ensure!(version.starts_with("HTTP/"), ParseError::invalid_status_line(line));

    parts
        .next()
        .and_then(|code| code.trim().parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| ParseError::invalid_status_line(line))
}

impl Decoder for ResponseDecoder {
    type Item = Response;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.pending.is_none() {
            let Some(raw) = take_head(src)? else {
                return Ok(None);
            };
            let head = parse_head(&raw)?;
            let status = parse_status_line(&head.start_line)?;
            let framing = self.framing(status, &head.headers)?;
            trace!(status = status.as_u16(), ?framing, "decoded response head");
            self.pending = Some((status, head.headers, BodyReader::new(framing, self.max_body_size)?));
        }

        let Some((_, _, reader)) = self.pending.as_mut() else {
            return Ok(None);
        };
        let Some(body) = reader.decode(src)? else {
            return Ok(None);
        };

        let Some((status, headers, _)) = self.pending.take() else {
            return Ok(None);
        };
        let content = decode_content(&headers, body, self.max_body_size)?;
        Ok(Some(Response::from_parts(status, headers, content)))
    }
}
