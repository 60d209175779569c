//! Decoder for `Transfer-Encoding: chunked` bodies
//! ([RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1)).
//!
//! Chunk extensions and trailer fields are validated for shape and then dropped.

use super::PayloadItem;
use crate::protocol::ParseError;
use ChunkedState::{
    Body, BodyCr, BodyLf, End, EndCr, EndLf, Extension, Size, SizeLf, SizeLws, Trailer, TrailerLf,
};
use bytes::{Buf, Bytes, BytesMut};
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChunkedDecoder {
    state: ChunkedState,
    remaining: u64,
}

impl ChunkedDecoder {
    pub(crate) fn new() -> Self {
        Self { state: Size, remaining: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    Size,
    SizeLws,
    Extension,
    SizeLf,
    Body,
    BodyCr,
    BodyLf,
    Trailer,
    TrailerLf,
    EndCr,
    EndLf,
    End,
}

type Step = Poll<Result<ChunkedState, ParseError>>;

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!("finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            let mut chunk = None;
            self.state = match self.state.step(src, &mut self.remaining, &mut chunk) {
                Poll::Pending => return Ok(None),
                Poll::Ready(result) => result?,
            };

            if let Some(bytes) = chunk {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }
}

macro_rules! next_byte {
    ($src:ident) => {{
        if $src.is_empty() {
            return Poll::Pending;
        }
        $src.get_u8()
    }};
}

fn invalid(reason: &str) -> Step {
    Poll::Ready(Err(ParseError::invalid_body(reason)))
}

impl ChunkedState {
    fn step(self, src: &mut BytesMut, remaining: &mut u64, chunk: &mut Option<Bytes>) -> Step {
        match self {
            Size => Self::read_size(src, remaining),
            SizeLws => Self::read_size_lws(src),
            Extension => Self::read_extension(src),
            SizeLf => Self::read_size_lf(src, *remaining),
            Body => Self::read_body(src, remaining, chunk),
            BodyCr => Self::expect_byte(src, b'\r', BodyLf, "invalid chunk body CR"),
            BodyLf => Self::expect_byte(src, b'\n', Size, "invalid chunk body LF"),
            Trailer => Self::read_trailer(src),
            TrailerLf => Self::expect_byte(src, b'\n', EndCr, "invalid trailer end LF"),
            EndCr => Self::read_end_cr(src),
            EndLf => Self::expect_byte(src, b'\n', End, "invalid chunk end LF"),
            End => Poll::Ready(Ok(End)),
        }
    }

    fn expect_byte(src: &mut BytesMut, byte: u8, next: ChunkedState, reason: &str) -> Step {
        if next_byte!(src) == byte { Poll::Ready(Ok(next)) } else { invalid(reason) }
    }

    fn read_size(src: &mut BytesMut, size: &mut u64) -> Step {
        let digit = match next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            _ => return invalid("invalid chunk size line"),
        };

        match size.checked_mul(16).and_then(|s| s.checked_add(u64::from(digit))) {
            Some(new_size) => {
                *size = new_size;
                Poll::Ready(Ok(Size))
            }
            None => invalid("chunk size overflow"),
        }
    }

    fn read_size_lws(src: &mut BytesMut) -> Step {
        match next_byte!(src) {
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => invalid("invalid chunk size linear white space"),
        }
    }

    fn read_extension(src: &mut BytesMut) -> Step {
        // extensions end at CRLF, a bare LF inside one is rejected
        match next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => invalid("invalid chunk extension contains newline"),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_size_lf(src: &mut BytesMut, size: u64) -> Step {
        match next_byte!(src) {
            b'\n' if size == 0 => Poll::Ready(Ok(EndCr)),
            b'\n' => Poll::Ready(Ok(Body)),
            _ => invalid("invalid chunk size LF"),
        }
    }

    fn read_body(src: &mut BytesMut, remaining: &mut u64, chunk: &mut Option<Bytes>) -> Step {
        if *remaining == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        let take = usize::try_from(*remaining).unwrap_or(usize::MAX).min(src.len());
        *remaining -= take as u64;
        *chunk = Some(src.split_to(take).freeze());

        if *remaining > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }

    fn read_trailer(src: &mut BytesMut) -> Step {
        match next_byte!(src) {
            b'\r' => Poll::Ready(Ok(TrailerLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_end_cr(src: &mut BytesMut) -> Step {
        match next_byte!(src) {
            b'\r' => Poll::Ready(Ok(EndLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }
}
