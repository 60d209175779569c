use crate::protocol::ParseError;
use crate::utils::ensure;
use bytes::{Buf, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::trace;

/// Upper bound on the size of a message head.
pub(crate) const MAX_HEADER_SIZE: usize = 64 * 1024;

/// A decoded message head: the raw start line and the header map.
#[derive(Debug)]
pub(crate) struct Head {
    pub(crate) start_line: String,
    pub(crate) headers: HeaderMap,
}

/// Splits a complete head (up to and including the first blank line) off the front of `src`.
///
/// Returns `Ok(None)` without consuming anything but leading line breaks when the head is
/// not complete yet.
pub(crate) fn take_head(src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
    // stray line breaks between messages are skipped
    let leading = src.iter().take_while(|b| matches!(b, b'\r' | b'\n')).count();
    src.advance(leading);

    let mut line_start = 0;
    while let Some(pos) = src[line_start..].iter().position(|b| *b == b'\n') {
        let line_end = line_start + pos;
        if src[line_start..line_end].iter().all(|b| matches!(b, b' ' | b'\r')) {
            ensure!(line_end < MAX_HEADER_SIZE, ParseError::too_large_header(line_end, MAX_HEADER_SIZE));
            trace!(len = line_end + 1, "message head complete");
            return Ok(Some(src.split_to(line_end + 1)));
        }
        line_start = line_end + 1;
    }

    ensure!(src.len() < MAX_HEADER_SIZE, ParseError::too_large_header(src.len(), MAX_HEADER_SIZE));
    Ok(None)
}

/// Parses a head taken by [`take_head`].
pub(crate) fn parse_head(head: &[u8]) -> Result<Head, ParseError> {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.split('\n').map(trim_line);

    let start_line = lines.next().unwrap_or_default().to_string();
    let mut headers = HeaderMap::new();
    for line in lines.take_while(|line| !line.is_empty()) {
        parse_header_line(line, &mut headers)?;
    }

    Ok(Head { start_line, headers })
}

fn trim_line(line: &str) -> &str {
    line.trim_matches(|c: char| c == ' ' || c == '\u{3000}' || c == '\r')
}

fn parse_header_line(line: &str, headers: &mut HeaderMap) -> Result<(), ParseError> {
    let (name, value) = line.split_once(':').ok_or_else(|| ParseError::invalid_header(line))?;
    let name = HeaderName::from_bytes(trim_line(name).as_bytes()).map_err(ParseError::invalid_header)?;
    let value = HeaderValue::from_str(trim_line(value)).map_err(ParseError::invalid_header)?;
    headers.insert(name, value);
    Ok(())
}
