//! Server side request parsing.
//!
//! The decoder works in two phases. The head is split off the buffer once the blank line
//! has arrived, and a [`Request`] is built from it; the body is then collected according
//! to the framing the headers announce. A request is yielded only once its body is
//! complete, so callers never see a half-read request.

use crate::codec::body::{BodyFraming, BodyReader, MAX_BODY_SIZE, decode_content};
use crate::codec::header::{parse_head, take_head};
use crate::protocol::{ParseError, Request, Scheme, has_token, parse_cookies, parse_method};
use crate::utils::ensure;
use bytes::BytesMut;
use http::{HeaderMap, header};
use tokio_util::codec::Decoder;
use tracing::trace;

/// Decodes requests arriving on a listening socket.
#[derive(Debug)]
pub struct RequestDecoder {
    listen_port: u16,
    secure: bool,
    max_body_size: usize,
    pending: Option<(Request, BodyReader)>,
}

impl RequestDecoder {
    /// `listen_port` and `secure` describe the socket the requests arrive on; they are
    /// used to rebuild each request's absolute URL.
    pub fn new(listen_port: u16, secure: bool) -> Self {
        Self { listen_port, secure, max_body_size: MAX_BODY_SIZE, pending: None }
    }

    /// Bodies larger than `max_body_size` after content decoding are rejected.
    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    fn decode_head(&self, src: &mut BytesMut) -> Result<Option<Request>, ParseError> {
        let Some(raw) = take_head(src)? else {
            return Ok(None);
        };
        let head = parse_head(&raw)?;

        let mut parts = head.start_line.split_whitespace();
        let (Some(method), Some(path), Some(version), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::invalid_request_line(&head.start_line));
        };
        ensure!(version.starts_with("HTTP/1."), ParseError::invalid_request_line(&head.start_line));
        ensure!(path.starts_with('/'), ParseError::invalid_request_line(&head.start_line));
        let method = parse_method(method)?;

        let mut scheme = if self.secure { Scheme::Https } else { Scheme::Http };
        if has_token(&head.headers, &header::CONNECTION, "upgrade") {
            scheme = scheme.upgraded();
        }
        let url = self.absolute_url(scheme, &head.headers, path);

        let cookies = head.headers.get(header::COOKIE).and_then(|v| v.to_str().ok()).map(parse_cookies);
        let mut request = Request::with_parts(method, url, scheme, path.to_string(), head.headers);
        if let Some(cookies) = cookies {
            request.set_cookies(cookies);
        }

        trace!(method = %request.method(), url = request.url(), "decoded request head");
        Ok(Some(request))
    }

    fn absolute_url(&self, scheme: Scheme, headers: &HeaderMap, path: &str) -> String {
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(strip_port)
            .filter(|host| !host.is_empty())
            .unwrap_or("localhost");

        if scheme.default_port() == Some(self.listen_port) {
            format!("{scheme}://{host}{path}")
        } else {
            format!("{scheme}://{host}:{}{path}", self.listen_port)
        }
    }
}

fn strip_port(host: &str) -> &str {
    let host = host.trim();
    if host.starts_with('[') {
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    host.split_once(':').map_or(host, |(name, _)| name)
}

impl Decoder for RequestDecoder {
    type Item = Request;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.pending.is_none() {
            let Some(request) = self.decode_head(src)? else {
                return Ok(None);
            };
            let framing = BodyFraming::from_headers(request.headers())?;
            self.pending = Some((request, BodyReader::new(framing, self.max_body_size)?));
        }

        let Some((_, reader)) = self.pending.as_mut() else {
            return Ok(None);
        };
        let Some(body) = reader.decode(src)? else {
            return Ok(None);
        };

        let Some((mut request, _)) = self.pending.take() else {
            return Ok(None);
        };
        let content = decode_content(request.headers(), body, self.max_body_size)?;
        request.set_content(content);
        Ok(Some(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RequestEncoder;
    use crate::protocol::BodyItem;
    use http::{HeaderValue, Method};
    use indoc::indoc;
    use std::collections::HashMap;
    use tokio_util::codec::Encoder;

    fn decode_all(decoder: &mut RequestDecoder, text: &str) -> Result<Option<Request>, ParseError> {
        let mut buf = BytesMut::from(text);
        decoder.decode(&mut buf)
    }

    #[test]
    fn test_get_request() {
        let text = indoc! {r##"
        GET /index.html?x=1 HTTP/1.1
        Host: example.test:8080
        Cookie: a=1; b=2
        Accept: */*

        "##};

        let mut decoder = RequestDecoder::new(8080, false);
        let request = decode_all(&mut decoder, text).unwrap().unwrap();

        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.scheme(), Scheme::Http);
        assert_eq!(request.url(), "http://example.test:8080/index.html?x=1");
        assert_eq!(request.path(), "/index.html");
        assert_eq!(request.query_str(), "x=1");
        assert_eq!(request.cookies().get("b").map(String::as_str), Some("2"));
        assert!(request.content().is_empty());
    }

    #[test]
    fn test_encoded_request_decodes_back() {
        let mut sent = Request::new(Method::POST, "http://example.test:8080/submit?lang=en");
        sent.headers_mut().insert("x-trace", HeaderValue::from_static("abc"));
        sent.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from_static("999"));
        sent.push_body_item(BodyItem::KeyValue { name: "user".to_string(), value: "zoe".to_string() });
        sent.push_body_item(BodyItem::KeyValue { name: "tries".to_string(), value: "3".to_string() });

        let mut buf = BytesMut::new();
        RequestEncoder.encode(&mut sent, &mut buf).unwrap();
        let received = RequestDecoder::new(8080, false).decode(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());

        assert_eq!(received.method(), &Method::POST);
        assert_eq!(received.url(), "http://example.test:8080/submit?lang=en");
        assert_eq!(received.path(), "/submit");
        assert_eq!(received.query_str(), "lang=en");
        assert_eq!(received.header("x-trace"), Some("abc"));
        assert_eq!(received.header(header::HOST), Some("example.test:8080"));
        assert_eq!(received.header(header::CONTENT_LENGTH), Some("16"));
        assert_eq!(received.text().unwrap(), "user=zoe&tries=3");

        let form: HashMap<String, String> = received.form().unwrap();
        assert_eq!(form.get("user").map(String::as_str), Some("zoe"));
        assert_eq!(form.get("tries").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_encoded_get_decodes_back() {
        let mut sent = Request::new(Method::GET, "http://example.test/");
        sent.headers_mut().insert(header::ACCEPT, HeaderValue::from_static("text/plain"));

        let mut buf = BytesMut::new();
        RequestEncoder.encode(&mut sent, &mut buf).unwrap();
        let received = RequestDecoder::new(80, false).decode(&mut buf).unwrap().unwrap();

        assert_eq!(received.method(), &Method::GET);
        assert_eq!(received.url(), "http://example.test/");
        assert_eq!(received.header(header::ACCEPT), Some("text/plain"));
        assert!(received.header(header::CONTENT_LENGTH).is_none());
        assert!(received.content().is_empty());
    }

    #[test]
    fn test_default_port_is_omitted() {
        let text = "GET / HTTP/1.1\r\nHost: example.test:443\r\n\r\n";
        let mut decoder = RequestDecoder::new(443, true);
        let request = decode_all(&mut decoder, text).unwrap().unwrap();
        assert_eq!(request.url(), "https://example.test/");
    }

    #[test]
    fn test_upgrade_scheme() {
        let text = indoc! {r##"
        GET /chat HTTP/1.1
        Host: example.test
        Connection: keep-alive, Upgrade
        Upgrade: websocket
        Sec-WebSocket-Version: 13
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==

        "##};

        let mut decoder = RequestDecoder::new(80, false);
        let request = decode_all(&mut decoder, text).unwrap().unwrap();
        assert_eq!(request.scheme(), Scheme::Ws);
        assert_eq!(request.url(), "ws://example.test/chat");
        assert!(request.is_websocket());
    }

    #[test]
    fn test_body_arrives_in_pieces() {
        let mut decoder = RequestDecoder::new(80, false);
        let mut buf = BytesMut::from("POST /submit HTTP/1.1\r\nContent-Length: 7\r\n\r\na=1");
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"&b=2GET / HTTP/1.1\r\n\r\n");
        let request = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.url(), "http://localhost/submit");
        assert_eq!(request.content().as_ref(), b"a=1&b=2");

        let next = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(next.method(), &Method::GET);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_chunked_body() {
        let text = "PUT /f HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n";
        let mut decoder = RequestDecoder::new(80, false);
        let request = decode_all(&mut decoder, text).unwrap().unwrap();
        assert_eq!(request.content().as_ref(), b"abcde");
    }

    #[test]
    fn test_invalid_request_lines() {
        for line in ["PATCH / HTTP/1.1", "GET index HTTP/1.1", "GET / SPDY/3", "GET /"] {
            let mut decoder = RequestDecoder::new(80, false);
            let result = decode_all(&mut decoder, &format!("{line}\r\n\r\n"));
            assert!(result.is_err(), "{line} should be rejected");
        }
    }

    #[test]
    fn test_ipv6_host() {
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
        assert_eq!(strip_port("example.test"), "example.test");
    }
}
