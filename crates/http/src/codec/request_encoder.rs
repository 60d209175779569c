//! Serializes a client [`Request`] into HTTP/1.1 wire format.

use crate::codec::body::build_content;
use crate::codec::header::{FastWrite, INIT_HEADER_SIZE, write_headers};
use crate::protocol::{Request, RequestUrl, SendError, mime_value};
use crate::utils::percent_encode;
use bytes::{BufMut, BytesMut};
use http::{HeaderValue, header};
use std::io::Write;
use tokio_util::codec::Encoder;
use tracing::trace;

/// Encoder for client requests.
///
/// Encoding mutates the request: a missing `Host` header is filled in, cookies become a
/// `Cookie` header, and staged body items are rendered into the content once. A request
/// whose content is already set is never re-rendered, so encoding it twice yields the
/// same body.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestEncoder;

impl Encoder<&mut Request> for RequestEncoder {
    type Error = SendError;

    fn encode(&mut self, request: &mut Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let url = RequestUrl::parse(request.url()).map_err(SendError::invalid_url)?;
        let path = append_query(&url.path, request.query_items());

        if request.content().is_empty() && !request.body_items().is_empty() {
            let items = request.body_items().to_vec();
            let content = build_content(request.headers_mut(), &items)?;
            request.set_content(content);
        }

        let host = url.target.host_header();
        let cookie = (!request.cookies().is_empty()).then(|| {
            request.cookies().iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("; ")
        });
        let content_len = request.content().len();
        let looks_like_json = request.content().first() == Some(&b'{');

        let headers = request.headers_mut();
        if !headers.contains_key(header::HOST) {
            headers.insert(header::HOST, HeaderValue::from_str(&host).map_err(SendError::invalid_header)?);
        }
        if let Some(cookie) = cookie
            && !headers.contains_key(header::COOKIE)
        {
            headers.insert(header::COOKIE, HeaderValue::from_str(&cookie).map_err(SendError::invalid_header)?);
        }
        if content_len > 0 {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_len));
            if !headers.contains_key(header::CONTENT_TYPE) {
                let mime = if looks_like_json { mime::APPLICATION_JSON } else { mime::APPLICATION_WWW_FORM_URLENCODED };
                headers.insert(header::CONTENT_TYPE, mime_value(&mime));
            }
        }

        dst.reserve(INIT_HEADER_SIZE + content_len);
        write!(FastWrite(dst), "{} {} HTTP/1.1\r\n", request.method(), path)?;
        write_headers(request.headers(), dst);
        dst.put_slice(b"\r\n");
        dst.put_slice(request.content());

        trace!(method = %request.method(), path, len = content_len, "encoded request");
        Ok(())
    }
}

fn append_query(path: &str, items: &[(String, String)]) -> String {
    if items.is_empty() {
        return path.to_string();
    }

    let query: Vec<String> = items.iter().map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v))).collect();
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{}", query.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BodyItem;
    use http::Method;

    fn encode(request: &mut Request) -> String {
        let mut buf = BytesMut::new();
        RequestEncoder.encode(request, &mut buf).unwrap();
        String::from_utf8(buf.to_vec()).unwrap()
    }

    #[test]
    fn test_get_without_body() {
        let mut request = Request::new(Method::GET, "http://example.test/hello");
        let wire = encode(&mut request);

        assert!(wire.starts_with("GET /hello HTTP/1.1\r\n"));
        assert!(wire.contains("host: example.test\r\n"));
        assert!(!wire.contains("content-length"));
        assert!(wire.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_post_form_items() {
        let mut request = Request::new(Method::POST, "http://example.test/submit");
        request.push_body_item(BodyItem::KeyValue { name: "a".to_string(), value: "1".to_string() });
        request.push_body_item(BodyItem::KeyValue { name: "b".to_string(), value: "2".to_string() });
        let wire = encode(&mut request);

        assert!(wire.contains("content-type: application/x-www-form-urlencoded\r\n"));
        assert!(wire.contains("content-length: 7\r\n"));
        assert!(wire.ends_with("\r\n\r\na=1&b=2"));
    }

    #[test]
    fn test_content_is_built_once() {
        let mut request = Request::new(Method::POST, "http://example.test/");
        request.push_body_item(BodyItem::KeyValue { name: "a".to_string(), value: "1".to_string() });
        let first = encode(&mut request);

        request.push_body_item(BodyItem::KeyValue { name: "b".to_string(), value: "2".to_string() });
        let second = encode(&mut request);
        assert_eq!(first, second);
    }

    #[test]
    fn test_raw_json_content_type_guess() {
        let mut request = Request::new(Method::PUT, "http://example.test/");
        request.set_content(r#"{"a":1}"#);
        let wire = encode(&mut request);
        assert!(wire.starts_with("PUT / HTTP/1.1\r\n"));
        assert!(wire.contains("content-type: application/json\r\n"));
    }

    #[test]
    fn test_query_cookies_and_port() {
        let mut request = Request::new(Method::OPTIONS, "http://example.test:8080/list?x=1");
        request.push_query_item("q", "a b");
        request.cookies_mut().insert("sid".to_string(), "42".to_string());
        request.cookies_mut().insert("lang".to_string(), "en".to_string());
        let wire = encode(&mut request);

        assert!(wire.starts_with("OPTIONS /list?x=1&q=a+b HTTP/1.1\r\n"));
        assert!(wire.contains("host: example.test:8080\r\n"));
        assert!(wire.contains("cookie: lang=en; sid=42\r\n"));
    }

    #[test]
    fn test_invalid_url() {
        let mut request = Request::new(Method::GET, "ftp://example.test/");
        let mut buf = BytesMut::new();
        assert!(matches!(RequestEncoder.encode(&mut request, &mut buf), Err(SendError::InvalidUrl { .. })));
    }
}
