//! Builds a request body out of staged [`BodyItem`]s.
//!
//! The encoding is picked from the items and the `Content-Type` header:
//!
//! - any file part, or a `multipart/form-data` content type: multipart, reusing the
//!   `boundary=` parameter when present and generating one otherwise
//! - `application/json`: a flat JSON object of the key/value items
//! - anything else, including no content type: `application/x-www-form-urlencoded`

use crate::protocol::{BodyItem, SendError, mime_value};
use crate::utils::{percent_encode, random_token};
use bytes::{BufMut, Bytes, BytesMut};
use http::{HeaderMap, HeaderValue, header};
use serde_json::{Map, Value};

const MULTIPART: &str = "multipart/form-data";

pub(crate) fn build_content(headers: &mut HeaderMap, items: &[BodyItem]) -> Result<Bytes, SendError> {
    let content_type = match headers.get(header::CONTENT_TYPE) {
        Some(value) => Some(value.to_str().map_err(SendError::invalid_header)?.to_string()),
        None => None,
    };
    let has_file = items.iter().any(BodyItem::is_file);
    let is_multipart = content_type.as_deref().is_some_and(|ct| ct.starts_with(MULTIPART));

    if has_file || is_multipart {
        let boundary = match content_type.as_deref() {
            Some(ct) if is_multipart => match boundary_of(ct) {
                Some(boundary) => boundary,
                None => set_new_boundary(headers)?,
            },
            Some(ct) => return Err(SendError::file_under_content_type(ct)),
            None => set_new_boundary(headers)?,
        };
        return Ok(multipart(items, &boundary));
    }

    match content_type.as_deref() {
        Some(ct) if ct.starts_with(mime::APPLICATION_JSON.essence_str()) => json(items),
        Some(_) => Ok(form(items)),
        None => {
            headers.insert(header::CONTENT_TYPE, mime_value(&mime::APPLICATION_WWW_FORM_URLENCODED));
            Ok(form(items))
        }
    }
}

fn boundary_of(content_type: &str) -> Option<String> {
    let (_, rest) = content_type.split_once("boundary=")?;
    let boundary = rest.split(';').next().unwrap_or_default().trim().trim_matches('"');
    (!boundary.is_empty()).then(|| boundary.to_string())
}

fn set_new_boundary(headers: &mut HeaderMap) -> Result<String, SendError> {
    let boundary = format!("----micro-wire-{}", random_token(8));
    let value = HeaderValue::from_str(&format!("{MULTIPART}; boundary={boundary}")).map_err(SendError::invalid_header)?;
    headers.insert(header::CONTENT_TYPE, value);
    Ok(boundary)
}

fn multipart(items: &[BodyItem], boundary: &str) -> Bytes {
    let mut buf = BytesMut::new();
    for item in items {
        buf.put_slice(b"--");
        buf.put_slice(boundary.as_bytes());
        buf.put_slice(b"\r\n");
        match item {
            BodyItem::KeyValue { name, value } => {
                buf.put_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
                buf.put_slice(value.as_bytes());
            }
            BodyItem::File { name, filename, content } => {
                buf.put_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n").as_bytes(),
                );
                buf.put_slice(b"Content-Type: application/octet-stream\r\n\r\n");
                buf.put_slice(content);
            }
        }
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(b"--");
    buf.put_slice(boundary.as_bytes());
    buf.put_slice(b"--\r\n");
    buf.freeze()
}

fn json(items: &[BodyItem]) -> Result<Bytes, SendError> {
    let object: Map<String, Value> = items
        .iter()
        .filter_map(|item| match item {
            BodyItem::KeyValue { name, value } => Some((name.clone(), Value::String(value.clone()))),
            BodyItem::File { .. } => None,
        })
        .collect();
    let body = serde_json::to_vec(&object).map_err(SendError::invalid_body)?;
    Ok(Bytes::from(body))
}

fn form(items: &[BodyItem]) -> Bytes {
    let pairs: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            BodyItem::KeyValue { name, value } => Some(format!("{}={}", percent_encode(name), percent_encode(value))),
            BodyItem::File { .. } => None,
        })
        .collect();
    Bytes::from(pairs.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(name: &str, value: &str) -> BodyItem {
        BodyItem::KeyValue { name: name.to_string(), value: value.to_string() }
    }

    fn file(name: &str, filename: &str, content: &'static [u8]) -> BodyItem {
        BodyItem::File { name: name.to_string(), filename: filename.to_string(), content: Bytes::from_static(content) }
    }

    #[test]
    fn test_default_is_form() {
        let mut headers = HeaderMap::new();
        let body = build_content(&mut headers, &[kv("a", "1"), kv("b", "x y&z")]).unwrap();
        assert_eq!(body.as_ref(), b"a=1&b=x+y%26z");
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/x-www-form-urlencoded");
    }

    #[test]
    fn test_json_when_asked() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        let body = build_content(&mut headers, &[kv("b", "2"), kv("a", "1")]).unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn test_file_makes_multipart() {
        let mut headers = HeaderMap::new();
        let body = build_content(&mut headers, &[kv("a", "1"), file("f", "x.txt", b"data")]).unwrap();

        let content_type = headers.get(header::CONTENT_TYPE).unwrap().to_str().unwrap();
        let boundary = boundary_of(content_type).unwrap();
        assert!(boundary.starts_with("----micro-wire-"));

        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.starts_with(&format!("--{boundary}\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n")));
        assert!(body.contains("name=\"f\"; filename=\"x.txt\"\r\n"));
        assert!(body.ends_with(&format!("data\r\n--{boundary}--\r\n")));
    }

    #[test]
    fn test_existing_boundary_is_reused() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("multipart/form-data; boundary=XyZ"));
        let body = build_content(&mut headers, &[kv("a", "1")]).unwrap();
        assert!(body.starts_with(b"--XyZ\r\n"));
    }

    #[test]
    fn test_file_under_other_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let result = build_content(&mut headers, &[file("f", "x.txt", b"data")]);
        assert!(matches!(result, Err(SendError::FileUnderContentType { .. })));
    }
}
