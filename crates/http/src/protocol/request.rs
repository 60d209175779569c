//! The HTTP request model shared by the client and server sides.
//!
//! On the client side a [`Request`] is built from a method and URL, decorated through
//! [`RequestOption`](crate::client::RequestOption)s, and consumed by
//! [`RequestEncoder`](crate::codec::RequestEncoder). Body content can be staged as
//! [`BodyItem`]s; the encoder turns them into a multipart, JSON or urlencoded body
//! the first time the request is serialized.
//!
//! On the server side a [`Request`] is produced by
//! [`RequestDecoder`](crate::codec::RequestDecoder) and may carry the connection it
//! arrived on, so a handler can take the connection over with
//! [`upgrade_websocket`](Request::upgrade_websocket).

use crate::connection::{Conn, MaybeTlsStream};
use crate::protocol::{ParseError, RequestUrl, Scheme};
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, header};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Slot through which the server lends its connection to a request handler.
pub type UpgradeSlot = Arc<Mutex<Option<Conn<MaybeTlsStream>>>>;

/// A body part staged on a request before the final body encoding is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyItem {
    KeyValue { name: String, value: String },
    File { name: String, filename: String, content: Bytes },
}

impl BodyItem {
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }
}

#[derive(Debug)]
pub struct Request {
    method: Method,
    url: String,
    scheme: Scheme,
    url_path: String,
    headers: HeaderMap,
    cookies: BTreeMap<String, String>,
    content: Bytes,
    body_items: Vec<BodyItem>,
    query_items: Vec<(String, String)>,
    timeout: Duration,
    server: Option<String>,
    upgrade_slot: Option<UpgradeSlot>,
    upgraded: bool,
}

impl Request {
    /// Creates a client request. The URL is only validated when the request is sent.
    pub fn new<U: Into<String>>(method: Method, url: U) -> Self {
        let url = url.into();
        let (scheme, url_path) = match RequestUrl::parse(&url) {
            Ok(parsed) => (parsed.target.scheme, parsed.path),
            Err(_) => (Scheme::Http, "/".to_string()),
        };
        Self::with_parts(method, url, scheme, url_path, HeaderMap::new())
    }

    pub(crate) fn with_parts(
        method: Method,
        url: String,
        scheme: Scheme,
        url_path: String,
        headers: HeaderMap,
    ) -> Self {
        Self {
            method,
            url,
            scheme,
            url_path,
            headers,
            cookies: BTreeMap::new(),
            content: Bytes::new(),
            body_items: Vec::new(),
            query_items: Vec::new(),
            timeout: Duration::ZERO,
            server: None,
            upgrade_slot: None,
            upgraded: false,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Path and query as they appear on the request line.
    pub fn url_path(&self) -> &str {
        &self.url_path
    }

    /// Path without the query string.
    pub fn path(&self) -> &str {
        self.url_path.split_once('?').map_or(self.url_path.as_str(), |(path, _)| path)
    }

    pub fn query_str(&self) -> &str {
        self.url_path.split_once('?').map_or("", |(_, query)| query)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Header value as text, `None` when missing or not visible ASCII.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.cookies
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Sets the serialized body. Staged body items are ignored from now on.
    pub fn set_content<B: Into<Bytes>>(&mut self, content: B) {
        self.content = content.into();
    }

    pub fn body_items(&self) -> &[BodyItem] {
        &self.body_items
    }

    pub fn push_body_item(&mut self, item: BodyItem) {
        self.body_items.push(item);
    }

    pub fn query_items(&self) -> &[(String, String)] {
        &self.query_items
    }

    pub fn push_query_item<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.query_items.push((key.into(), value.into()));
    }

    /// Zero means no timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Literal address used instead of resolving the URL host.
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn set_server<S: Into<String>>(&mut self, server: S) {
        self.server = Some(server.into());
    }

    pub fn text(&self) -> Result<&str, ParseError> {
        std::str::from_utf8(&self.content).map_err(ParseError::invalid_body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ParseError> {
        serde_json::from_slice(&self.content).map_err(ParseError::invalid_body)
    }

    pub fn form<T: DeserializeOwned>(&self) -> Result<T, ParseError> {
        serde_urlencoded::from_bytes(&self.content).map_err(ParseError::invalid_body)
    }

    pub fn query<T: DeserializeOwned>(&self) -> Result<T, ParseError> {
        serde_qs::from_str(self.query_str()).map_err(ParseError::invalid_url)
    }

    pub fn is_websocket(&self) -> bool {
        has_token(&self.headers, &header::CONNECTION, "upgrade")
            && self.header(header::SEC_WEBSOCKET_VERSION) == Some("13")
            && self.header(header::SEC_WEBSOCKET_KEY).is_some_and(|key| !key.is_empty())
    }

    pub fn is_upgraded(&self) -> bool {
        self.upgraded
    }

    /// Whether the peer asked to close the connection after this exchange.
    pub fn wants_close(&self) -> bool {
        has_token(&self.headers, &header::CONNECTION, "close")
    }

    pub(crate) fn set_cookies(&mut self, cookies: BTreeMap<String, String>) {
        self.cookies = cookies;
    }

    /// Lends the connection this request arrived on, enabling [`Request::upgrade_websocket`].
    pub fn attach_upgrade_slot(&mut self, slot: UpgradeSlot) {
        self.upgrade_slot = Some(slot);
    }

    pub(crate) fn take_upgrade_conn(&mut self) -> Option<Conn<MaybeTlsStream>> {
        let slot = self.upgrade_slot.as_ref()?;
        slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub(crate) fn mark_upgraded(&mut self) {
        self.upgraded = true;
    }
}

/// Whether a comma separated header contains `token`, compared case-insensitively.
pub(crate) fn has_token(headers: &HeaderMap, name: &header::HeaderName, token: &str) -> bool {
    headers
        .get(name)
        .and_then(|v: &HeaderValue| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
}

/// Parses a `Cookie` header value: `a=1; b=2`.
pub(crate) fn parse_cookies(value: &str) -> BTreeMap<String, String> {
    value
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Paging {
        page: u32,
        size: u32,
    }

    #[test]
    fn test_new_derives_scheme_and_path() {
        let request = Request::new(Method::GET, "https://example.test/a/b?x=1");
        assert_eq!(request.scheme(), Scheme::Https);
        assert_eq!(request.url_path(), "/a/b?x=1");
        assert_eq!(request.path(), "/a/b");
        assert_eq!(request.query_str(), "x=1");
    }

    #[test]
    fn test_query_extract() {
        let request = Request::new(Method::GET, "http://example.test/list?page=2&size=20");
        let paging: Paging = request.query().unwrap();
        assert_eq!(paging, Paging { page: 2, size: 20 });
    }

    #[test]
    fn test_form_and_json_extract() {
        let mut request = Request::new(Method::POST, "http://example.test/");
        request.set_content("page=1&size=5");
        assert_eq!(request.form::<Paging>().unwrap(), Paging { page: 1, size: 5 });

        request.set_content(r#"{"page":3,"size":7}"#);
        assert_eq!(request.json::<Paging>().unwrap(), Paging { page: 3, size: 7 });
        assert!(request.form::<Paging>().is_err());
    }

    #[test]
    fn test_is_websocket() {
        let mut request = Request::new(Method::GET, "http://example.test/ws");
        assert!(!request.is_websocket());

        let headers = request.headers_mut();
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
        assert!(!request.is_websocket());

        request.headers_mut().insert(header::SEC_WEBSOCKET_KEY, HeaderValue::from_static("dGhlIHNhbXBsZSBub25jZQ=="));
        assert!(request.is_websocket());
    }

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies("a=1; b = 2;broken; =x");
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies["a"], "1");
        assert_eq!(cookies["b"], "2");
    }
}
