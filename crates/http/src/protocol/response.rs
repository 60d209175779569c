//! The HTTP response model.
//!
//! A response without a status is the "nothing produced" marker: the server dispatcher
//! uses it to tell that a route did not handle a request. [`Response::http_code`] reports
//! such a response as `-1`.

use crate::protocol::date::http_date;
use crate::protocol::mime_value;
use crate::ws::accept_key;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use serde::Serialize;

const SERVER_NAME: HeaderValue = HeaderValue::from_static(concat!("micro-wire/", env!("CARGO_PKG_VERSION")));

#[derive(Debug, Clone, Default)]
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    content: Bytes,
}

impl Response {
    /// A response with no status, headers or body.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_status(status: StatusCode) -> Self {
        let mut response = Self { status: Some(status), headers: HeaderMap::new(), content: Bytes::new() };
        response.init_default_headers();
        response
    }

    pub fn from_text<T: Into<String>>(text: T) -> Self {
        let mut response = Self::from_status(StatusCode::OK);
        response.headers.insert(header::CONTENT_TYPE, mime_value(&mime::TEXT_PLAIN_UTF_8));
        response.content = Bytes::from(text.into());
        response
    }

    pub fn from_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        let mut response = Self::from_status(StatusCode::OK);
        response.headers.insert(header::CONTENT_TYPE, mime_value(&mime::APPLICATION_JSON));
        response.content = Bytes::from(body);
        Ok(response)
    }

    pub fn from_not_found() -> Self {
        let mut response = Self::from_text("404 Not Found");
        response.status = Some(StatusCode::NOT_FOUND);
        response
    }

    /// The `101 Switching Protocols` answer to a websocket upgrade carrying `key`.
    pub fn from_upgrade_websocket(key: &str) -> Self {
        let mut response = Self::from_status(StatusCode::SWITCHING_PROTOCOLS);
        let headers = &mut response.headers;
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        if let Ok(accept) = HeaderValue::from_str(&accept_key(key)) {
            headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
        }
        response
    }

    fn init_default_headers(&mut self) {
        self.headers.insert(header::SERVER, SERVER_NAME);
        self.headers.insert(header::DATE, http_date());
    }

    pub(crate) fn from_parts(status: StatusCode, headers: HeaderMap, content: Bytes) -> Self {
        Self { status: Some(status), headers, content }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: Option<StatusCode>) {
        self.status = status;
    }

    /// Numeric status, `-1` when no response was produced.
    pub fn http_code(&self) -> i32 {
        self.status.map_or(-1, |s| i32::from(s.as_u16()))
    }

    pub fn is_handled(&self) -> bool {
        self.status.is_some()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn set_content<B: Into<Bytes>>(&mut self, content: B) {
        self.content = content.into();
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.content)
    }
}
