//! Per-request options and pre-serialized bodies.
//!
//! The lowercase builder functions that take a header value return an `Option`: values
//! that are not valid header values are dropped with a warning, and the result can be
//! flattened straight into an option list.

use crate::protocol::{BodyItem, Request, mime_value};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::{HeaderName, HeaderValue, header};
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Everything that can be set on a request before it is sent.
#[derive(Debug, Clone)]
pub enum RequestOption {
    /// Deadline for the whole exchange; zero means none.
    Timeout(Duration),
    /// Connect to this address instead of resolving the URL host.
    Server(String),
    Header(HeaderName, HeaderValue),
    Authorization(HeaderValue),
    Connection(HeaderValue),
    ContentType(HeaderValue),
    Referer(HeaderValue),
    UserAgent(HeaderValue),
    QueryParam(String, String),
    BodyKeyValue(String, String),
    BodyFile { name: String, filename: String, content: Bytes },
}

impl RequestOption {
    pub fn apply(self, request: &mut Request) {
        match self {
            Self::Timeout(timeout) => request.set_timeout(timeout),
            Self::Server(server) => request.set_server(server),
            Self::Header(name, value) => {
                request.headers_mut().insert(name, value);
            }
            Self::Authorization(value) => {
                request.headers_mut().insert(header::AUTHORIZATION, value);
            }
            Self::Connection(value) => {
                request.headers_mut().insert(header::CONNECTION, value);
            }
            Self::ContentType(value) => {
                request.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            Self::Referer(value) => {
                request.headers_mut().insert(header::REFERER, value);
            }
            Self::UserAgent(value) => {
                request.headers_mut().insert(header::USER_AGENT, value);
            }
            Self::QueryParam(key, value) => request.push_query_item(key, value),
            Self::BodyKeyValue(name, value) => request.push_body_item(BodyItem::KeyValue { name, value }),
            Self::BodyFile { name, filename, content } => {
                request.push_body_item(BodyItem::File { name, filename, content });
            }
        }
    }
}

fn header_value(value: &str) -> Option<HeaderValue> {
    match HeaderValue::from_str(value) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(cause = %e, value, "ignore invalid header value");
            None
        }
    }
}

pub fn timeout(timeout: Duration) -> RequestOption {
    RequestOption::Timeout(timeout)
}

pub fn server<S: Into<String>>(server: S) -> RequestOption {
    RequestOption::Server(server.into())
}

pub fn header(name: HeaderName, value: &str) -> Option<RequestOption> {
    header_value(value).map(|value| RequestOption::Header(name, value))
}

pub fn authorization(value: &str) -> Option<RequestOption> {
    header_value(value).map(RequestOption::Authorization)
}

pub fn basic_auth(user: &str, password: &str) -> Option<RequestOption> {
    authorization(&format!("Basic {}", STANDARD.encode(format!("{user}:{password}"))))
}

pub fn connection(value: &str) -> Option<RequestOption> {
    header_value(value).map(RequestOption::Connection)
}

pub fn content_type(mime: &mime::Mime) -> RequestOption {
    RequestOption::ContentType(mime_value(mime))
}

pub fn referer(value: &str) -> Option<RequestOption> {
    header_value(value).map(RequestOption::Referer)
}

pub fn user_agent(value: &str) -> Option<RequestOption> {
    header_value(value).map(RequestOption::UserAgent)
}

pub fn query<K: Into<String>, V: Into<String>>(key: K, value: V) -> RequestOption {
    RequestOption::QueryParam(key.into(), value.into())
}

pub fn body_kv<K: Into<String>, V: Into<String>>(name: K, value: V) -> RequestOption {
    RequestOption::BodyKeyValue(name.into(), value.into())
}

pub fn body_file<N, F, C>(name: N, filename: F, content: C) -> RequestOption
where
    N: Into<String>,
    F: Into<String>,
    C: Into<Bytes>,
{
    RequestOption::BodyFile { name: name.into(), filename: filename.into(), content: content.into() }
}

/// A body serialized by the caller, sent as-is by `post_body`/`put_body`.
#[derive(Debug, Clone)]
pub struct Body {
    content: Bytes,
    content_type: Option<HeaderValue>,
}

impl Body {
    /// Raw bytes. Without a `ContentType` option the type is guessed when sending.
    pub fn raw<B: Into<Bytes>>(content: B) -> Self {
        Self { content: content.into(), content_type: None }
    }

    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let content = serde_json::to_vec(value)?;
        Ok(Self { content: content.into(), content_type: Some(mime_value(&mime::APPLICATION_JSON)) })
    }

    pub fn form<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_urlencoded::ser::Error> {
        let content = serde_urlencoded::to_string(value)?;
        Ok(Self { content: content.into(), content_type: Some(mime_value(&mime::APPLICATION_WWW_FORM_URLENCODED)) })
    }

    pub(crate) fn apply(self, request: &mut Request) {
        if let Some(content_type) = self.content_type
            && !request.headers().contains_key(header::CONTENT_TYPE)
        {
            request.headers_mut().insert(header::CONTENT_TYPE, content_type);
        }
        request.set_content(self.content);
    }
}
