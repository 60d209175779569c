//! HTTP message types and the errors raised while handling them.

mod date;
mod error;
mod request;
mod response;
mod url;

pub use date::http_date;
pub use error::{ConnError, HttpError, ParseError, SendError, WsError};
pub use request::{BodyItem, Request, UpgradeSlot};
pub use response::Response;
pub use url::{RequestUrl, Scheme, Target, parse_method};

pub(crate) use request::{has_token, parse_cookies};

use http::HeaderValue;

pub(crate) fn mime_value(mime: &mime::Mime) -> HeaderValue {
    HeaderValue::from_str(mime.as_ref()).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}
