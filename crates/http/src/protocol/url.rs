//! URL and method handling shared by the client and server sides.

use crate::protocol::ParseError;
use http::{Method, Uri};
use std::fmt;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    Ws,
    Wss,
    Tcp,
}

impl Scheme {
    pub fn parse(scheme: &str) -> Result<Self, ParseError> {
        match scheme.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "ws" => Ok(Self::Ws),
            "wss" => Ok(Self::Wss),
            "tcp" => Ok(Self::Tcp),
            _ => Err(ParseError::unsupported_scheme(scheme)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Ws => "ws",
            Self::Wss => "wss",
            Self::Tcp => "tcp",
        }
    }

    pub fn is_secure(self) -> bool {
        matches!(self, Self::Https | Self::Wss)
    }

    /// `None` for raw tcp, which has no well-known port.
    pub fn default_port(self) -> Option<u16> {
        match self {
            Self::Http | Self::Ws => Some(80),
            Self::Https | Self::Wss => Some(443),
            Self::Tcp => None,
        }
    }

    /// The websocket counterpart of an http scheme.
    pub fn upgraded(self) -> Self {
        match self {
            Self::Http => Self::Ws,
            Self::Https => Self::Wss,
            other => other,
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a connection goes: the `scheme://host:port` part of a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Key used by a session to decide whether a held connection can be reused.
    pub fn flag(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Value of the `Host` header, the port is left out when it is the scheme default.
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') { format!("[{}]", self.host) } else { self.host.clone() };
        if self.scheme.default_port() == Some(self.port) { host } else { format!("{host}:{}", self.port) }
    }
}

/// A parsed request URL: connection target plus the path (with query) sent on the request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUrl {
    pub target: Target,
    pub path: String,
}

impl RequestUrl {
    /// Parses `url`, assuming `http://` when no scheme is given and `/` when no path is given.
    pub fn parse(url: &str) -> Result<Self, ParseError> {
        let full = if url.contains("://") { url.to_string() } else { format!("http://{url}") };
        let uri = full.parse::<Uri>().map_err(|e| ParseError::invalid_url(format!("{url} ({e})")))?;

        let scheme = Scheme::parse(uri.scheme_str().unwrap_or("http"))?;
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| ParseError::invalid_url(url))?;
        let port = uri.port_u16().or(scheme.default_port()).ok_or_else(|| ParseError::invalid_url(url))?;
        let path = match uri.path_and_query() {
            Some(pq) if !pq.as_str().is_empty() => {
                let pq = pq.as_str();
                if pq.starts_with('/') { pq.to_string() } else { format!("/{pq}") }
            }
            _ => "/".to_string(),
        };

        Ok(Self { target: Target { scheme, host, port }, path })
    }
}

/// Parses a request-line method token. Only the six methods the server dispatches are accepted;
/// the legacy `OPTION` spelling is read as `OPTIONS`.
pub fn parse_method(token: &str) -> Result<Method, ParseError> {
    match token {
        "HEAD" => Ok(Method::HEAD),
        "OPTIONS" | "OPTION" => Ok(Method::OPTIONS),
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        _ => Err(ParseError::invalid_method(token)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let url = RequestUrl::parse("example.test").unwrap();
        assert_eq!(url.target.scheme, Scheme::Http);
        assert_eq!(url.target.host, "example.test");
        assert_eq!(url.target.port, 80);
        assert_eq!(url.path, "/");
    }

    #[test]
    fn test_parse_full() {
        let url = RequestUrl::parse("wss://example.test:8443/chat?room=1").unwrap();
        assert_eq!(url.target.scheme, Scheme::Wss);
        assert_eq!(url.target.port, 8443);
        assert_eq!(url.path, "/chat?room=1");
        assert_eq!(url.target.flag(), "wss://example.test:8443");
        assert_eq!(url.target.host_header(), "example.test:8443");
    }

    #[test]
    fn test_parse_https_default_port() {
        let url = RequestUrl::parse("https://example.test/a").unwrap();
        assert_eq!(url.target.port, 443);
        assert_eq!(url.target.host_header(), "example.test");
    }

    #[test]
    fn test_tcp_requires_port() {
        assert!(RequestUrl::parse("tcp://127.0.0.1").is_err());
        let url = RequestUrl::parse("tcp://127.0.0.1:9000").unwrap();
        assert_eq!(url.target.port, 9000);
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(matches!(RequestUrl::parse("ftp://example.test"), Err(ParseError::UnsupportedScheme { .. })));
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("OPTION").unwrap(), Method::OPTIONS);
        assert_eq!(parse_method("DELETE").unwrap(), Method::DELETE);
        assert!(parse_method("PATCH").is_err());
        assert!(parse_method("get").is_err());
    }
}
