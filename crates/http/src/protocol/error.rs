use std::io;
use std::time::Duration;
use thiserror::Error;

/// Top level error of a client call, tagged with the phase that failed.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("connection error: {source}")]
    Connection {
        #[from]
        source: ConnError,
    },

    #[error("parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("send error: {source}")]
    Send {
        #[from]
        source: SendError,
    },

    #[error("websocket error: {source}")]
    WebSocket {
        #[from]
        source: WsError,
    },

    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

impl HttpError {
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConnError {
    #[error("resolve host {host} failed: {reason}")]
    Resolve { host: String, reason: String },

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("tls error: {reason}")]
    Tls { reason: String },

    #[error("connection is not open")]
    NotConnected,

    #[error("connection closed by peer")]
    Closed,

    #[error("connection operation cancelled")]
    Cancelled,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ConnError {
    pub fn resolve<H: ToString, R: ToString>(host: H, reason: R) -> Self {
        Self::Resolve { host: host.to_string(), reason: reason.to_string() }
    }

    pub fn connect<A: ToString>(addr: A, source: io::Error) -> Self {
        Self::Connect { addr: addr.to_string(), source }
    }

    pub fn tls<S: ToString>(str: S) -> Self {
        Self::Tls { reason: str.to_string() }
    }

    /// Whether the failure came from the peer going away, as opposed to our side giving up.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed | Self::NotConnected)
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("body size too large, current: {size} exceed the limit {max_size}")]
    TooLargeBody { size: u64, max_size: usize },

    #[error("invalid status line: {line}")]
    InvalidStatusLine { line: String },

    #[error("invalid request line: {line}")]
    InvalidRequestLine { line: String },

    #[error("invalid http method: {method}")]
    InvalidMethod { method: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid url: {url}")]
    InvalidUrl { url: String },

    #[error("unsupported scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("connection error: {source}")]
    Conn {
        #[from]
        source: ConnError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_large_body(size: u64, max_size: usize) -> Self {
        Self::TooLargeBody { size, max_size }
    }

    pub fn invalid_status_line<S: ToString>(str: S) -> Self {
        Self::InvalidStatusLine { line: str.to_string() }
    }

    pub fn invalid_request_line<S: ToString>(str: S) -> Self {
        Self::InvalidRequestLine { line: str.to_string() }
    }

    pub fn invalid_method<S: ToString>(str: S) -> Self {
        Self::InvalidMethod { method: str.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn invalid_url<S: ToString>(str: S) -> Self {
        Self::InvalidUrl { url: str.to_string() }
    }

    pub fn unsupported_scheme<S: ToString>(str: S) -> Self {
        Self::UnsupportedScheme { scheme: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Whether the peer closed the stream before a message started.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Conn { source } if source.is_closed())
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("file parts can not be sent with content-type {content_type}")]
    FileUnderContentType { content_type: String },

    #[error("unsupported content-encoding: {encoding}")]
    UnsupportedEncoding { encoding: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid url: {url}")]
    InvalidUrl { url: String },

    #[error("connection error: {source}")]
    Conn {
        #[from]
        source: ConnError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn file_under_content_type<S: ToString>(str: S) -> Self {
        Self::FileUnderContentType { content_type: str.to_string() }
    }

    pub fn unsupported_encoding<S: ToString>(str: S) -> Self {
        Self::UnsupportedEncoding { encoding: str.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_url<S: ToString>(str: S) -> Self {
        Self::InvalidUrl { url: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum WsError {
    #[error("websocket closed")]
    Closed,

    #[error("request is not a websocket upgrade")]
    NotUpgrade,

    #[error("websocket handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("unknown websocket opcode: {opcode:#x}")]
    UnknownOpcode { opcode: u8 },

    #[error("websocket frame too large: {len} exceed the limit {max_len}")]
    FrameTooLarge { len: u64, max_len: u64 },

    #[error("connection error: {source}")]
    Conn {
        #[from]
        source: ConnError,
    },

    #[error("parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("send error: {source}")]
    Send {
        #[from]
        source: SendError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl WsError {
    pub fn handshake<S: ToString>(str: S) -> Self {
        Self::Handshake { reason: str.to_string() }
    }
}
