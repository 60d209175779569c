//! Wire codecs for HTTP/1.1 messages and WebSocket frames.
//!
//! Every codec implements the `tokio_util` [`Decoder`](tokio_util::codec::Decoder) or
//! [`Encoder`](tokio_util::codec::Encoder) traits over a [`BytesMut`](bytes::BytesMut)
//! buffer, so they can be driven by a [`ConnReader`](crate::connection::ConnReader) or
//! wrapped in a `Framed`.
//!
//! - [`RequestEncoder`] / [`ResponseDecoder`]: the client side of an exchange
//! - [`RequestDecoder`] / [`ResponseEncoder`]: the server side of an exchange
//! - [`WsCodec`]: single WebSocket frames, masked when sent by a client
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_wire::codec::ResponseDecoder;
//! use tokio_util::codec::Decoder;
//!
//! let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
//! let response = ResponseDecoder::new().decode(&mut buf).unwrap().unwrap();
//! assert_eq!(response.http_code(), 200);
//! assert_eq!(response.text(), "ok");
//! ```

mod body;
mod header;
mod request_decoder;
mod request_encoder;
mod response_decoder;
mod response_encoder;
mod ws_codec;

pub use body::MAX_BODY_SIZE;
pub use request_decoder::RequestDecoder;
pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;
pub use response_encoder::ResponseEncoder;
pub use ws_codec::{Frame, MAX_FRAME_SIZE, Role, WsCodec, WsType, apply_mask};
