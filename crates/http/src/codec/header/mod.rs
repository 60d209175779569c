//! Message head handling: start line plus header block.
//!
//! Decoding is line oriented: the head ends at the first blank line, each header line is
//! trimmed of spaces, full-width spaces and `\r`, then split on its first `:`. Encoding
//! writes headers in map iteration order through [`FastWrite`].

mod header_decoder;
mod header_encoder;

pub(crate) use header_decoder::{Head, MAX_HEADER_SIZE, parse_head, take_head};
pub(crate) use header_encoder::{FastWrite, INIT_HEADER_SIZE, write_headers};
