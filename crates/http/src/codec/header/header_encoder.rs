use bytes::{BufMut, BytesMut};
use http::HeaderMap;
use std::io;
use std::io::Write;

/// Initial buffer size reserved for a serialized head.
pub(crate) const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Writes every header as `name: value\r\n`, without the terminating blank line.
pub(crate) fn write_headers(headers: &HeaderMap, dst: &mut BytesMut) {
    for (name, value) in headers {
        dst.put_slice(name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(value.as_ref());
        dst.put_slice(b"\r\n");
    }
}

/// [`io::Write`] over a [`BytesMut`], for `write!` of start lines.
pub(crate) struct FastWrite<'a>(pub(crate) &'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
