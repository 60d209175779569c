//! WebSocket frame codec (RFC 6455 base framing).
//!
//! Outgoing frames are always sent whole: FIN is set and fragmentation is never produced.
//! Incoming fragmented messages are reassembled by [`WsConn`](crate::ws::WsConn); this
//! codec only deals in single frames.

use crate::protocol::WsError;
use crate::utils::ensure;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound on the payload of a single incoming frame.
pub const MAX_FRAME_SIZE: u64 = 64 * 1024 * 1024;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const OPCODE_MASK: u8 = 0x0F;
const LEN_MASK: u8 = 0x7F;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WsType {
    Continue = 0,
    Text = 1,
    Binary = 2,
    Close = 8,
    Ping = 9,
    Pong = 10,
}

impl WsType {
    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

impl TryFrom<u8> for WsType {
    type Error = WsError;

    fn try_from(opcode: u8) -> Result<Self, Self::Error> {
        match opcode {
            0 => Ok(Self::Continue),
            1 => Ok(Self::Text),
            2 => Ok(Self::Binary),
            8 => Ok(Self::Close),
            9 => Ok(Self::Ping),
            10 => Ok(Self::Pong),
            opcode => Err(WsError::UnknownOpcode { opcode }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub kind: WsType,
    pub payload: Bytes,
}

impl Frame {
    pub fn new<B: Into<Bytes>>(kind: WsType, payload: B) -> Self {
        Self { fin: true, kind, payload: payload.into() }
    }
}

/// Which end of the connection the codec serves. Clients mask what they send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy)]
pub struct WsCodec {
    role: Role,
    max_frame_size: u64,
}

impl WsCodec {
    pub fn new(role: Role) -> Self {
        Self { role, max_frame_size: MAX_FRAME_SIZE }
    }

    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: u64) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

/// XORs `payload` in place with the 4 byte `mask`.
pub fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

impl Encoder<Frame> for WsCodec {
    type Error = WsError;

    #[allow(clippy::cast_possible_truncation, reason = "length checked against the length-prefix regime")]
    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = frame.payload.len();
        dst.reserve(14 + len);
        let fin_bit = if frame.fin { FIN_BIT } else { 0 };
        dst.put_u8(fin_bit | frame.kind as u8);

        let mask_bit = if self.role == Role::Client { MASK_BIT } else { 0 };
        match len {
            0..=125 => dst.put_u8(mask_bit | len as u8),
            126..=0xFFFF => {
                dst.put_u8(mask_bit | 126);
                dst.put_u16(len as u16);
            }
            _ => {
                dst.put_u8(mask_bit | 127);
                dst.put_u64(len as u64);
            }
        }

        if self.role == Role::Client {
            let mask: [u8; 4] = rand::random();
            dst.put_slice(&mask);
            let start = dst.len();
            dst.put_slice(&frame.payload);
            apply_mask(&mut dst[start..], mask);
        } else {
            dst.put_slice(&frame.payload);
        }
        Ok(())
    }
}

impl Decoder for WsCodec {
    type Item = Frame;
    type Error = WsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 2 {
            return Ok(None);
        }

        let first = src[0];
        let second = src[1];
        let kind = WsType::try_from(first & OPCODE_MASK)?;
        let masked = second & MASK_BIT != 0;

        let (len, mut offset) = match second & LEN_MASK {
            126 => {
                if src.len() < 4 {
                    return Ok(None);
                }
                (u64::from(u16::from_be_bytes([src[2], src[3]])), 4)
            }
            127 => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&src[2..10]);
                (u64::from_be_bytes(raw), 10)
            }
            len => (u64::from(len), 2),
        };
        ensure!(len <= self.max_frame_size, WsError::FrameTooLarge { len, max_len: self.max_frame_size });

        let mask = if masked {
            if src.len() < offset + 4 {
                return Ok(None);
            }
            let mask = [src[offset], src[offset + 1], src[offset + 2], src[offset + 3]];
            offset += 4;
            Some(mask)
        } else {
            None
        };

        let Ok(len) = usize::try_from(len) else {
            return Err(WsError::FrameTooLarge { len, max_len: self.max_frame_size });
        };
        if src.len() < offset + len {
            src.reserve(offset + len - src.len());
            return Ok(None);
        }

        src.advance(offset);
        let mut payload = src.split_to(len);
        if let Some(mask) = mask {
            apply_mask(&mut payload, mask);
        }

        Ok(Some(Frame { fin: first & FIN_BIT != 0, kind, payload: payload.freeze() }))
    }
}
