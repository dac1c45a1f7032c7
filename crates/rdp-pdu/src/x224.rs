//! X.224 Connection Request / Connection Confirm / Data TPDUs.
//!
//! Each TPDU starts with a length indicator (the byte count of the header
//! that follows, excluding itself and the user data), then a TPDU code in
//! the high nibble of the next byte.

use rdp_core::{ReadCursor, WriteCursor};

use crate::error::{invalid_message, not_enough_bytes, unexpected_message_type, PduResult};
use crate::nego::{ConnectionConfirm, ConnectionRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpduCode(u8);

impl TpduCode {
    pub const CONNECTION_REQUEST: Self = Self(0xE0);
    pub const CONNECTION_CONFIRM: Self = Self(0xD0);
    pub const DATA: Self = Self(0xF0);

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// Fixed part of a CR/CC TPDU header after the length indicator: code (1),
/// dst-ref (2), src-ref (2), class option (1).
const CRCC_FIXED_PART_SIZE: usize = 6;

/// DT TPDU header after the length indicator: code (1), eot (1).
const DT_FIXED_PART_SIZE: usize = 2;
const DT_EOT: u8 = 0x80;

pub struct X224Request(pub ConnectionRequest);

impl X224Request {
    pub fn encode(&self, dst: &mut WriteCursor<'_>) {
        let li = CRCC_FIXED_PART_SIZE + self.0.variable_part_size();
        dst.write_u8(li as u8);
        dst.write_u8(TpduCode::CONNECTION_REQUEST.0);
        dst.write_u16_be(0); // dst-ref
        dst.write_u16_be(0); // src-ref
        dst.write_u8(0); // class option
        self.0.encode(dst);
    }

    #[must_use]
    pub fn size(&self) -> usize {
        1 + CRCC_FIXED_PART_SIZE + self.0.variable_part_size()
    }

    pub fn decode(src: &mut ReadCursor<'_>) -> PduResult<Self> {
        let (code, variable_part_size) = decode_crcc_header(src, "X224Request")?;
        if code != TpduCode::CONNECTION_REQUEST {
            return Err(unexpected_message_type("X224Request", code.0));
        }
        Ok(Self(ConnectionRequest::decode(src, variable_part_size)?))
    }
}

pub struct X224Confirm(pub ConnectionConfirm);

impl X224Confirm {
    pub fn encode(&self, dst: &mut WriteCursor<'_>) {
        let li = CRCC_FIXED_PART_SIZE + self.0.variable_part_size();
        dst.write_u8(li as u8);
        dst.write_u8(TpduCode::CONNECTION_CONFIRM.0);
        dst.write_u16_be(0);
        dst.write_u16_be(0);
        dst.write_u8(0);
        self.0.encode(dst);
    }

    #[must_use]
    pub fn size(&self) -> usize {
        1 + CRCC_FIXED_PART_SIZE + self.0.variable_part_size()
    }

    pub fn decode(src: &mut ReadCursor<'_>) -> PduResult<Self> {
        let (code, variable_part_size) = decode_crcc_header(src, "X224Confirm")?;
        if code != TpduCode::CONNECTION_CONFIRM {
            return Err(unexpected_message_type("X224Confirm", code.0));
        }
        Ok(Self(ConnectionConfirm::decode(src, variable_part_size)?))
    }
}

fn decode_crcc_header(src: &mut ReadCursor<'_>, context: &'static str) -> PduResult<(TpduCode, usize)> {
    if src.len() < 1 + CRCC_FIXED_PART_SIZE {
        return Err(not_enough_bytes(
            context,
            rdp_error::NotEnoughBytesError::new(src.len(), 1 + CRCC_FIXED_PART_SIZE),
        ));
    }

    let li = usize::from(src.read_u8());
    let code = TpduCode(src.read_u8() & 0xF0);
    let _dst_ref = src.read_u16_be();
    let _src_ref = src.read_u16_be();
    let _class_option = src.read_u8();

    let variable_part_size = li
        .checked_sub(CRCC_FIXED_PART_SIZE)
        .ok_or_else(|| invalid_message(context, "length indicator", "shorter than fixed part"))?;

    Ok((code, variable_part_size))
}

/// A Data TPDU wrapping an opaque upper-layer payload (MCS and above, which
/// this core treats as an uninterpreted byte string it never parses).
pub struct X224Data<'a>(pub &'a [u8]);

impl<'a> X224Data<'a> {
    pub fn encode(&self, dst: &mut WriteCursor<'_>) {
        dst.write_u8(DT_FIXED_PART_SIZE as u8);
        dst.write_u8(TpduCode::DATA.0);
        dst.write_u8(DT_EOT);
        dst.write_slice(self.0);
    }

    #[must_use]
    pub fn size(&self) -> usize {
        1 + DT_FIXED_PART_SIZE + self.0.len()
    }

    pub fn decode(src: &mut ReadCursor<'a>) -> PduResult<Self> {
        if src.len() < 1 + DT_FIXED_PART_SIZE {
            return Err(not_enough_bytes(
                "X224Data",
                rdp_error::NotEnoughBytesError::new(src.len(), 1 + DT_FIXED_PART_SIZE),
            ));
        }
        let li = usize::from(src.read_u8());
        let code = TpduCode(src.read_u8() & 0xF0);
        if code != TpduCode::DATA {
            return Err(unexpected_message_type("X224Data", code.0));
        }
        let _eot = src.read_u8();
        let _ = li;
        Ok(Self(src.read_remaining()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nego::{Cookie, RequestFlags, SecurityProtocol};

    #[test]
    fn request_round_trips() {
        let req = X224Request(ConnectionRequest {
            cookie: Some(Cookie("A".to_owned())),
            flags: RequestFlags::empty(),
            protocol: SecurityProtocol::HYBRID,
        });
        let mut buf = vec![0u8; req.size()];
        req.encode(&mut WriteCursor::new(&mut buf));

        let decoded = X224Request::decode(&mut ReadCursor::new(&buf)).unwrap();
        assert_eq!(decoded.0.protocol, SecurityProtocol::HYBRID);
    }

    #[test]
    fn data_tpdu_round_trips() {
        let payload = [1u8, 2, 3, 4];
        let data = X224Data(&payload);
        let mut buf = vec![0u8; data.size()];
        data.encode(&mut WriteCursor::new(&mut buf));

        let mut cursor = ReadCursor::new(&buf);
        let decoded = X224Data::decode(&mut cursor).unwrap();
        assert_eq!(decoded.0, &payload);
    }
}
