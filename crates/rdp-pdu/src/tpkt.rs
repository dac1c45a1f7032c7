//! T.123 TPKT header: a fixed 4-byte prefix carried by every frame on the
//! wire, slow-path or fast-path alike.
//!
//! ```text
//!  byte 1: version (always 3)
//!  byte 2: reserved (0)
//!  byte 3-4: packet_length, big-endian, header included
//! ```

use rdp_core::{ReadCursor, WriteCursor};

use crate::error::{not_enough_bytes, unsupported_value, PduResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpktHeader {
    pub packet_length: u16,
}

impl TpktHeader {
    pub const VERSION: u8 = 3;
    pub const SIZE: usize = 4;

    #[must_use]
    pub const fn new(packet_length: u16) -> Self {
        Self { packet_length }
    }

    pub fn decode(src: &mut ReadCursor<'_>) -> PduResult<Self> {
        if src.len() < Self::SIZE {
            return Err(not_enough_bytes(
                "TpktHeader",
                rdp_error::NotEnoughBytesError::new(src.len(), Self::SIZE),
            ));
        }

        let version = src.read_u8();
        if version != Self::VERSION {
            return Err(unsupported_value("TpktHeader", "TPKT version", u32::from(version)));
        }
        let _reserved = src.read_u8();
        let packet_length = src.read_u16_be();

        Ok(Self { packet_length })
    }

    pub fn encode(&self, dst: &mut WriteCursor<'_>) {
        dst.write_u8(Self::VERSION);
        dst.write_u8(0);
        dst.write_u16_be(self.packet_length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let header = TpktHeader::new(19);
        let mut buf = [0u8; TpktHeader::SIZE];
        header.encode(&mut WriteCursor::new(&mut buf));
        assert_eq!(buf, [0x03, 0x00, 0x00, 0x13]);

        let decoded = TpktHeader::decode(&mut ReadCursor::new(&buf)).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn rejects_unknown_version() {
        let buf = [0x02, 0x00, 0x00, 0x07];
        assert!(TpktHeader::decode(&mut ReadCursor::new(&buf)).is_err());
    }
}
