//! MS-RDPEDYC wire PDUs: the one-byte command header plus the five PDU
//! shapes a dynamic virtual channel client needs to send and parse
//! (capabilities, create, close, data, data-first).

use rdp_core::{ReadCursor, WriteCursor};

use crate::error::{invalid_message, not_enough_bytes, unexpected_message_type, PduResult};

pub type DynamicChannelId = u32;

/// The 2-bit field-width tag used for `cbId` and (on `DATA_FIRST`) `Sp`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldType {
    U8,
    U16,
    U32,
}

impl FieldType {
    #[must_use]
    pub fn for_value(value: u32) -> Self {
        if value <= u32::from(u8::MAX) {
            Self::U8
        } else if value <= u32::from(u16::MAX) {
            Self::U16
        } else {
            Self::U32
        }
    }

    #[must_use]
    pub fn size_of_val(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// `Sp` on `DATA_FIRST` only ever encodes a 2- or 4-byte total-length
    /// prefix (MS-RDPEDYC 2.2.3.1); `U8` is not a valid width for it.
    #[must_use]
    pub fn for_length_prefix(value: u32) -> Self {
        if value <= u32::from(u16::MAX) {
            Self::U16
        } else {
            Self::U32
        }
    }

    fn from_bits(bits: u8) -> PduResult<Self> {
        match bits {
            0x00 => Ok(Self::U8),
            0x01 => Ok(Self::U16),
            0x02 => Ok(Self::U32),
            _ => Err(invalid_message("FieldType", "bits", "reserved value 0x03 is not a valid field width")),
        }
    }

    const fn to_bits(self) -> u8 {
        match self {
            Self::U8 => 0x00,
            Self::U16 => 0x01,
            Self::U32 => 0x02,
        }
    }

    fn decode_val(self, src: &mut ReadCursor<'_>) -> PduResult<u32> {
        if src.len() < self.size_of_val() {
            return Err(not_enough_bytes(
                "FieldType",
                rdp_error::NotEnoughBytesError::new(src.len(), self.size_of_val()),
            ));
        }
        Ok(match self {
            Self::U8 => u32::from(src.read_u8()),
            Self::U16 => u32::from(src.read_u16()),
            Self::U32 => src.read_u32(),
        })
    }

    fn encode_val(self, value: u32, dst: &mut WriteCursor<'_>) {
        match self {
            Self::U8 => dst.write_u8(value as u8),
            Self::U16 => dst.write_u16(value as u16),
            Self::U32 => dst.write_u32(value),
        }
    }
}

/// Commands carried in the high nibble of the DVC header byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cmd {
    Create,
    DataFirst,
    Data,
    Close,
    Capability,
    DataFirstCompressed,
    DataCompressed,
    SoftSyncRequest,
    SoftSyncResponse,
}

impl Cmd {
    fn from_bits(bits: u8) -> PduResult<Self> {
        Ok(match bits {
            0x01 => Self::Create,
            0x02 => Self::DataFirst,
            0x03 => Self::Data,
            0x04 => Self::Close,
            0x05 => Self::Capability,
            0x06 => Self::DataFirstCompressed,
            0x07 => Self::DataCompressed,
            0x08 => Self::SoftSyncRequest,
            0x09 => Self::SoftSyncResponse,
            other => return Err(unexpected_message_type("Cmd", other)),
        })
    }

    const fn to_bits(self) -> u8 {
        match self {
            Self::Create => 0x01,
            Self::DataFirst => 0x02,
            Self::Data => 0x03,
            Self::Close => 0x04,
            Self::Capability => 0x05,
            Self::DataFirstCompressed => 0x06,
            Self::DataCompressed => 0x07,
            Self::SoftSyncRequest => 0x08,
            Self::SoftSyncResponse => 0x09,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub cb_id: FieldType,
    pub sp: FieldType,
    pub cmd: Cmd,
}

impl Header {
    pub const SIZE: usize = 1;

    #[must_use]
    pub fn new(cb_id_val: u32, sp_val: u32, cmd: Cmd) -> Self {
        Self {
            cb_id: FieldType::for_value(cb_id_val),
            sp: FieldType::for_value(sp_val),
            cmd,
        }
    }

    pub fn encode(&self, dst: &mut WriteCursor<'_>) {
        dst.write_u8((self.cmd.to_bits() << 4) | (self.sp.to_bits() << 2) | self.cb_id.to_bits());
    }

    pub fn decode(src: &mut ReadCursor<'_>) -> PduResult<Self> {
        if src.len() < Self::SIZE {
            return Err(not_enough_bytes("Header", rdp_error::NotEnoughBytesError::new(src.len(), Self::SIZE)));
        }
        let byte = src.read_u8();
        let cmd = Cmd::from_bits(byte >> 4)?;
        let sp = FieldType::from_bits((byte >> 2) & 0b11)?;
        let cb_id = FieldType::from_bits(byte & 0b11)?;
        Ok(Self { cb_id, sp, cmd })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CreateRequestPdu {
    pub channel_id: DynamicChannelId,
    pub channel_name: String,
}

impl CreateRequestPdu {
    pub fn decode(header: Header, src: &mut ReadCursor<'_>) -> PduResult<Self> {
        let channel_id = header.cb_id.decode_val(src)?;
        let name_bytes = src.read_remaining();
        let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let channel_name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();
        Ok(Self { channel_id, channel_name })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CreationStatus(pub u32);

impl CreationStatus {
    pub const OK: Self = Self(0x0000_0000);
    pub const NO_LISTENER: Self = Self(0xC000_0001);
}

#[derive(Debug, PartialEq, Eq)]
pub struct CreateResponsePdu {
    pub channel_id: DynamicChannelId,
    /// The `cbId` width negotiated at `CREATE_REQ` time (MS-RDPEDYC requires
    /// `CREATE_RSP` to echo the same encoding the request used).
    pub width: FieldType,
    pub creation_status: CreationStatus,
}

impl CreateResponsePdu {
    #[must_use]
    pub fn new(channel_id: DynamicChannelId, width: FieldType, creation_status: CreationStatus) -> Self {
        Self { channel_id, width, creation_status }
    }

    pub fn encode(&self, dst: &mut WriteCursor<'_>) {
        let header = Header { cb_id: self.width, sp: FieldType::U8, cmd: Cmd::Create };
        header.encode(dst);
        self.width.encode_val(self.channel_id, dst);
        dst.write_u32(self.creation_status.0);
    }

    #[must_use]
    pub fn size(&self) -> usize {
        Header::SIZE + self.width.size_of_val() + 4
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ClosePdu {
    pub channel_id: DynamicChannelId,
    pub width: FieldType,
}

impl ClosePdu {
    #[must_use]
    pub fn new(channel_id: DynamicChannelId, width: FieldType) -> Self {
        Self { channel_id, width }
    }

    pub fn decode(header: Header, src: &mut ReadCursor<'_>) -> PduResult<Self> {
        let channel_id = header.cb_id.decode_val(src)?;
        Ok(Self { channel_id, width: header.cb_id })
    }

    pub fn encode(&self, dst: &mut WriteCursor<'_>) {
        let header = Header { cb_id: self.width, sp: FieldType::U8, cmd: Cmd::Close };
        header.encode(dst);
        self.width.encode_val(self.channel_id, dst);
    }

    #[must_use]
    pub fn size(&self) -> usize {
        Header::SIZE + self.width.size_of_val()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DataPdu {
    pub channel_id: DynamicChannelId,
    pub width: FieldType,
    pub data: Vec<u8>,
}

impl DataPdu {
    #[must_use]
    pub fn new(channel_id: DynamicChannelId, width: FieldType, data: Vec<u8>) -> Self {
        Self { channel_id, width, data }
    }

    pub fn decode(header: Header, src: &mut ReadCursor<'_>) -> PduResult<Self> {
        let channel_id = header.cb_id.decode_val(src)?;
        Ok(Self {
            channel_id,
            width: header.cb_id,
            data: src.read_remaining().to_vec(),
        })
    }

    pub fn encode(&self, dst: &mut WriteCursor<'_>) {
        let header = Header { cb_id: self.width, sp: FieldType::U8, cmd: Cmd::Data };
        header.encode(dst);
        self.width.encode_val(self.channel_id, dst);
        dst.write_slice(&self.data);
    }

    #[must_use]
    pub fn size(&self) -> usize {
        Header::SIZE + self.width.size_of_val() + self.data.len()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct DataFirstPdu {
    pub channel_id: DynamicChannelId,
    pub width: FieldType,
    pub total_length: u32,
    pub data: Vec<u8>,
}

impl DataFirstPdu {
    #[must_use]
    pub fn new(channel_id: DynamicChannelId, width: FieldType, total_length: u32, data: Vec<u8>) -> Self {
        Self {
            channel_id,
            width,
            total_length,
            data,
        }
    }

    pub fn decode(header: Header, src: &mut ReadCursor<'_>) -> PduResult<Self> {
        if header.sp == FieldType::U8 {
            return Err(invalid_message(
                "DataFirstPdu",
                "Sp",
                "a 1-byte total-length prefix is not representable (MS-RDPEDYC 2.2.3.1)",
            ));
        }
        let channel_id = header.cb_id.decode_val(src)?;
        let total_length = header.sp.decode_val(src)?;
        Ok(Self {
            channel_id,
            width: header.cb_id,
            total_length,
            data: src.read_remaining().to_vec(),
        })
    }

    pub fn encode(&self, dst: &mut WriteCursor<'_>) {
        let cb_id = self.width;
        let sp = FieldType::for_length_prefix(self.total_length);
        let header = Header { cb_id, sp, cmd: Cmd::DataFirst };
        header.encode(dst);
        cb_id.encode_val(self.channel_id, dst);
        sp.encode_val(self.total_length, dst);
        dst.write_slice(&self.data);
    }

    #[must_use]
    pub fn size(&self) -> usize {
        Header::SIZE
            + self.width.size_of_val()
            + FieldType::for_length_prefix(self.total_length).size_of_val()
            + self.data.len()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum CapsVersion {
    V1 = 0x0001,
}

impl CapsVersion {
    const SIZE: usize = 2;

    fn decode(value: u16) -> PduResult<Self> {
        match value {
            0x0001 => Ok(Self::V1),
            other => Err(crate::error::unsupported_value("CapsVersion", "version", u32::from(other))),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CapabilitiesRequestPdu {
    pub version: CapsVersion,
}

impl CapabilitiesRequestPdu {
    pub fn decode(_header: Header, src: &mut ReadCursor<'_>) -> PduResult<Self> {
        if src.len() < 1 + CapsVersion::SIZE {
            return Err(not_enough_bytes(
                "CapabilitiesRequestPdu",
                rdp_error::NotEnoughBytesError::new(src.len(), 1 + CapsVersion::SIZE),
            ));
        }
        let _pad = src.read_u8();
        let version = CapsVersion::decode(src.read_u16())?;
        Ok(Self { version })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CapabilitiesResponsePdu {
    pub version: CapsVersion,
}

impl CapabilitiesResponsePdu {
    #[must_use]
    pub fn new(version: CapsVersion) -> Self {
        Self { version }
    }

    pub fn encode(&self, dst: &mut WriteCursor<'_>) {
        let header = Header::new(0, 0, Cmd::Capability);
        header.encode(dst);
        dst.write_u8(0x00);
        dst.write_u16(self.version as u16);
    }

    #[must_use]
    pub fn size(&self) -> usize {
        Header::SIZE + 1 + CapsVersion::SIZE
    }
}

/// A fully decoded DVC PDU arriving from the server.
#[derive(Debug, PartialEq, Eq)]
pub enum ServerPdu {
    Capabilities(CapabilitiesRequestPdu),
    Create(CreateRequestPdu),
    Close(ClosePdu),
    Data(DataPdu),
    DataFirst(DataFirstPdu),
    /// Recognized but intentionally dropped (compressed/soft-sync variants).
    Ignored(Cmd),
}

impl ServerPdu {
    pub fn decode(src: &mut ReadCursor<'_>) -> PduResult<Self> {
        let header = Header::decode(src)?;
        Ok(match header.cmd {
            Cmd::Create => Self::Create(CreateRequestPdu::decode(header, src)?),
            Cmd::DataFirst => Self::DataFirst(DataFirstPdu::decode(header, src)?),
            Cmd::Data => Self::Data(DataPdu::decode(header, src)?),
            Cmd::Close => Self::Close(ClosePdu::decode(header, src)?),
            Cmd::Capability => Self::Capabilities(CapabilitiesRequestPdu::decode(header, src)?),
            other @ (Cmd::DataFirstCompressed | Cmd::DataCompressed | Cmd::SoftSyncRequest | Cmd::SoftSyncResponse) => {
                Self::Ignored(other)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_response_round_trips() {
        let pdu = CreateResponsePdu::new(3, FieldType::U8, CreationStatus::OK);
        let mut buf = vec![0u8; pdu.size()];
        pdu.encode(&mut WriteCursor::new(&mut buf));

        let mut src = ReadCursor::new(&buf);
        let header = Header::decode(&mut src).unwrap();
        assert_eq!(header.cmd, Cmd::Create);
        let channel_id = header.cb_id.decode_val(&mut src).unwrap();
        let status = src.read_u32();
        assert_eq!(channel_id, 3);
        assert_eq!(status, CreationStatus::OK.0);
    }

    #[test]
    fn data_first_then_data_share_channel_id() {
        let first = DataFirstPdu::new(7, FieldType::U8, 10, vec![1, 2, 3]);
        let mut buf = vec![0u8; first.size()];
        first.encode(&mut WriteCursor::new(&mut buf));

        let mut src = ReadCursor::new(&buf);
        let parsed = ServerPdu::decode(&mut src).unwrap();
        match parsed {
            ServerPdu::DataFirst(pdu) => {
                assert_eq!(pdu.channel_id, 7);
                assert_eq!(pdu.total_length, 10);
                assert_eq!(pdu.data, vec![1, 2, 3]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn data_first_with_u8_sp_is_rejected() {
        let header = Header { cb_id: FieldType::U8, sp: FieldType::U8, cmd: Cmd::DataFirst };
        let payload = [0u8; 4];
        let mut src = ReadCursor::new(&payload);
        assert!(DataFirstPdu::decode(header, &mut src).is_err());
    }

    #[test]
    fn create_request_reads_null_terminated_name() {
        let mut payload = Vec::new();
        payload.push(5u8); // channel id, U8
        payload.extend_from_slice(b"EXAMPLE\0");
        let header = Header::new(5, 0, Cmd::Create);
        let mut src = ReadCursor::new(&payload);
        let req = CreateRequestPdu::decode(header, &mut src).unwrap();
        assert_eq!(req.channel_id, 5);
        assert_eq!(req.channel_name, "EXAMPLE");
    }
}
