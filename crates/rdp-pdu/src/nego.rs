//! RDP_NEG_REQ / RDP_NEG_RSP / RDP_NEG_FAILURE — the security-protocol
//! negotiation payload carried inside the X.224 Connection Request/Confirm
//! variable part (MS-RDPBCGR 2.2.1.1.1 / 2.2.1.2.1).

use std::fmt;

use bitflags::bitflags;
use rdp_core::{ReadCursor, WriteCursor};

use crate::error::{not_enough_bytes, unexpected_message_type, PduResult};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SecurityProtocol: u32 {
        const RDP = 0x0000_0000;
        const SSL = 0x0000_0001;
        const HYBRID = 0x0000_0002;
        const RDSTLS = 0x0000_0004;
        const HYBRID_EX = 0x0000_0008;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct RequestFlags: u8 {
        const RESTRICTED_ADMIN_MODE_REQUIRED = 0x01;
        const REDIRECTED_AUTHENTICATION_MODE_REQUIRED = 0x02;
        const CORRELATION_INFO_PRESENT = 0x08;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ResponseFlags: u8 {
        const EXTENDED_CLIENT_DATA_SUPPORTED = 0x01;
        const DYNVC_GFX_PROTOCOL_SUPPORTED = 0x02;
        const RESTRICTED_ADMIN_MODE_SUPPORTED = 0x08;
        const REDIRECTED_AUTHENTICATION_MODE_SUPPORTED = 0x10;
    }
}

/// `RDP_NEG_FAILURE::failureCode`, MS-RDPBCGR 2.2.1.2.2.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FailureCode(u32);

impl FailureCode {
    pub const SSL_REQUIRED_BY_SERVER: Self = Self(1);
    pub const SSL_NOT_ALLOWED_BY_SERVER: Self = Self(2);
    pub const SSL_CERT_NOT_ON_SERVER: Self = Self(3);
    pub const INCONSISTENT_FLAGS: Self = Self(4);
    pub const HYBRID_REQUIRED_BY_SERVER: Self = Self(5);
    pub const SSL_WITH_USER_AUTH_REQUIRED_BY_SERVER: Self = Self(6);

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for FailureCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<FailureCode> for u32 {
    fn from(value: FailureCode) -> Self {
        value.0
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::SSL_REQUIRED_BY_SERVER => "SSL_REQUIRED_BY_SERVER",
            Self::SSL_NOT_ALLOWED_BY_SERVER => "SSL_NOT_ALLOWED_BY_SERVER",
            Self::SSL_CERT_NOT_ON_SERVER => "SSL_CERT_NOT_ON_SERVER",
            Self::INCONSISTENT_FLAGS => "INCONSISTENT_FLAGS",
            Self::HYBRID_REQUIRED_BY_SERVER => "HYBRID_REQUIRED_BY_SERVER",
            Self::SSL_WITH_USER_AUTH_REQUIRED_BY_SERVER => "SSL_WITH_USER_AUTH_REQUIRED_BY_SERVER",
            _ => return write!(f, "unknown failure code {}", self.0),
        };
        f.write_str(name)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct NegoMsgType(u8);

impl NegoMsgType {
    const REQUEST: Self = Self(0x01);
    const RESPONSE: Self = Self(0x02);
    const FAILURE: Self = Self(0x03);
}

const RDP_NEG_SIZE: u16 = 8;

/// `Cookie: mstshash=<value>\r\n`, the only negotiation-request variable-part
/// field this client ever sends (routing tokens are a server-farm load
/// balancing feature, out of scope here).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie(pub String);

impl Cookie {
    const PREFIX: &'static str = "Cookie: mstshash=";

    #[must_use]
    pub fn size(&self) -> usize {
        Self::PREFIX.len() + self.0.len() + 2
    }

    pub fn encode(&self, dst: &mut WriteCursor<'_>) {
        dst.write_slice(Self::PREFIX.as_bytes());
        dst.write_slice(self.0.as_bytes());
        dst.write_slice(b"\r\n");
    }

    pub fn decode(src: &mut ReadCursor<'_>) -> Option<Self> {
        if src.len() < Self::PREFIX.len() + 2 {
            return None;
        }
        if src.peek_slice(Self::PREFIX.len()) != Self::PREFIX.as_bytes() {
            return None;
        }
        src.advance(Self::PREFIX.len());

        let terminator = src.remaining().windows(2).position(|w| w == b"\r\n")?;
        let value = String::from_utf8_lossy(src.peek_slice(terminator)).into_owned();
        src.advance(terminator + 2);

        Some(Self(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub cookie: Option<Cookie>,
    pub flags: RequestFlags,
    pub protocol: SecurityProtocol,
}

impl ConnectionRequest {
    #[must_use]
    pub fn variable_part_size(&self) -> usize {
        let cookie_len = self.cookie.as_ref().map_or(0, Cookie::size);
        let nego_len = if self.protocol == SecurityProtocol::RDP {
            0
        } else {
            usize::from(RDP_NEG_SIZE)
        };
        cookie_len + nego_len
    }

    pub fn encode(&self, dst: &mut WriteCursor<'_>) {
        if let Some(cookie) = &self.cookie {
            cookie.encode(dst);
        }
        if self.protocol != SecurityProtocol::RDP {
            dst.write_u8(NegoMsgType::REQUEST.0);
            dst.write_u8(self.flags.bits());
            dst.write_u16(RDP_NEG_SIZE);
            dst.write_u32(self.protocol.bits());
        }
    }

    pub fn decode(src: &mut ReadCursor<'_>, variable_part_size: usize) -> PduResult<Self> {
        if src.len() < variable_part_size {
            return Err(not_enough_bytes(
                "ConnectionRequest",
                rdp_error::NotEnoughBytesError::new(src.len(), variable_part_size),
            ));
        }

        let cookie = Cookie::decode(src);
        let consumed = cookie.as_ref().map_or(0, Cookie::size);
        let rest = variable_part_size - consumed;

        if rest >= usize::from(RDP_NEG_SIZE) {
            let msg_type = NegoMsgType(src.read_u8());
            if msg_type != NegoMsgType::REQUEST {
                return Err(unexpected_message_type("ConnectionRequest", msg_type.0));
            }
            let flags = RequestFlags::from_bits_truncate(src.read_u8());
            let _length = src.read_u16();
            let protocol = SecurityProtocol::from_bits_truncate(src.read_u32());
            Ok(Self { cookie, flags, protocol })
        } else {
            Ok(Self {
                cookie,
                flags: RequestFlags::empty(),
                protocol: SecurityProtocol::RDP,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionConfirm {
    Response { flags: ResponseFlags, protocol: SecurityProtocol },
    Failure { code: FailureCode },
}

impl ConnectionConfirm {
    #[must_use]
    pub fn variable_part_size(&self) -> usize {
        usize::from(RDP_NEG_SIZE)
    }

    pub fn encode(&self, dst: &mut WriteCursor<'_>) {
        match self {
            Self::Response { flags, protocol } => {
                dst.write_u8(NegoMsgType::RESPONSE.0);
                dst.write_u8(flags.bits());
                dst.write_u16(RDP_NEG_SIZE);
                dst.write_u32(protocol.bits());
            }
            Self::Failure { code } => {
                dst.write_u8(NegoMsgType::FAILURE.0);
                dst.write_u8(0);
                dst.write_u16(RDP_NEG_SIZE);
                dst.write_u32((*code).into());
            }
        }
    }

    pub fn decode(src: &mut ReadCursor<'_>, variable_part_size: usize) -> PduResult<Self> {
        if variable_part_size == 0 {
            return Ok(Self::Response {
                flags: ResponseFlags::empty(),
                protocol: SecurityProtocol::RDP,
            });
        }

        if src.len() < usize::from(RDP_NEG_SIZE) {
            return Err(not_enough_bytes(
                "ConnectionConfirm",
                rdp_error::NotEnoughBytesError::new(src.len(), usize::from(RDP_NEG_SIZE)),
            ));
        }

        match NegoMsgType(src.read_u8()) {
            NegoMsgType::RESPONSE => {
                let flags = ResponseFlags::from_bits_truncate(src.read_u8());
                let _length = src.read_u16();
                let protocol = SecurityProtocol::from_bits_truncate(src.read_u32());
                Ok(Self::Response { flags, protocol })
            }
            NegoMsgType::FAILURE => {
                let _flags = src.read_u8();
                let _length = src.read_u16();
                let code = FailureCode::from(src.read_u32());
                Ok(Self::Failure { code })
            }
            other => Err(unexpected_message_type("ConnectionConfirm", other.0)),
        }
    }
}

#[derive(Debug)]
pub enum NegoOutcome {
    PlainRdp,
    TlsUpgrade,
    CredsspHandoff,
}

impl ConnectionConfirm {
    #[must_use]
    pub fn outcome(&self) -> Result<NegoOutcome, &'static str> {
        match self {
            Self::Response {
                protocol: SecurityProtocol::RDP,
                ..
            } => Ok(NegoOutcome::PlainRdp),
            Self::Response { protocol, .. } if protocol.contains(SecurityProtocol::SSL) => Ok(NegoOutcome::TlsUpgrade),
            Self::Response { protocol, .. } if protocol.contains(SecurityProtocol::HYBRID) => {
                Ok(NegoOutcome::CredsspHandoff)
            }
            Self::Response { .. } => Err("negotiated protocol not supported by this core"),
            Self::Failure { .. } => Err("server refused negotiation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_with_cookie_and_protocol() {
        let req = ConnectionRequest {
            cookie: Some(Cookie("USER".to_owned())),
            flags: RequestFlags::empty(),
            protocol: SecurityProtocol::SSL | SecurityProtocol::HYBRID,
        };
        let size = req.variable_part_size();
        let mut buf = vec![0u8; size];
        req.encode(&mut WriteCursor::new(&mut buf));

        let decoded = ConnectionRequest::decode(&mut ReadCursor::new(&buf), size).unwrap();
        assert_eq!(decoded.protocol, req.protocol);
    }

    #[test]
    fn confirm_response_round_trips() {
        let confirm = ConnectionConfirm::Response {
            flags: ResponseFlags::EXTENDED_CLIENT_DATA_SUPPORTED,
            protocol: SecurityProtocol::HYBRID,
        };
        let mut buf = vec![0u8; confirm.variable_part_size()];
        confirm.encode(&mut WriteCursor::new(&mut buf));
        let decoded = ConnectionConfirm::decode(&mut ReadCursor::new(&buf), buf.len()).unwrap();
        assert_eq!(decoded, confirm);
    }

    #[test]
    fn confirm_failure_round_trips() {
        let confirm = ConnectionConfirm::Failure {
            code: FailureCode::HYBRID_REQUIRED_BY_SERVER,
        };
        let mut buf = vec![0u8; confirm.variable_part_size()];
        confirm.encode(&mut WriteCursor::new(&mut buf));
        let decoded = ConnectionConfirm::decode(&mut ReadCursor::new(&buf), buf.len()).unwrap();
        assert_eq!(decoded, confirm);
    }
}
