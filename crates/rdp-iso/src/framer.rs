//! Outbound TPKT/X.224 framing, inbound fast-path/slow-path dispatch, and
//! the connection-negotiation entry point.

use rdp_core::Layer;
use rdp_pdu::fastpath::{detect_frame_length, Action};
use rdp_pdu::nego::{ConnectionConfirm, NegoOutcome, SecurityProtocol};
use rdp_pdu::tpkt::TpktHeader;
use rdp_pdu::x224::{X224Confirm, X224Data, X224Request};
use rdp_transport::{OutputStream, Transport, TransportConfig};
use tracing::{debug, instrument, warn};

use crate::error::{from_pdu, from_transport, protocol_error, IsoError, IsoResult};
use crate::negotiation::{self, NegotiationConfig, Step};

/// Size of the reserved header prefix every outbound data PDU carries:
/// 4-byte TPKT header + 3-byte X.224 DT fixed part (length indicator,
/// code, EOT marker).
pub const RESERVED_PREFIX_LEN: usize = TpktHeader::SIZE + 1 + 2;

/// A frame handed back by [`IsoFramer::recv`], already stripped of its
/// TPKT/X.224 envelope.
#[derive(Debug)]
pub enum Frame {
    FastPath { header: u8, payload: Vec<u8> },
    SlowPath { payload: Vec<u8> },
}

/// Outcome of [`IsoFramer::connect`].
#[derive(Debug)]
pub struct ConnectResult {
    pub selected_protocol: SecurityProtocol,
    pub outcome: NegoOutcome,
    pub extended_client_data_supported: bool,
}

/// Frames outbound data PDUs, parses inbound slow-path/fast-path frames, and
/// drives the connection-setup negotiation state machine. Holds no protocol
/// state of its own beyond the two capability flags negotiation produces.
pub struct IsoFramer {
    transport: Transport,
    extended_client_data_supported: bool,
    encryption_in_use: bool,
}

impl IsoFramer {
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self {
            transport: Transport::new(config),
            extended_client_data_supported: false,
            encryption_in_use: false,
        }
    }

    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    #[must_use]
    pub fn extended_client_data_supported(&self) -> bool {
        self.extended_client_data_supported
    }

    #[must_use]
    pub fn encryption_in_use(&self) -> bool {
        self.encryption_in_use
    }

    /// Runs the full connection-request/confirm round-trip, including the
    /// plain-RDP retry loop and (when selected) the TLS upgrade.
    #[instrument(skip(self, config), fields(server_name))]
    pub fn connect(&mut self, server_name: &str, config: &NegotiationConfig) -> IsoResult<ConnectResult> {
        let mut desired_protocols = config.initial_desired_protocols();

        loop {
            self.transport
                .connect(server_name)
                .map_err(|e| from_transport("connect", e))?;

            self.send_connection_request(config, desired_protocols)?;
            let confirm = self.recv_connection_confirm()?;

            match negotiation::interpret(&confirm) {
                Step::RetryWithPlainRdp => {
                    debug!("server rejected SSL/HYBRID, retrying with plain RDP");
                    desired_protocols = SecurityProtocol::RDP;
                    self.transport.disconnect();
                    continue;
                }
                Step::Fatal(code) => {
                    self.transport.disconnect();
                    return Err(IsoError::new("connect", crate::error::IsoErrorKind::Negotiation(code)));
                }
                Step::Concluded {
                    outcome,
                    extended_client_data_supported,
                } => {
                    self.extended_client_data_supported = extended_client_data_supported;
                    self.encryption_in_use = !config.negotiation_enabled;

                    if matches!(outcome, NegoOutcome::TlsUpgrade) {
                        if let Err(error) = self.transport.tls_upgrade(server_name) {
                            warn!(%error, "TLS handshake failed, falling back to plain RDP");
                            desired_protocols = SecurityProtocol::RDP;
                            self.transport.disconnect();
                            continue;
                        }
                    }

                    let selected_protocol = match confirm {
                        ConnectionConfirm::Response { protocol, .. } => protocol,
                        ConnectionConfirm::Failure { .. } => unreachable!("Concluded only follows a Response"),
                    };

                    return Ok(ConnectResult {
                        selected_protocol,
                        outcome,
                        extended_client_data_supported,
                    });
                }
            }
        }
    }

    fn send_connection_request(&self, config: &NegotiationConfig, desired_protocols: SecurityProtocol) -> IsoResult<()> {
        let request = X224Request(negotiation::build_request(config, desired_protocols));
        let total_len = TpktHeader::SIZE + request.size();
        let packet_length =
            u16::try_from(total_len).map_err(|_| protocol_error("connect", "connection request too large"))?;

        let mut stream = self.transport.init_stream(total_len);
        stream.write_with(total_len, |cursor| {
            TpktHeader::new(packet_length).encode(cursor);
            request.encode(cursor);
        });
        stream.mark_end();
        self.transport.send(stream).map_err(|e| from_transport("connect", e))
    }

    fn recv_connection_confirm(&self) -> IsoResult<ConnectionConfirm> {
        let header = self
            .transport
            .recv_into_input(TpktHeader::SIZE)
            .map_err(|e| from_transport("connect", e))?
            .ok_or_else(|| protocol_error("connect", "peer closed during negotiation"))?;

        let tpkt = TpktHeader::decode(&mut rdp_core::ReadCursor::new(&header)).map_err(|e| from_pdu("connect", e))?;
        let total_len = usize::from(tpkt.packet_length);
        if total_len < TpktHeader::SIZE {
            return Err(protocol_error("connect", "TPKT length shorter than header"));
        }

        let rest = self
            .transport
            .recv_into_input(total_len - TpktHeader::SIZE)
            .map_err(|e| from_transport("connect", e))?
            .ok_or_else(|| protocol_error("connect", "peer closed during negotiation"))?;

        let confirm = X224Confirm::decode(&mut rdp_core::ReadCursor::new(&rest)).map_err(|e| from_pdu("connect", e))?;
        Ok(confirm.0)
    }

    /// Reserves `payload_len + `[`RESERVED_PREFIX_LEN`]` bytes for the caller
    /// to write a data PDU's payload into.
    pub fn init(&self, payload_len: usize) -> OutputStream {
        let mut stream = self.transport.init_stream(payload_len + RESERVED_PREFIX_LEN);
        stream.push_layer(Layer::Iso, RESERVED_PREFIX_LEN);
        stream
    }

    /// Finalizes the TPKT/X.224 header over the region reserved by
    /// [`Self::init`] and hands the frame to the transport.
    #[instrument(skip(self, stream))]
    pub fn send(&self, mut stream: OutputStream) -> IsoResult<()> {
        finalize_data_header(&mut stream)?;
        self.transport.send(stream).map_err(|e| from_transport("send", e))
    }

    /// Reads one inbound frame, distinguishing fast-path from slow-path.
    /// Returns `None` on graceful close or user-requested disconnect.
    #[instrument(skip(self))]
    pub fn recv(&self) -> IsoResult<Option<Frame>> {
        let Some(first) = self.read_bytes(1)? else {
            return Ok(None);
        };

        match Action::from_first_byte(first[0]).map_err(|e| from_pdu("recv", e))? {
            Action::X224 => {
                let Some(rest) = self.read_bytes(3)? else {
                    return Ok(None);
                };
                let mut prefix = first;
                prefix.extend_from_slice(&rest);
                let total_len = detect_frame_length(&prefix)
                    .map_err(|e| from_pdu("recv", e))?
                    .ok_or_else(|| protocol_error("recv", "short TPKT prefix"))?;
                if total_len < prefix.len() {
                    return Err(protocol_error("recv", "TPKT length shorter than header"));
                }

                let Some(body) = self.read_bytes(total_len - prefix.len())? else {
                    return Ok(None);
                };
                let mut cursor = rdp_core::ReadCursor::new(&body);
                let data = X224Data::decode(&mut cursor).map_err(|e| from_pdu("recv", e))?;
                Ok(Some(Frame::SlowPath { payload: data.0.to_vec() }))
            }
            Action::FastPath => {
                let mut prefix = first;
                let Some(second) = self.read_bytes(1)? else {
                    return Ok(None);
                };
                prefix.extend_from_slice(&second);

                if second[0] & 0x80 != 0 {
                    let Some(third) = self.read_bytes(1)? else {
                        return Ok(None);
                    };
                    prefix.extend_from_slice(&third);
                }

                let total_len = detect_frame_length(&prefix)
                    .map_err(|e| from_pdu("recv", e))?
                    .ok_or_else(|| protocol_error("recv", "short fast-path prefix"))?;
                if total_len < prefix.len() {
                    return Err(protocol_error("recv", "fast-path length shorter than header"));
                }

                let Some(payload) = self.read_bytes(total_len - prefix.len())? else {
                    return Ok(None);
                };
                Ok(Some(Frame::FastPath {
                    header: prefix[0],
                    payload,
                }))
            }
        }
    }

    fn read_bytes(&self, n: usize) -> IsoResult<Option<Vec<u8>>> {
        self.transport.recv_into_input(n).map_err(|e| from_transport("recv", e))
    }

    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    pub fn reset_state(&mut self) {
        self.transport.reset_state();
        self.extended_client_data_supported = false;
        self.encryption_in_use = false;
    }
}

/// Rewinds to the [`Layer::Iso`] marker and writes the TPKT + X.224 DT
/// header now that the payload's length is known.
fn finalize_data_header(stream: &mut OutputStream) -> IsoResult<()> {
    stream.mark_end();
    let packet_length = u16::try_from(stream.data().len())
        .map_err(|_| protocol_error("send", "frame too large for a 16-bit TPKT length"))?;

    let mut header = stream.pop_layer(Layer::Iso);
    TpktHeader::new(packet_length).encode(&mut header);
    header.write_u8(2); // X.224 DT header length indicator
    header.write_u8(0xF0); // DT
    header.write_u8(0x80); // EOT

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_prefix_matches_tpkt_plus_x224_dt_header() {
        assert_eq!(RESERVED_PREFIX_LEN, 7);
    }

    #[test]
    fn finalize_data_header_writes_tpkt_and_dt_envelope() {
        let transport = Transport::new(TransportConfig::default());
        let mut stream = transport.init_stream(RESERVED_PREFIX_LEN + 3);
        stream.push_layer(Layer::Iso, RESERVED_PREFIX_LEN);
        stream.write_slice(&[0xAA, 0xBB, 0xCC]);

        finalize_data_header(&mut stream).unwrap();

        assert_eq!(&stream.data()[..4], &[0x03, 0x00, 0x00, 0x0A]);
        assert_eq!(&stream.data()[4..7], &[0x02, 0xF0, 0x80]);
        assert_eq!(&stream.data()[7..], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn frame_parses_fast_path_short_length() {
        // Simulated fast-path bytes: header 0x00 (fast-path, no extra bits),
        // length byte 0x05 (total frame length 5), 3 bytes payload.
        let prefix = [0x00u8, 0x05];
        assert_eq!(Action::from_first_byte(prefix[0]).unwrap(), Action::FastPath);
        assert_eq!(detect_frame_length(&prefix).unwrap(), Some(5));
    }
}
