//! Top-level dynamic-channel dispatch: decodes one inbound DVC PDU, updates
//! listener/channel state, and returns whatever outbound PDUs (control
//! replies, or a listener's own segmented reply traffic) should be sent
//! back in response.

use rdp_core::{ReadCursor, WriteCursor};
use rdp_pdu::dvc::{
    CapabilitiesRequestPdu, CapabilitiesResponsePdu, Cmd, ClosePdu, CreateRequestPdu, CreateResponsePdu,
    CreationStatus, DataFirstPdu, DataPdu, DynamicChannelId, FieldType, Header,
};
use tracing::{debug, warn};

use crate::channels::{ChannelSet, DvcListener};
use crate::error::{from_pdu, protocol_error, DvcResult};
use crate::outbound;

/// Owns the channel/listener registry and turns inbound wire bytes into
/// listener callbacks and outbound wire bytes.
#[derive(Default)]
pub struct Multiplexer {
    channels: ChannelSet,
}

impl Multiplexer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_listener(&mut self, name: impl Into<String>, handler: Box<dyn DvcListener>) -> DvcResult<()> {
        self.channels.init_listener(name, handler)
    }

    /// Decodes one inbound DVC PDU and returns the outbound PDUs (control
    /// replies and/or a listener's reply traffic) it produced.
    ///
    /// Unresolved channel ids and unknown-but-recognized commands are logged
    /// and dropped rather than treated as fatal.
    pub fn handle_pdu(&mut self, frame: &[u8]) -> DvcResult<Vec<Vec<u8>>> {
        let mut src = ReadCursor::new(frame);
        let header = Header::decode(&mut src).map_err(|e| from_pdu("dvc_recv", e))?;

        match header.cmd {
            Cmd::Capability => self.handle_capabilities(header, &mut src),
            Cmd::Create => self.handle_create(header, &mut src),
            Cmd::Close => self.handle_close(header, &mut src),
            Cmd::Data => self.handle_data(header, &mut src),
            Cmd::DataFirst => self.handle_data_first(header, &mut src),
            Cmd::DataFirstCompressed | Cmd::DataCompressed | Cmd::SoftSyncRequest | Cmd::SoftSyncResponse => {
                debug!(cmd = ?header.cmd, "recognized but unsupported DVC command, dropping");
                Ok(Vec::new())
            }
        }
    }

    fn handle_capabilities(&mut self, header: Header, src: &mut ReadCursor<'_>) -> DvcResult<Vec<Vec<u8>>> {
        if header.cb_id != FieldType::U8 {
            return Err(protocol_error("dvc_recv", "CAPS_REQ cbId must be 0"));
        }
        let request = CapabilitiesRequestPdu::decode(header, src).map_err(|e| from_pdu("dvc_recv", e))?;
        let response = CapabilitiesResponsePdu::new(request.version);
        Ok(vec![encode(response.size(), |dst| response.encode(dst))])
    }

    fn handle_create(&mut self, header: Header, src: &mut ReadCursor<'_>) -> DvcResult<Vec<Vec<u8>>> {
        let request = CreateRequestPdu::decode(header, src).map_err(|e| from_pdu("dvc_recv", e))?;

        let (status, start_messages) = match self.channels.bind(&request.channel_name, request.channel_id, header.cb_id) {
            Some(start_messages) => (CreationStatus::OK, start_messages),
            None => {
                warn!(name = %request.channel_name, "CREATE_REQ for an unknown or already-bound listener");
                (CreationStatus::NO_LISTENER, Vec::new())
            }
        };

        let response = CreateResponsePdu::new(request.channel_id, header.cb_id, status);
        let mut out = vec![encode(response.size(), |dst| response.encode(dst))];
        for message in start_messages {
            out.extend(outbound::write_pkt(request.channel_id, header.cb_id, &message));
        }
        Ok(out)
    }

    fn handle_close(&mut self, header: Header, src: &mut ReadCursor<'_>) -> DvcResult<Vec<Vec<u8>>> {
        let request = ClosePdu::decode(header, src).map_err(|e| from_pdu("dvc_recv", e))?;
        self.channels.unbind(request.channel_id);

        let reply = ClosePdu::new(request.channel_id, request.width);
        Ok(vec![encode(reply.size(), |dst| reply.encode(dst))])
    }

    fn handle_data(&mut self, header: Header, src: &mut ReadCursor<'_>) -> DvcResult<Vec<Vec<u8>>> {
        let request = DataPdu::decode(header, src).map_err(|e| from_pdu("dvc_recv", e))?;
        self.check_width(request.channel_id, header.cb_id)?;

        let Some(complete) = self
            .channels
            .reassembly_mut(request.channel_id)
            .and_then(|r| r.process_data(&request.data))
        else {
            return Ok(Vec::new());
        };
        self.dispatch_complete_payload(request.channel_id, &complete)
    }

    fn handle_data_first(&mut self, header: Header, src: &mut ReadCursor<'_>) -> DvcResult<Vec<Vec<u8>>> {
        let request = DataFirstPdu::decode(header, src).map_err(|e| from_pdu("dvc_recv", e))?;
        self.check_width(request.channel_id, header.cb_id)?;

        let Some(complete) = self
            .channels
            .reassembly_mut(request.channel_id)
            .and_then(|r| r.process_data_first(request.total_length as usize, request.data))
        else {
            return Ok(Vec::new());
        };
        self.dispatch_complete_payload(request.channel_id, &complete)
    }

    fn check_width(&self, channel_id: DynamicChannelId, observed: FieldType) -> DvcResult<()> {
        match self.channels.width_of(channel_id) {
            Some(cached) if cached != observed => {
                Err(protocol_error("dvc_recv", "channel id width changed after CREATE"))
            }
            _ => Ok(()),
        }
    }

    fn dispatch_complete_payload(&mut self, channel_id: DynamicChannelId, payload: &[u8]) -> DvcResult<Vec<Vec<u8>>> {
        let Some(replies) = self.channels.dispatch(channel_id, payload) else {
            debug!(channel_id, "DVC payload for an unbound channel id, dropping");
            return Ok(Vec::new());
        };

        let width = self
            .channels
            .width_of(channel_id)
            .unwrap_or_else(|| unreachable!("a dispatchable channel always has a cached width"));

        let mut out = Vec::new();
        for reply in replies {
            out.extend(outbound::write_pkt(channel_id, width, &reply));
        }
        Ok(out)
    }
}

fn encode(size: usize, write: impl FnOnce(&mut WriteCursor<'_>)) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    write(&mut WriteCursor::new(&mut buf));
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl DvcListener for Echo {
        fn process(&mut self, _channel_id: DynamicChannelId, payload: &[u8]) -> Vec<Vec<u8>> {
            vec![payload.to_vec()]
        }
    }

    /// Builds a `CREATE_REQ` for a channel id that fits in a single byte, so
    /// the reply can be decoded without needing the crate-private
    /// field-width codec `rdp-pdu` keeps for its own direction (client only
    /// ever decodes `CREATE_REQ`, never encodes one).
    fn create_req_bytes(channel_id: u8, name: &str) -> Vec<u8> {
        let mut buf = vec![0x10, channel_id]; // Cmd::Create, sp=U8, cb_id=U8
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        buf
    }

    #[test]
    fn create_request_binds_listener_and_replies_ok() {
        let mut mux = Multiplexer::new();
        mux.init_listener("cliprdr", Box::new(Echo)).unwrap();

        let replies = mux.handle_pdu(&create_req_bytes(7, "cliprdr")).unwrap();
        assert_eq!(replies.len(), 1);

        let mut src = ReadCursor::new(&replies[0]);
        let header = Header::decode(&mut src).unwrap();
        assert_eq!(header.cmd, Cmd::Create);
        let channel_id = src.read_u8();
        let status = src.read_u32();
        assert_eq!(channel_id, 7);
        assert_eq!(status, CreationStatus::OK.0);
    }

    #[test]
    fn create_request_for_unknown_name_reports_no_listener() {
        let mut mux = Multiplexer::new();
        let replies = mux.handle_pdu(&create_req_bytes(3, "nope")).unwrap();

        let mut src = ReadCursor::new(&replies[0]);
        let _header = Header::decode(&mut src).unwrap();
        let _channel_id = src.read_u8();
        let status = src.read_u32();
        assert_eq!(status, CreationStatus::NO_LISTENER.0);
    }

    #[test]
    fn data_for_unbound_channel_is_dropped_without_error() {
        let mut mux = Multiplexer::new();
        let data = DataPdu::new(99, FieldType::U8, vec![1, 2, 3]);
        let mut buf = vec![0u8; data.size()];
        data.encode(&mut WriteCursor::new(&mut buf));

        let replies = mux.handle_pdu(&buf).unwrap();
        assert!(replies.is_empty());
    }
}
