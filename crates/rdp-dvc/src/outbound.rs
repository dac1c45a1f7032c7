//! Segments an outbound channel payload into `DATA`/`DATA_FIRST` PDUs no
//! larger than [`MAX_PDU`], the way a listener's writes eventually reach
//! the wire.

use rdp_core::WriteCursor;
use rdp_pdu::dvc::{DataFirstPdu, DataPdu, DynamicChannelId, FieldType};

/// Largest on-wire DVC PDU this core ever produces.
pub const MAX_PDU: usize = 1600;
/// Largest payload that fits in a single unfragmented `DATA` PDU, leaving
/// room for the worst-case (5-byte) header.
pub const MAX_SINGLE_DATA_PAYLOAD: usize = 1590;

/// Splits `payload` into one or more fully encoded DVC PDUs, each ready to
/// be handed to the channel-transport layer as-is.
#[must_use]
pub fn write_pkt(channel_id: DynamicChannelId, width: FieldType, payload: &[u8]) -> Vec<Vec<u8>> {
    if payload.len() <= MAX_SINGLE_DATA_PAYLOAD {
        return vec![encode_data(channel_id, width, payload)];
    }

    let total_len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    let first_header_len = DataFirstPdu::new(channel_id, width, total_len, Vec::new()).size();
    let first_chunk_len = MAX_PDU.saturating_sub(first_header_len).min(payload.len());

    let mut segments = vec![encode_data_first(channel_id, width, total_len, &payload[..first_chunk_len])];

    let data_header_len = DataPdu::new(channel_id, width, Vec::new()).size();
    let mut offset = first_chunk_len;
    while offset < payload.len() {
        let chunk_len = MAX_PDU.saturating_sub(data_header_len).min(payload.len() - offset);
        segments.push(encode_data(channel_id, width, &payload[offset..offset + chunk_len]));
        offset += chunk_len;
    }
    segments
}

fn encode_data(channel_id: DynamicChannelId, width: FieldType, chunk: &[u8]) -> Vec<u8> {
    let pdu = DataPdu::new(channel_id, width, chunk.to_vec());
    let mut buf = vec![0u8; pdu.size()];
    pdu.encode(&mut WriteCursor::new(&mut buf));
    buf
}

fn encode_data_first(channel_id: DynamicChannelId, width: FieldType, total_len: u32, chunk: &[u8]) -> Vec<u8> {
    let pdu = DataFirstPdu::new(channel_id, width, total_len, chunk.to_vec());
    let mut buf = vec![0u8; pdu.size()];
    pdu.encode(&mut WriteCursor::new(&mut buf));
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdp_pdu::dvc::{Header, ServerPdu};
    use rdp_core::ReadCursor;

    #[test]
    fn small_payload_fits_in_one_data_pdu() {
        let segments = write_pkt(5, FieldType::U8, &[1, 2, 3]);
        assert_eq!(segments.len(), 1);

        let mut src = ReadCursor::new(&segments[0]);
        match ServerPdu::decode(&mut src).unwrap() {
            ServerPdu::Data(pdu) => {
                assert_eq!(pdu.channel_id, 5);
                assert_eq!(pdu.data, vec![1, 2, 3]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn oversized_payload_splits_into_first_plus_data_segments() {
        let payload = vec![0xABu8; 4000];
        let segments = write_pkt(9, FieldType::U8, &payload);
        assert!(segments.len() >= 3);
        for segment in &segments {
            assert!(segment.len() <= MAX_PDU);
        }

        let mut src = ReadCursor::new(&segments[0]);
        let header = Header::decode(&mut src).unwrap();
        assert_eq!(header.cmd, rdp_pdu::dvc::Cmd::DataFirst);
    }

    #[test]
    fn reassembling_all_segments_recovers_the_original_payload() {
        let payload = vec![0x7Eu8; 5000];
        let segments = write_pkt(3, FieldType::U8, &payload);

        let mut reassembly = crate::reassembly::Reassembly::new();
        let mut out = None;
        for segment in segments {
            let mut src = ReadCursor::new(&segment);
            match ServerPdu::decode(&mut src).unwrap() {
                ServerPdu::DataFirst(pdu) => {
                    out = reassembly.process_data_first(pdu.total_length as usize, pdu.data);
                }
                ServerPdu::Data(pdu) => {
                    out = reassembly.process_data(&pdu.data);
                }
                other => panic!("unexpected variant: {other:?}"),
            }
        }
        assert_eq!(out, Some(payload));
    }
}
