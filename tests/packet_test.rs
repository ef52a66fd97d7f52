#[cfg(test)]
mod tests {
    extern crate firehose_link as fh;

    use fh::cobs;
    use fh::crc::{crc16, CRC_16_OK};
    use fh::error::Error;
    use fh::packet::{self, PacketId};

    #[test]
    fn crc_matches_reference_check_value() {
        assert_eq!(crc16(b"123456789"), 0xd64e);
    }

    #[test]
    fn crc_residue_over_appended_crc() {
        let data = b"<?xml version=\"1.0\"?><data><configure /></data>";
        let mut framed = data.to_vec();
        framed.extend_from_slice(&crc16(data).to_be_bytes());
        assert_eq!(crc16(&framed), CRC_16_OK);
    }

    #[test]
    fn ack_is_a_single_raw_byte() {
        let mut dst = [0u8; 4];
        let len = packet::encode_frame(PacketId::Ack, &[], &mut dst).unwrap();
        assert_eq!(&dst[..len], &[0x06]);

        let mut sink = [0u8; 4];
        let (id, payload_len) = packet::decode(&[0x06], &mut sink).unwrap();
        assert_eq!(id, PacketId::Ack);
        assert_eq!(payload_len, 0);
    }

    #[test]
    fn ack_with_trailing_byte_is_invalid() {
        let mut sink = [0u8; 4];
        assert!(matches!(
            packet::decode(&[0x06, 0x00], &mut sink),
            Err(Error::InvalidLength)
        ));
    }

    #[test]
    fn nak_round_trip() {
        let mut dst = [0u8; 4];
        let len = packet::encode_frame(PacketId::Nak, &[], &mut dst).unwrap();
        let mut sink = [0u8; 4];
        let (id, payload_len) = packet::decode_frame(&dst[..len], &mut sink).unwrap();
        assert_eq!(id, PacketId::Nak);
        assert_eq!(payload_len, 0);
    }

    #[test]
    fn ready_to_read_on_wire() {
        let mut plain = [0u8; 8];
        let plain_len = packet::encode(PacketId::ReadyToRead, &[], &mut plain).unwrap();
        assert_eq!(plain_len, 3);
        assert_eq!(plain[0], 0x0f);
        assert_eq!(&plain[1..3], &crc16(&[0x0f]).to_be_bytes()[..]);

        // The framed form is the same packet stuffed and terminated.
        let mut expected = [0u8; 16];
        let expected_len = cobs::stuff(&plain[..plain_len], &mut expected).unwrap();

        let mut frame = [0u8; 16];
        let frame_len = packet::encode_frame(PacketId::ReadyToRead, &[], &mut frame).unwrap();
        assert_eq!(&frame[..frame_len], &expected[..expected_len]);
        assert_eq!(frame[frame_len - 1], 0x00);
    }

    #[test]
    fn version_carries_fixed_tuple() {
        let mut plain = [0u8; 8];
        let len = packet::encode(PacketId::Version, &[], &mut plain).unwrap();
        assert_eq!(len, 5);
        assert_eq!(&plain[..3], &[0xaa, 0x01, 0x00]);

        let mut sink = [0u8; 4];
        let (id, payload_len) = packet::decode(&plain[..len], &mut sink).unwrap();
        assert_eq!(id, PacketId::Version);
        assert_eq!(payload_len, 0);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut pkt = [0xaa, 0x02, 0x00, 0x00, 0x00];
        let crc = crc16(&pkt[..3]);
        pkt[3..5].copy_from_slice(&crc.to_be_bytes());

        let mut sink = [0u8; 4];
        assert!(matches!(
            packet::decode(&pkt, &mut sink),
            Err(Error::VersionMismatch)
        ));
    }

    #[test]
    fn protocol_frame_round_trip() {
        let payload = [0xde, 0xad, 0x00, 0xbe, 0xef];
        let mut frame = [0u8; 64];
        let len = packet::encode_frame(PacketId::Protocol, &payload, &mut frame).unwrap();
        assert_eq!(frame[len - 1], 0x00);
        assert!(frame[..len - 1].iter().all(|&byte| byte != 0x00));

        let mut decoded = [0u8; 64];
        let (id, payload_len) = packet::decode_frame(&frame[..len], &mut decoded).unwrap();
        assert_eq!(id, PacketId::Protocol);
        assert_eq!(&decoded[..payload_len], &payload);
    }

    #[test]
    fn end_of_transfer_frame_round_trip() {
        let payload = [0x42_u8; 100];
        let mut frame = [0u8; 256];
        let len = packet::encode_frame(PacketId::EndOfTransfer, &payload, &mut frame).unwrap();

        let mut decoded = [0u8; 256];
        let (id, payload_len) = packet::decode_frame(&frame[..len], &mut decoded).unwrap();
        assert_eq!(id, PacketId::EndOfTransfer);
        assert_eq!(&decoded[..payload_len], &payload[..]);
    }

    #[test]
    fn corrupted_payload_fails_crc() {
        let payload = [0x10, 0x20, 0x30];
        let mut pkt = [0u8; 16];
        let len = packet::encode(PacketId::Protocol, &payload, &mut pkt).unwrap();
        pkt[2] ^= 0xff;

        let mut sink = [0u8; 16];
        assert!(matches!(
            packet::decode(&pkt[..len], &mut sink),
            Err(Error::CrcMismatch)
        ));
    }

    #[test]
    fn unknown_packet_id_is_rejected() {
        let mut sink = [0u8; 16];
        assert!(matches!(
            packet::decode(&[0x42, 0x00, 0x00], &mut sink),
            Err(Error::InvalidPacketId(0x42))
        ));
    }

    #[test]
    fn data_packet_with_empty_payload_is_rejected() {
        let mut dst = [0u8; 16];
        assert!(matches!(
            packet::encode(PacketId::Protocol, &[], &mut dst),
            Err(Error::InvalidLength)
        ));
    }

    #[test]
    fn payload_too_large_for_destination_overflows() {
        let payload = [0x11_u8; 32];
        let mut dst = [0u8; 16];
        assert!(matches!(
            packet::encode(PacketId::Protocol, &payload, &mut dst),
            Err(Error::DstBufferOverflow)
        ));
    }
}
