#[cfg(test)]
mod tests {
    extern crate firehose_link as fh;

    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use fh::cobs;
    use fh::crc::crc16;
    use fh::error::Error;
    use fh::hsuart::Hsuart;
    use fh::interface::BytePort;
    use fh::packet::{self, PacketId};

    const ACK: u8 = 0x06;
    const NAK: u8 = 0x09;

    /// Scripted serial line: `rx` hands out the prepared chunks in
    /// order, `tx` records everything the framer sends.
    struct MockPort {
        rx_script: VecDeque<Vec<u8>>,
        tx_log: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    impl MockPort {
        fn new(script: Vec<Vec<u8>>) -> (Self, Rc<RefCell<Vec<Vec<u8>>>>) {
            let tx_log = Rc::new(RefCell::new(Vec::new()));
            let port = MockPort {
                rx_script: script.into(),
                tx_log: Rc::clone(&tx_log),
            };
            (port, tx_log)
        }
    }

    impl BytePort for MockPort {
        fn rx(&mut self, buf: &mut [u8]) -> fh::Result<usize> {
            let mut chunk = self.rx_script.pop_front().expect("rx script exhausted");
            let len = buf.len().min(chunk.len());
            buf[..len].copy_from_slice(&chunk[..len]);
            if len < chunk.len() {
                let rest = chunk.split_off(len);
                self.rx_script.push_front(rest);
            }
            Ok(len)
        }

        fn tx(&mut self, buf: &[u8]) -> fh::Result<usize> {
            self.tx_log.borrow_mut().push(buf.to_vec());
            Ok(buf.len())
        }
    }

    fn frame(id: PacketId, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; packet::MAX_HSUART_PACKET_SIZE];
        let len = packet::encode_frame(id, payload, &mut buf).unwrap();
        buf.truncate(len);
        buf
    }

    /// ACK for the host's VERSION packet, then the target's own VERSION.
    fn open_script() -> Vec<Vec<u8>> {
        vec![vec![ACK], frame(PacketId::Version, &[])]
    }

    fn open_link(mut script: Vec<Vec<u8>>) -> (Hsuart<MockPort>, Rc<RefCell<Vec<Vec<u8>>>>) {
        let mut full = open_script();
        full.append(&mut script);
        let (port, tx_log) = MockPort::new(full);
        (Hsuart::open(port).unwrap(), tx_log)
    }

    #[test]
    fn open_performs_version_handshake() {
        let (link, tx_log) = open_link(vec![]);
        assert!(!link.target_in_read_mode());

        let log = tx_log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], frame(PacketId::Version, &[]));
        assert_eq!(log[1], vec![ACK]);
    }

    #[test]
    fn open_rejects_version_mismatch() {
        // Target claims packet layer 2.0; the frame itself is intact.
        let mut plain = [0u8; 8];
        plain[0] = 0xaa;
        plain[1] = 0x02;
        plain[2] = 0x00;
        let crc = crc16(&plain[..3]);
        plain[3..5].copy_from_slice(&crc.to_be_bytes());
        let mut stuffed = [0u8; 16];
        let len = cobs::stuff(&plain[..5], &mut stuffed).unwrap();

        let (port, tx_log) = MockPort::new(vec![vec![ACK], stuffed[..len].to_vec()]);
        assert!(matches!(Hsuart::open(port), Err(Error::OpenPortFailed)));
        assert_eq!(tx_log.borrow().last().unwrap(), &vec![NAK]);
    }

    #[test]
    fn write_waits_for_rtr_and_fragments() {
        let payload = vec![0x5a_u8; 9000];
        let (mut link, tx_log) = open_link(vec![
            frame(PacketId::ReadyToRead, &[]),
            vec![ACK],
            vec![ACK],
            vec![ACK],
        ]);

        link.write(&payload).unwrap();
        assert!(!link.target_in_read_mode());

        let log = tx_log.borrow();
        // version, ACK, ACK for the RTR, then three fragments
        assert_eq!(log.len(), 6);
        assert_eq!(log[2], vec![ACK]);

        let mut decoded = [0u8; packet::MAX_HSUART_PACKET_SIZE];
        let (id, len) = packet::decode_frame(&log[3], &mut decoded).unwrap();
        assert_eq!((id, len), (PacketId::Protocol, 4000));
        let (id, len) = packet::decode_frame(&log[4], &mut decoded).unwrap();
        assert_eq!((id, len), (PacketId::Protocol, 4000));
        let (id, len) = packet::decode_frame(&log[5], &mut decoded).unwrap();
        assert_eq!((id, len), (PacketId::EndOfTransfer, 1000));
    }

    #[test]
    fn write_exact_multiple_sends_full_final_fragment() {
        let payload = vec![0x33_u8; 8000];
        let (mut link, tx_log) = open_link(vec![
            frame(PacketId::ReadyToRead, &[]),
            vec![ACK],
            vec![ACK],
        ]);

        link.write(&payload).unwrap();

        let log = tx_log.borrow();
        assert_eq!(log.len(), 5);

        let mut decoded = [0u8; packet::MAX_HSUART_PACKET_SIZE];
        let (id, len) = packet::decode_frame(&log[3], &mut decoded).unwrap();
        assert_eq!((id, len), (PacketId::Protocol, 4000));
        let (id, len) = packet::decode_frame(&log[4], &mut decoded).unwrap();
        assert_eq!((id, len), (PacketId::EndOfTransfer, 4000));
    }

    #[test]
    fn nak_triggers_retransmission() {
        let payload = [0x77_u8; 8];
        let (mut link, tx_log) = open_link(vec![
            frame(PacketId::ReadyToRead, &[]),
            vec![NAK],
            vec![ACK],
        ]);

        link.write(&payload).unwrap();

        let log = tx_log.borrow();
        // version, ACK, ACK for RTR, frame, identical frame again
        assert_eq!(log.len(), 5);
        assert_eq!(log[3], log[4]);

        let mut decoded = [0u8; packet::MAX_HSUART_PACKET_SIZE];
        let (id, len) = packet::decode_frame(&log[4], &mut decoded).unwrap();
        assert_eq!((id, len), (PacketId::EndOfTransfer, payload.len()));
    }

    #[test]
    fn frames_before_rtr_are_buffered_for_later_reads() {
        let pending = b"pending target data";
        let (mut link, tx_log) = open_link(vec![
            frame(PacketId::Protocol, pending),
            frame(PacketId::ReadyToRead, &[]),
            vec![ACK],
        ]);

        link.write(&[0x01, 0x02, 0x03]).unwrap();

        // The early frame went into the holding buffer.
        let mut out = [0u8; 64];
        let bytes = link.read(&mut out).unwrap();
        assert_eq!(&out[..bytes], pending);

        let log = tx_log.borrow();
        // version, ACK, ACK for the early frame, ACK for RTR, fragment
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn read_stitches_frames_until_end_of_transfer() {
        let (mut link, tx_log) = open_link(vec![
            frame(PacketId::Protocol, b"abc"),
            frame(PacketId::EndOfTransfer, b"def"),
        ]);

        let mut out = [0u8; 64];
        let bytes = link.read(&mut out).unwrap();
        assert_eq!(&out[..bytes], b"abcdef");

        let log = tx_log.borrow();
        assert_eq!(log.len(), 4);
        assert_eq!(log[2], vec![ACK]);
        assert_eq!(log[3], vec![ACK]);
    }

    #[test]
    fn version_frame_during_read_contributes_nothing() {
        let (mut link, _tx_log) = open_link(vec![
            frame(PacketId::Version, &[]),
            frame(PacketId::EndOfTransfer, b"tail"),
        ]);

        let mut out = [0u8; 64];
        let bytes = link.read(&mut out).unwrap();
        assert_eq!(&out[..bytes], b"tail");
    }

    #[test]
    fn oversized_frame_is_parked_for_the_next_read() {
        let (mut link, _tx_log) = open_link(vec![frame(PacketId::Protocol, b"0123456789")]);

        // Ten payload bytes cannot fit a four byte destination.
        let mut small = [0u8; 4];
        let bytes = link.read(&mut small).unwrap();
        assert_eq!(bytes, 0);

        let mut out = [0u8; 64];
        let bytes = link.read(&mut out).unwrap();
        assert_eq!(&out[..bytes], b"0123456789");
    }

    #[test]
    fn holding_buffer_drains_across_reads() {
        let pending = b"pending target data";
        let (mut link, _tx_log) = open_link(vec![
            frame(PacketId::Protocol, pending),
            frame(PacketId::ReadyToRead, &[]),
            vec![ACK],
        ]);
        link.write(&[0xaa]).unwrap();

        let mut first = [0u8; 7];
        let bytes = link.read(&mut first).unwrap();
        assert_eq!(&first[..bytes], &pending[..7]);

        let mut rest = [0u8; 64];
        let bytes = link.read(&mut rest).unwrap();
        assert_eq!(&rest[..bytes], &pending[7..]);
    }

    #[test]
    fn corrupt_frame_is_nakked_and_dropped() {
        let mut bad = frame(PacketId::Protocol, b"hello");
        // Flip a payload byte inside the stuffed region; the stuffing
        // stays intact so the failure is the CRC check.
        bad[3] ^= 0x01;

        let (mut link, tx_log) = open_link(vec![bad]);

        let mut out = [0u8; 64];
        let bytes = link.read(&mut out).unwrap();
        assert_eq!(bytes, 0);
        assert_eq!(tx_log.borrow().last().unwrap(), &vec![NAK]);
    }
}
