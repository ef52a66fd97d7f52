//! HSUART link layer.
//!
//! Every frame on the wire is `COBS(id + payload + crc16_BE)` followed
//! by a `0x00` terminator, except ACK and NAK which travel as raw
//! single bytes. The framer runs
//! a stop-and-wait ARQ: each transmitted frame is repeated until the
//! target acknowledges it, and each received frame is answered with ACK
//! or NAK. Host-to-target bursts only start once the target has granted
//! transmit rights with a `READY_TO_READ` packet.

use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serial::prelude::*;
use serial::SystemPort;

use crate::error::{Error, Result};
use crate::interface::BytePort;
use crate::packet::{self, PacketId, END_OF_PACKET, MAX_HSUART_PACKET_SIZE, PACKET_ID_SIZE};

const BAUDRATE: usize = 3_000_000;

/// Largest payload carried by a single PROTOCOL / END_OF_TRANSFER frame.
pub const MAX_HSUART_PACKET_DATA_SIZE: usize = 4000;

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_POLL_DELAY: Duration = Duration::from_secs(1);
const NUM_RETRY: u32 = 100;

const ONE_MEGA_BYTE: usize = 1024 * 1024;

const UART_SETTINGS: serial::PortSettings = serial::PortSettings {
    baud_rate: serial::BaudOther(BAUDRATE),
    char_size: serial::Bits8,
    parity: serial::ParityNone,
    stop_bits: serial::Stop1,
    flow_control: serial::FlowHardware,
};

/// Per-port receive timeout; the framer runs its own 10 s wall clock on
/// top of this.
const PORT_RX_TIMEOUT: Duration = Duration::from_millis(100);

/// Physical 3 Mbaud serial port with RTS/CTS handshaking.
pub struct UartPort {
    port: SystemPort,
}

impl UartPort {
    pub fn open(path: &str) -> Result<Self> {
        let mut port = serial::open(path).map_err(|e| {
            error!("failed to open port({}): {}", path, e);
            Error::OpenPortFailed
        })?;
        port.configure(&UART_SETTINGS).map_err(|e| {
            error!("failed to configure port({}): {}", path, e);
            Error::OpenPortFailed
        })?;
        port.set_timeout(PORT_RX_TIMEOUT).map_err(|e| {
            error!("failed to set timeout on port({}): {}", path, e);
            Error::OpenPortFailed
        })?;

        let mut uart = UartPort { port };
        uart.purge();
        Ok(uart)
    }

    /// Discards anything the target was still sending when a previous
    /// session broke off, so a fresh run starts with a clean line.
    fn purge(&mut self) {
        let mut empty_reads = 0;
        let mut scratch = [0u8; 1];
        while empty_reads <= 10 {
            match self.port.read(&mut scratch) {
                Ok(bytes) if bytes > 0 => {}
                _ => empty_reads += 1,
            }
        }
    }
}

impl BytePort for UartPort {
    fn rx(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(bytes) => Ok(bytes),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => {
                error!("uart read failed: {}", e);
                Err(Error::ReadPortError)
            }
        }
    }

    fn tx(&mut self, buf: &[u8]) -> Result<usize> {
        self.port.write(buf).map_err(|e| {
            error!("uart write failed: {}", e);
            Error::WritePortError
        })
    }
}

/// Holds target-originated frames that arrived while the host was still
/// waiting for transmit rights, so later reads see them in order.
struct RxRing {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
}

impl RxRing {
    fn new() -> Self {
        RxRing {
            buf: vec![0u8; ONE_MEGA_BYTE].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn push(&mut self, data: &[u8]) -> Result<()> {
        if self.end + data.len() > self.buf.len() {
            error!("holding buffer exhausted, cannot keep {} bytes", data.len());
            return Err(Error::NoMemory);
        }
        self.buf[self.end..self.end + data.len()].copy_from_slice(data);
        self.end += data.len();
        Ok(())
    }

    fn drain(&mut self, out: &mut [u8]) -> usize {
        let len = out.len().min(self.end - self.start);
        out[..len].copy_from_slice(&self.buf[self.start..self.start + len]);
        self.start += len;
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
        len
    }
}

/// HSUART framer over a blocking byte port.
pub struct Hsuart<P: BytePort> {
    port: P,
    target_in_read_mode: bool,
    ring: RxRing,
}

impl<P: BytePort> Hsuart<P> {
    /// Takes ownership of the port and completes the version handshake.
    /// Fails with `OpenPortFailed` when the target does not answer with
    /// a matching VERSION packet in time.
    pub fn open(port: P) -> Result<Self> {
        let mut link = Hsuart {
            port,
            target_in_read_mode: false,
            ring: RxRing::new(),
        };
        match link.handshake() {
            Ok(()) => {
                info!("transport layer initialisation successful");
                Ok(link)
            }
            Err(e) => {
                error!("transport layer initialisation failed: {}", e);
                Err(Error::OpenPortFailed)
            }
        }
    }

    /// True once the target has granted transmit rights and the host has
    /// not yet completed a burst.
    pub fn target_in_read_mode(&self) -> bool {
        self.target_in_read_mode
    }

    fn handshake(&mut self) -> Result<()> {
        let mut frame = [0u8; MAX_HSUART_PACKET_SIZE];
        let len = packet::encode_frame(PacketId::Version, &[], &mut frame)?;

        let mut acked = false;
        for _ in 0..NUM_RETRY {
            self.transmit(&frame[..len])?;
            if self.wait_for_ack() {
                acked = true;
                break;
            }
        }
        if !acked {
            return Err(Error::TransportTimeout);
        }

        let mut payload = [0u8; MAX_HSUART_PACKET_SIZE];
        let (packet_id, _) = self.recv_frame(&mut payload)?;
        if packet_id != PacketId::Version {
            error!("expected version packet, got 0x{:02x}", packet_id.byte());
            return Err(Error::PacketCorruption);
        }
        Ok(())
    }

    fn transmit(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            written += self.port.tx(&data[written..])?;
        }
        Ok(())
    }

    fn send_control(&mut self, packet_id: PacketId) -> Result<()> {
        let mut byte = [0u8; PACKET_ID_SIZE];
        let len = packet::encode_frame(packet_id, &[], &mut byte)?;
        self.transmit(&byte[..len])
    }

    /// Reads raw bytes until the `0x00` frame terminator shows up, the
    /// buffer fills, or the 10 s window closes. The window restarts on
    /// every successful byte batch. When waiting for an ACK exactly one
    /// byte is taken, since ACK/NAK travel unstuffed.
    fn recv_raw(&mut self, buf: &mut [u8], waiting_for_ack: bool) -> Result<usize> {
        let mut start = Instant::now();
        let mut total = 0;

        loop {
            let bytes = self.port.rx(&mut buf[total..])?;
            if bytes > 0 {
                total += bytes;
                start = Instant::now();
            }

            if total > 0 && (waiting_for_ack || buf[total - 1] == END_OF_PACKET) {
                break;
            }
            if total == buf.len() {
                break;
            }
            if total > 0 {
                info!("received {} bytes, reading more", total);
            }

            if bytes == 0 {
                thread::sleep(IDLE_POLL_DELAY);
            }
            if start.elapsed() > READ_TIMEOUT {
                if total == 0 {
                    return Err(Error::TransportTimeout);
                }
                error!("read failed due to timeout");
                break;
            }
        }

        Ok(total)
    }

    /// Receives one frame, answers it, and copies its payload into
    /// `payload`. Corrupt frames are NAKed and reported as
    /// `PacketCorruption`; structurally broken ones as
    /// `InvalidParameter`.
    fn recv_frame(&mut self, payload: &mut [u8]) -> Result<(PacketId, usize)> {
        let mut raw = [0u8; MAX_HSUART_PACKET_SIZE];
        let received = self.recv_raw(&mut raw, false)?;

        match packet::decode_frame(&raw[..received], payload) {
            Ok((packet_id, len)) => match packet_id {
                PacketId::Ack | PacketId::Nak => {
                    warn!("unexpected control packet 0x{:02x}", packet_id.byte());
                    Err(Error::InvalidParameter)
                }
                PacketId::ReadyToRead => {
                    self.target_in_read_mode = true;
                    self.send_control(PacketId::Ack)?;
                    Ok((packet_id, len))
                }
                _ => {
                    self.send_control(PacketId::Ack)?;
                    Ok((packet_id, len))
                }
            },
            Err(Error::CrcMismatch) | Err(Error::VersionMismatch) => {
                warn!("corrupt frame received, sending NAK");
                let _ = self.send_control(PacketId::Nak);
                Err(Error::PacketCorruption)
            }
            Err(e) => {
                warn!("malformed frame received ({}), sending NAK", e);
                let _ = self.send_control(PacketId::Nak);
                Err(Error::InvalidParameter)
            }
        }
    }

    fn wait_for_ack(&mut self) -> bool {
        let mut byte = [0u8; PACKET_ID_SIZE];
        let received = match self.recv_raw(&mut byte, true) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let mut sink = [0u8; 0];
        match packet::decode_frame(&byte[..received], &mut sink[..]) {
            Ok((PacketId::Ack, _)) => true,
            Ok((PacketId::Nak, _)) => {
                info!("NAK received");
                false
            }
            Ok((packet_id, _)) => {
                info!("invalid packet id received 0x{:02x}", packet_id.byte());
                false
            }
            Err(e) => {
                debug!("garbage while waiting for ACK: {}", e);
                false
            }
        }
    }

    /// Encodes and transmits one frame, retransmitting until the target
    /// acknowledges it. The link is assumed eventually reliable; a
    /// higher layer bounds the overall session time.
    fn write_frame(&mut self, packet_id: PacketId, payload: &[u8]) -> Result<()> {
        let mut frame = [0u8; MAX_HSUART_PACKET_SIZE];
        let len = packet::encode_frame(packet_id, payload, &mut frame)?;

        loop {
            self.transmit(&frame[..len])?;
            if self.wait_for_ack() {
                return Ok(());
            }
            debug!("no ACK for frame 0x{:02x}, retransmitting", packet_id.byte());
        }
    }

    /// Blocks until the target grants transmit rights. Frames received
    /// meanwhile are kept in the holding buffer, not dropped.
    fn wait_for_ready_to_read(&mut self) -> Result<()> {
        let mut payload = [0u8; MAX_HSUART_PACKET_SIZE];
        while !self.target_in_read_mode {
            let (_, len) = self.recv_frame(&mut payload)?;
            if len > 0 {
                self.ring.push(&payload[..len])?;
            }
        }
        Ok(())
    }

    /// Sends `data` as a burst of ≤4000-byte fragments, all PROTOCOL
    /// except the last which carries END_OF_TRANSFER. Transmit rights
    /// are consumed once the full burst went out.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidParameter);
        }

        self.wait_for_ready_to_read()?;

        let fragments = (data.len() + MAX_HSUART_PACKET_DATA_SIZE - 1) / MAX_HSUART_PACKET_DATA_SIZE;
        for (index, chunk) in data.chunks(MAX_HSUART_PACKET_DATA_SIZE).enumerate() {
            let packet_id = if index + 1 == fragments {
                PacketId::EndOfTransfer
            } else {
                PacketId::Protocol
            };
            self.write_frame(packet_id, chunk)?;
        }

        self.target_in_read_mode = false;
        Ok(())
    }

    /// Drains the holding buffer if it has data; otherwise receives and
    /// stitches frames together until an END_OF_TRANSFER arrives. A
    /// frame that no longer fits `out` is parked in the holding buffer
    /// for the next call.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        if !self.ring.is_empty() {
            return Ok(self.ring.drain(out));
        }

        let mut payload = [0u8; MAX_HSUART_PACKET_SIZE];
        let mut total = 0;
        loop {
            match self.recv_frame(&mut payload) {
                Ok((packet_id, len)) => match packet_id {
                    PacketId::Protocol | PacketId::EndOfTransfer => {
                        if total + len > out.len() {
                            self.ring.push(&payload[..len])?;
                            break;
                        }
                        out[total..total + len].copy_from_slice(&payload[..len]);
                        total += len;
                        if packet_id == PacketId::EndOfTransfer {
                            break;
                        }
                    }
                    // RTR and VERSION contribute no payload bytes.
                    _ => {}
                },
                Err(e) => {
                    warn!("frame dropped while reading: {}", e);
                    break;
                }
            }
        }

        Ok(total)
    }

    pub fn rx_blocking(&mut self, buf: &mut [u8]) -> Result<usize> {
        for _ in 0..NUM_RETRY {
            let bytes = self.read(buf)?;
            if bytes > 0 {
                return Ok(bytes);
            }
        }
        Err(Error::ReadPortError)
    }

    pub fn tx_blocking(&mut self, data: &[u8]) -> Result<()> {
        for _ in 0..NUM_RETRY {
            match self.write(data) {
                Ok(()) => return Ok(()),
                Err(Error::InvalidParameter) => return Err(Error::InvalidParameter),
                Err(e) => warn!("write failed: {}, retrying", e),
            }
        }
        Err(Error::WritePortError)
    }
}
