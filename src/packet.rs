//! Typed HSUART packets.
//!
//! Every packet starts with a one-byte identifier. ACK and NAK travel as
//! that single byte; every other packet carries a CRC-16 transmitted
//! big-endian and is byte-stuffed on the wire.

use log::error;

use crate::cobs;
use crate::crc::crc16;
use crate::error::{Error, Result};

pub const MAX_HSUART_PACKET_SIZE: usize = 4 * 1024;
pub const PACKET_ID_SIZE: usize = 1;
/// Terminator appended to every stuffed frame.
pub const END_OF_PACKET: u8 = 0x00;

const CRC_SIZE: usize = 2;
const VERSION_PAYLOAD_SIZE: usize = 2;

pub const PACKET_LAYER_MAJOR_ID: u8 = 1;
pub const PACKET_LAYER_MINOR_ID: u8 = 0;

/// Wire-level packet identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketId {
    Protocol = 0xf0,
    EndOfTransfer = 0x55,
    Ack = 0x06,
    Nak = 0x09,
    Version = 0xaa,
    ReadyToRead = 0x0f,
}

impl PacketId {
    pub fn byte(self) -> u8 {
        self as u8
    }

    fn from_byte(byte: u8) -> Result<PacketId> {
        match byte {
            0xf0 => Ok(PacketId::Protocol),
            0x55 => Ok(PacketId::EndOfTransfer),
            0x06 => Ok(PacketId::Ack),
            0x09 => Ok(PacketId::Nak),
            0xaa => Ok(PacketId::Version),
            0x0f => Ok(PacketId::ReadyToRead),
            other => Err(Error::InvalidPacketId(other)),
        }
    }
}

fn put_crc(dst: &mut [u8], checked: usize) {
    let crc = crc16(&dst[..checked]);
    dst[checked..checked + CRC_SIZE].copy_from_slice(&crc.to_be_bytes());
}

fn check_crc(src: &[u8]) -> Result<()> {
    let split = src.len() - CRC_SIZE;
    let mut rx_crc = [0u8; CRC_SIZE];
    rx_crc.copy_from_slice(&src[split..]);
    if u16::from_be_bytes(rx_crc) != crc16(&src[..split]) {
        return Err(Error::CrcMismatch);
    }
    Ok(())
}

/// Encodes a packet (identifier, payload, CRC where applicable) into
/// `dst` and returns the encoded length. The payload is ignored for
/// control packets; VERSION carries the fixed (major, minor) tuple
/// supplied by this layer.
pub fn encode(packet_id: PacketId, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    match packet_id {
        PacketId::Ack | PacketId::Nak => {
            if dst.is_empty() {
                return Err(Error::DstBufferOverflow);
            }
            dst[0] = packet_id.byte();
            Ok(PACKET_ID_SIZE)
        }
        PacketId::Version => {
            let total = PACKET_ID_SIZE + VERSION_PAYLOAD_SIZE + CRC_SIZE;
            if dst.len() < total {
                return Err(Error::DstBufferOverflow);
            }
            dst[0] = packet_id.byte();
            dst[1] = PACKET_LAYER_MAJOR_ID;
            dst[2] = PACKET_LAYER_MINOR_ID;
            put_crc(dst, PACKET_ID_SIZE + VERSION_PAYLOAD_SIZE);
            Ok(total)
        }
        PacketId::ReadyToRead => {
            let total = PACKET_ID_SIZE + CRC_SIZE;
            if dst.len() < total {
                return Err(Error::DstBufferOverflow);
            }
            dst[0] = packet_id.byte();
            put_crc(dst, PACKET_ID_SIZE);
            Ok(total)
        }
        PacketId::Protocol | PacketId::EndOfTransfer => {
            if src.is_empty() {
                return Err(Error::InvalidLength);
            }
            let total = PACKET_ID_SIZE + src.len() + CRC_SIZE;
            if dst.len() < total {
                return Err(Error::DstBufferOverflow);
            }
            dst[0] = packet_id.byte();
            dst[PACKET_ID_SIZE..PACKET_ID_SIZE + src.len()].copy_from_slice(src);
            put_crc(dst, PACKET_ID_SIZE + src.len());
            Ok(total)
        }
    }
}

/// Decodes an unstuffed packet, validating length, CRC and (for VERSION)
/// the protocol version tuple. The payload, if any, is copied into `dst`
/// and its length returned alongside the identifier.
pub fn decode(src: &[u8], dst: &mut [u8]) -> Result<(PacketId, usize)> {
    if src.is_empty() {
        return Err(Error::InvalidLength);
    }

    let packet_id = PacketId::from_byte(src[0])?;
    match packet_id {
        PacketId::Ack | PacketId::Nak => {
            if src.len() != PACKET_ID_SIZE {
                return Err(Error::InvalidLength);
            }
            Ok((packet_id, 0))
        }
        PacketId::Version => {
            if src.len() != PACKET_ID_SIZE + VERSION_PAYLOAD_SIZE + CRC_SIZE {
                return Err(Error::InvalidLength);
            }
            check_crc(src)?;
            if src[1] != PACKET_LAYER_MAJOR_ID || src[2] != PACKET_LAYER_MINOR_ID {
                error!(
                    "packet layer version mismatch: target {}.{}, host {}.{}",
                    src[1], src[2], PACKET_LAYER_MAJOR_ID, PACKET_LAYER_MINOR_ID
                );
                return Err(Error::VersionMismatch);
            }
            Ok((packet_id, 0))
        }
        PacketId::ReadyToRead => {
            if src.len() != PACKET_ID_SIZE + CRC_SIZE {
                return Err(Error::InvalidLength);
            }
            check_crc(src)?;
            Ok((packet_id, 0))
        }
        PacketId::Protocol | PacketId::EndOfTransfer => {
            if src.len() < PACKET_ID_SIZE + CRC_SIZE {
                return Err(Error::InvalidLength);
            }
            let payload_len = src.len() - PACKET_ID_SIZE - CRC_SIZE;
            if dst.len() < payload_len {
                return Err(Error::DstBufferOverflow);
            }
            check_crc(src)?;
            dst[..payload_len].copy_from_slice(&src[PACKET_ID_SIZE..PACKET_ID_SIZE + payload_len]);
            Ok((packet_id, payload_len))
        }
    }
}

/// Encodes a packet and byte-stuffs it for the wire. ACK and NAK are
/// emitted raw, a single byte with no stuffing or terminator.
pub fn encode_frame(packet_id: PacketId, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    match packet_id {
        PacketId::Ack | PacketId::Nak => encode(packet_id, src, dst),
        _ => {
            let mut staging = [0u8; MAX_HSUART_PACKET_SIZE];
            let encoded = encode(packet_id, src, &mut staging)?;
            cobs::stuff(&staging[..encoded], dst)
        }
    }
}

/// Unstuffs a received frame and decodes it. A single-byte frame is
/// decoded raw, matching the ACK/NAK transmit path.
pub fn decode_frame(src: &[u8], dst: &mut [u8]) -> Result<(PacketId, usize)> {
    if src.len() > 1 {
        let mut staging = [0u8; MAX_HSUART_PACKET_SIZE];
        let unstuffed = cobs::unstuff(src, &mut staging)?;
        decode(&staging[..unstuffed], dst)
    } else {
        decode(src, dst)
    }
}
