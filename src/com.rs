//! COM port transport. Bytes are forwarded unframed; on this transport
//! the XML application layer is the only framing.

use std::io::{Read, Write};
use std::time::Duration;

use log::{debug, error, info};
use serial::prelude::*;
use serial::SystemPort;

use crate::error::{Error, Result};

pub const NUM_RETRY_READ: u32 = 100;
pub const NUM_RETRY_WRITE: u32 = 100;

/// Upper bound for a single blocking read, standing in for the 50 s
/// `select` window of the reference loader.
const RX_TIMEOUT: Duration = Duration::from_secs(50);

const SETTINGS: serial::PortSettings = serial::PortSettings {
    baud_rate: serial::Baud115200,
    char_size: serial::Bits8,
    parity: serial::ParityNone,
    stop_bits: serial::Stop1,
    flow_control: serial::FlowNone,
};

pub struct ComPort {
    port: SystemPort,
}

impl ComPort {
    pub fn open(path: &str) -> Result<Self> {
        let mut port = serial::open(path).map_err(|e| {
            error!("failed to open port({}): {}", path, e);
            Error::OpenPortFailed
        })?;
        port.configure(&SETTINGS).map_err(|e| {
            error!("failed to configure port({}): {}", path, e);
            Error::OpenPortFailed
        })?;
        port.set_timeout(RX_TIMEOUT).map_err(|e| {
            error!("failed to set timeout on port({}): {}", path, e);
            Error::OpenPortFailed
        })?;
        Ok(ComPort { port })
    }

    pub fn rx_blocking(&mut self, buf: &mut [u8]) -> Result<usize> {
        read_retry(&mut self.port, buf)
    }

    pub fn tx_blocking(&mut self, data: &[u8]) -> Result<()> {
        write_retry(&mut self.port, data)
    }
}

/// Single read with up to [`NUM_RETRY_READ`] attempts. Shared with the
/// pipe transport.
pub(crate) fn read_retry<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    for retry in (0..NUM_RETRY_READ).rev() {
        match reader.read(buf) {
            Ok(bytes) => return Ok(bytes),
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                info!("didn't receive data from port, will retry {} times", retry);
            }
            Err(e) => {
                error!("error while reading data: {}, will retry {}", e, retry);
            }
        }
    }
    Err(Error::ReadPortError)
}

/// Writes all of `data` with up to [`NUM_RETRY_WRITE`] attempts. Shared
/// with the pipe transport.
pub(crate) fn write_retry<W: Write>(writer: &mut W, data: &[u8]) -> Result<()> {
    debug!("trying to write {} bytes to the port", data.len());
    let mut offset = 0;
    for retry in (0..NUM_RETRY_WRITE).rev() {
        if offset == data.len() {
            break;
        }
        match writer.write(&data[offset..]) {
            Ok(written) => offset += written,
            Err(e) => {
                error!("error while writing to port, may retry: {} {}", e, retry);
            }
        }
    }
    if offset < data.len() {
        error!("failed to write all the data to the port: {}", data.len() - offset);
        return Err(Error::WritePortError);
    }
    Ok(())
}
