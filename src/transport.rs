//! Transport selection and dispatch.
//!
//! One transport is chosen per session and cannot change afterwards.
//! Dispatch is by variant tag over the same four operations every
//! transport provides: open, blocking receive, blocking transmit, close.

use crate::com::ComPort;
use crate::error::{Error, Result};
use crate::hsuart::{Hsuart, UartPort};
use crate::pipe::PipePort;

/// Transport mediums selectable at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    None,
    Com,
    Hsuart,
    /// Simulates the device and generates the VIP tables. Not part of
    /// this build.
    VipSim,
    /// Pipe pair used for offline development.
    LinuxPipeTest,
}

pub enum Transport {
    Com(ComPort),
    Hsuart(Hsuart<UartPort>),
    Pipe(PipePort),
}

impl Transport {
    pub fn open(transport_type: TransportType, path: &str) -> Result<Self> {
        match transport_type {
            TransportType::Com => Ok(Transport::Com(ComPort::open(path)?)),
            TransportType::Hsuart => {
                let port = UartPort::open(path)?;
                Ok(Transport::Hsuart(Hsuart::open(port)?))
            }
            TransportType::LinuxPipeTest => Ok(Transport::Pipe(PipePort::open(path)?)),
            TransportType::None | TransportType::VipSim => Err(Error::InvalidParameter),
        }
    }

    pub fn rx_blocking(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Transport::Com(port) => port.rx_blocking(buf),
            Transport::Hsuart(link) => link.rx_blocking(buf),
            Transport::Pipe(port) => port.rx_blocking(buf),
        }
    }

    pub fn tx_blocking(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Transport::Com(port) => port.tx_blocking(data),
            Transport::Hsuart(link) => link.tx_blocking(data),
            Transport::Pipe(port) => port.tx_blocking(data),
        }
    }
}
