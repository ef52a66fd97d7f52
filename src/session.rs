//! Session facade over transport, XML reassembly and VIP injection.

use log::error;

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportType};
use crate::vip::{Vip, VipState};
use crate::xml::XmlStream;

/// One loader session on one port.
///
/// The protocol supports a single session per port and the session is
/// not reentrant: all state lives in this value and every operation
/// takes `&mut self`, so driving it from two threads requires external
/// synchronization that the protocol itself would not survive.
pub struct Session {
    transport_type: TransportType,
    link: Option<Transport>,
    xml: XmlStream,
    vip: Vip,
}

impl Session {
    /// Selects the transport for this session. The choice is fixed for
    /// the session lifetime; `None` and the VIP simulator are rejected.
    pub fn new(transport_type: TransportType) -> Result<Self> {
        match transport_type {
            TransportType::None | TransportType::VipSim => {
                error!("invalid transport type {:?}", transport_type);
                Err(Error::InvalidParameter)
            }
            _ => Ok(Session {
                transport_type,
                link: None,
                xml: XmlStream::new(),
                vip: Vip::new(),
            }),
        }
    }

    pub fn transport_type(&self) -> TransportType {
        self.transport_type
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Opens and configures the port at `path`. On HSUART this also
    /// runs the version handshake.
    pub fn open(&mut self, path: &str) -> Result<()> {
        if self.link.is_some() {
            error!("opening the port without closing");
            return Err(Error::InvalidParameter);
        }
        self.link = Some(Transport::open(self.transport_type, path)?);
        Ok(())
    }

    /// Receives the next `<response …/>` envelope into `out`.
    pub fn rx_xml(&mut self, out: &mut [u8]) -> Result<usize> {
        let link = self.link.as_mut().ok_or(Error::NotInitialized)?;
        self.xml.read_response(link, out)
    }

    /// Receives raw bytes, draining anything the XML layer buffered
    /// first.
    pub fn rx_raw(&mut self, out: &mut [u8]) -> Result<usize> {
        let link = self.link.as_mut().ok_or(Error::NotInitialized)?;
        self.xml.read_raw(link, out)
    }

    /// Transmits `data`, injecting VIP hash tables when enabled.
    pub fn tx(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidParameter);
        }
        let link = self.link.as_mut().ok_or(Error::NotInitialized)?;
        self.vip.tx(link, &mut self.xml, data)
    }

    /// Arms Verified Image Programming with the given table files.
    pub fn enable_vip(
        &mut self,
        signed_table: &str,
        chained_tables: &str,
        digests_per_table: usize,
    ) -> Result<()> {
        self.vip.enable(signed_table, chained_tables, digests_per_table)
    }

    pub fn vip_state(&self) -> VipState {
        self.vip.state()
    }

    pub fn get_vip_frame_cnt(&self) -> usize {
        self.vip.frames_sent()
    }

    pub fn get_vip_frames_to_next_table(&self) -> usize {
        self.vip.frames_to_next_table()
    }

    /// Closes the port.
    pub fn close(&mut self) -> Result<()> {
        match self.link.take() {
            Some(link) => {
                drop(link);
                Ok(())
            }
            None => Err(Error::NotInitialized),
        }
    }

    /// Ends the session, releasing the VIP table handles. The port is
    /// not closed here; that stays with [`Session::close`] (or the
    /// session simply going out of scope).
    pub fn deinit(mut self) {
        self.vip.close_tables();
    }
}
