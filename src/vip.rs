//! Verified-Image-Programming injection.
//!
//! With VIP enabled, the write path interleaves signed hash tables with
//! the payload stream: first the signed root table, then one 8192-byte
//! chained table whenever the digests of the previous table are used up.
//! The target answers each table with a `<response value="ACK…"/>`
//! envelope before more payload may flow.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use log::{debug, error};

use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::xml::{parse_envelope, XmlStream, MAX_XML_SIZE};

const VIP_CHAINED_TABLE_SIZE: usize = 8192;
const SHA256_SIZE: usize = 32;
const MAX_DIGESTS_PER_TABLE: usize = 256;
const MAX_SIGNED_TABLE_SIZE: u64 = 16 * 1024;

/// The signed root table carries 54 digests: 53 cover payload frames,
/// the last covers the first chained table.
const SIGNED_TABLE_PAYLOAD_FRAMES: usize = 53;

/// Payload frames covered by one chained table; the final digest chains
/// to the next table.
const CHAINED_TABLE_PAYLOAD_FRAMES: usize = VIP_CHAINED_TABLE_SIZE / SHA256_SIZE - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VipState {
    Disabled,
    /// The signed root table still has to be sent.
    Init,
    SendNextTable,
    SendData,
}

pub struct Vip {
    state: VipState,
    signed_table: Option<File>,
    chained_table: Option<File>,
    chained_table_size: u64,
    digests_per_table: usize,
    frame_sent: usize,
    frames_to_next_table: usize,
}

impl Vip {
    pub fn new() -> Self {
        Vip {
            state: VipState::Disabled,
            signed_table: None,
            chained_table: None,
            chained_table_size: 0,
            digests_per_table: 0,
            frame_sent: 0,
            frames_to_next_table: 0,
        }
    }

    /// Arms VIP for the session: opens both table files and parks the
    /// state machine in `Init` until the first transmit.
    pub fn enable(
        &mut self,
        signed_table: &str,
        chained_tables: &str,
        digests_per_table: usize,
    ) -> Result<()> {
        if digests_per_table > MAX_DIGESTS_PER_TABLE {
            error!(
                "value too large for digests per table, {} is max, given {}",
                MAX_DIGESTS_PER_TABLE, digests_per_table
            );
            return Err(Error::InvalidParameter);
        }

        let signed = File::open(signed_table).map_err(|e| {
            error!("can't open signed digest file {}: {}", signed_table, e);
            Error::InvalidParameter
        })?;
        let chained = File::open(chained_tables).map_err(|e| {
            error!("can't open chained digest tables file {}: {}", chained_tables, e);
            Error::InvalidParameter
        })?;
        let chained_table_size = chained.metadata()?.len();

        self.digests_per_table = digests_per_table;
        self.frames_to_next_table = SIGNED_TABLE_PAYLOAD_FRAMES;
        self.frame_sent = 0;
        self.signed_table = Some(signed);
        self.chained_table = Some(chained);
        self.chained_table_size = chained_table_size;
        self.state = VipState::Init;
        Ok(())
    }

    /// Drops the table handles. Called on session deinit.
    pub fn close_tables(&mut self) {
        self.signed_table = None;
        self.chained_table = None;
        self.state = VipState::Disabled;
    }

    pub fn state(&self) -> VipState {
        self.state
    }

    pub fn frames_sent(&self) -> usize {
        self.frame_sent
    }

    pub fn frames_to_next_table(&self) -> usize {
        self.frames_to_next_table
    }

    pub fn digests_per_table(&self) -> usize {
        self.digests_per_table
    }

    fn send_signed_table(&mut self, link: &mut Transport, xml: &mut XmlStream) -> Result<()> {
        let table = self.signed_table.as_mut().ok_or(Error::InvalidParameter)?;

        let size = table.metadata()?.len();
        if size == 0 {
            error!("can't get file size for signed table");
            return Err(Error::FileIo(io::Error::from(io::ErrorKind::UnexpectedEof)));
        }
        if size > MAX_SIGNED_TABLE_SIZE {
            error!("signed table size larger than expected > 16K: {}", size);
            return Err(Error::FileIo(io::Error::from(io::ErrorKind::InvalidData)));
        }

        let mut table_data = vec![0u8; size as usize];
        table.seek(SeekFrom::Start(0))?;
        table.read_exact(&mut table_data)?;

        link.tx_blocking(&table_data)?;
        wait_for_target_ack(link, xml)
    }

    fn send_chained_table(&mut self, link: &mut Transport, xml: &mut XmlStream) -> Result<()> {
        let table = self.chained_table.as_mut().ok_or(Error::InvalidParameter)?;

        let offset = table.seek(SeekFrom::Current(0))?;
        let remain = self.chained_table_size.saturating_sub(offset);
        if remain == 0 {
            error!("chained digest tables exhausted");
            return Err(Error::FileIo(io::Error::from(io::ErrorKind::UnexpectedEof)));
        }

        let chunk = remain.min(VIP_CHAINED_TABLE_SIZE as u64) as usize;
        let mut table_data = vec![0u8; chunk];
        table.read_exact(&mut table_data)?;

        link.tx_blocking(&table_data)?;
        wait_for_target_ack(link, xml)
    }

    /// Transmit entry point for the session. Ships whichever table is
    /// due, counts the payload frame, and forwards `data`.
    pub fn tx(&mut self, link: &mut Transport, xml: &mut XmlStream, data: &[u8]) -> Result<()> {
        if self.state == VipState::Disabled {
            return link.tx_blocking(data);
        }

        if self.state == VipState::Init {
            self.send_signed_table(link, xml).map_err(|e| {
                error!("failed to send the signed VIP table");
                e
            })?;
            self.state = VipState::SendData;
            self.frame_sent = 0;
            self.frames_to_next_table = SIGNED_TABLE_PAYLOAD_FRAMES;
        }

        if self.state == VipState::SendNextTable {
            self.send_chained_table(link, xml).map_err(|e| {
                error!("failed to send the chained VIP table");
                e
            })?;
            self.state = VipState::SendData;
            self.frame_sent = 0;
            self.frames_to_next_table = CHAINED_TABLE_PAYLOAD_FRAMES;
        }

        self.frame_sent += 1;
        if self.frame_sent >= self.frames_to_next_table {
            self.state = VipState::SendNextTable;
        }

        link.tx_blocking(data)
    }
}

impl Default for Vip {
    fn default() -> Self {
        Vip::new()
    }
}

/// Reads the response XML that gates a table transfer and checks that
/// its value begins with `ACK` (case-insensitive).
fn wait_for_target_ack(link: &mut Transport, xml: &mut XmlStream) -> Result<()> {
    let mut response = [0u8; MAX_XML_SIZE];
    let size = xml.read_response(link, &mut response)?;

    let envelope = match parse_envelope(&response[..size]) {
        Some(envelope) => envelope,
        None => {
            error!("didn't receive proper response XML: {} bytes", size);
            return Err(Error::TargetNak);
        }
    };

    match envelope.value {
        Some(value) if size >= value + 3 && response[value..value + 3].eq_ignore_ascii_case(b"ACK") => {
            debug!("ACK for VIP table received: {} bytes", size);
            Ok(())
        }
        Some(_) => Err(Error::TargetNak),
        None => {
            error!("didn't receive proper response XML: {} bytes", size);
            Err(Error::TargetNak)
        }
    }
}
