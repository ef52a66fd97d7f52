//! # firehose-link
//! Host-side framing and transport core for a Firehose-style boot
//! firmware loader. The host drives a request/response XML protocol
//! over a serial link; on the HSUART transport every XML blob is
//! wrapped in a byte-stuffed, CRC-checked packet protocol with
//! acknowledgements and a read-mode handshake. An optional Verified
//! Image Programming layer interleaves signed hash tables with the
//! payload stream.
//!
//! The layers, bottom up:
//!
//! * [`crc`]: CRC-16 used by the packet layer.
//! * [`cobs`]: byte stuffing that keeps `0x00` free as the frame
//!   terminator.
//! * [`packet`]: typed packets (`PROTOCOL`, `END_OF_TRANSFER`, `ACK`,
//!   `NAK`, `VERSION`, `READY_TO_READ`).
//! * [`hsuart`]: the ARQ link layer with version handshake, per-frame
//!   ACK/NAK, `READY_TO_READ` rendezvous and fragmentation.
//! * [`transport`]: dispatch over the COM, HSUART and pipe transports.
//! * [`xml`]: envelope reassembly, log consumption, response delivery.
//! * [`vip`]: hash-table injection on the write path.
//! * [`session`]: the public facade tying the layers together.
//!
//! ## Example
//! ```no_run
//! use firehose_link::{Session, TransportType};
//!
//! fn main() -> firehose_link::Result<()> {
//!     let mut session = Session::new(TransportType::Com)?;
//!     session.open("/dev/ttyUSB0")?;
//!
//!     session.tx(b"<?xml version=\"1.0\"?><data><configure /></data>")?;
//!
//!     let mut response = [0u8; 4096];
//!     let size = session.rx_xml(&mut response)?;
//!     println!("{}", String::from_utf8_lossy(&response[..size]));
//!
//!     session.close()?;
//!     Ok(())
//! }
//! ```

pub mod cobs;
pub mod com;
pub mod crc;
pub mod error;
pub mod hsuart;
pub mod interface;
pub mod packet;
pub mod pipe;
pub mod session;
pub mod transport;
pub mod vip;
pub mod xml;

pub use error::{Error, Result};
pub use interface::BytePort;
pub use session::Session;
pub use transport::{Transport, TransportType};
pub use vip::VipState;
