use thiserror::Error;

/// Errors reported by the framing and transport layers.
///
/// Every error is fatal to the operation that returned it; NAK exchanges
/// and bounded port retries are handled below the public API.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-supplied argument violates the contract.
    #[error("invalid parameter")]
    InvalidParameter,
    /// The selected transport is not available on this build.
    #[error("transport not supported")]
    NotSupported,
    /// Operation attempted before the session was initialized or opened.
    #[error("transport not initialized")]
    NotInitialized,
    /// The port could not be opened or configured.
    #[error("failed to open port")]
    OpenPortFailed,
    /// OS-level read failure that survived the bounded retries.
    #[error("error reading from port")]
    ReadPortError,
    /// OS-level write failure that survived the bounded retries.
    #[error("error writing to port")]
    WritePortError,
    /// Timeout expired while waiting for data.
    #[error("transport timeout")]
    TransportTimeout,
    /// A VIP table file could not be read.
    #[error("table file i/o failed: {0}")]
    FileIo(#[from] std::io::Error),
    /// A buffer could not hold the data it was asked to.
    #[error("out of buffer memory")]
    NoMemory,
    /// The target's response XML did not begin with `ACK`.
    #[error("target did not acknowledge")]
    TargetNak,

    /// Zero-sized source or destination handed to a codec.
    #[error("invalid length")]
    InvalidLength,
    /// Byte-stuffed input whose block pointers wrap or run past the end.
    #[error("invalid byte stuffing")]
    InvalidStuffing,
    /// Destination buffer exhausted before the source was consumed.
    #[error("destination buffer overflow")]
    DstBufferOverflow,
    /// Leading packet identifier byte is not part of the protocol.
    #[error("invalid packet id 0x{0:02x}")]
    InvalidPacketId(u8),
    /// Computed CRC does not match the one carried on the wire.
    #[error("crc mismatch")]
    CrcMismatch,
    /// Peer speaks a different packet-layer version.
    #[error("packet layer version mismatch")]
    VersionMismatch,
    /// Received frame failed CRC or version validation.
    #[error("packet corruption")]
    PacketCorruption,
}

pub type Result<T> = std::result::Result<T, Error>;
