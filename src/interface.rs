use crate::error::Result;

/// Blocking byte-oriented port underneath the HSUART framer.
///
/// `rx` may return fewer bytes than requested, or zero after the port's
/// own receive timeout; `tx` returns the number of bytes accepted.
pub trait BytePort {
    fn rx(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn tx(&mut self, buf: &[u8]) -> Result<usize>;
}
