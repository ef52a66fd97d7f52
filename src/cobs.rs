//! Consistent Overhead Byte Stuffing.
//!
//! Encoded output carries no `0x00` bytes except the single trailing
//! frame terminator. Each block starts with a code byte giving the
//! offset to the next zero (or to the end of a full 254-byte block).

use crate::error::{Error, Result};

const FULL_BLOCK: u8 = 0xff;

/// Stuffs `src` into `dst` and appends the `0x00` terminator, returning
/// the number of bytes written.
///
/// Worst-case output length is `src.len() + src.len() / 254 + 2`. Fails
/// with `InvalidLength` on an empty source or destination and with
/// `DstBufferOverflow` once `dst` is exhausted.
pub fn stuff(src: &[u8], dst: &mut [u8]) -> Result<usize> {
    if src.is_empty() || dst.is_empty() {
        return Err(Error::InvalidLength);
    }

    // dst[code_idx] is reserved for the code byte of the open block.
    let mut code: u8 = 0x01;
    let mut code_idx: usize = 0;
    let mut out: usize = 1;
    let mut index: usize = 0;

    while index < src.len() {
        if code == FULL_BLOCK {
            // Close the full block without consuming a source byte.
            dst[code_idx] = code;
            if out >= dst.len() {
                return Err(Error::DstBufferOverflow);
            }
            code_idx = out;
            out += 1;
            code = 0x01;
            continue;
        }

        let byte = src[index];
        if byte != 0x00 {
            if out >= dst.len() {
                return Err(Error::DstBufferOverflow);
            }
            dst[out] = byte;
            out += 1;
            code += 1;
        } else {
            dst[code_idx] = code;
            if out >= dst.len() {
                return Err(Error::DstBufferOverflow);
            }
            code_idx = out;
            out += 1;
            code = 0x01;
        }
        index += 1;
    }

    dst[code_idx] = code;
    if out >= dst.len() {
        return Err(Error::DstBufferOverflow);
    }
    dst[out] = 0x00;
    out += 1;

    Ok(out)
}

/// Unstuffs `src` into `dst`, stopping at the `0x00` terminator and
/// returning the number of bytes recovered.
///
/// A zero is emitted for every block terminator except after a full
/// 254-byte block. Fails with `InvalidStuffing` when the implied block
/// pointer wraps or runs past the end of `src` before the terminator.
pub fn unstuff(src: &[u8], dst: &mut [u8]) -> Result<usize> {
    if src.is_empty() || dst.is_empty() {
        return Err(Error::InvalidLength);
    }

    let mut code = src[0];
    let mut base: usize = 0;
    let mut index: u8 = 1;
    let mut out: usize = 0;

    loop {
        let pos = base + index as usize;
        if pos >= src.len() {
            return Err(Error::InvalidStuffing);
        }

        if index != code {
            if out >= dst.len() {
                return Err(Error::DstBufferOverflow);
            }
            dst[out] = src[pos];
            out += 1;
        } else {
            code = src[pos];
            if code == 0x00 {
                break;
            }
            if index != FULL_BLOCK {
                if out >= dst.len() {
                    return Err(Error::DstBufferOverflow);
                }
                dst[out] = 0x00;
                out += 1;
            }
            base += index as usize;
            index = 1;
            continue;
        }

        index = index.wrapping_add(1);
        if index == 0 {
            return Err(Error::InvalidStuffing);
        }
    }

    Ok(out)
}
