//! XML stream reassembly.
//!
//! The target talks in `<?xml …?><data>…</data>` envelopes. This module
//! recovers them from an arbitrary byte transport, consumes `<log …/>`
//! envelopes into the logger, and hands `<response …/>` envelopes to the
//! caller. Binary payloads following an XML exchange are fetched with
//! [`XmlStream::read_raw`].

use std::ops::Range;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::error::{Error, Result};
use crate::transport::Transport;

pub const MAX_XML_SIZE: usize = 4 * 1024;

const RX_TIMEOUT: Duration = Duration::from_secs(120);

/// One parsed `<?xml …?><data>…</data>` unit. Offsets are relative to
/// the buffer handed to [`parse_envelope`].
pub struct Envelope {
    /// Envelope length in bytes, up to and including `</data>`.
    pub len: usize,
    /// Name of the single inner tag.
    pub tag: Range<usize>,
    /// Offset of the first byte after `value="`, when present.
    pub value: Option<usize>,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Parses one envelope from the start of `xml`. Returns `None` while
/// the buffer does not yet hold a complete envelope.
pub fn parse_envelope(xml: &[u8]) -> Option<Envelope> {
    // Too small for <?xml plus the closing </data>.
    if xml.len() < 12 {
        return None;
    }
    let last = xml.len() - 7;

    // Skip the <?xml?> declaration and locate <data>.
    let data = find(&xml[6..], b"<data>")?;
    let mut offset = 6 + data + 6;
    if offset > last {
        return None;
    }

    // The next '<' opens the inner tag; the tag name runs to the space.
    while xml[offset] != b'<' {
        offset += 1;
        if offset > last {
            return None;
        }
    }
    offset += 1;
    if offset > last {
        return None;
    }
    let tag_start = offset;
    while xml[offset] != b' ' {
        offset += 1;
        if offset > last {
            return None;
        }
    }
    let tag_end = offset;
    offset += 1;

    // Pick up an optional value="…" before the tag closes.
    let mut value = None;
    while offset < last {
        if xml[offset..].starts_with(b"value=\"") {
            offset += 7;
            value = Some(offset);
        } else if xml[offset] == b'/' && xml[offset + 1] == b'>' {
            offset += 2;
            break;
        } else {
            offset += 1;
        }
    }

    let close = find(&xml[offset..], b"</data>")?;
    Some(Envelope {
        len: offset + close + 7,
        tag: tag_start..tag_end,
        value,
    })
}

/// Accumulates transport bytes until full envelopes can be recognized.
pub struct XmlStream {
    scratch: [u8; MAX_XML_SIZE],
    length: usize,
}

impl XmlStream {
    pub fn new() -> Self {
        XmlStream {
            scratch: [0; MAX_XML_SIZE],
            length: 0,
        }
    }

    fn shift_left(&mut self, bytes: usize) {
        let remain = self.length - bytes;
        self.scratch.copy_within(bytes..self.length, 0);
        for byte in &mut self.scratch[remain..self.length] {
            *byte = 0;
        }
        self.length = remain;
    }

    fn read_more(&mut self, link: &mut Transport) -> Result<()> {
        if self.length == self.scratch.len() {
            error!("xml scratch exhausted without a complete envelope");
            return Err(Error::NoMemory);
        }
        let offset = self.length;
        let bytes = link.rx_blocking(&mut self.scratch[offset..])?;
        self.length += bytes;
        Ok(())
    }

    /// Makes sure the scratch begins with `<?xml`, discarding leading
    /// bytes that do not belong to an envelope. Returns false while more
    /// data is needed.
    fn starts_with_xml(&mut self) -> bool {
        if self.length < 6 {
            return false;
        }
        match find(&self.scratch[..self.length], b"<?xml") {
            Some(0) => true,
            Some(offset) => {
                error!("unexpected data while reading XML, discarding {} bytes", offset);
                self.shift_left(offset);
                true
            }
            None => {
                for byte in &mut self.scratch[..self.length] {
                    *byte = 0;
                }
                self.length = 0;
                false
            }
        }
    }

    /// Delivers the next `<response …/>` envelope into `out`, returning
    /// its length. `<log …/>` envelopes received on the way are emitted
    /// to the logger; each one restarts the 120 s timeout.
    pub fn read_response(&mut self, link: &mut Transport, out: &mut [u8]) -> Result<usize> {
        let mut deadline = Instant::now();

        loop {
            while !self.starts_with_xml() {
                if deadline.elapsed() > RX_TIMEOUT {
                    return Err(Error::TransportTimeout);
                }
                self.read_more(link)?;
            }

            let envelope = loop {
                match parse_envelope(&self.scratch[..self.length]) {
                    Some(envelope) => break envelope,
                    None => {
                        if deadline.elapsed() > RX_TIMEOUT {
                            return Err(Error::TransportTimeout);
                        }
                        self.read_more(link)?;
                    }
                }
            };

            let tag = &self.scratch[envelope.tag.clone()];
            if tag.starts_with(b"log") {
                match envelope.value {
                    Some(value_start) => {
                        // The value ends at its closing quote, which must
                        // come before the trailing </data>.
                        let value_end = envelope.len - 7;
                        let quote = self.scratch[value_start..value_end]
                            .iter()
                            .position(|&byte| byte == b'"');
                        if let Some(quote) = quote {
                            info!(
                                "TARGET SAID: '{}'",
                                String::from_utf8_lossy(
                                    &self.scratch[value_start..value_start + quote]
                                )
                            );
                        }
                        deadline = Instant::now();
                    }
                    None => {
                        error!("target sent a log xml with no value string");
                    }
                }
                self.shift_left(envelope.len);
            } else if tag.starts_with(b"response") {
                if out.len() < envelope.len {
                    error!("input buffer is too small: {} < {}", out.len(), envelope.len);
                    return Err(Error::InvalidParameter);
                }
                let length = envelope.len;
                out[..length].copy_from_slice(&self.scratch[..length]);
                self.shift_left(length);
                return Ok(length);
            } else {
                warn!("discarding envelope with unexpected tag");
                self.shift_left(envelope.len);
            }

            if deadline.elapsed() > RX_TIMEOUT {
                return Err(Error::TransportTimeout);
            }
        }
    }

    /// Drains bytes already buffered in the scratch, then reads the
    /// transport directly. This is how callers pick up post-XML binary
    /// payloads.
    pub fn read_raw(&mut self, link: &mut Transport, out: &mut [u8]) -> Result<usize> {
        let mut total = 0;

        if self.length != 0 {
            let copied = out.len().min(self.length);
            out[..copied].copy_from_slice(&self.scratch[..copied]);
            if copied < self.length {
                self.shift_left(copied);
            } else {
                for byte in &mut self.scratch[..self.length] {
                    *byte = 0;
                }
                self.length = 0;
            }
            total = copied;
        }

        if total < out.len() {
            let bytes = link.rx_blocking(&mut out[total..])?;
            total += bytes;
        }

        Ok(total)
    }
}

impl Default for XmlStream {
    fn default() -> Self {
        XmlStream::new()
    }
}
