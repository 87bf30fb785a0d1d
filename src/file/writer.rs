//! Growable byte sink, the writing counterpart of [`crate::file::parser::Parser`].
//!
//! Every encoding produced here is read back by the matching `Parser` method:
//! [`Writer::write_7bit_encoded_int`] by `read_7bit_encoded_int`,
//! [`Writer::write_prefixed_string_utf8`] by `read_prefixed_string_utf8`, and so on.

use crate::file::io::ImageIO;

/// Append-only little-endian byte writer.
#[derive(Debug, Default)]
pub struct Writer {
    buffer: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create an empty writer with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append a little-endian primitive.
    pub fn write_le<T: ImageIO>(&mut self, value: T) {
        self.buffer.extend_from_slice(value.to_le_bytes().as_ref());
    }

    /// Append a 7-bit encoded unsigned integer.
    pub fn write_7bit_encoded_int(&mut self, mut value: u32) {
        while value >= 0x80 {
            self.buffer.push((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        self.buffer.push(value as u8);
    }

    /// Append a length-prefixed UTF-8 string.
    ///
    /// Strings longer than `u32::MAX` bytes cannot be represented and are truncated.
    pub fn write_prefixed_string_utf8(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let length = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        self.write_7bit_encoded_int(length);
        self.buffer.extend_from_slice(&bytes[..length as usize]);
    }

    /// Append a GUID in its on-disk byte order.
    pub fn write_guid(&mut self, guid: &uguid::Guid) {
        self.buffer.extend_from_slice(&guid.to_bytes());
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Consume the writer and return the written bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}
