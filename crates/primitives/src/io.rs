//! Little-endian binary codec with compact variable-length integers.
//!
//! The writer is infallible and appends to an owned buffer; the reader
//! tracks its offset so truncation errors point at the failing field.

use crate::error::IoError;
use crate::hash::{UInt160, UInt256};

/// Hard cap for decoded collection lengths. Anything above this is a
/// malformed or hostile payload, not a real consensus message.
pub const MAX_ARRAY_SIZE: u64 = 0x0100_0000;

/// A sequential little-endian writer over an owned `Vec<u8>`.
#[derive(Debug, Clone, Default)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
}

impl BinaryWriter {
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_uint256(&mut self, value: &UInt256) {
        self.write_bytes(value.as_bytes());
    }

    pub fn write_uint160(&mut self, value: &UInt160) {
        self.write_bytes(value.as_bytes());
    }

    /// Compact var-int: values below 0xFD inline, larger ones prefixed with
    /// 0xFD/0xFE/0xFF and stored as 2/4/8 little-endian bytes.
    pub fn write_var_int(&mut self, value: u64) {
        if value < 0xFD {
            self.write_u8(value as u8);
        } else if value <= 0xFFFF {
            self.write_u8(0xFD);
            self.write_u16(value as u16);
        } else if value <= 0xFFFF_FFFF {
            self.write_u8(0xFE);
            self.write_u32(value as u32);
        } else {
            self.write_u8(0xFF);
            self.write_u64(value);
        }
    }

    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_var_int(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// A bounds-checked reader over a borrowed byte slice.
#[derive(Debug)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> BinaryReader<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], IoError> {
        if self.remaining() < count {
            return Err(IoError::UnexpectedEof {
                offset: self.offset,
                needed: count - self.remaining(),
            });
        }
        let slice = &self.data[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, IoError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, IoError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32, IoError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, IoError> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], IoError> {
        self.take(count)
    }

    pub fn read_uint256(&mut self) -> Result<UInt256, IoError> {
        let offset = self.offset;
        let bytes = self.take(32)?;
        UInt256::from_bytes(bytes).map_err(|_| IoError::InvalidValue("UInt256", offset))
    }

    pub fn read_uint160(&mut self) -> Result<UInt160, IoError> {
        let offset = self.offset;
        let bytes = self.take(20)?;
        UInt160::from_bytes(bytes).map_err(|_| IoError::InvalidValue("UInt160", offset))
    }

    pub fn read_var_int(&mut self, max: u64) -> Result<u64, IoError> {
        let prefix = self.read_u8()?;
        let value = match prefix {
            0xFD => u64::from(self.read_u16()?),
            0xFE => u64::from(self.read_u32()?),
            0xFF => self.read_u64()?,
            inline => u64::from(inline),
        };
        if value > max {
            return Err(IoError::VarIntTooLarge { value, max });
        }
        Ok(value)
    }

    pub fn read_var_bytes(&mut self, max: u64) -> Result<&'a [u8], IoError> {
        let len = self.read_var_int(max)?;
        self.take(len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_roundtrip() {
        let mut w = BinaryWriter::new();
        w.write_u8(0xAB);
        w.write_u16(0xBEEF);
        w.write_u32(0xDEAD_BEEF);
        w.write_u64(0x0102_0304_0506_0708);
        let bytes = w.into_bytes();

        let mut r = BinaryReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 0xAB);
        assert_eq!(r.read_u16().unwrap(), 0xBEEF);
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.read_u64().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn var_int_width_boundaries() {
        for value in [0u64, 0xFC, 0xFD, 0xFFFF, 0x1_0000, 0xFFFF_FFFF, 0x1_0000_0000] {
            let mut w = BinaryWriter::new();
            w.write_var_int(value);
            let bytes = w.into_bytes();
            let mut r = BinaryReader::new(&bytes);
            assert_eq!(r.read_var_int(u64::MAX).unwrap(), value);
        }
    }

    #[test]
    fn var_int_respects_limit() {
        let mut w = BinaryWriter::new();
        w.write_var_int(600);
        let bytes = w.into_bytes();
        let mut r = BinaryReader::new(&bytes);
        assert_eq!(
            r.read_var_int(500).unwrap_err(),
            IoError::VarIntTooLarge {
                value: 600,
                max: 500
            }
        );
    }

    #[test]
    fn truncated_read_reports_offset() {
        let bytes = [0u8; 3];
        let mut r = BinaryReader::new(&bytes);
        r.read_u8().unwrap();
        let err = r.read_u32().unwrap_err();
        assert_eq!(
            err,
            IoError::UnexpectedEof {
                offset: 1,
                needed: 2
            }
        );
    }

    #[test]
    fn var_bytes_roundtrip() {
        let payload = vec![7u8; 70];
        let mut w = BinaryWriter::new();
        w.write_var_bytes(&payload);
        let bytes = w.into_bytes();
        let mut r = BinaryReader::new(&bytes);
        assert_eq!(r.read_var_bytes(MAX_ARRAY_SIZE).unwrap(), &payload[..]);
    }
}
