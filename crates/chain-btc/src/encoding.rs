//! Little-endian primitives and CompactSize integers shared by the legacy and
//! Zcash wire formats.

use crate::error::BtcError;

/// Write a Bitcoin CompactSize variable-length integer.
pub fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    if n < 0xFD {
        buf.push(n as u8);
    } else if n <= 0xFFFF {
        buf.push(0xFD);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xFFFF_FFFF {
        buf.push(0xFE);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xFF);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

/// Serialized length of a CompactSize integer.
pub fn compact_size_len(n: u64) -> usize {
    match n {
        0..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

/// Length-prefixed byte string.
pub fn write_var_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    write_compact_size(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// Cursor over a serialized transaction.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], BtcError> {
        if self.remaining() < len {
            return Err(BtcError::Decode(format!(
                "unexpected end of data: need {len} bytes at offset {}, have {}",
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), BtcError> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BtcError> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, BtcError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, BtcError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, BtcError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, BtcError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, BtcError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64_le(&mut self) -> Result<i64, BtcError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Reads a CompactSize and rejects non-canonical encodings.
    pub fn read_compact_size(&mut self) -> Result<u64, BtcError> {
        let first = self.read_u8()?;
        let (value, min) = match first {
            0xFD => (self.read_u16_le()? as u64, 0xFD),
            0xFE => (self.read_u32_le()? as u64, 0x1_0000),
            0xFF => (self.read_u64_le()?, 0x1_0000_0000),
            n => return Ok(n as u64),
        };
        if value < min {
            return Err(BtcError::Decode(format!(
                "non-canonical compact size {value}"
            )));
        }
        Ok(value)
    }

    /// Reads a count that must fit in the remaining data at `min_item_size`
    /// bytes per item, so hostile counts cannot force huge allocations.
    pub fn read_count(&mut self, min_item_size: usize) -> Result<usize, BtcError> {
        let count = self.read_compact_size()?;
        let max = self.remaining() / min_item_size.max(1);
        if count > max as u64 {
            return Err(BtcError::Decode(format!(
                "count {count} exceeds remaining data"
            )));
        }
        Ok(count as usize)
    }

    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, BtcError> {
        let len = self.read_count(1)?;
        Ok(self.read_bytes(len)?.to_vec())
    }
}
