//! Common types, traits and helper functions for MDF block parsing.
//!
//! This module provides:
//! - [`BlockHeader`]: the 24-byte header present in all MDF 4.x blocks
//! - [`BlockParse`]: trait for parsing 4.x blocks from bytes
//! - [`ByteOrder`]: explicit byte order threaded through every multi-byte
//!   read (MDF 3.x metadata may be big-endian; 4.x metadata is always
//!   little-endian)
//! - byte parsing helpers shared by both dialects

use crate::error::{FormatError, Result};

/// Byte order for multi-byte integer and float fields.
///
/// Never ambient: the identification block declares the order once and it is
/// passed explicitly to every read that depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    #[inline]
    pub fn is_big_endian(self) -> bool {
        matches!(self, ByteOrder::BigEndian)
    }
}

// ============================================================================
// Byte parsing helpers
// ============================================================================

/// Read a u64 from a byte slice at the given offset (little-endian).
///
/// # Panics
/// Panics if `offset + 8 > bytes.len()`; callers validate with
/// [`validate_buffer_size`] first.
#[inline]
pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

/// Read a u32 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

/// Read a u16 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
}

/// Read an f64 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_f64(bytes: &[u8], offset: usize) -> f64 {
    f64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

/// Read a u8 from a byte slice at the given offset.
#[inline]
pub fn read_u8(bytes: &[u8], offset: usize) -> u8 {
    bytes[offset]
}

/// Read a u16 honoring an explicit byte order (3.x dialect).
#[inline]
pub fn read_u16_ord(bytes: &[u8], offset: usize, order: ByteOrder) -> u16 {
    let raw: [u8; 2] = bytes[offset..offset + 2].try_into().unwrap();
    match order {
        ByteOrder::LittleEndian => u16::from_le_bytes(raw),
        ByteOrder::BigEndian => u16::from_be_bytes(raw),
    }
}

/// Read a u32 honoring an explicit byte order (3.x dialect).
#[inline]
pub fn read_u32_ord(bytes: &[u8], offset: usize, order: ByteOrder) -> u32 {
    let raw: [u8; 4] = bytes[offset..offset + 4].try_into().unwrap();
    match order {
        ByteOrder::LittleEndian => u32::from_le_bytes(raw),
        ByteOrder::BigEndian => u32::from_be_bytes(raw),
    }
}

/// Read an f64 honoring an explicit byte order (3.x dialect).
#[inline]
pub fn read_f64_ord(bytes: &[u8], offset: usize, order: ByteOrder) -> f64 {
    let raw: [u8; 8] = bytes[offset..offset + 8].try_into().unwrap();
    match order {
        ByteOrder::LittleEndian => f64::from_le_bytes(raw),
        ByteOrder::BigEndian => f64::from_be_bytes(raw),
    }
}

/// Validate that a buffer has at least `expected` bytes.
#[inline]
pub fn validate_buffer_size(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(FormatError::TooShortBuffer {
            actual: bytes.len(),
            expected,
        }
        .into());
    }
    Ok(())
}

/// Decode a fixed-width, NUL-padded Latin-1 text field.
pub fn latin1_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end].iter().map(|&b| b as char).collect()
}

// ============================================================================
// MDF 4.x block header
// ============================================================================

/// The 24-byte header at the start of every MDF 4.x block.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    /// 4-byte block type identifier (e.g. "##HD", "##DG").
    pub id: String,
    /// Total length of the block in bytes, including this header.
    pub length: u64,
    /// Number of link fields following the header.
    pub link_count: u64,
}

impl BlockHeader {
    /// Parse a block header from the first 24 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        validate_buffer_size(bytes, 24)?;

        let id = match core::str::from_utf8(&bytes[0..4]) {
            Ok(s) => String::from(s),
            Err(_) => String::from_utf8_lossy(&bytes[0..4]).into_owned(),
        };

        Ok(Self {
            id,
            length: read_u64(bytes, 8),
            link_count: read_u64(bytes, 16),
        })
    }
}

/// Trait for parsing MDF 4.x blocks identified by a 4-character tag.
pub trait BlockParse<'a>: Sized {
    const ID: &'static str;
    /// Minimum total block length for this type, header included.
    const MIN_LEN: u64 = 24;

    fn parse_header(bytes: &[u8]) -> Result<BlockHeader> {
        let header = BlockHeader::from_bytes(bytes)?;
        if header.id != Self::ID {
            return Err(FormatError::BlockIdMismatch {
                actual: header.id,
                expected: Self::ID,
                address: 0,
            }
            .into());
        }
        if header.length < Self::MIN_LEN {
            return Err(FormatError::BlockTooSmall {
                id: header.id,
                declared: header.length,
                minimum: Self::MIN_LEN,
            }
            .into());
        }
        Ok(header)
    }

    fn from_bytes(bytes: &'a [u8]) -> Result<Self>;
}

/// Bounds-check a link and return the block slice starting at `address`.
///
/// `address` is an absolute byte offset from file start; `0` is the defined
/// null link and must be filtered by the caller.
pub fn slice_at(data: &[u8], address: u64) -> Result<&[u8]> {
    let offset = usize::try_from(address).map_err(|_| FormatError::LinkOutOfBounds {
        address,
        file_len: data.len(),
    })?;
    if offset >= data.len() {
        return Err(FormatError::LinkOutOfBounds {
            address,
            file_len: data.len(),
        }
        .into());
    }
    Ok(&data[offset..])
}

/// Peek the 4-character id of the 4.x block at `address`.
pub fn peek_block_id(data: &[u8], address: u64) -> Result<[u8; 4]> {
    let bytes = slice_at(data, address)?;
    validate_buffer_size(bytes, 4)?;
    Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_header_parses_id_and_lengths() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"##HD");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&104u64.to_le_bytes());
        bytes.extend_from_slice(&6u64.to_le_bytes());
        let header = BlockHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.id, "##HD");
        assert_eq!(header.length, 104);
        assert_eq!(header.link_count, 6);
    }

    #[test]
    fn ordered_reads_honor_byte_order() {
        let bytes = [0x12, 0x34];
        assert_eq!(read_u16_ord(&bytes, 0, ByteOrder::LittleEndian), 0x3412);
        assert_eq!(read_u16_ord(&bytes, 0, ByteOrder::BigEndian), 0x1234);
    }

    #[test]
    fn slice_at_rejects_out_of_bounds() {
        let data = [0u8; 16];
        assert!(slice_at(&data, 16).is_err());
        assert!(slice_at(&data, 8).is_ok());
    }

    #[test]
    fn latin1_field_trims_at_nul() {
        assert_eq!(latin1_field(b"abc\0\0\0"), "abc");
        assert_eq!(latin1_field(b"abc"), "abc");
    }
}
