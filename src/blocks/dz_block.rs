//! DZ block — compressed data block.
//!
//! A DZ block stands in for another data block (DT, DV or SD) and carries its
//! payload zlib-compressed, optionally after a byte transposition that groups
//! column bytes together to help the compressor. Decompression requires the
//! `compression` feature.

use crate::blocks::common::{
    BlockHeader, BlockParse, read_u8, read_u32, read_u64, validate_buffer_size,
};
use crate::error::{FormatError, Result};

/// Compression envelope used in a DZ block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DzCompressionType {
    /// Deflate only (zlib stream).
    Deflate,
    /// Byte transposition followed by deflate.
    TranspositionDeflate,
}

impl DzCompressionType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Deflate),
            1 => Some(Self::TranspositionDeflate),
            _ => None,
        }
    }
}

/// DZ block header size (standard 24 + DZ-specific 24).
pub const DZ_HEADER_SIZE: usize = 48;

/// DZ block — zlib-compressed stand-in for a DT/DV/SD block.
#[derive(Debug, Clone)]
pub struct DzBlock<'a> {
    pub header: BlockHeader,
    /// Original block type identifier (e.g. "DT", "SD").
    pub original_block_type: [u8; 2],
    pub zip_type: DzCompressionType,
    /// For transposition: the column count (record length).
    pub zip_parameter: u32,
    /// Uncompressed payload size in bytes.
    pub original_data_length: u64,
    /// Compressed payload size in bytes.
    pub compressed_data_length: u64,
    /// Compressed payload.
    pub data: &'a [u8],
}

impl<'a> BlockParse<'a> for DzBlock<'a> {
    const ID: &'static str = "##DZ";
    const MIN_LEN: u64 = DZ_HEADER_SIZE as u64;

    fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, DZ_HEADER_SIZE)?;

        let original_block_type = [bytes[24], bytes[25]];
        let zip_type_raw = read_u8(bytes, 26);
        let zip_type = DzCompressionType::from_u8(zip_type_raw).ok_or_else(|| {
            FormatError::Decompression(format!("unknown DZ compression type {zip_type_raw}"))
        })?;
        let zip_parameter = read_u32(bytes, 28);
        let original_data_length = read_u64(bytes, 32);
        let compressed_data_length = read_u64(bytes, 40);

        let data_end = DZ_HEADER_SIZE + compressed_data_length as usize;
        validate_buffer_size(bytes, data_end)?;

        Ok(Self {
            header,
            original_block_type,
            zip_type,
            zip_parameter,
            original_data_length,
            compressed_data_length,
            data: &bytes[DZ_HEADER_SIZE..data_end],
        })
    }
}

#[cfg(feature = "compression")]
impl DzBlock<'_> {
    /// Decompress the payload back to the original block's bytes.
    ///
    /// The inverse transposition (for column-major storage) runs as a
    /// separate pre-pass here, so record extraction downstream stays
    /// layout-agnostic.
    pub fn decompress(&self) -> Result<Vec<u8>> {
        use miniz_oxide::inflate::decompress_to_vec_zlib;

        let decompressed = decompress_to_vec_zlib(self.data)
            .map_err(|e| FormatError::Decompression(format!("{e:?}")))?;

        if decompressed.len() != self.original_data_length as usize {
            return Err(FormatError::Decompression(format!(
                "size mismatch: expected {}, got {}",
                self.original_data_length,
                decompressed.len()
            ))
            .into());
        }

        match self.zip_type {
            DzCompressionType::Deflate => Ok(decompressed),
            DzCompressionType::TranspositionDeflate => self.inverse_transpose(decompressed),
        }
    }

    /// Restore row-major (record-by-record) byte order from the column-major
    /// layout produced by the transposition step.
    fn inverse_transpose(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        let columns = self.zip_parameter as usize;
        if columns == 0 {
            return Err(FormatError::Decompression(
                "transposition column count is zero".to_string(),
            )
            .into());
        }

        let total = data.len();
        // Only the whole rows are transposed; a trailing partial row is
        // stored untouched after them.
        let rows = total / columns;
        let transposed_len = rows * columns;

        let mut result = vec![0u8; total];
        for col in 0..columns {
            for row in 0..rows {
                result[row * columns + col] = data[col * rows + row];
            }
        }
        result[transposed_len..].copy_from_slice(&data[transposed_len..]);

        Ok(result)
    }
}
