use crate::blocks::common::{BlockHeader, BlockParse, validate_buffer_size};
use crate::error::{FormatError, Result};

/// Data block (##DT or ##DV) — a contiguous run of raw record bytes.
///
/// The payload is borrowed from the file buffer; no copy is made for
/// uncompressed data.
#[derive(Debug, Clone)]
pub struct DataBlock<'a> {
    pub header: BlockHeader,
    pub data: &'a [u8],
}

impl<'a> DataBlock<'a> {
    /// Parse a DT or DV block. Both carry nothing but raw bytes after the
    /// header; which id is used depends on whether invalidation data is
    /// stored separately.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        let header = BlockHeader::from_bytes(bytes)?;
        if header.id != "##DT" && header.id != "##DV" {
            return Err(FormatError::BlockIdMismatch {
                actual: header.id,
                expected: "##DT",
                address: 0,
            }
            .into());
        }
        if header.length < 24 {
            return Err(FormatError::BlockTooSmall {
                id: header.id,
                declared: header.length,
                minimum: 24,
            }
            .into());
        }
        let end = header.length as usize;
        validate_buffer_size(bytes, end)?;
        Ok(Self {
            header,
            data: &bytes[24..end],
        })
    }
}

/// Signal data block (##SD) — variable-length payloads for VLSD channels.
///
/// The payload is a back-to-back sequence of `u32` length prefixes, each
/// followed by that many bytes.
#[derive(Debug, Clone)]
pub struct SignalDataBlock<'a> {
    pub header: BlockHeader,
    pub data: &'a [u8],
}

impl<'a> BlockParse<'a> for SignalDataBlock<'a> {
    const ID: &'static str = "##SD";

    fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let end = header.length as usize;
        validate_buffer_size(bytes, end)?;
        Ok(Self {
            header,
            data: &bytes[24..end],
        })
    }
}
