// src/blocks/header_block.rs

use super::HD_BLOCK_SIZE;
use crate::blocks::common::{BlockHeader, BlockParse, read_u64, validate_buffer_size};
use crate::error::Result;

/// Header block (##HD) — file-level metadata, entry point of the block graph.
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    pub header: BlockHeader,
    /// Link to the first data group block (0 when the file has no data).
    pub first_dg_addr: u64,
    /// Link to the file history chain.
    pub file_history_addr: u64,
    /// Link to the comment text/metadata block.
    pub comment_addr: u64,
    /// Absolute start time in nanoseconds since the epoch.
    pub abs_time: u64,
}

impl BlockParse<'_> for HeaderBlock {
    const ID: &'static str = "##HD";
    const MIN_LEN: u64 = HD_BLOCK_SIZE as u64;

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, HD_BLOCK_SIZE)?;

        Ok(Self {
            header,
            first_dg_addr: read_u64(bytes, 24),
            file_history_addr: read_u64(bytes, 32),
            // links at 40..64 (channel tree, attachments, events) are not
            // needed for decoding
            comment_addr: read_u64(bytes, 64),
            abs_time: read_u64(bytes, 72),
        })
    }
}
