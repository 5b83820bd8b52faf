use super::DG_BLOCK_SIZE;
use crate::blocks::common::{BlockHeader, BlockParse, read_u8, read_u64, validate_buffer_size};
use crate::error::Result;

/// Data group block (##DG) — groups channel groups sharing one record stream.
#[derive(Debug, Clone)]
pub struct DataGroupBlock {
    pub header: BlockHeader,
    /// Link to next data group block (0 if last).
    pub next_dg_addr: u64,
    /// Link to first channel group block.
    pub first_cg_addr: u64,
    /// Link to the data block (DT, DV, DL, HL or DZ).
    pub data_block_addr: u64,
    /// Link to comment text/metadata block.
    pub comment_addr: u64,
    /// Size of the record id prefix in bytes (0, 1, 2, 4 or 8). Non-zero
    /// means the group's records are interleaved (unsorted data group).
    pub record_id_size: u8,
}

impl BlockParse<'_> for DataGroupBlock {
    const ID: &'static str = "##DG";
    const MIN_LEN: u64 = DG_BLOCK_SIZE as u64;

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, DG_BLOCK_SIZE)?;

        Ok(Self {
            header,
            next_dg_addr: read_u64(bytes, 24),
            first_cg_addr: read_u64(bytes, 32),
            data_block_addr: read_u64(bytes, 40),
            comment_addr: read_u64(bytes, 48),
            record_id_size: read_u8(bytes, 56),
        })
    }
}
