use super::CG_BLOCK_SIZE;
use crate::blocks::common::{
    BlockHeader, BlockParse, read_u16, read_u32, read_u64, validate_buffer_size,
};
use crate::error::Result;

/// Flag bit: the channel group itself stores variable-length records
/// (VLSD channel group).
pub const CG_FLAG_VLSD: u16 = 0x01;

/// Channel group block (##CG) — one fixed-format record layout.
#[derive(Debug, Clone)]
pub struct ChannelGroupBlock {
    pub header: BlockHeader,
    pub next_cg_addr: u64,
    pub first_ch_addr: u64,
    /// Link to acquisition name text block.
    pub acq_name_addr: u64,
    /// Link to acquisition source block.
    pub acq_source_addr: u64,
    /// Link to first sample reduction block (ignored for decoding).
    pub first_sr_addr: u64,
    pub comment_addr: u64,
    /// Record id tag used to route records in unsorted data groups.
    pub record_id: u64,
    /// Declared number of records (cycles).
    pub cycle_count: u64,
    pub flags: u16,
    /// Record data length in bytes, excluding record id and invalidation
    /// bytes. For VLSD groups this is the maximum payload length.
    pub samples_byte_nr: u32,
    /// Number of invalidation bytes trailing each record.
    pub invalidation_bytes_nr: u32,
}

impl BlockParse<'_> for ChannelGroupBlock {
    const ID: &'static str = "##CG";
    const MIN_LEN: u64 = CG_BLOCK_SIZE as u64;

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, CG_BLOCK_SIZE)?;

        Ok(Self {
            header,
            next_cg_addr: read_u64(bytes, 24),
            first_ch_addr: read_u64(bytes, 32),
            acq_name_addr: read_u64(bytes, 40),
            acq_source_addr: read_u64(bytes, 48),
            first_sr_addr: read_u64(bytes, 56),
            comment_addr: read_u64(bytes, 64),
            record_id: read_u64(bytes, 72),
            cycle_count: read_u64(bytes, 80),
            flags: read_u16(bytes, 88),
            samples_byte_nr: read_u32(bytes, 96),
            invalidation_bytes_nr: read_u32(bytes, 100),
        })
    }
}

impl ChannelGroupBlock {
    /// True when this group stores variable-length records.
    pub fn is_vlsd(&self) -> bool {
        self.flags & CG_FLAG_VLSD != 0
    }
}
