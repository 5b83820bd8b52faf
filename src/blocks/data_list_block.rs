use crate::blocks::common::{
    BlockHeader, BlockParse, read_u8, read_u16, read_u64, validate_buffer_size,
};
use crate::error::Result;

/// Data list block (##DL) — ordered list of data block fragments.
///
/// Large or compressed record streams are split across multiple DT/DZ
/// fragments chained through DL blocks.
#[derive(Debug, Clone)]
pub struct DataListBlock {
    pub header: BlockHeader,
    /// Link to the next DL block in the chain (0 = end).
    pub next: u64,
    /// Offsets of the data block fragments, in on-disk order.
    pub data_links: Vec<u64>,
    pub flags: u8,
}

impl BlockParse<'_> for DataListBlock {
    const ID: &'static str = "##DL";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;

        // Saturating: a corrupt link_count fails the size check below.
        let link_count = header.link_count as usize;
        let min_len = link_count.saturating_mul(8).saturating_add(24 + 8);
        validate_buffer_size(bytes, min_len)?;

        // First link is 'next'; the rest point to data fragments.
        let next = read_u64(bytes, 24);
        let mut data_links = Vec::with_capacity(link_count.saturating_sub(1));
        for i in 1..link_count {
            let link = read_u64(bytes, 24 + i * 8);
            if link != 0 {
                data_links.push(link);
            }
        }
        let flags = read_u8(bytes, 24 + link_count * 8);

        Ok(Self {
            header,
            next,
            data_links,
            flags,
        })
    }
}

/// Header list block (##HL) — sits in front of a DL chain whose fragments
/// are DZ-compressed, declaring the compression flags once for the chain.
#[derive(Debug, Clone)]
pub struct HeaderListBlock {
    pub header: BlockHeader,
    /// Link to the first DL block.
    pub first_dl_addr: u64,
    pub flags: u16,
    /// Compression algorithm used by the chained DZ blocks.
    pub zip_type: u8,
}

impl BlockParse<'_> for HeaderListBlock {
    const ID: &'static str = "##HL";
    const MIN_LEN: u64 = 40;

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, 40)?;

        Ok(Self {
            header,
            first_dl_addr: read_u64(bytes, 24),
            flags: read_u16(bytes, 32),
            zip_type: read_u8(bytes, 34),
        })
    }
}
