use super::parse_header_v3;
use crate::blocks::common::{ByteOrder, read_u16_ord, read_u32_ord};
use crate::error::Result;

/// Channel group block ("CG"), 3.x layout.
#[derive(Debug, Clone)]
pub struct ChannelGroupBlockV3 {
    pub next_cg_addr: u32,
    pub first_ch_addr: u32,
    pub comment_addr: u32,
    pub record_id: u16,
    pub channel_count: u16,
    /// Record data size in bytes, id prefix excluded.
    pub record_size: u16,
    pub record_count: u32,
}

impl ChannelGroupBlockV3 {
    pub const ID: &'static str = "CG";
    pub const MIN_SIZE: u16 = 26;

    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        parse_header_v3(bytes, order, Self::ID, Self::MIN_SIZE)?;

        Ok(Self {
            next_cg_addr: read_u32_ord(bytes, 4, order),
            first_ch_addr: read_u32_ord(bytes, 8, order),
            comment_addr: read_u32_ord(bytes, 12, order),
            record_id: read_u16_ord(bytes, 16, order),
            channel_count: read_u16_ord(bytes, 18, order),
            record_size: read_u16_ord(bytes, 20, order),
            record_count: read_u32_ord(bytes, 22, order),
        })
    }
}
