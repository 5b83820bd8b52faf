use super::parse_header_v3;
use crate::blocks::common::{ByteOrder, read_u16_ord, read_u32_ord};
use crate::error::Result;

/// Data group block ("DG"), 3.x layout.
///
/// Unlike 4.x, the data pointer leads to raw record bytes with no enclosing
/// block, and the record id prefix width is given as a count of id bytes
/// (0, 1 or 2; with 2, the id is repeated after each record).
#[derive(Debug, Clone)]
pub struct DataGroupBlockV3 {
    pub next_dg_addr: u32,
    pub first_cg_addr: u32,
    pub trigger_addr: u32,
    pub data_addr: u32,
    pub channel_group_count: u16,
    pub record_id_count: u16,
}

impl DataGroupBlockV3 {
    pub const ID: &'static str = "DG";
    pub const MIN_SIZE: u16 = 24;

    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        parse_header_v3(bytes, order, Self::ID, Self::MIN_SIZE)?;

        Ok(Self {
            next_dg_addr: read_u32_ord(bytes, 4, order),
            first_cg_addr: read_u32_ord(bytes, 8, order),
            trigger_addr: read_u32_ord(bytes, 12, order),
            data_addr: read_u32_ord(bytes, 16, order),
            channel_group_count: read_u16_ord(bytes, 20, order),
            record_id_count: read_u16_ord(bytes, 22, order),
        })
    }

    /// Width of the record id prefix in bytes (the trailing copy written for
    /// `record_id_count == 2` is handled by the record iterator).
    pub fn record_id_prefix(&self) -> usize {
        usize::from(self.record_id_count != 0)
    }
}
