use super::parse_header_v3;
use crate::blocks::common::{ByteOrder, latin1_field, read_u16_ord, read_u32_ord};
use crate::error::Result;

/// Header block ("HD"), 3.x layout. Anchors the data group list.
#[derive(Debug, Clone)]
pub struct HeaderBlockV3 {
    pub first_dg_addr: u32,
    pub comment_addr: u32,
    pub program_addr: u32,
    pub data_group_count: u16,
    /// Recording start date as "DD:MM:YYYY".
    pub date: String,
    /// Recording start time as "HH:MM:SS".
    pub time: String,
    pub author: String,
}

impl HeaderBlockV3 {
    pub const ID: &'static str = "HD";
    /// Size of the 3.0 layout; 3.2 appends timestamp fields we do not need.
    pub const MIN_SIZE: u16 = 164;

    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        parse_header_v3(bytes, order, Self::ID, Self::MIN_SIZE)?;

        Ok(Self {
            first_dg_addr: read_u32_ord(bytes, 4, order),
            comment_addr: read_u32_ord(bytes, 8, order),
            program_addr: read_u32_ord(bytes, 12, order),
            data_group_count: read_u16_ord(bytes, 16, order),
            date: latin1_field(&bytes[18..28]),
            time: latin1_field(&bytes[28..36]),
            author: latin1_field(&bytes[36..68]),
        })
    }
}
