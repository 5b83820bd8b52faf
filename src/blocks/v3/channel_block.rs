use super::parse_header_v3;
use crate::blocks::DataType;
use crate::blocks::common::{ByteOrder, latin1_field, read_u16_ord, read_u32_ord};
use crate::error::Result;

/// 3.x channel type code for a time (master) channel.
pub const CN_TYPE_TIME_V3: u16 = 1;

/// Channel block ("CN"), 3.x layout.
#[derive(Debug, Clone)]
pub struct ChannelBlockV3 {
    pub next_ch_addr: u32,
    pub conversion_addr: u32,
    pub source_addr: u32,
    pub dependency_addr: u32,
    pub comment_addr: u32,
    /// 0 = data channel, 1 = time channel.
    pub channel_type: u16,
    pub name: String,
    pub description: String,
    /// Bit position within the record, relative to `additional_byte_offset`.
    pub start_offset: u16,
    pub bit_count: u16,
    pub data_type: DataType,
    /// Extra byte offset added for records wider than 8192 bits; present only
    /// in the 228-byte layout.
    pub additional_byte_offset: u16,
    /// Link to a separate TX block holding the full name, when the 32-byte
    /// inline field was too short.
    pub long_name_addr: u32,
}

impl ChannelBlockV3 {
    pub const ID: &'static str = "CN";
    /// Size of the oldest layout; newer files append long-name and
    /// display-name links plus the additional byte offset (228 bytes).
    pub const MIN_SIZE: u16 = 218;

    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        let header = parse_header_v3(bytes, order, Self::ID, Self::MIN_SIZE)?;

        let long_name_addr = if header.size >= 222 {
            read_u32_ord(bytes, 218, order)
        } else {
            0
        };
        let additional_byte_offset = if header.size >= 228 {
            read_u16_ord(bytes, 226, order)
        } else {
            0
        };

        Ok(Self {
            next_ch_addr: read_u32_ord(bytes, 4, order),
            conversion_addr: read_u32_ord(bytes, 8, order),
            source_addr: read_u32_ord(bytes, 12, order),
            dependency_addr: read_u32_ord(bytes, 16, order),
            comment_addr: read_u32_ord(bytes, 20, order),
            channel_type: read_u16_ord(bytes, 24, order),
            name: latin1_field(&bytes[26..58]),
            description: latin1_field(&bytes[58..186]),
            start_offset: read_u16_ord(bytes, 186, order),
            bit_count: read_u16_ord(bytes, 188, order),
            data_type: map_data_type(read_u16_ord(bytes, 190, order), order),
            additional_byte_offset,
            long_name_addr,
        })
    }

    /// True for the group's time channel.
    pub fn is_master(&self) -> bool {
        self.channel_type == CN_TYPE_TIME_V3
    }

    /// Absolute bit position of the value within the record data.
    ///
    /// `start_offset` is only 16 bits wide, so records longer than 8192 bits
    /// spill into `additional_byte_offset`.
    pub fn record_bit_start(&self) -> u32 {
        u32::from(self.additional_byte_offset) * 8 + u32::from(self.start_offset)
    }
}

/// Translate a 3.x data type code into the normalized [`DataType`].
///
/// Codes 0..=3 use the file's default byte order; 9..=12 force big-endian and
/// 13..=16 force little-endian regardless of it. The VAX float codes (4..=6)
/// have no modern equivalent and stay unknown.
fn map_data_type(code: u16, order: ByteOrder) -> DataType {
    let big = order.is_big_endian();
    match code {
        0 if big => DataType::UnsignedIntegerBE,
        0 => DataType::UnsignedIntegerLE,
        1 if big => DataType::SignedIntegerBE,
        1 => DataType::SignedIntegerLE,
        2 | 3 if big => DataType::FloatBE,
        2 | 3 => DataType::FloatLE,
        7 => DataType::StringLatin1,
        8 => DataType::ByteArray,
        9 => DataType::UnsignedIntegerBE,
        10 => DataType::SignedIntegerBE,
        11 | 12 => DataType::FloatBE,
        13 => DataType::UnsignedIntegerLE,
        14 => DataType::SignedIntegerLE,
        15 | 16 => DataType::FloatLE,
        other => DataType::Unknown(other.min(255) as u8),
    }
}
