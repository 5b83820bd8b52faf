use super::CN_BLOCK_SIZE;
use crate::blocks::common::{
    BlockHeader, BlockParse, read_u8, read_u32, read_u64, validate_buffer_size,
};
use crate::error::Result;

// Channel type codes (cn_type)
pub const CN_TYPE_FIXED: u8 = 0;
pub const CN_TYPE_VLSD: u8 = 1;
pub const CN_TYPE_MASTER: u8 = 2;
pub const CN_TYPE_VIRTUAL_MASTER: u8 = 3;

// Flag bit positions for cn_flags
pub const CN_FLAG_ALL_INVALID: u32 = 0x01;
pub const CN_FLAG_INVAL_BIT_VALID: u32 = 0x02;

/// Channel sample data type, normalized across both dialects.
///
/// The 4.x codes map directly; the 3.x parser translates its own codes (and
/// the identification block's default byte order) into these variants so the
/// rest of the pipeline is version-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    UnsignedIntegerLE,
    UnsignedIntegerBE,
    SignedIntegerLE,
    SignedIntegerBE,
    FloatLE,
    FloatBE,
    StringLatin1,
    StringUtf8,
    StringUtf16LE,
    StringUtf16BE,
    ByteArray,
    MimeSample,
    MimeStream,
    CanOpenDate,
    CanOpenTime,
    Unknown(u8),
}

impl DataType {
    /// Convert the MDF 4.x numeric code to the corresponding `DataType`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => DataType::UnsignedIntegerLE,
            1 => DataType::UnsignedIntegerBE,
            2 => DataType::SignedIntegerLE,
            3 => DataType::SignedIntegerBE,
            4 => DataType::FloatLE,
            5 => DataType::FloatBE,
            6 => DataType::StringLatin1,
            7 => DataType::StringUtf8,
            8 => DataType::StringUtf16LE,
            9 => DataType::StringUtf16BE,
            10 => DataType::ByteArray,
            11 => DataType::MimeSample,
            12 => DataType::MimeStream,
            13 => DataType::CanOpenDate,
            14 => DataType::CanOpenTime,
            other => DataType::Unknown(other),
        }
    }

    /// True for string-typed channels (any encoding).
    pub fn is_string(self) -> bool {
        matches!(
            self,
            DataType::StringLatin1
                | DataType::StringUtf8
                | DataType::StringUtf16LE
                | DataType::StringUtf16BE
        )
    }

    /// True for channels whose payload is an opaque byte sequence.
    pub fn is_bytes(self) -> bool {
        matches!(
            self,
            DataType::ByteArray | DataType::MimeSample | DataType::MimeStream
        )
    }

    /// True when multi-byte values are stored big-endian.
    pub fn is_big_endian(self) -> bool {
        matches!(
            self,
            DataType::UnsignedIntegerBE
                | DataType::SignedIntegerBE
                | DataType::FloatBE
                | DataType::StringUtf16BE
        )
    }
}

/// Channel block (##CN) — one decodable signal within a record.
#[derive(Debug, Clone)]
pub struct ChannelBlock {
    pub header: BlockHeader,
    pub next_ch_addr: u64,
    /// Link to a composition (nested CN chain or CA array block).
    pub component_addr: u64,
    pub name_addr: u64,
    pub source_addr: u64,
    pub conversion_addr: u64,
    /// For VLSD channels: link to the signal data (SD/DL) chain.
    pub data_addr: u64,
    pub unit_addr: u64,
    pub comment_addr: u64,
    pub channel_type: u8,
    pub sync_type: u8,
    pub data_type: DataType,
    /// Bit offset within the start byte (0..7).
    pub bit_offset: u8,
    /// Byte offset of the start byte within the record data.
    pub byte_offset: u32,
    pub bit_count: u32,
    pub flags: u32,
    /// Position of this channel's invalidation bit within the invalidation
    /// bytes, when `CN_FLAG_INVAL_BIT_VALID` is set.
    pub pos_invalidation_bit: u32,
}

impl BlockParse<'_> for ChannelBlock {
    const ID: &'static str = "##CN";
    const MIN_LEN: u64 = CN_BLOCK_SIZE as u64;

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, CN_BLOCK_SIZE)?;

        Ok(Self {
            header,
            // Links section (8 x u64 at offset 24)
            next_ch_addr: read_u64(bytes, 24),
            component_addr: read_u64(bytes, 32),
            name_addr: read_u64(bytes, 40),
            source_addr: read_u64(bytes, 48),
            conversion_addr: read_u64(bytes, 56),
            data_addr: read_u64(bytes, 64),
            unit_addr: read_u64(bytes, 72),
            comment_addr: read_u64(bytes, 80),
            // Format section at offset 88
            channel_type: read_u8(bytes, 88),
            sync_type: read_u8(bytes, 89),
            data_type: DataType::from_u8(read_u8(bytes, 90)),
            bit_offset: read_u8(bytes, 91),
            byte_offset: read_u32(bytes, 92),
            bit_count: read_u32(bytes, 96),
            flags: read_u32(bytes, 100),
            pos_invalidation_bit: read_u32(bytes, 104),
            // range limits at 112.. are not needed for decoding
        })
    }
}

impl ChannelBlock {
    /// True for master and virtual-master channels.
    pub fn is_master(&self) -> bool {
        self.channel_type == CN_TYPE_MASTER || self.channel_type == CN_TYPE_VIRTUAL_MASTER
    }

    /// True for variable-length signal data channels.
    pub fn is_vlsd(&self) -> bool {
        self.channel_type == CN_TYPE_VLSD && self.data_addr != 0
    }
}
