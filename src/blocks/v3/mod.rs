//! MDF 3.x dialect blocks.
//!
//! The 3.x generation uses 2-character block ids, u16 block sizes, u32 links
//! and stores all metadata in the byte order declared by the identification
//! block. Everything here parses into the same version-neutral directory
//! model as the 4.x blocks; nothing downstream of the walker sees a 3.x
//! structure.

mod channel_block;
mod channel_group_block;
mod conversion_block;
mod data_group_block;
mod header_block;
mod text_block;

pub use channel_block::{CN_TYPE_TIME_V3, ChannelBlockV3};
pub use channel_group_block::ChannelGroupBlockV3;
pub use conversion_block::{CC_TYPE_IDENTITY_V3, ConversionBlockV3, ConversionDataV3, TextRangeV3};
pub use data_group_block::DataGroupBlockV3;
pub use header_block::HeaderBlockV3;
pub use text_block::read_text_block_v3;

use crate::blocks::common::{ByteOrder, read_u16_ord, validate_buffer_size};
use crate::error::{FormatError, Result};

/// The 4-byte header at the start of every 3.x block: a 2-character id and a
/// u16 total size.
#[derive(Debug, Clone)]
pub struct BlockHeaderV3 {
    pub id: String,
    pub size: u16,
}

impl BlockHeaderV3 {
    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        validate_buffer_size(bytes, 4)?;
        let id = String::from_utf8_lossy(&bytes[0..2]).into_owned();
        Ok(Self {
            id,
            size: read_u16_ord(bytes, 2, order),
        })
    }
}

/// Parse and validate a 3.x block header against an expected id and minimum
/// size.
pub(crate) fn parse_header_v3(
    bytes: &[u8],
    order: ByteOrder,
    expected: &'static str,
    min_size: u16,
) -> Result<BlockHeaderV3> {
    let header = BlockHeaderV3::from_bytes(bytes, order)?;
    if header.id != expected {
        return Err(FormatError::BlockIdMismatch {
            actual: header.id,
            expected,
            address: 0,
        }
        .into());
    }
    if header.size < min_size {
        return Err(FormatError::BlockTooSmall {
            id: header.id,
            declared: header.size as u64,
            minimum: min_size as u64,
        }
        .into());
    }
    validate_buffer_size(bytes, header.size as usize)?;
    Ok(header)
}
