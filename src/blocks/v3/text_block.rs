use super::BlockHeaderV3;
use crate::blocks::common::{ByteOrder, latin1_field, slice_at, validate_buffer_size};
use crate::error::Result;

/// Resolve a 3.x text link ("TX" block) to its string.
///
/// Returns `None` for a null link or a block that is not a TX block;
/// dangling metadata links degrade rather than failing the walk.
pub fn read_text_block_v3(data: &[u8], address: u32, order: ByteOrder) -> Result<Option<String>> {
    if address == 0 {
        return Ok(None);
    }
    let bytes = slice_at(data, u64::from(address))?;
    let header = BlockHeaderV3::from_bytes(bytes, order)?;
    if header.id != "TX" || header.size < 4 {
        return Ok(None);
    }
    validate_buffer_size(bytes, header.size as usize)?;
    Ok(Some(latin1_field(&bytes[4..header.size as usize])))
}
