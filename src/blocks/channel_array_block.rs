use crate::blocks::common::{
    BlockHeader, BlockParse, read_u8, read_u16, read_u64, validate_buffer_size,
};
use crate::error::{ConversionError, Result};

/// Channel array block (##CA) — describes the multi-dimensional layout of a
/// matrix channel.
///
/// Only the dimension sizes are needed for decoding: the matrix channel's
/// payload is materialized as one byte array per sample and the dimensions
/// are reported on the channel descriptor.
#[derive(Debug, Clone)]
pub struct ChannelArrayBlock {
    pub header: BlockHeader,
    /// Array type (0 = plain array, 1 = scaling axis, ...).
    pub ca_type: u8,
    /// Storage type (0 = CN template is the only supported layout).
    pub storage: u8,
    /// Sizes of each dimension, innermost last.
    pub dim_sizes: Vec<u64>,
}

impl BlockParse<'_> for ChannelArrayBlock {
    const ID: &'static str = "##CA";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;

        // Data section follows the link table; saturating so a corrupt
        // link_count fails the size check.
        let data_off = (header.link_count as usize)
            .saturating_mul(8)
            .saturating_add(24);
        validate_buffer_size(bytes, data_off + 8)?;

        let ca_type = read_u8(bytes, data_off);
        let storage = read_u8(bytes, data_off + 1);
        let ndim = read_u16(bytes, data_off + 2) as usize;

        validate_buffer_size(bytes, data_off + 8 + ndim * 8)?;
        let mut dim_sizes = Vec::with_capacity(ndim);
        for i in 0..ndim {
            dim_sizes.push(read_u64(bytes, data_off + 8 + i * 8));
        }

        if dim_sizes.iter().any(|&d| d == 0) {
            return Err(ConversionError::Malformed {
                address: 0,
                reason: "channel array declares a zero-size dimension".to_string(),
            }
            .into());
        }

        Ok(Self {
            header,
            ca_type,
            storage,
            dim_sizes,
        })
    }
}

impl ChannelArrayBlock {
    /// Total element count across all dimensions.
    pub fn element_count(&self) -> u64 {
        self.dim_sizes.iter().product()
    }
}
