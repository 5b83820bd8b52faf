// src/blocks/mod.rs

// ============================================================================
// Block size constants (4.x dialect; 3.x sizes live in blocks::v3)
// ============================================================================
// Fixed sizes for MDF 4.x block structures. Variable-length blocks (TX, MD,
// DT, SD, DL, DZ, CC, CA) are sized by their header.

/// Identification block size (64 bytes) - file format identifier at offset 0.
pub(crate) const ID_BLOCK_SIZE: usize = 64;

/// Header block size (104 bytes) - file-level metadata after identification.
pub(crate) const HD_BLOCK_SIZE: usize = 104;

/// Data group block size (64 bytes).
pub(crate) const DG_BLOCK_SIZE: usize = 64;

/// Channel group block size (104 bytes).
pub(crate) const CG_BLOCK_SIZE: usize = 104;

/// Channel block size (160 bytes).
pub(crate) const CN_BLOCK_SIZE: usize = 160;

// ============================================================================
// Submodules
// ============================================================================

pub mod common;
pub mod v3;

mod channel_array_block;
mod channel_block;
mod channel_group_block;
mod conversion_block;
mod data_block;
mod data_group_block;
mod data_list_block;
mod dz_block;
mod header_block;
mod identification_block;
mod text_block;

pub use common::{BlockHeader, BlockParse, ByteOrder};

pub use channel_array_block::ChannelArrayBlock;
pub use channel_block::{
    CN_FLAG_ALL_INVALID, CN_FLAG_INVAL_BIT_VALID, CN_TYPE_FIXED, CN_TYPE_MASTER,
    CN_TYPE_VIRTUAL_MASTER, CN_TYPE_VLSD, ChannelBlock, DataType,
};
pub use channel_group_block::{CG_FLAG_VLSD, ChannelGroupBlock};
pub use conversion_block::{ConversionBlock, ConversionType};
pub use data_block::{DataBlock, SignalDataBlock};
pub use data_group_block::DataGroupBlock;
pub use data_list_block::{DataListBlock, HeaderListBlock};
pub use dz_block::{DZ_HEADER_SIZE, DzBlock, DzCompressionType};
pub use header_block::HeaderBlock;
pub use identification_block::{Dialect, IdentificationBlock};
pub use text_block::{MetadataBlock, TextBlock, read_string_block};
