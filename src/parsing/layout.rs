//! Record layout planning.
//!
//! A [`RecordLayoutPlan`] is the compiled form of one channel group: for each
//! channel, the exact byte/bit extraction to run per record plus the shared
//! conversion to apply. Plans are validated once against the declared record
//! length, so the per-record hot loop never bounds-checks a channel again.

use std::sync::Arc;

use crate::blocks::{CN_TYPE_VIRTUAL_MASTER, CN_TYPE_VLSD, DataType};
use crate::conversion::Conversion;
use crate::error::{LayoutError, Result};
use crate::parsing::directory::{ChannelGroupInfo, ChannelInfo};
use crate::types::Warning;

/// How one channel's raw value comes out of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Byte-aligned scalar of 1, 2, 4 or 8 bytes; the fast path.
    Aligned {
        offset: usize,
        width: usize,
        kind: ScalarKind,
        big_endian: bool,
    },
    /// Arbitrary bit field, extracted with shifts and masks.
    Bitfield {
        byte_offset: usize,
        bit_offset: u8,
        bit_count: u32,
        signed: bool,
        big_endian: bool,
    },
    /// Fixed-length text field.
    Text {
        offset: usize,
        len: usize,
        encoding: TextEncoding,
    },
    /// Opaque byte payload (byte arrays, matrix channels, CANopen values).
    Bytes { offset: usize, len: usize },
    /// Variable-length value: the record stores a byte offset into a signal
    /// data stream.
    Vlsd {
        offset: usize,
        width: usize,
        data_addr: u64,
        encoding: Option<TextEncoding>,
    },
    /// Virtual master: the value is the record index itself.
    VirtualIndex,
    /// Declared layout this decoder cannot extract (e.g. a 3-byte float);
    /// every sample is invalid.
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Unsigned,
    Signed,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Latin1,
    Utf8,
    Utf16Le,
    Utf16Be,
}

/// Per-channel decode recipe.
#[derive(Debug, Clone)]
pub struct ChannelRecipe {
    pub name: String,
    pub unit: Option<String>,
    pub extraction: Extraction,
    pub conversion: Arc<Conversion>,
    /// Invalidation bit position within the record's invalidation bytes.
    pub invalidation_bit: Option<u32>,
    pub all_invalid: bool,
    pub is_master: bool,
    pub warnings: Vec<Warning>,
}

/// Compiled layout for one channel group.
#[derive(Debug, Clone)]
pub struct RecordLayoutPlan {
    pub group_index: usize,
    /// Record data length in bytes (id prefix excluded).
    pub record_len: usize,
    /// Invalidation bytes trailing the record data.
    pub invalidation_bytes: usize,
    pub recipes: Vec<ChannelRecipe>,
}

impl RecordLayoutPlan {
    /// Build and validate the plan for one channel group.
    pub fn build(group: &ChannelGroupInfo) -> Result<Self> {
        let record_len = group.record_len as usize;
        if record_len == 0 && !group.channels.is_empty() {
            return Err(LayoutError::ZeroRecordLength {
                group: group.index,
            }
            .into());
        }

        let record_bits = (record_len as u64) * 8;
        let mut recipes = Vec::with_capacity(group.channels.len());
        for channel in &group.channels {
            let extraction = plan_extraction(channel);

            // Virtual masters occupy no record bytes; everything else must
            // fit inside the declared record.
            if !matches!(
                extraction,
                Extraction::VirtualIndex | Extraction::Unsupported
            ) {
                let bit_end = u64::from(channel.byte_offset) * 8
                    + u64::from(channel.bit_offset)
                    + u64::from(channel.bit_count);
                if bit_end > record_bits {
                    return Err(LayoutError::ChannelOutOfRecord {
                        channel: channel.name.clone(),
                        bit_end,
                        record_bits,
                    }
                    .into());
                }
            }

            if let Some(bit) = channel.invalidation_bit {
                let inval_bits = (group.invalidation_bytes as u64) * 8;
                if u64::from(bit) >= inval_bits {
                    return Err(LayoutError::ChannelOutOfRecord {
                        channel: channel.name.clone(),
                        bit_end: record_bits + u64::from(bit) + 1,
                        record_bits: record_bits + inval_bits,
                    }
                    .into());
                }
            }

            recipes.push(ChannelRecipe {
                name: channel.name.clone(),
                unit: channel.unit.clone(),
                extraction,
                conversion: Arc::clone(&channel.conversion),
                invalidation_bit: channel.invalidation_bit,
                all_invalid: channel.all_invalid,
                is_master: channel.is_master,
                warnings: channel.warnings.clone(),
            });
        }

        Ok(Self {
            group_index: group.index,
            record_len,
            invalidation_bytes: group.invalidation_bytes as usize,
            recipes,
        })
    }

    /// Total on-disk bytes per record, invalidation bytes included.
    pub fn record_stride(&self) -> usize {
        self.record_len + self.invalidation_bytes
    }

    /// Recipe of the group's master channel, if it has one.
    pub fn master_recipe(&self) -> Option<&ChannelRecipe> {
        self.recipes.iter().find(|r| r.is_master)
    }
}

fn text_encoding(data_type: DataType) -> Option<TextEncoding> {
    match data_type {
        DataType::StringLatin1 => Some(TextEncoding::Latin1),
        DataType::StringUtf8 => Some(TextEncoding::Utf8),
        DataType::StringUtf16LE => Some(TextEncoding::Utf16Le),
        DataType::StringUtf16BE => Some(TextEncoding::Utf16Be),
        _ => None,
    }
}

/// Choose the extraction strategy for one channel.
fn plan_extraction(channel: &ChannelInfo) -> Extraction {
    let offset = channel.byte_offset as usize;
    let bits = channel.bit_count;
    let aligned = channel.bit_offset == 0 && bits % 8 == 0;
    let width = (bits / 8) as usize;

    if channel.channel_type == CN_TYPE_VIRTUAL_MASTER {
        return Extraction::VirtualIndex;
    }

    if channel.channel_type == CN_TYPE_VLSD {
        // The record holds an unsigned byte offset into the signal data
        // stream; anything but an aligned scalar offset is malformed.
        if aligned && matches!(width, 1 | 2 | 4 | 8) {
            return Extraction::Vlsd {
                offset,
                width,
                data_addr: channel.vlsd_data_addr,
                encoding: text_encoding(channel.data_type),
            };
        }
        return Extraction::Unsupported;
    }

    if let Some(encoding) = text_encoding(channel.data_type) {
        if aligned && width > 0 {
            return Extraction::Text {
                offset,
                len: width,
                encoding,
            };
        }
        return Extraction::Unsupported;
    }

    if channel.data_type.is_bytes()
        || !channel.array_dims.is_empty()
        || matches!(
            channel.data_type,
            DataType::CanOpenDate | DataType::CanOpenTime
        )
    {
        if aligned && width > 0 {
            return Extraction::Bytes { offset, len: width };
        }
        return Extraction::Unsupported;
    }

    let big_endian = channel.data_type.is_big_endian();
    match channel.data_type {
        DataType::FloatLE | DataType::FloatBE => {
            if aligned && matches!(width, 4 | 8) {
                Extraction::Aligned {
                    offset,
                    width,
                    kind: ScalarKind::Float,
                    big_endian,
                }
            } else if bits == 16 && aligned {
                // Half precision exists in the wild; widened during
                // extraction.
                Extraction::Aligned {
                    offset,
                    width: 2,
                    kind: ScalarKind::Float,
                    big_endian,
                }
            } else {
                Extraction::Unsupported
            }
        }
        DataType::UnsignedIntegerLE | DataType::UnsignedIntegerBE => {
            if aligned && matches!(width, 1 | 2 | 4 | 8) {
                Extraction::Aligned {
                    offset,
                    width,
                    kind: ScalarKind::Unsigned,
                    big_endian,
                }
            } else if bits > 0 && bits <= 64 {
                Extraction::Bitfield {
                    byte_offset: offset,
                    bit_offset: channel.bit_offset,
                    bit_count: bits,
                    signed: false,
                    big_endian,
                }
            } else {
                Extraction::Unsupported
            }
        }
        DataType::SignedIntegerLE | DataType::SignedIntegerBE => {
            if aligned && matches!(width, 1 | 2 | 4 | 8) {
                Extraction::Aligned {
                    offset,
                    width,
                    kind: ScalarKind::Signed,
                    big_endian,
                }
            } else if bits > 0 && bits <= 64 {
                Extraction::Bitfield {
                    byte_offset: offset,
                    bit_offset: channel.bit_offset,
                    bit_count: bits,
                    signed: true,
                    big_endian,
                }
            } else {
                Extraction::Unsupported
            }
        }
        _ => Extraction::Unsupported,
    }
}
