//! Block directory walking.
//!
//! The walker turns the on-disk link graph of either dialect into a flat,
//! version-neutral [`Directory`]: data groups, their channel groups, and
//! fully described channels with resolved names, units and conversions.
//! Nothing downstream of this module branches on the file version again.
//!
//! Link graphs come from untrusted files, so every structural hop goes
//! through a [`TraversalGuard`]: a revisited address or an exhausted hop
//! budget aborts the walk with [`Error::CorruptionGuard`] instead of looping
//! or recursing forever.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::warn;

use crate::blocks::common::{ByteOrder, peek_block_id, slice_at};
use crate::blocks::v3::{
    ChannelBlockV3, ChannelGroupBlockV3, DataGroupBlockV3, HeaderBlockV3, read_text_block_v3,
};
use crate::blocks::{
    BlockParse, CN_FLAG_ALL_INVALID, CN_FLAG_INVAL_BIT_VALID, CN_TYPE_FIXED, CN_TYPE_MASTER,
    ChannelArrayBlock, ChannelBlock, ChannelGroupBlock, DataGroupBlock, DataType, Dialect,
    HeaderBlock, IdentificationBlock, read_string_block,
};
use crate::conversion::{Conversion, ConversionCache};
use crate::error::{Error, Result};
use crate::types::Warning;

/// Default hop budget for one directory walk or data chain traversal.
pub const DEFAULT_HOP_LIMIT: usize = 65_536;

/// Maximum nesting depth for channel compositions (structures and arrays).
pub const MAX_COMPOSITION_DEPTH: usize = 16;

/// File offset of the header block, directly after the identification block.
const HEADER_ADDR: u64 = 64;

/// Hop budget and cycle detector for link graph traversal.
#[derive(Debug)]
pub struct TraversalGuard {
    limit: usize,
    remaining: usize,
    visited: BTreeSet<u64>,
}

impl TraversalGuard {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            remaining: limit,
            visited: BTreeSet::new(),
        }
    }

    /// Account for one hop to `address`.
    ///
    /// Fails on a revisit (a cycle in the link graph) or when the hop budget
    /// is exhausted (a degenerate but acyclic graph).
    pub fn visit(&mut self, address: u64) -> Result<()> {
        if self.remaining == 0 || !self.visited.insert(address) {
            return Err(Error::CorruptionGuard {
                address,
                limit: self.limit,
            });
        }
        self.remaining -= 1;
        Ok(())
    }
}

/// One fully described channel.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub name: String,
    pub unit: Option<String>,
    pub data_type: DataType,
    /// Byte offset of the value within the record data (id prefix excluded).
    pub byte_offset: u32,
    /// Bit offset within the start byte (0..7).
    pub bit_offset: u8,
    pub bit_count: u32,
    /// 4.x channel type code; 3.x channels are mapped onto fixed/master.
    pub channel_type: u8,
    pub is_master: bool,
    /// For VLSD channels: link to the signal data chain, or to the stream
    /// channel group in unsorted files.
    pub vlsd_data_addr: u64,
    pub conversion: Arc<Conversion>,
    /// Invalidation bit position, when the channel declares one.
    pub invalidation_bit: Option<u32>,
    /// Channel is declared entirely invalid.
    pub all_invalid: bool,
    /// Dimension sizes for matrix channels, empty for scalars.
    pub array_dims: Vec<u64>,
    /// Degradations recorded while describing this channel.
    pub warnings: Vec<Warning>,
}

/// One decodable channel group.
#[derive(Debug, Clone)]
pub struct ChannelGroupInfo {
    /// File-wide group index used by the decode operations.
    pub index: usize,
    /// Acquisition name, when present.
    pub name: Option<String>,
    pub record_id: u64,
    pub record_count: u64,
    /// Record data length in bytes (id prefix and invalidation bytes
    /// excluded).
    pub record_len: u32,
    pub invalidation_bytes: u32,
    pub channels: Vec<ChannelInfo>,
    pub warnings: Vec<Warning>,
}

/// A variable-length stream channel group in an unsorted data group. It
/// carries no decodable channels; its records feed the byte streams that
/// VLSD channels in sibling groups index into.
#[derive(Debug, Clone)]
pub struct VlsdStreamInfo {
    pub record_id: u64,
    /// File offset of the CG block, matched against VLSD channel data links.
    pub block_addr: u64,
}

/// One data group: a record container plus the channel groups multiplexed
/// into it.
#[derive(Debug, Clone)]
pub struct DataGroupInfo {
    /// Record id prefix width in bytes (0 for sorted groups).
    pub record_id_size: u8,
    /// 3.x only: the record id is repeated after each record.
    pub trailing_record_id: bool,
    /// 4.x: address of the data block chain. 3.x: address of the raw record
    /// bytes.
    pub data_addr: u64,
    pub channel_groups: Vec<ChannelGroupInfo>,
    pub vlsd_streams: Vec<VlsdStreamInfo>,
}

impl DataGroupInfo {
    /// True when records carry no id prefix and only one group owns them.
    pub fn is_sorted(&self) -> bool {
        self.record_id_size == 0
    }
}

/// The version-neutral directory of a file's block graph.
#[derive(Debug)]
pub struct Directory {
    pub dialect: Dialect,
    pub version_number: u16,
    pub data_groups: Vec<DataGroupInfo>,
    /// File-level degradations (e.g. an unfinalized file marker).
    pub warnings: Vec<Warning>,
}

impl Directory {
    /// Walk the block graph with the default hop budget.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_with(data, DEFAULT_HOP_LIMIT)
    }

    /// Walk the block graph with an explicit hop budget.
    pub fn parse_with(data: &[u8], hop_limit: usize) -> Result<Self> {
        let id = IdentificationBlock::from_bytes(data)?;
        let mut guard = TraversalGuard::new(hop_limit);
        let mut warnings = Vec::new();
        if id.is_unfinalized {
            warn!("file is unfinalized, contents may be incomplete");
            warnings.push(Warning::UnfinalizedFile);
        }

        let data_groups = match id.dialect {
            Dialect::V4 => walk_v4(data, &mut guard)?,
            Dialect::V3 { byte_order } => walk_v3(data, byte_order, &mut guard)?,
        };

        Ok(Self {
            dialect: id.dialect,
            version_number: id.version_number,
            data_groups,
            warnings,
        })
    }

    /// Number of decodable channel groups.
    pub fn group_count(&self) -> usize {
        self.data_groups
            .iter()
            .map(|dg| dg.channel_groups.len())
            .sum()
    }

    /// Look up a channel group by its file-wide index.
    pub fn group(&self, index: usize) -> Option<(&DataGroupInfo, &ChannelGroupInfo)> {
        self.data_groups.iter().find_map(|dg| {
            dg.channel_groups
                .iter()
                .find(|cg| cg.index == index)
                .map(|cg| (dg, cg))
        })
    }
}

/// Resolve a conversion link, degrading to identity on any failure.
///
/// A broken conversion never fails the walk: the channel keeps decoding with
/// raw values and the degradation is recorded on the channel.
fn resolve_conversion(
    cache: &mut ConversionCache,
    data: &[u8],
    address: u64,
    order: Option<ByteOrder>,
    channel: &str,
    warnings: &mut Vec<Warning>,
) -> (Arc<Conversion>, Option<String>) {
    let resolved = match order {
        Some(order) => cache.resolve_v3(data, address, order),
        None => cache.resolve_v4(data, address),
    };
    match resolved {
        Ok(entry) => entry,
        Err(e) => {
            warn!("channel {channel:?}: conversion at {address:#x} fell back to identity: {e}");
            warnings.push(Warning::ConversionFallback {
                channel: channel.to_string(),
                reason: e.to_string(),
            });
            (Arc::new(Conversion::Identity), None)
        }
    }
}

/// Resolve an optional text link (name, unit, comment), degrading to `None`
/// when the link is dangling.
///
/// Only mandatory structural links are allowed to fail the walk; a broken
/// name or unit costs the label, not the file.
fn read_optional_string(
    data: &[u8],
    address: u64,
    what: &'static str,
    warnings: &mut Vec<Warning>,
) -> Option<String> {
    match read_string_block(data, address) {
        Ok(text) => text,
        Err(e) => {
            warn!("ignoring unresolvable {what} link at {address:#x}: {e}");
            warnings.push(Warning::UnresolvedOptionalLink { address, what });
            None
        }
    }
}

// ============================================================================
// 4.x walk
// ============================================================================

fn walk_v4(data: &[u8], guard: &mut TraversalGuard) -> Result<Vec<DataGroupInfo>> {
    guard.visit(HEADER_ADDR)?;
    let header = HeaderBlock::from_bytes(slice_at(data, HEADER_ADDR)?)?;

    let mut cache = ConversionCache::new();
    let mut data_groups = Vec::new();
    let mut group_index = 0usize;

    let mut dg_addr = header.first_dg_addr;
    while dg_addr != 0 {
        guard.visit(dg_addr)?;
        let dg = DataGroupBlock::from_bytes(slice_at(data, dg_addr)?)?;

        let mut channel_groups = Vec::new();
        let mut vlsd_streams = Vec::new();

        let mut cg_addr = dg.first_cg_addr;
        while cg_addr != 0 {
            guard.visit(cg_addr)?;
            let cg = ChannelGroupBlock::from_bytes(slice_at(data, cg_addr)?)?;

            if cg.is_vlsd() {
                vlsd_streams.push(VlsdStreamInfo {
                    record_id: cg.record_id,
                    block_addr: cg_addr,
                });
            } else {
                let mut warnings = Vec::new();
                let mut channels = Vec::new();
                walk_channels_v4(
                    data,
                    cg.first_ch_addr,
                    guard,
                    &mut cache,
                    &mut channels,
                    0,
                )?;
                note_masters(&mut channels, group_index, &mut warnings);

                let name =
                    read_optional_string(data, cg.acq_name_addr, "acquisition name", &mut warnings);
                channel_groups.push(ChannelGroupInfo {
                    index: group_index,
                    name,
                    record_id: cg.record_id,
                    record_count: cg.cycle_count,
                    record_len: cg.samples_byte_nr,
                    invalidation_bytes: cg.invalidation_bytes_nr,
                    channels,
                    warnings,
                });
                group_index += 1;
            }

            cg_addr = cg.next_cg_addr;
        }

        data_groups.push(DataGroupInfo {
            record_id_size: dg.record_id_size,
            trailing_record_id: false,
            data_addr: dg.data_block_addr,
            channel_groups,
            vlsd_streams,
        });

        dg_addr = dg.next_dg_addr;
    }

    Ok(data_groups)
}

fn walk_channels_v4(
    data: &[u8],
    first_ch_addr: u64,
    guard: &mut TraversalGuard,
    cache: &mut ConversionCache,
    out: &mut Vec<ChannelInfo>,
    depth: usize,
) -> Result<()> {
    if depth > MAX_COMPOSITION_DEPTH {
        return Err(Error::CorruptionGuard {
            address: first_ch_addr,
            limit: MAX_COMPOSITION_DEPTH,
        });
    }

    let mut cn_addr = first_ch_addr;
    while cn_addr != 0 {
        guard.visit(cn_addr)?;
        let cn = ChannelBlock::from_bytes(slice_at(data, cn_addr)?)?;

        let mut warnings = Vec::new();
        let name = match read_optional_string(data, cn.name_addr, "channel name", &mut warnings) {
            Some(name) => name,
            None => format!("channel_{cn_addr:#x}"),
        };

        let (conversion, conversion_unit) = resolve_conversion(
            cache,
            data,
            cn.conversion_addr,
            None,
            &name,
            &mut warnings,
        );
        let unit = match read_optional_string(data, cn.unit_addr, "unit", &mut warnings) {
            Some(unit) => Some(unit),
            None => conversion_unit,
        };

        // Compositions hang off the component link: a CA block describes a
        // matrix layout for this channel, a CN chain describes structure
        // members occupying the same record bytes.
        let mut array_dims = Vec::new();
        let mut component_channels = Vec::new();
        if cn.component_addr != 0 {
            match &peek_block_id(data, cn.component_addr)? {
                b"##CA" => {
                    guard.visit(cn.component_addr)?;
                    let ca = ChannelArrayBlock::from_bytes(slice_at(data, cn.component_addr)?)?;
                    array_dims = ca.dim_sizes;
                }
                b"##CN" => {
                    walk_channels_v4(
                        data,
                        cn.component_addr,
                        guard,
                        cache,
                        &mut component_channels,
                        depth + 1,
                    )?;
                }
                _ => {
                    warn!("ignoring unknown composition block at {:#x}", cn.component_addr);
                    warnings.push(Warning::UnresolvedOptionalLink {
                        address: cn.component_addr,
                        what: "composition",
                    });
                }
            }
        }

        let invalidation_bit = (cn.flags & CN_FLAG_INVAL_BIT_VALID != 0)
            .then_some(cn.pos_invalidation_bit);

        out.push(ChannelInfo {
            is_master: cn.is_master(),
            vlsd_data_addr: if cn.is_vlsd() { cn.data_addr } else { 0 },
            name,
            unit,
            data_type: cn.data_type,
            byte_offset: cn.byte_offset,
            bit_offset: cn.bit_offset,
            bit_count: cn.bit_count,
            channel_type: cn.channel_type,
            conversion,
            invalidation_bit,
            all_invalid: cn.flags & CN_FLAG_ALL_INVALID != 0,
            array_dims,
            warnings,
        });
        out.append(&mut component_channels);

        cn_addr = cn.next_ch_addr;
    }

    Ok(())
}

// ============================================================================
// 3.x walk
// ============================================================================

fn walk_v3(
    data: &[u8],
    order: ByteOrder,
    guard: &mut TraversalGuard,
) -> Result<Vec<DataGroupInfo>> {
    guard.visit(HEADER_ADDR)?;
    let header = HeaderBlockV3::from_bytes(slice_at(data, HEADER_ADDR)?, order)?;

    let mut cache = ConversionCache::new();
    let mut data_groups = Vec::new();
    let mut group_index = 0usize;

    let mut dg_addr = u64::from(header.first_dg_addr);
    while dg_addr != 0 {
        guard.visit(dg_addr)?;
        let dg = DataGroupBlockV3::from_bytes(slice_at(data, dg_addr)?, order)?;

        let mut channel_groups = Vec::new();
        let mut cg_addr = u64::from(dg.first_cg_addr);
        while cg_addr != 0 {
            guard.visit(cg_addr)?;
            let cg = ChannelGroupBlockV3::from_bytes(slice_at(data, cg_addr)?, order)?;

            let mut warnings = Vec::new();
            let mut channels = Vec::new();

            let mut cn_addr = u64::from(cg.first_ch_addr);
            let mut position = 0usize;
            while cn_addr != 0 {
                guard.visit(cn_addr)?;
                let cn = ChannelBlockV3::from_bytes(slice_at(data, cn_addr)?, order)?;

                let mut channel_warnings = Vec::new();

                // Long names live in a separate TX block when the inline
                // 32-byte field was too short. A dangling link costs the
                // long name, not the file.
                let long_name = match read_text_block_v3(data, cn.long_name_addr, order) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(
                            "ignoring unresolvable long name link at {:#x}: {e}",
                            cn.long_name_addr
                        );
                        channel_warnings.push(Warning::UnresolvedOptionalLink {
                            address: u64::from(cn.long_name_addr),
                            what: "long name",
                        });
                        None
                    }
                };
                let name = match long_name {
                    Some(long) => long,
                    None if cn.name.is_empty() => format!("channel_{position}"),
                    None => cn.name.clone(),
                };
                let (conversion, unit) = resolve_conversion(
                    &mut cache,
                    data,
                    u64::from(cn.conversion_addr),
                    Some(order),
                    &name,
                    &mut channel_warnings,
                );

                let bit_start = cn.record_bit_start();
                out_push_v3(
                    &mut channels,
                    &cn,
                    name,
                    unit,
                    bit_start,
                    conversion,
                    channel_warnings,
                );

                cn_addr = u64::from(cn.next_ch_addr);
                position += 1;
            }

            note_masters(&mut channels, group_index, &mut warnings);

            channel_groups.push(ChannelGroupInfo {
                index: group_index,
                name: None,
                record_id: u64::from(cg.record_id),
                record_count: u64::from(cg.record_count),
                record_len: u32::from(cg.record_size),
                invalidation_bytes: 0,
                channels,
                warnings,
            });
            group_index += 1;

            cg_addr = u64::from(cg.next_cg_addr);
        }

        data_groups.push(DataGroupInfo {
            record_id_size: u8::from(dg.record_id_count != 0),
            trailing_record_id: dg.record_id_count == 2,
            data_addr: u64::from(dg.data_addr),
            channel_groups,
            vlsd_streams: Vec::new(),
        });

        dg_addr = u64::from(dg.next_dg_addr);
    }

    Ok(data_groups)
}

fn out_push_v3(
    out: &mut Vec<ChannelInfo>,
    cn: &ChannelBlockV3,
    name: String,
    unit: Option<String>,
    bit_start: u32,
    conversion: Arc<Conversion>,
    warnings: Vec<Warning>,
) {
    out.push(ChannelInfo {
        name,
        unit,
        data_type: cn.data_type,
        byte_offset: bit_start / 8,
        bit_offset: (bit_start % 8) as u8,
        bit_count: u32::from(cn.bit_count),
        channel_type: if cn.is_master() {
            CN_TYPE_MASTER
        } else {
            CN_TYPE_FIXED
        },
        is_master: cn.is_master(),
        vlsd_data_addr: 0,
        conversion,
        invalidation_bit: None,
        all_invalid: false,
        array_dims: Vec::new(),
        warnings,
    });
}

/// Enforce the single-master rule: when a group declares several master
/// channels the first one keeps the role and the rest decode as ordinary
/// channels.
fn note_masters(channels: &mut [ChannelInfo], group: usize, warnings: &mut Vec<Warning>) {
    let mut masters = channels.iter().enumerate().filter(|(_, c)| c.is_master);
    let Some((_, first)) = masters.next() else {
        return;
    };
    if masters.next().is_some() {
        let picked = first.name.clone();
        warn!("group {group}: multiple master channels, picked {picked:?}");
        warnings.push(Warning::MultipleMasters { group, picked });
        let mut seen = false;
        for channel in channels.iter_mut() {
            if channel.is_master {
                if seen {
                    channel.is_master = false;
                } else {
                    seen = true;
                }
            }
        }
    }
}
