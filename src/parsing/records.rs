//! Record stream decoding.
//!
//! This module turns the bytes behind a data group into per-channel sample
//! vectors, following one compiled [`RecordLayoutPlan`]:
//!
//! - fragment gathering: DT/DV payloads are borrowed straight from the file
//!   buffer; DL/HL chains and DZ-compressed fragments are stitched into one
//!   owned buffer first
//! - sorted groups iterate records by fixed stride
//! - unsorted groups are demultiplexed by record id tag, preserving on-disk
//!   order per tag; variable-length stream groups are reassembled into the
//!   byte streams their referencing channels index into
//! - per record, each channel recipe runs its extraction, the invalidation
//!   bit check, and its shared conversion

use std::borrow::Cow;
use std::collections::BTreeMap;

use log::warn;

use crate::blocks::common::{peek_block_id, slice_at};
use crate::blocks::{
    BlockParse, DataBlock, DataListBlock, Dialect, DzBlock, HeaderListBlock, SignalDataBlock,
};
use crate::error::{Error, FormatError, LayoutError, Result};
use crate::parsing::directory::{ChannelGroupInfo, DataGroupInfo, Directory, TraversalGuard};
use crate::parsing::extract::{decode_text, extract, invalidation_bit_set};
use crate::parsing::layout::{Extraction, RecordLayoutPlan, TextEncoding};
use crate::types::{CancelToken, Value, Warning};

/// Decoded raw output for one channel group: one sample vector per recipe,
/// in recipe order, plus the degradations hit along the way.
#[derive(Debug)]
pub struct DecodedChannels {
    pub samples: Vec<Vec<Option<Value>>>,
    pub warnings: Vec<Warning>,
}

/// Decode every channel of one group according to its layout plan.
pub fn decode_records(
    file: &[u8],
    directory: &Directory,
    dg: &DataGroupInfo,
    cg: &ChannelGroupInfo,
    plan: &RecordLayoutPlan,
    hop_limit: usize,
    cancel: Option<&CancelToken>,
) -> Result<DecodedChannels> {
    let mut guard = TraversalGuard::new(hop_limit);
    let raw = gather_group_data(file, directory.dialect, dg, cg, &mut guard)?;

    let mut warnings = Vec::new();
    let stride = plan.record_stride();

    // Demultiplex when records carry an id prefix; otherwise the whole
    // stream belongs to this group.
    let (records, vlsd_streams) = if dg.is_sorted() {
        (raw, BTreeMap::new())
    } else {
        let demuxed = demultiplex(&raw, dg, cg, &mut warnings);
        (Cow::Owned(demuxed.records), demuxed.vlsd_streams)
    };

    let record_count = available_records(cg.record_count, records.len(), stride);

    // Resolve each VLSD recipe's backing stream once, up front. Entries are
    // parallel to the recipes; `None` means not a VLSD channel or an
    // unresolvable stream.
    let streams = resolve_vlsd_streams(file, dg, plan, &vlsd_streams, hop_limit, &mut warnings)?;

    let mut samples: Vec<Vec<Option<Value>>> = plan
        .recipes
        .iter()
        .map(|_| Vec::with_capacity(record_count))
        .collect();

    for index in 0..record_count {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
        }

        let record = &records[index * stride..(index + 1) * stride];
        let data = &record[..plan.record_len];
        let invalidation = &record[plan.record_len..];

        for (position, (slot, recipe)) in samples.iter_mut().zip(&plan.recipes).enumerate() {
            if recipe.all_invalid {
                slot.push(None);
                continue;
            }
            if let Some(bit) = recipe.invalidation_bit {
                if invalidation_bit_set(invalidation, bit) {
                    slot.push(None);
                    continue;
                }
            }

            let raw_value = match &recipe.extraction {
                Extraction::Vlsd { encoding, .. } => match extract(data, &recipe.extraction, 0) {
                    Some(Value::UnsignedInteger(offset)) => match &streams[position] {
                        Some(stream) => Some(vlsd_value(stream, offset, *encoding)?),
                        None => None,
                    },
                    _ => None,
                },
                other => extract(data, other, index as u64),
            };

            let value = match raw_value {
                Some(raw) if recipe.conversion.is_identity() => Some(raw),
                Some(raw) => recipe.conversion.apply(&raw),
                None => None,
            };
            slot.push(value);
        }
    }

    Ok(DecodedChannels { samples, warnings })
}

fn available_records(declared: u64, data_len: usize, stride: usize) -> usize {
    if stride == 0 {
        return 0;
    }
    let available = data_len / stride;
    if declared == 0 {
        available
    } else {
        available.min(declared as usize)
    }
}

// ============================================================================
// Fragment gathering
// ============================================================================

/// Collect the record bytes behind a data group into one contiguous view.
///
/// A single uncompressed fragment is borrowed from the file buffer; chains
/// and compressed fragments are concatenated into an owned buffer.
fn gather_group_data<'a>(
    file: &'a [u8],
    dialect: Dialect,
    dg: &DataGroupInfo,
    cg: &ChannelGroupInfo,
    guard: &mut TraversalGuard,
) -> Result<Cow<'a, [u8]>> {
    match dialect {
        Dialect::V4 => gather_chain(file, dg.data_addr, guard),
        Dialect::V3 { .. } => Ok(Cow::Borrowed(raw_records_v3(file, dg, cg)?)),
    }
}

/// 3.x record bytes are raw, with no enclosing block: slice from the data
/// pointer up to the total length declared by the channel groups, clamped to
/// the end of a possibly truncated file.
fn raw_records_v3<'a>(file: &'a [u8], dg: &DataGroupInfo, cg: &ChannelGroupInfo) -> Result<&'a [u8]> {
    if dg.data_addr == 0 {
        return Ok(&[]);
    }
    let bytes = slice_at(file, dg.data_addr)?;

    let per_record_overhead =
        usize::from(dg.record_id_size) + usize::from(dg.trailing_record_id);
    let mut total = 0usize;
    if dg.is_sorted() {
        total = cg.record_count as usize * (cg.record_len as usize + per_record_overhead);
    } else {
        for group in &dg.channel_groups {
            total += group.record_count as usize
                * (group.record_len as usize + per_record_overhead);
        }
    }
    Ok(&bytes[..total.min(bytes.len())])
}

/// Walk a 4.x data chain (DT/DV/SD directly, or DL/HL lists of DT/DZ
/// fragments) and return the concatenated payload.
fn gather_chain<'a>(
    file: &'a [u8],
    addr: u64,
    guard: &mut TraversalGuard,
) -> Result<Cow<'a, [u8]>> {
    if addr == 0 {
        return Ok(Cow::Borrowed(&[]));
    }

    let mut fragments: Vec<Cow<'a, [u8]>> = Vec::new();
    collect_fragments(file, addr, guard, &mut fragments)?;

    match fragments.len() {
        0 => Ok(Cow::Borrowed(&[])),
        1 => Ok(fragments.pop().unwrap_or(Cow::Borrowed(&[]))),
        _ => {
            let total: usize = fragments.iter().map(|f| f.len()).sum();
            let mut joined = Vec::with_capacity(total);
            for fragment in fragments {
                joined.extend_from_slice(&fragment);
            }
            Ok(Cow::Owned(joined))
        }
    }
}

fn collect_fragments<'a>(
    file: &'a [u8],
    addr: u64,
    guard: &mut TraversalGuard,
    fragments: &mut Vec<Cow<'a, [u8]>>,
) -> Result<()> {
    guard.visit(addr)?;
    let bytes = slice_at(file, addr)?;

    match &peek_block_id(file, addr)? {
        b"##DT" | b"##DV" => {
            fragments.push(Cow::Borrowed(DataBlock::from_bytes(bytes)?.data));
        }
        b"##SD" => {
            fragments.push(Cow::Borrowed(SignalDataBlock::from_bytes(bytes)?.data));
        }
        b"##DZ" => {
            fragments.push(Cow::Owned(decompress_dz(bytes)?));
        }
        b"##HL" => {
            let hl = HeaderListBlock::from_bytes(bytes)?;
            if hl.first_dl_addr != 0 {
                collect_fragments(file, hl.first_dl_addr, guard, fragments)?;
            }
        }
        b"##DL" => {
            let mut dl_addr = addr;
            let mut first = true;
            while dl_addr != 0 {
                if !first {
                    guard.visit(dl_addr)?;
                }
                first = false;
                let dl = DataListBlock::from_bytes(slice_at(file, dl_addr)?)?;
                for link in &dl.data_links {
                    collect_fragments(file, *link, guard, fragments)?;
                }
                dl_addr = dl.next;
            }
        }
        other => {
            return Err(FormatError::UnknownIdentifier(
                String::from_utf8_lossy(other).into_owned(),
            )
            .into());
        }
    }

    Ok(())
}

#[cfg(feature = "compression")]
fn decompress_dz(bytes: &[u8]) -> Result<Vec<u8>> {
    DzBlock::from_bytes(bytes)?.decompress()
}

#[cfg(not(feature = "compression"))]
fn decompress_dz(bytes: &[u8]) -> Result<Vec<u8>> {
    // Parse anyway so a corrupt block reports as such, then refuse.
    let _ = DzBlock::from_bytes(bytes)?;
    Err(FormatError::Decompression(
        "compressed data block, but compression support is not enabled".to_string(),
    )
    .into())
}

// ============================================================================
// Unsorted demultiplexing
// ============================================================================

struct Demuxed {
    /// The target group's records, concatenated in on-disk order.
    records: Vec<u8>,
    /// Reassembled variable-length streams, keyed by record id. Entries keep
    /// their u32 length prefixes, so stored byte offsets stay valid.
    vlsd_streams: BTreeMap<u64, Vec<u8>>,
}

/// Split an interleaved record stream by record id tag.
///
/// Records of the target group are collected in order; records of sibling
/// fixed-length groups are skipped by their stride; records of
/// variable-length stream groups are appended to their stream. A tag no
/// group claims makes the rest of the stream unwalkable, since its length is
/// unknown: demultiplexing stops there with a warning.
fn demultiplex(
    raw: &[u8],
    dg: &DataGroupInfo,
    cg: &ChannelGroupInfo,
    warnings: &mut Vec<Warning>,
) -> Demuxed {
    let id_size = dg.record_id_size as usize;
    let trailing = usize::from(dg.trailing_record_id);

    let mut strides: BTreeMap<u64, usize> = BTreeMap::new();
    for group in &dg.channel_groups {
        strides.insert(
            group.record_id,
            group.record_len as usize + group.invalidation_bytes as usize,
        );
    }
    let vlsd_ids: Vec<u64> = dg.vlsd_streams.iter().map(|s| s.record_id).collect();

    let target_stride = cg.record_len as usize + cg.invalidation_bytes as usize;
    let mut records =
        Vec::with_capacity((cg.record_count as usize).saturating_mul(target_stride));
    let mut vlsd_streams: BTreeMap<u64, Vec<u8>> =
        vlsd_ids.iter().map(|&id| (id, Vec::new())).collect();

    let mut cursor = 0usize;
    while cursor + id_size <= raw.len() {
        let id = read_record_id(&raw[cursor..cursor + id_size]);
        cursor += id_size;

        if let Some(&stride) = strides.get(&id) {
            if cursor + stride > raw.len() {
                break; // truncated trailing record
            }
            if id == cg.record_id {
                records.extend_from_slice(&raw[cursor..cursor + stride]);
            }
            cursor += stride + trailing;
        } else if vlsd_ids.contains(&id) {
            if cursor + 4 > raw.len() {
                break;
            }
            let len =
                u32::from_le_bytes([raw[cursor], raw[cursor + 1], raw[cursor + 2], raw[cursor + 3]])
                    as usize;
            if cursor + 4 + len > raw.len() {
                break;
            }
            if let Some(stream) = vlsd_streams.get_mut(&id) {
                stream.extend_from_slice(&raw[cursor..cursor + 4 + len]);
            }
            cursor += 4 + len + trailing;
        } else {
            warn!(
                "group {}: unknown record id {id} at byte {cursor}, skipping remaining stream",
                cg.index
            );
            warnings.push(Warning::UnknownRecordId {
                group: cg.index,
                skipped: 1,
            });
            break;
        }
    }

    Demuxed {
        records,
        vlsd_streams,
    }
}

/// 4.x ids are little-endian; 3.x ids are a single byte, so the declared
/// byte order cannot matter.
fn read_record_id(bytes: &[u8]) -> u64 {
    let mut acc = 0u64;
    for &b in bytes.iter().rev() {
        acc = (acc << 8) | u64::from(b);
    }
    acc
}

// ============================================================================
// Variable-length signal data
// ============================================================================

/// Resolve the backing byte stream of every VLSD recipe in the plan.
///
/// The channel's data link points either at a signal data chain (sorted
/// files) or at the stream channel group whose records were just
/// demultiplexed (unsorted files). An unresolvable link degrades the channel
/// to all-invalid samples rather than failing the group.
fn resolve_vlsd_streams<'a>(
    file: &'a [u8],
    dg: &DataGroupInfo,
    plan: &RecordLayoutPlan,
    demuxed: &'a BTreeMap<u64, Vec<u8>>,
    hop_limit: usize,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<Option<Cow<'a, [u8]>>>> {
    let mut streams = Vec::with_capacity(plan.recipes.len());

    for recipe in &plan.recipes {
        let Extraction::Vlsd { data_addr, .. } = recipe.extraction else {
            streams.push(None);
            continue;
        };
        if data_addr == 0 {
            streams.push(Some(Cow::Borrowed(&[][..])));
            continue;
        }

        let stream = if peek_block_id(file, data_addr)? == *b"##CG" {
            dg.vlsd_streams
                .iter()
                .find(|s| s.block_addr == data_addr)
                .and_then(|s| demuxed.get(&s.record_id))
                .map(|bytes| Cow::Borrowed(bytes.as_slice()))
        } else {
            let mut guard = TraversalGuard::new(hop_limit);
            Some(gather_chain(file, data_addr, &mut guard)?)
        };

        if stream.is_none() {
            warn!(
                "channel {:?}: unresolvable signal data link at {data_addr:#x}",
                recipe.name
            );
            warnings.push(Warning::UnresolvedOptionalLink {
                address: data_addr,
                what: "signal data",
            });
        }
        streams.push(stream);
    }

    Ok(streams)
}

/// Read one length-prefixed value out of a signal data stream.
fn vlsd_value(stream: &[u8], offset: u64, encoding: Option<TextEncoding>) -> Result<Value> {
    let start = usize::try_from(offset).unwrap_or(usize::MAX);
    let declared = stream
        .get(start..start.saturating_add(4))
        .filter(|b| b.len() == 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
        .ok_or(LayoutError::InconsistentLengthPrefix {
            offset: start,
            declared: 0,
        })?;

    let payload = stream
        .get(start + 4..(start + 4).saturating_add(declared))
        .filter(|b| b.len() == declared)
        .ok_or(LayoutError::InconsistentLengthPrefix {
            offset: start,
            declared,
        })?;

    Ok(match encoding {
        Some(encoding) => Value::String(decode_text(payload, encoding)),
        None => Value::ByteArray(payload.to_vec()),
    })
}
