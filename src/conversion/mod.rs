//! Conversion resolution and application.
//!
//! Raw conversion blocks from either dialect are resolved once per distinct
//! file offset into a version-neutral [`Conversion`], shared between channels
//! via `Arc`. Application is total: a conversion never fails per sample, it
//! yields `None` for values it cannot map to a finite result (division by
//! zero, log of a negative number) and the decoder records those samples as
//! invalid.

pub mod formula;

pub use formula::Formula;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::blocks::common::{ByteOrder, slice_at};
use crate::blocks::v3::{CC_TYPE_IDENTITY_V3, ConversionBlockV3, ConversionDataV3, read_text_block_v3};
use crate::blocks::{ConversionBlock, ConversionType, read_string_block};
use crate::error::{ConversionError, Result};
use crate::types::Value;

/// Executable conversion, normalized across both dialects.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    /// 1:1, raw value passes through.
    Identity,
    /// `phys = offset + factor * raw`.
    Linear { offset: f64, factor: f64 },
    /// `phys = (p[0]*x² + p[1]*x + p[2]) / (p[3]*x² + p[4]*x + p[5])`.
    Rational { p: [f64; 6] },
    /// 3.x polynomial with the historical 6-parameter shape.
    Polynomial { p: [f64; 6] },
    /// 3.x exponential (7 parameters, two valid shapes).
    Exponential { p: [f64; 7] },
    /// 3.x logarithmic (7 parameters, two valid shapes).
    Logarithmic { p: [f64; 7] },
    /// Parsed formula text evaluated per sample.
    Algebraic(Formula),
    /// Value-to-value table with linear interpolation, clamped at both ends.
    TableInterp { pairs: Vec<(f64, f64)> },
    /// Value-to-value table without interpolation (nearest key wins).
    TableLookup { pairs: Vec<(f64, f64)> },
    /// Range-to-value table with a default for unmatched raw values.
    RangeToValue {
        entries: Vec<(f64, f64, f64)>,
        default: f64,
    },
    /// Value-to-text table; unmatched values keep their numeric form unless
    /// a default text is present.
    ValueToText {
        keys: Vec<f64>,
        texts: Vec<Option<String>>,
        default: Option<String>,
    },
    /// Range-to-text table.
    RangeToText {
        ranges: Vec<(f64, f64)>,
        texts: Vec<Option<String>>,
        default: Option<String>,
    },
    /// Text-to-value table with a default value.
    TextToValue {
        keys: Vec<String>,
        values: Vec<f64>,
        default: f64,
    },
    /// Text-to-text translation table.
    TextToText {
        pairs: Vec<(String, String)>,
        default: Option<String>,
    },
}

impl Conversion {
    /// Apply the conversion to one raw sample.
    ///
    /// `None` marks the sample invalid: the conversion could not produce a
    /// finite result for this input.
    pub fn apply(&self, raw: &Value) -> Option<Value> {
        match self {
            Conversion::Identity => Some(raw.clone()),

            Conversion::Linear { offset, factor } => {
                finite(offset + factor * raw.as_f64()?)
            }

            Conversion::Rational { p } => {
                let x = raw.as_f64()?;
                let num = p[0] * x * x + p[1] * x + p[2];
                let den = p[3] * x * x + p[4] * x + p[5];
                finite(num / den)
            }

            Conversion::Polynomial { p } => {
                let x = raw.as_f64()?;
                let shifted = x - p[4] - p[5];
                finite((p[1] - p[3] * shifted) / (p[2] * shifted - p[0]))
            }

            Conversion::Exponential { p } => {
                let x = raw.as_f64()?;
                let value = if p[3] == 0.0 {
                    (((x - p[6]) * p[5] - p[2]) / p[0]).ln() / p[1]
                } else if p[0] == 0.0 {
                    ((p[2] / (x - p[6]) - p[5]) / p[3]).ln() / p[4]
                } else {
                    return None;
                };
                finite(value)
            }

            Conversion::Logarithmic { p } => {
                let x = raw.as_f64()?;
                let value = if p[3] == 0.0 {
                    (((x - p[6]) * p[5] - p[2]) / p[0]).exp() / p[1]
                } else if p[0] == 0.0 {
                    ((p[2] / (x - p[6]) - p[5]) / p[3]).exp() / p[4]
                } else {
                    return None;
                };
                finite(value)
            }

            Conversion::Algebraic(formula) => {
                formula.eval(raw.as_f64()?).map(Value::Float)
            }

            Conversion::TableInterp { pairs } => {
                let x = raw.as_f64()?;
                finite(interpolate_clamped(pairs, x)?)
            }

            Conversion::TableLookup { pairs } => {
                let x = raw.as_f64()?;
                finite(nearest_key(pairs, x)?)
            }

            Conversion::RangeToValue { entries, default } => {
                let x = raw.as_f64()?;
                let value = entries
                    .iter()
                    .find(|&&(lo, hi, _)| lo <= x && x <= hi)
                    .map_or(*default, |&(_, _, v)| v);
                finite(value)
            }

            Conversion::ValueToText {
                keys,
                texts,
                default,
            } => {
                let x = raw.as_f64()?;
                match keys.iter().position(|&k| k == x) {
                    Some(i) => text_or_invalid(texts.get(i).cloned().flatten()),
                    None => match default {
                        Some(text) => Some(Value::String(text.clone())),
                        None => Some(raw.clone()),
                    },
                }
            }

            Conversion::RangeToText {
                ranges,
                texts,
                default,
            } => {
                let x = raw.as_f64()?;
                match ranges.iter().position(|&(lo, hi)| lo <= x && x <= hi) {
                    Some(i) => text_or_invalid(texts.get(i).cloned().flatten()),
                    None => match default {
                        Some(text) => Some(Value::String(text.clone())),
                        None => Some(raw.clone()),
                    },
                }
            }

            Conversion::TextToValue {
                keys,
                values,
                default,
            } => {
                let input = raw.as_str()?;
                let value = keys
                    .iter()
                    .position(|k| k == input)
                    .and_then(|i| values.get(i).copied())
                    .unwrap_or(*default);
                finite(value)
            }

            Conversion::TextToText { pairs, default } => {
                let input = raw.as_str()?;
                match pairs.iter().find(|(from, _)| from == input) {
                    Some((_, to)) => Some(Value::String(to.clone())),
                    None => match default {
                        Some(text) => Some(Value::String(text.clone())),
                        None => Some(raw.clone()),
                    },
                }
            }
        }
    }

    /// True when applying this conversion is a no-op.
    pub fn is_identity(&self) -> bool {
        matches!(self, Conversion::Identity)
    }
}

fn finite(value: f64) -> Option<Value> {
    value.is_finite().then_some(Value::Float(value))
}

fn text_or_invalid(text: Option<String>) -> Option<Value> {
    // A table slot whose text link was null or dangling marks matching
    // samples invalid rather than mapping them to an empty string.
    text.map(Value::String)
}

/// Piecewise-linear interpolation over `(key, value)` pairs sorted by key.
/// Raw values outside the key range clamp to the edge values.
fn interpolate_clamped(pairs: &[(f64, f64)], x: f64) -> Option<f64> {
    let (first, last) = (pairs.first()?, pairs.last()?);
    if x <= first.0 {
        return Some(first.1);
    }
    if x >= last.0 {
        return Some(last.1);
    }
    let upper = pairs.iter().position(|&(k, _)| k >= x)?;
    let (k1, v1) = pairs[upper - 1];
    let (k2, v2) = pairs[upper];
    if k2 == k1 {
        return Some(v1);
    }
    Some(v1 + (v2 - v1) * (x - k1) / (k2 - k1))
}

/// Value of the pair whose key is closest to `x` (lower key wins ties).
fn nearest_key(pairs: &[(f64, f64)], x: f64) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for &(k, v) in pairs {
        let distance = (k - x).abs();
        match best {
            Some((d, _)) if d <= distance => {}
            _ => best = Some((distance, v)),
        }
    }
    best.map(|(_, v)| v)
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves conversion blocks to executable conversions, deduplicated by
/// file offset so channels sharing a block share one `Arc`.
#[derive(Debug, Default)]
pub struct ConversionCache {
    entries: BTreeMap<u64, (Arc<Conversion>, Option<String>)>,
}

impl ConversionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a 4.x conversion link. A null link yields the shared identity.
    pub fn resolve_v4(
        &mut self,
        data: &[u8],
        address: u64,
    ) -> Result<(Arc<Conversion>, Option<String>)> {
        if let Some(entry) = self.entries.get(&address) {
            return Ok(entry.clone());
        }
        let entry = if address == 0 {
            (Arc::new(Conversion::Identity), None)
        } else {
            let (conversion, unit) = build_v4(data, address)?;
            (Arc::new(conversion), unit)
        };
        self.entries.insert(address, entry.clone());
        Ok(entry)
    }

    /// Resolve a 3.x conversion link in the file's declared byte order.
    pub fn resolve_v3(
        &mut self,
        data: &[u8],
        address: u64,
        order: ByteOrder,
    ) -> Result<(Arc<Conversion>, Option<String>)> {
        if let Some(entry) = self.entries.get(&address) {
            return Ok(entry.clone());
        }
        let entry = if address == 0 {
            (Arc::new(Conversion::Identity), None)
        } else {
            let (conversion, unit) = build_v3(data, address, order)?;
            (Arc::new(conversion), unit)
        };
        self.entries.insert(address, entry.clone());
        Ok(entry)
    }

    /// Number of distinct conversions resolved so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn malformed(address: u64, reason: impl Into<String>) -> crate::error::Error {
    ConversionError::Malformed {
        address,
        reason: reason.into(),
    }
    .into()
}

fn build_v4(data: &[u8], address: u64) -> Result<(Conversion, Option<String>)> {
    use crate::blocks::BlockParse;

    let block = ConversionBlock::from_bytes(slice_at(data, address)?)?;
    let unit = read_string_block(data, block.unit_addr)?;
    let values = &block.values;

    let need = |count: usize| -> Result<()> {
        if values.len() < count {
            Err(malformed(
                address,
                format!("expected {} parameters, found {}", count, values.len()),
            ))
        } else {
            Ok(())
        }
    };

    // Table refs may be TX/MD texts or nested conversion blocks; nested
    // conversions are not evaluated and their slots resolve to no text.
    let ref_text = |addr: u64| -> Result<Option<String>> {
        if addr == 0 {
            return Ok(None);
        }
        read_string_block(data, addr)
    };

    let conversion = match block.conversion_type {
        ConversionType::Identity => Conversion::Identity,

        ConversionType::Linear => {
            need(2)?;
            Conversion::Linear {
                offset: values[0],
                factor: values[1],
            }
        }

        ConversionType::Rational => {
            need(6)?;
            Conversion::Rational {
                p: values[..6].try_into().map_err(|_| {
                    malformed(address, "rational conversion needs 6 parameters")
                })?,
            }
        }

        ConversionType::Algebraic => {
            let text_addr = *block
                .refs
                .first()
                .ok_or_else(|| malformed(address, "algebraic conversion without formula link"))?;
            let text = ref_text(text_addr)?
                .ok_or_else(|| malformed(address, "algebraic conversion formula text missing"))?;
            Conversion::Algebraic(Formula::parse(&text)?)
        }

        ConversionType::TableInterp | ConversionType::TableNoInterp => {
            if values.len() % 2 != 0 || values.is_empty() {
                return Err(malformed(address, "value table needs key/value pairs"));
            }
            let pairs: Vec<(f64, f64)> =
                values.chunks_exact(2).map(|c| (c[0], c[1])).collect();
            if !pairs.windows(2).all(|w| w[0].0 <= w[1].0) {
                return Err(malformed(address, "value table keys are not sorted"));
            }
            if block.conversion_type == ConversionType::TableInterp {
                Conversion::TableInterp { pairs }
            } else {
                Conversion::TableLookup { pairs }
            }
        }

        ConversionType::RangeToValue => {
            if values.len() % 3 != 1 {
                return Err(malformed(
                    address,
                    "range table needs lower/upper/value triples plus a default",
                ));
            }
            let default = values[values.len() - 1];
            let entries = values[..values.len() - 1]
                .chunks_exact(3)
                .map(|c| (c[0], c[1], c[2]))
                .collect();
            Conversion::RangeToValue { entries, default }
        }

        ConversionType::ValueToText => {
            let n = block.value_count as usize;
            if block.refs.len() < n {
                return Err(malformed(address, "value-to-text table is missing links"));
            }
            let mut texts = Vec::with_capacity(n);
            for &addr in &block.refs[..n] {
                texts.push(ref_text(addr)?);
            }
            let default = match block.refs.get(n) {
                Some(&addr) => ref_text(addr)?,
                None => None,
            };
            Conversion::ValueToText {
                keys: values.clone(),
                texts,
                default,
            }
        }

        ConversionType::RangeToText => {
            if values.len() % 2 != 0 {
                return Err(malformed(address, "range-to-text table needs range pairs"));
            }
            let n = values.len() / 2;
            if block.refs.len() < n {
                return Err(malformed(address, "range-to-text table is missing links"));
            }
            let ranges = values.chunks_exact(2).map(|c| (c[0], c[1])).collect();
            let mut texts = Vec::with_capacity(n);
            for &addr in &block.refs[..n] {
                texts.push(ref_text(addr)?);
            }
            let default = match block.refs.get(n) {
                Some(&addr) => ref_text(addr)?,
                None => None,
            };
            Conversion::RangeToText {
                ranges,
                texts,
                default,
            }
        }

        ConversionType::TextToValue => {
            let n = block.refs.len();
            if values.len() != n + 1 {
                return Err(malformed(
                    address,
                    "text-to-value table needs one value per text plus a default",
                ));
            }
            let mut keys = Vec::with_capacity(n);
            for &addr in &block.refs {
                keys.push(ref_text(addr)?.ok_or_else(|| {
                    malformed(address, "text-to-value table key text missing")
                })?);
            }
            Conversion::TextToValue {
                keys,
                values: values[..n].to_vec(),
                default: values[n],
            }
        }

        ConversionType::TextToText => {
            if block.refs.len() % 2 != 1 {
                return Err(malformed(
                    address,
                    "text-to-text table needs text pairs plus a default",
                ));
            }
            let mut pairs = Vec::with_capacity(block.refs.len() / 2);
            for chunk in block.refs[..block.refs.len() - 1].chunks_exact(2) {
                let from = ref_text(chunk[0])?.ok_or_else(|| {
                    malformed(address, "text-to-text table key text missing")
                })?;
                let to = ref_text(chunk[1])?.unwrap_or_default();
                pairs.push((from, to));
            }
            let default = ref_text(block.refs[block.refs.len() - 1])?;
            Conversion::TextToText { pairs, default }
        }

        ConversionType::Unknown(code) => {
            return Err(ConversionError::UnsupportedType {
                address,
                cc_type: u16::from(code),
            }
            .into());
        }
    };

    Ok((conversion, unit))
}

fn build_v3(data: &[u8], address: u64, order: ByteOrder) -> Result<(Conversion, Option<String>)> {
    let block = ConversionBlockV3::from_bytes(slice_at(data, address)?, order)?;
    let unit = (!block.unit.is_empty()).then(|| block.unit.clone());

    let fixed = |params: &[f64], count: usize| -> Result<Vec<f64>> {
        if params.len() < count {
            Err(malformed(
                address,
                format!("expected {} parameters, found {}", count, params.len()),
            ))
        } else {
            Ok(params[..count].to_vec())
        }
    };

    let conversion = match block.conversion_type {
        CC_TYPE_IDENTITY_V3 => Conversion::Identity,

        0 => {
            let p = fixed(block.params(address)?, 2)?;
            Conversion::Linear {
                offset: p[0],
                factor: p[1],
            }
        }

        1 | 2 => {
            let params = block.params(address)?;
            if params.len() % 2 != 0 || params.is_empty() {
                return Err(malformed(address, "value table needs key/value pairs"));
            }
            let pairs: Vec<(f64, f64)> =
                params.chunks_exact(2).map(|c| (c[0], c[1])).collect();
            if !pairs.windows(2).all(|w| w[0].0 <= w[1].0) {
                return Err(malformed(address, "value table keys are not sorted"));
            }
            if block.conversion_type == 1 {
                Conversion::TableInterp { pairs }
            } else {
                Conversion::TableLookup { pairs }
            }
        }

        6 => {
            let p = fixed(block.params(address)?, 6)?;
            Conversion::Polynomial {
                p: p.try_into()
                    .map_err(|_| malformed(address, "polynomial needs 6 parameters"))?,
            }
        }

        7 => {
            let p = fixed(block.params(address)?, 7)?;
            Conversion::Exponential {
                p: p.try_into()
                    .map_err(|_| malformed(address, "exponential needs 7 parameters"))?,
            }
        }

        8 => {
            let p = fixed(block.params(address)?, 7)?;
            Conversion::Logarithmic {
                p: p.try_into()
                    .map_err(|_| malformed(address, "logarithmic needs 7 parameters"))?,
            }
        }

        9 => {
            let p = fixed(block.params(address)?, 6)?;
            Conversion::Rational {
                p: p.try_into()
                    .map_err(|_| malformed(address, "rational needs 6 parameters"))?,
            }
        }

        10 => match &block.data {
            ConversionDataV3::Formula(text) => Conversion::Algebraic(Formula::parse(text)?),
            _ => return Err(malformed(address, "formula conversion without text")),
        },

        11 => match &block.data {
            ConversionDataV3::TextTable(table) => Conversion::ValueToText {
                keys: table.iter().map(|(k, _)| *k).collect(),
                texts: table.iter().map(|(_, t)| Some(t.clone())).collect(),
                default: None,
            },
            _ => return Err(malformed(address, "text table conversion without entries")),
        },

        12 => match &block.data {
            ConversionDataV3::TextRange(entries) => {
                // The first entry carries the default text; its range is
                // not meaningful.
                let mut iter = entries.iter();
                let default = match iter.next() {
                    Some(first) => read_text_block_v3(data, first.text_addr, order)?,
                    None => None,
                };
                let mut ranges = Vec::with_capacity(entries.len().saturating_sub(1));
                let mut texts = Vec::with_capacity(entries.len().saturating_sub(1));
                for entry in iter {
                    ranges.push((entry.lower, entry.upper));
                    texts.push(read_text_block_v3(data, entry.text_addr, order)?);
                }
                Conversion::RangeToText {
                    ranges,
                    texts,
                    default,
                }
            }
            _ => return Err(malformed(address, "text range conversion without entries")),
        },

        other => {
            return Err(ConversionError::UnsupportedType {
                address,
                cc_type: other,
            }
            .into());
        }
    };

    Ok((conversion, unit))
}
