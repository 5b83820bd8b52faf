//! Raw conversion block (##CC) for the 4.x dialect.
//!
//! This is the on-disk representation only; the executable form lives in
//! [`crate::conversion`], which the resolver builds from this block once per
//! distinct file offset.

use crate::blocks::common::{
    BlockHeader, BlockParse, read_f64, read_u8, read_u16, read_u64, validate_buffer_size,
};
use crate::error::Result;

/// Conversion type codes (cc_type) from the 4.x specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionType {
    /// 0: 1:1 conversion (no change).
    Identity,
    /// 1: linear `phys = p1 + p2 * raw`.
    Linear,
    /// 2: rational `phys = (p1*x² + p2*x + p3) / (p4*x² + p5*x + p6)`.
    Rational,
    /// 3: algebraic MCD-2 MC text formula.
    Algebraic,
    /// 4: value-to-value table with interpolation.
    TableInterp,
    /// 5: value-to-value table without interpolation.
    TableNoInterp,
    /// 6: value-range-to-value table.
    RangeToValue,
    /// 7: value-to-text table.
    ValueToText,
    /// 8: value-range-to-text table.
    RangeToText,
    /// 9: text-to-value table.
    TextToValue,
    /// 10: text-to-text translation table.
    TextToText,
    /// Anything else (e.g. 11 bitfield text) degrades to identity.
    Unknown(u8),
}

impl ConversionType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ConversionType::Identity,
            1 => ConversionType::Linear,
            2 => ConversionType::Rational,
            3 => ConversionType::Algebraic,
            4 => ConversionType::TableInterp,
            5 => ConversionType::TableNoInterp,
            6 => ConversionType::RangeToValue,
            7 => ConversionType::ValueToText,
            8 => ConversionType::RangeToText,
            9 => ConversionType::TextToValue,
            10 => ConversionType::TextToText,
            other => ConversionType::Unknown(other),
        }
    }
}

/// Conversion block (##CC), 4.x layout.
#[derive(Debug, Clone)]
pub struct ConversionBlock {
    pub header: BlockHeader,
    pub name_addr: u64,
    pub unit_addr: u64,
    pub comment_addr: u64,
    pub inverse_addr: u64,
    /// Additional links: text blocks or nested conversions, interpretation
    /// depends on `conversion_type`.
    pub refs: Vec<u64>,
    pub conversion_type: ConversionType,
    pub precision: u8,
    pub flags: u16,
    pub ref_count: u16,
    pub value_count: u16,
    /// Numeric parameter table (cc_val).
    pub values: Vec<f64>,
}

impl BlockParse<'_> for ConversionBlock {
    const ID: &'static str = "##CC";
    const MIN_LEN: u64 = 24 + 4 * 8 + 8;

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;

        // Saturate: a corrupt link_count must fail the size check, not
        // overflow the arithmetic.
        let link_count = header.link_count as usize;
        validate_buffer_size(bytes, link_count.saturating_mul(8).saturating_add(24 + 8))?;

        let name_addr = read_u64(bytes, 24);
        let unit_addr = read_u64(bytes, 32);
        let comment_addr = read_u64(bytes, 40);
        let inverse_addr = read_u64(bytes, 48);

        let mut refs = Vec::with_capacity(link_count.saturating_sub(4));
        for i in 4..link_count {
            refs.push(read_u64(bytes, 24 + i * 8));
        }

        let mut offset = 24 + link_count * 8;
        let conversion_type = ConversionType::from_u8(read_u8(bytes, offset));
        let precision = read_u8(bytes, offset + 1);
        let flags = read_u16(bytes, offset + 2);
        let ref_count = read_u16(bytes, offset + 4);
        let value_count = read_u16(bytes, offset + 6);
        offset += 8;

        // Some tools always write the physical range fields even when the
        // range-valid flag is clear; detect their presence from the declared
        // block length instead of trusting the flag.
        let size_without_range = 24 + link_count * 8 + 8 + value_count as usize * 8;
        let has_range = header.length as usize >= size_without_range + 16;
        if has_range {
            offset += 16;
        }

        validate_buffer_size(bytes, offset + value_count as usize * 8)?;
        let mut values = Vec::with_capacity(value_count as usize);
        for i in 0..value_count as usize {
            values.push(read_f64(bytes, offset + i * 8));
        }

        Ok(Self {
            header,
            name_addr,
            unit_addr,
            comment_addr,
            inverse_addr,
            refs,
            conversion_type,
            precision,
            flags,
            ref_count,
            value_count,
            values,
        })
    }
}
