use super::parse_header_v3;
use crate::blocks::common::{
    ByteOrder, latin1_field, read_f64_ord, read_u16_ord, read_u32_ord, validate_buffer_size,
};
use crate::error::{ConversionError, Result};

/// 3.x conversion type code for the 1:1 conversion.
pub const CC_TYPE_IDENTITY_V3: u16 = 65535;

/// One entry of a 3.x range-to-text table. The text itself lives in a
/// separate TX block the walker resolves.
#[derive(Debug, Clone, Copy)]
pub struct TextRangeV3 {
    pub lower: f64,
    pub upper: f64,
    pub text_addr: u32,
}

/// Parameter section of a 3.x conversion block, shaped by its type code.
#[derive(Debug, Clone)]
pub enum ConversionDataV3 {
    /// Plain f64 parameter list (linear, tabular, polynomial, exponential,
    /// logarithmic, rational).
    Params(Vec<f64>),
    /// MCD-2 MC formula text (type 10).
    Formula(String),
    /// Value-to-text pairs with inline 32-byte texts (type 11).
    TextTable(Vec<(f64, String)>),
    /// Range-to-text entries; the first entry carries the default text
    /// (type 12).
    TextRange(Vec<TextRangeV3>),
    /// No parameters (identity, or a type this crate does not evaluate).
    None,
}

/// Conversion block ("CC"), 3.x layout.
///
/// Unlike 4.x, the unit is a fixed 20-byte field inside the block and the
/// parameter section layout varies with the conversion type.
#[derive(Debug, Clone)]
pub struct ConversionBlockV3 {
    pub unit: String,
    pub conversion_type: u16,
    pub data: ConversionDataV3,
}

impl ConversionBlockV3 {
    pub const ID: &'static str = "CC";
    pub const MIN_SIZE: u16 = 46;

    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        let header = parse_header_v3(bytes, order, Self::ID, Self::MIN_SIZE)?;

        let unit = latin1_field(&bytes[22..42]);
        let conversion_type = read_u16_ord(bytes, 42, order);
        let param_count = read_u16_ord(bytes, 44, order) as usize;
        let body = &bytes[..header.size as usize];

        let data = match conversion_type {
            CC_TYPE_IDENTITY_V3 => ConversionDataV3::None,
            10 => {
                // Formula text, NUL-terminated within the remaining bytes.
                ConversionDataV3::Formula(latin1_field(&body[46..]))
            }
            11 => {
                validate_buffer_size(body, 46 + param_count * 40)?;
                let mut table = Vec::with_capacity(param_count);
                for i in 0..param_count {
                    let off = 46 + i * 40;
                    let value = read_f64_ord(body, off, order);
                    let text = latin1_field(&body[off + 8..off + 40]);
                    table.push((value, text));
                }
                ConversionDataV3::TextTable(table)
            }
            12 => {
                validate_buffer_size(body, 46 + param_count * 20)?;
                let mut ranges = Vec::with_capacity(param_count);
                for i in 0..param_count {
                    let off = 46 + i * 20;
                    ranges.push(TextRangeV3 {
                        lower: read_f64_ord(body, off, order),
                        upper: read_f64_ord(body, off + 8, order),
                        text_addr: read_u32_ord(body, off + 16, order),
                    });
                }
                ConversionDataV3::TextRange(ranges)
            }
            _ => {
                validate_buffer_size(body, 46 + param_count * 8)?;
                let mut params = Vec::with_capacity(param_count);
                for i in 0..param_count {
                    params.push(read_f64_ord(body, 46 + i * 8, order));
                }
                ConversionDataV3::Params(params)
            }
        };

        Ok(Self {
            unit,
            conversion_type,
            data,
        })
    }

    /// Numeric parameters, or an error naming the address when the block's
    /// type demanded them but the section holds something else.
    pub fn params(&self, address: u64) -> Result<&[f64]> {
        match &self.data {
            ConversionDataV3::Params(p) => Ok(p),
            _ => Err(ConversionError::Malformed {
                address,
                reason: format!(
                    "conversion type {} expects numeric parameters",
                    self.conversion_type
                ),
            }
            .into()),
        }
    }
}
