//! Identification block — the 64-byte file identifier at offset 0.
//!
//! This is the only block whose layout is shared by both format generations.
//! Its numeric version code selects the block-layout dialect used for all
//! subsequent parsing.

use super::ID_BLOCK_SIZE;
use crate::blocks::common::{ByteOrder, read_u16, read_u16_ord, validate_buffer_size};
use crate::error::{FormatError, Result};
use core::str::from_utf8;

/// The block-layout dialect selected once at open time.
///
/// All per-version layout knowledge lives behind this value; the layout
/// planner, conversion resolver and record decoder never branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// MDF 2.x/3.x: 2-character block ids, u16 block sizes, u32 links,
    /// metadata in the byte order declared by the identification block.
    V3 { byte_order: ByteOrder },
    /// MDF 4.x: `##xx` ids, u64 lengths and links, always little-endian
    /// metadata.
    V4,
}

/// Identification block contents.
#[derive(Debug, Clone)]
pub struct IdentificationBlock {
    /// File identifier string ("MDF     " or "UnFinMF ").
    pub file_id: String,
    /// Format version string (e.g. "4.10    ", "3.30").
    pub format_version: String,
    /// Program identifier of the creating tool.
    pub program_id: String,
    /// Numeric version (e.g. 410, 330).
    pub version_number: u16,
    /// Selected block-layout dialect.
    pub dialect: Dialect,
    /// Whether the file identifier marks the file as unfinalized.
    pub is_unfinalized: bool,
}

impl IdentificationBlock {
    /// Parse the identification block from the first 64 bytes of a file.
    ///
    /// Accepts finalized (`"MDF     "`) and unfinalized (`"UnFinMF "`)
    /// identifiers; anything else is a [`FormatError::UnknownIdentifier`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        validate_buffer_size(bytes, ID_BLOCK_SIZE)?;

        let file_id = from_utf8(&bytes[0..8])
            .map(String::from)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes[0..8]).into_owned());

        if file_id != "MDF     " && file_id != "UnFinMF " {
            return Err(FormatError::UnknownIdentifier(file_id).into());
        }
        let is_unfinalized = file_id.trim() == "UnFinMF";

        let format_version = from_utf8(&bytes[8..16])
            .map(String::from)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes[8..16]).into_owned());
        let program_id = from_utf8(&bytes[16..24])
            .map(String::from)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes[16..24]).into_owned());

        let (major, minor) = parse_version_string(&format_version)?;
        let mut version_number = major * 100 + minor;

        // 3.x files additionally carry the numeric code at offset 28 in the
        // declared byte order; prefer it when it agrees on the major version.
        let dialect = if version_number < 400 {
            let byte_order = if read_u16(bytes, 24) == 0 {
                ByteOrder::LittleEndian
            } else {
                ByteOrder::BigEndian
            };
            let coded = read_u16_ord(bytes, 28, byte_order);
            if coded / 100 == major && coded != 0 {
                version_number = coded;
            }
            Dialect::V3 { byte_order }
        } else {
            version_number = read_u16(bytes, 28).max(version_number);
            Dialect::V4
        };

        if !(200..500).contains(&version_number) {
            return Err(FormatError::UnsupportedVersion(version_number).into());
        }

        Ok(Self {
            file_id,
            format_version,
            program_id,
            version_number,
            dialect,
            is_unfinalized,
        })
    }
}

/// Parse the textual version field, e.g. `"4.10    "` or `"3.30\0..."`.
fn parse_version_string(raw: &str) -> Result<(u16, u16)> {
    let s = raw.trim_end_matches(char::from(0)).trim();
    let mut parts = s.split('.');
    let major = parts
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| FormatError::InvalidVersionString(s.to_string()))?
        .parse::<u16>()
        .map_err(|_| FormatError::InvalidVersionString(s.to_string()))?;
    let minor = parts
        .next()
        .unwrap_or("0")
        .parse::<u16>()
        .map_err(|_| FormatError::InvalidVersionString(s.to_string()))?;
    Ok((major, minor))
}
