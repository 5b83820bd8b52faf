use crate::blocks::common::{BlockHeader, BlockParse, slice_at, validate_buffer_size};
use crate::error::Result;

/// Text block (##TX) — a NUL-terminated UTF-8 string payload.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub header: BlockHeader,
    pub text: String,
}

impl BlockParse<'_> for TextBlock {
    const ID: &'static str = "##TX";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let end = (header.length as usize).min(bytes.len());
        let payload = &bytes[24..end];
        let text = String::from_utf8_lossy(payload)
            .trim_end_matches('\0')
            .to_string();
        Ok(Self { header, text })
    }
}

/// Metadata block (##MD) — an XML fragment; we expose only the raw text.
#[derive(Debug, Clone)]
pub struct MetadataBlock {
    pub header: BlockHeader,
    pub xml: String,
}

impl BlockParse<'_> for MetadataBlock {
    const ID: &'static str = "##MD";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let end = (header.length as usize).min(bytes.len());
        let payload = &bytes[24..end];
        let xml = String::from_utf8_lossy(payload)
            .trim_end_matches('\0')
            .to_string();
        Ok(Self { header, xml })
    }
}

/// Read a text or metadata block at `address` and return its contents.
///
/// Returns `Ok(None)` when `address` is the null link or the target block is
/// neither `##TX` nor `##MD` — names and comments are optional links and
/// their absence is not an error.
pub fn read_string_block(data: &[u8], address: u64) -> Result<Option<String>> {
    if address == 0 {
        return Ok(None);
    }

    let bytes = slice_at(data, address)?;
    validate_buffer_size(bytes, 24)?;
    let header = BlockHeader::from_bytes(bytes)?;

    match header.id.as_str() {
        "##TX" => Ok(Some(TextBlock::from_bytes(bytes)?.text)),
        "##MD" => Ok(Some(MetadataBlock::from_bytes(bytes)?.xml)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx_bytes(text: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"##TX");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(24 + text.len() as u64 + 1).to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        bytes
    }

    #[test]
    fn text_block_trims_nul() {
        let parsed = TextBlock::from_bytes(&tx_bytes("EngineSpeed")).unwrap();
        assert_eq!(parsed.text, "EngineSpeed");
    }

    #[test]
    fn null_link_is_none() {
        assert_eq!(read_string_block(&[], 0).unwrap(), None);
    }
}
