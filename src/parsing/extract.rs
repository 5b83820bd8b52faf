//! Raw value extraction from record bytes.
//!
//! The extraction plan is validated against the record length when the
//! layout plan is built, so every slice here is in bounds by construction.

use crate::parsing::layout::{Extraction, ScalarKind, TextEncoding};
use crate::types::Value;

/// Extract one channel's raw value from one record's data bytes.
///
/// `record_index` feeds virtual master channels, whose value is the record
/// position itself. `None` marks the sample invalid (a layout this decoder
/// cannot extract).
pub fn extract(record: &[u8], extraction: &Extraction, record_index: u64) -> Option<Value> {
    match extraction {
        Extraction::Aligned {
            offset,
            width,
            kind,
            big_endian,
        } => extract_aligned(record, *offset, *width, *kind, *big_endian),

        Extraction::Bitfield {
            byte_offset,
            bit_offset,
            bit_count,
            signed,
            big_endian,
        } => {
            let raw = extract_bits(record, *byte_offset, *bit_offset, *bit_count, *big_endian)?;
            if *signed {
                Some(Value::SignedInteger(sign_extend(raw, *bit_count)))
            } else {
                Some(Value::UnsignedInteger(raw))
            }
        }

        Extraction::Text {
            offset,
            len,
            encoding,
        } => {
            let field = record.get(*offset..*offset + *len)?;
            Some(Value::String(decode_text(field, *encoding)))
        }

        Extraction::Bytes { offset, len } => {
            let field = record.get(*offset..*offset + *len)?;
            Some(Value::ByteArray(field.to_vec()))
        }

        // The stored offset is resolved against the signal data stream by
        // the record decoder; here it surfaces as an unsigned raw value.
        Extraction::Vlsd { offset, width, .. } => extract_aligned(
            record,
            *offset,
            *width,
            ScalarKind::Unsigned,
            false,
        ),

        Extraction::VirtualIndex => Some(Value::UnsignedInteger(record_index)),

        Extraction::Unsupported => None,
    }
}

fn extract_aligned(
    record: &[u8],
    offset: usize,
    width: usize,
    kind: ScalarKind,
    big_endian: bool,
) -> Option<Value> {
    let field = record.get(offset..offset + width)?;
    let unsigned = {
        let mut acc: u64 = 0;
        if big_endian {
            for &b in field {
                acc = (acc << 8) | u64::from(b);
            }
        } else {
            for &b in field.iter().rev() {
                acc = (acc << 8) | u64::from(b);
            }
        }
        acc
    };

    match kind {
        ScalarKind::Unsigned => Some(Value::UnsignedInteger(unsigned)),
        ScalarKind::Signed => Some(Value::SignedInteger(sign_extend(
            unsigned,
            (width * 8) as u32,
        ))),
        ScalarKind::Float => match width {
            2 => Some(Value::Float(half_to_f64(unsigned as u16))),
            4 => Some(Value::Float(f64::from(f32::from_bits(unsigned as u32)))),
            8 => Some(Value::Float(f64::from_bits(unsigned))),
            _ => None,
        },
    }
}

/// Extract an arbitrary bit field as an unsigned integer.
///
/// `bit_offset` counts from the least significant bit of the byte at
/// `byte_offset`. Big-endian fields store their bytes most significant
/// first; the bit position then counts from the low end of the whole span.
fn extract_bits(
    record: &[u8],
    byte_offset: usize,
    bit_offset: u8,
    bit_count: u32,
    big_endian: bool,
) -> Option<u64> {
    let total_bits = u32::from(bit_offset) + bit_count;
    let span = total_bits.div_ceil(8) as usize;
    let field = record.get(byte_offset..byte_offset + span)?;

    let mut acc: u128 = 0;
    if big_endian {
        for &b in field {
            acc = (acc << 8) | u128::from(b);
        }
    } else {
        for &b in field.iter().rev() {
            acc = (acc << 8) | u128::from(b);
        }
    }
    acc >>= bit_offset;

    let mask = if bit_count >= 64 {
        u64::MAX
    } else {
        (1u64 << bit_count) - 1
    };
    Some((acc as u64) & mask)
}

/// Sign-extend the low `bit_count` bits of `raw` to a full i64.
fn sign_extend(raw: u64, bit_count: u32) -> i64 {
    if bit_count == 0 || bit_count >= 64 {
        return raw as i64;
    }
    let shift = 64 - bit_count;
    ((raw << shift) as i64) >> shift
}

/// Widen an IEEE 754 half-precision value.
fn half_to_f64(bits: u16) -> f64 {
    let sign = u32::from(bits >> 15);
    let exponent = u32::from((bits >> 10) & 0x1f);
    let mantissa = u32::from(bits & 0x3ff);

    let f32_bits = match (exponent, mantissa) {
        (0, 0) => sign << 31,
        (0, m) => {
            // Subnormal: renormalize into f32. `shift` moves the highest set
            // bit up to position 10, where the implicit leading 1 sits.
            let shift = m.leading_zeros() - 21;
            let m = (m << shift) & 0x3ff;
            let e = 113 - shift;
            (sign << 31) | (e << 23) | (m << 13)
        }
        (0x1f, 0) => (sign << 31) | 0x7f80_0000,
        (0x1f, m) => (sign << 31) | 0x7f80_0000 | (m << 13),
        (e, m) => (sign << 31) | ((e + 127 - 15) << 23) | (m << 13),
    };
    f64::from(f32::from_bits(f32_bits))
}

/// Decode a fixed-width text field, trimming at the first NUL terminator.
pub fn decode_text(field: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Latin1 => {
            let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
            field[..end].iter().map(|&b| b as char).collect()
        }
        TextEncoding::Utf8 => {
            let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
            String::from_utf8_lossy(&field[..end]).into_owned()
        }
        TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
            let mut units = Vec::with_capacity(field.len() / 2);
            for pair in field.chunks_exact(2) {
                let unit = if encoding == TextEncoding::Utf16Le {
                    u16::from_le_bytes([pair[0], pair[1]])
                } else {
                    u16::from_be_bytes([pair[0], pair[1]])
                };
                if unit == 0 {
                    break;
                }
                units.push(unit);
            }
            String::from_utf16_lossy(&units)
        }
    }
}

/// Test the channel's invalidation bit within the record's invalidation
/// bytes. A bit outside the bytes counts as invalid.
pub fn invalidation_bit_set(invalidation: &[u8], bit: u32) -> bool {
    let byte = (bit / 8) as usize;
    match invalidation.get(byte) {
        Some(&b) => b & (1 << (bit % 8)) != 0,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_unsigned_le_and_be() {
        let record = [0x34, 0x12, 0x12, 0x34];
        assert_eq!(
            extract_aligned(&record, 0, 2, ScalarKind::Unsigned, false),
            Some(Value::UnsignedInteger(0x1234))
        );
        assert_eq!(
            extract_aligned(&record, 2, 2, ScalarKind::Unsigned, true),
            Some(Value::UnsignedInteger(0x1234))
        );
    }

    #[test]
    fn aligned_signed_negative() {
        let record = (-5i16).to_le_bytes();
        assert_eq!(
            extract_aligned(&record, 0, 2, ScalarKind::Signed, false),
            Some(Value::SignedInteger(-5))
        );
    }

    #[test]
    fn aligned_floats() {
        let record = 1.5f32.to_le_bytes();
        assert_eq!(
            extract_aligned(&record, 0, 4, ScalarKind::Float, false),
            Some(Value::Float(1.5))
        );
        let record = 2.25f64.to_be_bytes();
        assert_eq!(
            extract_aligned(&record, 0, 8, ScalarKind::Float, true),
            Some(Value::Float(2.25))
        );
    }

    #[test]
    fn half_precision_widens() {
        // 0x3c00 is 1.0, 0xc000 is -2.0 in binary16.
        assert_eq!(half_to_f64(0x3c00), 1.0);
        assert_eq!(half_to_f64(0xc000), -2.0);
        assert_eq!(half_to_f64(0x0000), 0.0);
        // Smallest and largest subnormals.
        assert_eq!(half_to_f64(0x0001), 2f64.powi(-24));
        assert_eq!(half_to_f64(0x03ff), 1023.0 * 2f64.powi(-24));
    }

    #[test]
    fn bitfield_le_mid_byte() {
        // Little-endian span 0x05a0 = 0b0000_0101_1010_0000; bits 5..11
        // hold 0b101101.
        let record = [0b1010_0000, 0b0000_0101];
        let got = extract_bits(&record, 0, 5, 6, false).unwrap();
        assert_eq!(got, 0b101101);
    }

    #[test]
    fn bitfield_big_endian() {
        // Two bytes 0x12 0x34 = 0b0001_0010_0011_0100; take 12 bits starting
        // at bit offset 0 from the low end: 0x234.
        let record = [0x12, 0x34];
        assert_eq!(extract_bits(&record, 0, 0, 12, true), Some(0x234));
        // Non-zero bit offset still counts from the low end: 0x1234 >> 4.
        assert_eq!(extract_bits(&record, 0, 4, 8, true), Some(0x23));
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0b111, 3), -1);
        assert_eq!(sign_extend(0b011, 3), 3);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }

    #[test]
    fn text_encodings() {
        assert_eq!(decode_text(b"abc\0\0", TextEncoding::Latin1), "abc");
        assert_eq!(decode_text(b"caf\xe9", TextEncoding::Latin1), "café");
        assert_eq!(decode_text(b"abc\0z", TextEncoding::Utf8), "abc");
        let utf16: Vec<u8> = "hi"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .chain([0, 0])
            .collect();
        assert_eq!(decode_text(&utf16, TextEncoding::Utf16Le), "hi");
    }

    #[test]
    fn invalidation_bits() {
        let invalidation = [0b0000_0100u8];
        assert!(invalidation_bit_set(&invalidation, 2));
        assert!(!invalidation_bit_set(&invalidation, 1));
        // Out of range counts as invalid.
        assert!(invalidation_bit_set(&invalidation, 9));
    }

    #[test]
    fn virtual_index_uses_record_position() {
        assert_eq!(
            extract(&[], &Extraction::VirtualIndex, 41),
            Some(Value::UnsignedInteger(41))
        );
    }
}
