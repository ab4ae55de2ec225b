//! Value encoding and decoding
//!
//! Converts between the raw byte image of a tag and [`TagValue`]s. Multi-byte
//! primitives are stored little-endian; BOOL elements are single bits,
//! numbered from the least significant bit of each byte.

use crate::types::{DataType, Primitive, Result, TagError, TagValue};
use byteorder::{ByteOrder, LittleEndian};
use std::cmp::Ordering;

/// Read one bit from a byte image
pub fn get_bit(data: &[u8], bit: u64) -> bool {
    let byte_idx = (bit / 8) as usize;
    let bit_in_byte = bit % 8;
    (data[byte_idx] >> bit_in_byte) & 0x01 != 0
}

/// Set or clear one bit in a byte image
pub fn set_bit(data: &mut [u8], bit: u64, value: bool) {
    let byte_idx = (bit / 8) as usize;
    let mask = 0x01u8 << (bit % 8);
    if value {
        data[byte_idx] |= mask;
    } else {
        data[byte_idx] &= !mask;
    }
}

/// Decode a byte-aligned primitive (not BOOL) from its little-endian bytes
pub fn decode_primitive(primitive: Primitive, bytes: &[u8]) -> TagValue {
    match primitive {
        Primitive::Bool => TagValue::Bool(bytes[0] & 0x01 != 0),
        Primitive::Byte => TagValue::Uint(bytes[0] as u64),
        Primitive::Sint => TagValue::Int(bytes[0] as i8 as i64),
        Primitive::Word | Primitive::Uint => TagValue::Uint(LittleEndian::read_u16(bytes) as u64),
        Primitive::Int => TagValue::Int(LittleEndian::read_i16(bytes) as i64),
        Primitive::Dword | Primitive::Udint | Primitive::Time => {
            TagValue::Uint(LittleEndian::read_u32(bytes) as u64)
        }
        Primitive::Dint => TagValue::Int(LittleEndian::read_i32(bytes) as i64),
        Primitive::Real => TagValue::Real(LittleEndian::read_f32(bytes) as f64),
        Primitive::Lword | Primitive::Ulint => TagValue::Uint(LittleEndian::read_u64(bytes)),
        Primitive::Lint => TagValue::Int(LittleEndian::read_i64(bytes)),
        Primitive::Lreal => TagValue::Real(LittleEndian::read_f64(bytes)),
    }
}

/// Encode a scalar into a byte-aligned primitive
///
/// Integers are truncated to the declared width. Integers may be written to
/// REAL/LREAL; floats, booleans and aggregates are rejected for integer
/// kinds.
pub fn encode_primitive(primitive: Primitive, value: &TagValue, out: &mut [u8]) -> Result<()> {
    if primitive.is_float() {
        let v = match value {
            TagValue::Int(_) | TagValue::Uint(_) | TagValue::Real(_) => value.as_f64(),
            _ => None,
        }
        .ok_or_else(|| mismatch(primitive, value))?;

        if primitive == Primitive::Real {
            LittleEndian::write_f32(out, v as f32);
        } else {
            LittleEndian::write_f64(out, v);
        }
        return Ok(());
    }

    let raw: u64 = match value {
        TagValue::Int(v) => *v as u64,
        TagValue::Uint(v) => *v,
        _ => return Err(mismatch(primitive, value)),
    };

    match primitive.bits() {
        8 => out[0] = raw as u8,
        16 => LittleEndian::write_u16(out, raw as u16),
        32 => LittleEndian::write_u32(out, raw as u32),
        64 => LittleEndian::write_u64(out, raw),
        _ => return Err(mismatch(primitive, value)),
    }
    Ok(())
}

/// Reject an integer the primitive cannot hold without truncation
///
/// Non-integer values and float kinds pass; `encode_primitive` decides
/// whether they can be stored at all.
pub fn check_range(primitive: Primitive, value: &TagValue) -> Result<()> {
    if primitive.is_float() || primitive == Primitive::Bool {
        return Ok(());
    }
    let v = match value {
        TagValue::Int(v) => *v as i128,
        TagValue::Uint(v) => *v as i128,
        _ => return Ok(()),
    };
    let bits = primitive.bits();
    let (min, max) = if primitive.is_signed() {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    };
    if v < min || v > max {
        return Err(TagError::OutOfRange(format!(
            "{} is outside {} ({}..={})",
            value, primitive, min, max
        )));
    }
    Ok(())
}

fn mismatch(primitive: Primitive, value: &TagValue) -> TagError {
    TagError::TypeMismatch(format!("cannot store {:?} in {}", value, primitive))
}

/// Compare two encoded values of the same primitive kind
pub fn compare(primitive: Primitive, a: &[u8], b: &[u8]) -> Option<Ordering> {
    match (decode_primitive(primitive, a), decode_primitive(primitive, b)) {
        (TagValue::Int(x), TagValue::Int(y)) => Some(x.cmp(&y)),
        (TagValue::Uint(x), TagValue::Uint(y)) => Some(x.cmp(&y)),
        (TagValue::Real(x), TagValue::Real(y)) => x.partial_cmp(&y),
        _ => None,
    }
}

/// Absolute difference between two encoded values of the same kind
pub fn difference(primitive: Primitive, a: &[u8], b: &[u8]) -> f64 {
    match (decode_primitive(primitive, a), decode_primitive(primitive, b)) {
        (TagValue::Int(x), TagValue::Int(y)) => (x as i128 - y as i128).unsigned_abs() as f64,
        (TagValue::Uint(x), TagValue::Uint(y)) => x.abs_diff(y) as f64,
        (TagValue::Real(x), TagValue::Real(y)) => (x - y).abs(),
        _ => 0.0,
    }
}

/// Decode `count` elements of `data_type` starting at `bit_offset`
///
/// A count of one yields a scalar (or compound) value, anything else an
/// array.
pub fn decode_region(image: &[u8], bit_offset: u64, data_type: &DataType, count: u32) -> TagValue {
    if count == 1 {
        return decode_element(image, bit_offset, data_type);
    }
    let step = data_type.element_bits();
    TagValue::Array(
        (0..count as u64)
            .map(|i| decode_element(image, bit_offset + i * step, data_type))
            .collect(),
    )
}

fn decode_element(image: &[u8], bit_offset: u64, data_type: &DataType) -> TagValue {
    match data_type {
        DataType::Primitive(Primitive::Bool) => TagValue::Bool(get_bit(image, bit_offset)),
        DataType::Primitive(p) => {
            let start = (bit_offset / 8) as usize;
            decode_primitive(*p, &image[start..start + p.bytes()])
        }
        DataType::Compound(compound) => TagValue::Compound(
            compound
                .members()
                .iter()
                .map(|m| {
                    (
                        m.name.clone(),
                        decode_region(image, bit_offset + m.bit_offset, &m.data_type, m.count),
                    )
                })
                .collect(),
        ),
    }
}

/// Encode `value` as `count` elements of `data_type` at `bit_offset`
///
/// Every bit written is also set in `mask`, so the caller can merge the
/// result into the stored image without touching anything else. Omitted
/// compound members and trailing array elements are left unmasked.
pub fn encode_region(
    value: &TagValue,
    data_type: &DataType,
    count: u32,
    bit_offset: u64,
    data: &mut [u8],
    mask: &mut [u8],
) -> Result<()> {
    if count == 1 {
        return encode_element(value, data_type, bit_offset, data, mask);
    }

    let items = match value {
        TagValue::Array(items) => items,
        other => {
            return Err(TagError::TypeMismatch(format!(
                "expected an array of {} {} values, got {}",
                count, data_type, other
            )))
        }
    };
    if items.len() > count as usize {
        return Err(TagError::OutOfRange(format!(
            "{} values given for {} elements",
            items.len(),
            count
        )));
    }

    let step = data_type.element_bits();
    for (i, item) in items.iter().enumerate() {
        encode_element(item, data_type, bit_offset + i as u64 * step, data, mask)?;
    }
    Ok(())
}

fn encode_element(
    value: &TagValue,
    data_type: &DataType,
    bit_offset: u64,
    data: &mut [u8],
    mask: &mut [u8],
) -> Result<()> {
    match data_type {
        DataType::Primitive(Primitive::Bool) => match value {
            TagValue::Bool(b) => {
                set_bit(data, bit_offset, *b);
                set_bit(mask, bit_offset, true);
                Ok(())
            }
            other => Err(mismatch(Primitive::Bool, other)),
        },
        DataType::Primitive(p) => {
            let start = (bit_offset / 8) as usize;
            let end = start + p.bytes();
            encode_primitive(*p, value, &mut data[start..end])?;
            mask[start..end].fill(0xFF);
            Ok(())
        }
        DataType::Compound(compound) => {
            let members = match value {
                TagValue::Compound(members) => members,
                other => {
                    return Err(TagError::TypeMismatch(format!(
                        "expected a {} value, got {}",
                        compound.name(),
                        other
                    )))
                }
            };
            for (name, member_value) in members {
                let member = compound.member(name).ok_or_else(|| TagError::UnknownMember {
                    path: compound.name().to_string(),
                    member: name.clone(),
                })?;
                encode_region(
                    member_value,
                    &member.data_type,
                    member.count,
                    bit_offset + member.bit_offset,
                    data,
                    mask,
                )?;
            }
            Ok(())
        }
    }
}
