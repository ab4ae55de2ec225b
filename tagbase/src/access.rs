//! Read/write engine
//!
//! Resolves addresses to bit-precise regions of a tag image and moves
//! structured values in and out of them. Every write is a masked merge
//! followed by event evaluation over the touched bytes, both under the
//! tag's lock.

use crate::address::{Address, Segment};
use crate::codec::{decode_region, encode_region};
use crate::events::EventEngine;
use crate::store::{Tag, TagSlot, TagState};
use crate::types::{DataType, Result, TagError, TagHandle, TagValue};
use std::ops::Range;

/// A resolved region of a tag
#[derive(Debug, Clone, PartialEq)]
pub struct Handle {
    pub tag: TagHandle,
    /// First byte of the region within the tag image
    pub byte: usize,
    /// Bit within `byte` where the region starts (BOOL only)
    pub bit: u8,
    /// Number of elements
    pub count: u32,
    /// Element type
    pub data_type: DataType,
    /// Bytes spanned by the region
    pub size: usize,
}

impl Handle {
    /// Absolute bit offset of the region within the tag image
    pub fn bit_offset(&self) -> u64 {
        self.byte as u64 * 8 + self.bit as u64
    }

    pub fn byte_range(&self) -> Range<usize> {
        self.byte..self.byte + self.size
    }

    /// True if the region overlaps the given byte range
    pub fn intersects(&self, range: &Range<usize>) -> bool {
        self.byte < range.end && range.start < self.byte + self.size
    }
}

/// Stateless engine for addressing, reading and writing tag data
pub struct ReadWriteEngine;

impl ReadWriteEngine {
    /// Resolve an address into a region of `tag`
    ///
    /// A `count` of 0 selects the addressed element, or the whole array if
    /// the last segment was not an index. Otherwise `count` consecutive
    /// elements are selected starting at the addressed one.
    pub fn resolve(tag: &Tag, address: &Address, count: u32) -> Result<Handle> {
        let mut data_type = tag.data_type.clone();
        let mut elements = tag.count;
        let mut available = tag.count;
        let mut bit: u64 = 0;
        let mut indexed = false;
        let mut walked = tag.name.clone();

        for segment in &address.path {
            match segment {
                Segment::Index(i) => {
                    if *i >= elements {
                        return Err(TagError::OutOfRange(format!(
                            "index {} outside {}[{}]",
                            i, walked, elements
                        )));
                    }
                    bit += *i as u64 * data_type.element_bits();
                    available = elements - i;
                    elements = 1;
                    indexed = true;
                    walked.push_str(&format!("[{}]", i));
                }
                Segment::Member(name) => {
                    if elements > 1 {
                        return Err(TagError::TypeMismatch(format!(
                            "{} is an array; index it before selecting '{}'",
                            walked, name
                        )));
                    }
                    let compound = data_type.as_compound().cloned().ok_or_else(|| {
                        TagError::UnknownMember {
                            path: walked.clone(),
                            member: name.clone(),
                        }
                    })?;
                    let member = compound.member(name).ok_or_else(|| TagError::UnknownMember {
                        path: walked.clone(),
                        member: name.clone(),
                    })?;
                    bit += member.bit_offset;
                    data_type = member.data_type.clone();
                    elements = member.count;
                    available = member.count;
                    indexed = false;
                    walked.push('.');
                    walked.push_str(name);
                }
            }
        }

        let count = match count {
            0 if indexed => 1,
            0 => elements,
            n if n > available => {
                return Err(TagError::OutOfRange(format!(
                    "{} elements requested from {}, only {} available",
                    n, walked, available
                )))
            }
            n => n,
        };

        let byte = (bit / 8) as usize;
        let bit = (bit % 8) as u8;
        let size = (bit as u64 + data_type.element_bits() * count as u64).div_ceil(8) as usize;

        Ok(Handle {
            tag: tag.handle,
            byte,
            bit,
            count,
            data_type,
            size,
        })
    }

    /// Decode the region described by `handle`
    pub(crate) fn read(slot: &TagSlot, handle: &Handle) -> Result<TagValue> {
        check_handle(&slot.tag, handle)?;
        let state = slot.state.lock();
        Ok(Self::decode(&state.data, handle))
    }

    pub(crate) fn decode(image: &[u8], handle: &Handle) -> TagValue {
        decode_region(image, handle.bit_offset(), &handle.data_type, handle.count)
    }

    /// Write a structured value into the region described by `handle`
    ///
    /// The value is encoded completely before the tag is locked, so an
    /// encoding error leaves the tag untouched.
    pub(crate) fn write(slot: &TagSlot, handle: &Handle, value: &TagValue) -> Result<()> {
        check_handle(&slot.tag, handle)?;
        let (data, mask) = Self::encode(handle, value)?;
        let mut state = slot.state.lock();
        Self::commit(&slot.tag, &mut state, handle.byte, &data, Some(&mask));
        Ok(())
    }

    fn encode(handle: &Handle, value: &TagValue) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut data = vec![0u8; handle.size];
        let mut mask = vec![0u8; handle.size];
        encode_region(
            value,
            &handle.data_type,
            handle.count,
            handle.bit as u64,
            &mut data,
            &mut mask,
        )?;
        Ok((data, mask))
    }

    /// Read-modify-write of a region under a single lock acquisition
    pub(crate) fn modify<F>(slot: &TagSlot, handle: &Handle, update: F) -> Result<TagValue>
    where
        F: FnOnce(&TagValue) -> TagValue,
    {
        check_handle(&slot.tag, handle)?;
        let mut state = slot.state.lock();
        let current = Self::decode(&state.data, handle);
        let next = update(&current);
        let (data, mask) = Self::encode(handle, &next)?;
        Self::commit(&slot.tag, &mut state, handle.byte, &data, Some(&mask));
        Ok(next)
    }

    /// Copy raw bytes out of a tag image
    pub(crate) fn read_bytes(slot: &TagSlot, offset: usize, len: usize) -> Result<Vec<u8>> {
        check_bounds(&slot.tag, offset, len)?;
        let state = slot.state.lock();
        Ok(state.data[offset..offset + len].to_vec())
    }

    /// Write raw bytes, optionally limited to the bits set in `mask`
    pub(crate) fn mask_write(
        slot: &TagSlot,
        offset: usize,
        data: &[u8],
        mask: Option<&[u8]>,
    ) -> Result<()> {
        if let Some(mask) = mask {
            if mask.len() != data.len() {
                return Err(TagError::InvalidArgument(format!(
                    "mask length {} does not match data length {}",
                    mask.len(),
                    data.len()
                )));
            }
        }
        check_bounds(&slot.tag, offset, data.len())?;
        let mut state = slot.state.lock();
        Self::commit(&slot.tag, &mut state, offset, data, mask);
        Ok(())
    }

    /// Merge `data` into the locked image and evaluate events on the bytes
    /// whose mask is non-zero
    fn commit(tag: &Tag, state: &mut TagState, offset: usize, data: &[u8], mask: Option<&[u8]>) {
        let mut touched: Option<Range<usize>> = None;

        for (i, byte) in data.iter().enumerate() {
            let m = mask.map_or(0xFF, |m| m[i]);
            if m == 0 {
                continue;
            }
            let pos = offset + i;
            state.data[pos] = (byte & m) | (state.data[pos] & !m);
            touched = Some(match touched {
                Some(range) => range.start..pos + 1,
                None => pos..pos + 1,
            });
        }

        match touched {
            Some(range) => {
                log::trace!("Write to {} touched bytes {:?}", tag.name, range);
                EventEngine::evaluate(tag, state, &range);
            }
            None => log::trace!("Write to {} had an empty mask", tag.name),
        }
    }
}

/// Reject a handle that was not resolved against `tag`
///
/// Handles are plain values and may come back from another tag or store, so
/// the region must lie inside the image and agree with its own element type.
fn check_handle(tag: &Tag, handle: &Handle) -> Result<()> {
    if handle.tag != tag.handle {
        return Err(TagError::InvalidArgument(format!(
            "handle for tag {} used on {} ({})",
            handle.tag, tag.name, tag.handle
        )));
    }
    let bits = handle.data_type.element_bits() * handle.count as u64;
    let expected = (handle.bit as u64 + bits).div_ceil(8);
    if handle.bit > 7 || handle.count == 0 || handle.size as u64 != expected {
        return Err(TagError::InvalidArgument(format!(
            "malformed handle on {}: bit {}, {} x {} in {} bytes",
            tag.name, handle.bit, handle.count, handle.data_type, handle.size
        )));
    }
    check_bounds(tag, handle.byte, handle.size)
}

fn check_bounds(tag: &Tag, offset: usize, len: usize) -> Result<()> {
    if offset.checked_add(len).map_or(true, |end| end > tag.size) {
        return Err(TagError::OutOfRange(format!(
            "{} bytes at offset {} exceed {} ({} bytes)",
            len, offset, tag.name, tag.size
        )));
    }
    Ok(())
}
