use crate::model::{MASK_BYTES, SLOTS_PER_DAY, SlotMask};

use super::EngineError;

/// Decode the packed 24-byte storage form into a slot mask.
///
/// Bit layout: for byte `i` and bit position `j` (MSB first), slot `i*8 + j`
/// is free iff that bit is 1. This is the layout existing data was written
/// with; it must never change.
pub fn decode(packed: &[u8]) -> Result<SlotMask, EngineError> {
    if packed.len() != MASK_BYTES {
        return Err(EngineError::InvalidLength {
            expected: MASK_BYTES,
            got: packed.len(),
        });
    }
    let mut bytes = [0u8; MASK_BYTES];
    bytes.copy_from_slice(packed);
    Ok(SlotMask::from_bytes(bytes))
}

/// Pack a 192-element availability vector into its storage form.
pub fn encode(slots: &[bool]) -> Result<SlotMask, EngineError> {
    if slots.len() != SLOTS_PER_DAY {
        return Err(EngineError::InvalidLength {
            expected: SLOTS_PER_DAY,
            got: slots.len(),
        });
    }
    let mut mask = SlotMask::all_occupied();
    for (slot, &free) in slots.iter().enumerate() {
        if free {
            mask.set_free(slot);
        }
    }
    Ok(mask)
}

/// Expand a mask into its indexable 192-element vector form.
pub fn to_slots(mask: &SlotMask) -> [bool; SLOTS_PER_DAY] {
    let mut slots = [false; SLOTS_PER_DAY];
    for (i, s) in slots.iter_mut().enumerate() {
        *s = mask.is_free(i);
    }
    slots
}
