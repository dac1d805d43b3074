use crate::model::{MASK_BYTES, SlotMask};

use super::EngineError;

/// First slot a request wants that an existing-reservations mask already
/// marks occupied, if any.
///
/// Both masks use the true=free encoding; a request marks the slots it
/// intends to consume as occupied (`false`). A clash is therefore a bit
/// position occupied in both.
pub fn first_conflict(existing: &SlotMask, requested: &SlotMask) -> Option<usize> {
    for i in 0..MASK_BYTES {
        let clash = !requested.as_bytes()[i] & !existing.as_bytes()[i];
        if clash != 0 {
            return Some(i * 8 + clash.leading_zeros() as usize);
        }
    }
    None
}

/// A request must claim at least one slot; an all-free mask books nothing.
pub(super) fn validate_request(requested: &SlotMask) -> Result<(), EngineError> {
    if *requested == SlotMask::all_free() {
        return Err(EngineError::LimitExceeded("request claims no slots"));
    }
    Ok(())
}
