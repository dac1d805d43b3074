use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Number of 5-minute slots tracked per day, starting at 00:00.
pub const SLOTS_PER_DAY: usize = 192;

/// Packed size of a slot mask: one bit per slot, MSB of byte 0 = slot 0.
pub const MASK_BYTES: usize = 24;

/// Minutes covered by a single slot.
pub const SLOT_MINUTES: usize = 5;

pub type ReservationId = Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeatId(pub u64);

/// Opaque student handle supplied by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-day availability vector: one bit per 5-minute slot, `1` = free.
///
/// The canonical in-memory form is the packed 24-byte layout used on disk,
/// MSB-first within each byte: slot `i*8 + j` lives in bit `7-j` of byte `i`.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMask([u8; MASK_BYTES]);

impl SlotMask {
    pub const fn all_free() -> Self {
        Self([0xFF; MASK_BYTES])
    }

    pub const fn all_occupied() -> Self {
        Self([0; MASK_BYTES])
    }

    pub const fn from_bytes(bytes: [u8; MASK_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; MASK_BYTES] {
        &self.0
    }

    pub fn is_free(&self, slot: usize) -> bool {
        debug_assert!(slot < SLOTS_PER_DAY);
        (self.0[slot / 8] >> (7 - slot % 8)) & 1 == 1
    }

    pub fn set_free(&mut self, slot: usize) {
        debug_assert!(slot < SLOTS_PER_DAY);
        self.0[slot / 8] |= 1 << (7 - slot % 8);
    }

    pub fn set_occupied(&mut self, slot: usize) {
        debug_assert!(slot < SLOTS_PER_DAY);
        self.0[slot / 8] &= !(1 << (7 - slot % 8));
    }

    /// AND of free bits: a slot stays free only if it is free in both masks.
    pub fn intersect(&mut self, other: &SlotMask) {
        for (b, o) in self.0.iter_mut().zip(other.0.iter()) {
            *b &= o;
        }
    }

    pub fn free_count(&self) -> u32 {
        self.0.iter().map(|b| b.count_ones()).sum()
    }

    pub fn has_free_slot(&self) -> bool {
        self.0.iter().any(|b| *b != 0)
    }

    pub fn free_indices(&self) -> Vec<usize> {
        (0..SLOTS_PER_DAY).filter(|&i| self.is_free(i)).collect()
    }

    /// Build a request mask that occupies exactly `slots` and is free elsewhere.
    pub fn occupying<I: IntoIterator<Item = usize>>(slots: I) -> Self {
        let mut mask = Self::all_free();
        for slot in slots {
            mask.set_occupied(slot);
        }
        mask
    }
}

impl fmt::Debug for SlotMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotMask(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// Static desirability flags on a seat. Scoring input only — never consulted
/// by conflict logic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatTraits {
    pub near_window: bool,
    pub near_door: bool,
    pub near_power: bool,
}

impl SeatTraits {
    /// True if this seat has every trait the filter asks for. Traits not
    /// asked for are ignored, not excluded.
    pub fn satisfies(&self, wanted: &SeatTraits) -> bool {
        (!wanted.near_window || self.near_window)
            && (!wanted.near_door || self.near_door)
            && (!wanted.near_power || self.near_power)
    }

    /// Additive desirability bonus, granted for every trait the seat has.
    pub fn bonus(&self) -> u32 {
        let mut bonus = 0;
        if self.near_window {
            bonus += 2;
        }
        if self.near_door {
            bonus += 1;
        }
        if self.near_power {
            bonus += 3;
        }
        bonus
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub floor: u8,
    pub total_seats: u32,
    /// Seats with at least one reservation-free slot on the date last
    /// mutated. Updated only inside the same store transaction as the
    /// reservation write that triggered the change.
    pub free_seats: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub room_id: RoomId,
    pub traits: SeatTraits,
}

/// Administrative room-wide unavailability for one date. Multiple events on
/// the same room/date are OR-ed together at aggregation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutEvent {
    pub id: Ulid,
    pub room_id: RoomId,
    pub date: NaiveDate,
    pub mask: SlotMask,
    pub reason: String,
}

/// One student's claim on one seat for one date. The mask is `false` exactly
/// at the reserved slots and `true` elsewhere, so merging occupancy is a
/// plain intersection of free bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub seat_id: SeatId,
    pub room_id: RoomId,
    pub student_id: StudentId,
    pub date: NaiveDate,
    pub signed: bool,
    pub mask: SlotMask,
}

/// The record types persisted to the store log. Counter deltas ride with the
/// reservation write they accompany so replay keeps both consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEvent {
    RoomAdded {
        room: Room,
    },
    SeatAdded {
        seat: Seat,
    },
    BlackoutAdded {
        event: BlackoutEvent,
    },
    ReservationCommitted {
        record: Reservation,
        free_delta: i32,
    },
    ReservationCancelled {
        id: ReservationId,
        room_id: RoomId,
        free_delta: i32,
    },
    SignedIn {
        id: ReservationId,
    },
}

/// Change notification published per room after a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Booked {
        record: Reservation,
    },
    Cancelled {
        id: ReservationId,
        seat_id: SeatId,
        date: NaiveDate,
    },
    SignedIn {
        id: ReservationId,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedSeat {
    pub seat: Seat,
    pub free_slots: u32,
    pub weight: u32,
}
