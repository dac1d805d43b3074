use std::time::Instant;

use chrono::NaiveDate;

use crate::model::*;

use super::{Engine, EngineError};

// ── Availability Aggregation ─────────────────────────────────────

/// Fold room-wide blackout events into a single mask. Events OR their
/// occupancy together: a slot is free only if no event occupies it.
pub fn room_blackout_mask(events: &[BlackoutEvent]) -> SlotMask {
    let mut mask = SlotMask::all_free();
    for event in events {
        mask.intersect(&event.mask);
    }
    mask
}

/// Fold a seat's reservations into its reservations-only availability.
/// A slot is free only if no existing reservation occupies it.
pub fn reserved_mask(records: &[Reservation]) -> SlotMask {
    let mut mask = SlotMask::all_free();
    for record in records {
        mask.intersect(&record.mask);
    }
    mask
}

impl Engine {
    /// Reservations-only availability for one seat. Zero reservations yield
    /// an all-free mask.
    pub async fn seat_availability(
        &self,
        seat_id: SeatId,
        date: NaiveDate,
    ) -> Result<SlotMask, EngineError> {
        let records = self
            .store_call(
                "reservations_for_seat",
                self.store.reservations_for_seat(seat_id, date),
            )
            .await?;
        Ok(reserved_mask(&records))
    }

    /// Final availability for every seat in a room: blackout events folded
    /// room-wide first, then each seat's reservations intersected out.
    ///
    /// Recomputed from the store on every call — events and reservations
    /// change underneath us, so nothing here may be cached across requests.
    pub async fn availability_map(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Vec<(Seat, SlotMask)>, EngineError> {
        let start = Instant::now();
        let events = self
            .store_call("blackouts_for", self.store.blackouts_for(room_id, date))
            .await?;
        let room_mask = room_blackout_mask(&events);

        let seats = self
            .store_call("seats_in_room", self.store.seats_in_room(room_id))
            .await?;
        let mut map = Vec::with_capacity(seats.len());
        for seat in seats {
            let records = self
                .store_call(
                    "reservations_for_seat",
                    self.store.reservations_for_seat(seat.id, date),
                )
                .await?;
            let mut mask = room_mask;
            mask.intersect(&reserved_mask(&records));
            map.push((seat, mask));
        }

        metrics::histogram!(crate::observability::AVAILABILITY_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        Ok(map)
    }
}
