use chrono::NaiveDate;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// Rank a room's seats for recommendation.
    ///
    /// Candidates are filtered to seats carrying every wanted trait; traits
    /// not wanted are ignored. Weight = reservation-free slot count plus the
    /// seat's full trait bonus (every trait it has, wanted or not). Ties
    /// keep catalog order; at most `top_n` entries come back.
    pub async fn recommend_seats(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        wanted: SeatTraits,
        top_n: usize,
    ) -> Result<Vec<RankedSeat>, EngineError> {
        if top_n == 0 {
            return Ok(Vec::new());
        }
        let seats = self
            .store_call("seats_in_room", self.store.seats_in_room(room_id))
            .await?;

        let mut ranked = Vec::new();
        for seat in seats {
            if !seat.traits.satisfies(&wanted) {
                continue;
            }
            let mask = self.seat_availability(seat.id, date).await?;
            let free_slots = mask.free_count();
            let weight = free_slots + seat.traits.bonus();
            ranked.push(RankedSeat {
                seat,
                free_slots,
                weight,
            });
        }

        // Stable sort: equal weights keep catalog order.
        ranked.sort_by(|a, b| b.weight.cmp(&a.weight));
        ranked.truncate(top_n);
        Ok(ranked)
    }

    /// A student's reservations, newest date first, newest record first
    /// within a date.
    pub async fn reservations_for_student(
        &self,
        student: &StudentId,
    ) -> Result<Vec<Reservation>, EngineError> {
        let mut records = self
            .store_call(
                "reservations_for_student",
                self.store.reservations_for_student(student),
            )
            .await?;
        records.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    pub async fn room(&self, id: RoomId) -> Result<Room, EngineError> {
        self.store_call("room", self.store.room(id)).await
    }

    pub async fn rooms(&self) -> Result<Vec<Room>, EngineError> {
        self.store_call("rooms", self.store.rooms()).await
    }
}
