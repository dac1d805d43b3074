use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::reserved_mask;
use super::conflict::{first_conflict, validate_request};
use super::{Engine, EngineError};

impl Engine {
    /// Point-in-time check: would `requested` fit around the seat's existing
    /// reservations right now? Advisory only — the answer can be stale by
    /// the time a booking lands, so `create_reservation` re-validates under
    /// its lock.
    pub async fn is_available(
        &self,
        seat_id: SeatId,
        date: NaiveDate,
        requested: &SlotMask,
    ) -> Result<bool, EngineError> {
        let existing = self.seat_availability(seat_id, date).await?;
        Ok(first_conflict(&existing, requested).is_none())
    }

    /// Atomically validate and insert a reservation.
    ///
    /// The conflict check and the commit run under the exclusive
    /// (seat, date) lock, so of N concurrent callers wanting overlapping
    /// slots exactly one commits; the rest observe `Conflict`. The room
    /// free-counter delta is computed here and applied by the store in the
    /// same unit as the insert.
    pub async fn create_reservation(
        &self,
        seat_id: SeatId,
        student_id: StudentId,
        date: NaiveDate,
        requested: SlotMask,
    ) -> Result<ReservationId, EngineError> {
        validate_request(&requested)?;
        if student_id.0.is_empty() {
            return Err(EngineError::LimitExceeded("empty student id"));
        }
        if student_id.0.len() > MAX_STUDENT_ID_LEN {
            return Err(EngineError::LimitExceeded("student id too long"));
        }
        let seat = self.store_call("seat", self.store.seat(seat_id)).await?;

        let lock = self.booking_lock(seat_id, date);
        let _guard = lock.lock().await;

        let records = self
            .store_call(
                "reservations_for_seat",
                self.store.reservations_for_seat(seat_id, date),
            )
            .await?;
        let existing = reserved_mask(&records);
        if let Some(slot) = first_conflict(&existing, &requested) {
            metrics::counter!(observability::RESERVATIONS_TOTAL, "status" => "conflict")
                .increment(1);
            return Err(EngineError::Conflict { slot });
        }

        // Counter semantics: the room counter tracks seats that still have
        // at least one reservation-free slot on this date. Decrement only on
        // the some-free → fully-booked transition.
        let mut after = existing;
        after.intersect(&requested);
        let free_delta = if existing.has_free_slot() && !after.has_free_slot() {
            -1
        } else {
            0
        };

        let record = Reservation {
            id: Ulid::new(),
            seat_id,
            room_id: seat.room_id,
            student_id,
            date,
            signed: false,
            mask: requested,
        };
        self.store_call(
            "commit_reservation",
            self.store.commit_reservation(record.clone(), free_delta),
        )
        .await?;

        metrics::counter!(observability::RESERVATIONS_TOTAL, "status" => "committed").increment(1);
        tracing::info!(seat = %seat_id, date = %date, id = %record.id, "reservation committed");
        self.notify.send(
            seat.room_id,
            &ChangeEvent::Booked {
                record: record.clone(),
            },
        );
        Ok(record.id)
    }

    /// Delete a reservation, restoring its slots and settling the room
    /// counter in the same store unit.
    pub async fn cancel_reservation(&self, id: ReservationId) -> Result<(), EngineError> {
        let record = self.store_call("reservation", self.store.reservation(id)).await?;

        let lock = self.booking_lock(record.seat_id, record.date);
        let _guard = lock.lock().await;

        // May have been cancelled while we waited on the lock.
        let records = self
            .store_call(
                "reservations_for_seat",
                self.store.reservations_for_seat(record.seat_id, record.date),
            )
            .await?;
        if !records.iter().any(|r| r.id == id) {
            return Err(EngineError::NotFound(format!("reservation {id}")));
        }

        let before = reserved_mask(&records);
        let remaining: Vec<Reservation> =
            records.into_iter().filter(|r| r.id != id).collect();
        let after = reserved_mask(&remaining);
        let free_delta = if !before.has_free_slot() && after.has_free_slot() {
            1
        } else {
            0
        };

        self.store_call(
            "remove_reservation",
            self.store.remove_reservation(id, free_delta),
        )
        .await?;

        metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);
        tracing::info!(seat = %record.seat_id, date = %record.date, %id, "reservation cancelled");
        self.notify.send(
            record.room_id,
            &ChangeEvent::Cancelled {
                id,
                seat_id: record.seat_id,
                date: record.date,
            },
        );
        Ok(())
    }

    /// Flip the signed flag. Rejected with `AlreadySigned` on a second call.
    pub async fn sign_in(&self, id: ReservationId) -> Result<(), EngineError> {
        let record = self.store_call("reservation", self.store.reservation(id)).await?;
        let previously_signed = self
            .store_call("mark_signed", self.store.mark_signed(id))
            .await?;
        if previously_signed {
            return Err(EngineError::AlreadySigned(id));
        }

        metrics::counter!(observability::SIGNINS_TOTAL).increment(1);
        tracing::info!(%id, "signed in");
        self.notify.send(record.room_id, &ChangeEvent::SignedIn { id });
        Ok(())
    }
}
