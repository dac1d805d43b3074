use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::limits::*;
use crate::model::*;
use crate::wal::Wal;

/// Failures surfaced by a persistence backend.
#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    AlreadyExists(String),
    LimitExceeded(&'static str),
    Io(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "not found: {what}"),
            StoreError::AlreadyExists(what) => write!(f, "already exists: {what}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::Io(e) => write!(f, "store I/O error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Contract the engine holds against the persistent store.
///
/// The three mutations each carry the room free-counter delta they imply;
/// an implementation must apply record and delta as one atomic unit — a
/// reservation write must never land without its counter change or vice
/// versa.
#[async_trait]
pub trait Store: Send + Sync {
    async fn room(&self, id: RoomId) -> Result<Room, StoreError>;
    async fn rooms(&self) -> Result<Vec<Room>, StoreError>;
    async fn seat(&self, id: SeatId) -> Result<Seat, StoreError>;
    /// Seats of a room in stable catalog order (ascending id).
    async fn seats_in_room(&self, room: RoomId) -> Result<Vec<Seat>, StoreError>;
    async fn blackouts_for(
        &self,
        room: RoomId,
        date: NaiveDate,
    ) -> Result<Vec<BlackoutEvent>, StoreError>;
    async fn reservations_for_seat(
        &self,
        seat: SeatId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, StoreError>;
    async fn reservations_for_student(
        &self,
        student: &StudentId,
    ) -> Result<Vec<Reservation>, StoreError>;
    async fn reservation(&self, id: ReservationId) -> Result<Reservation, StoreError>;
    /// Persist a new reservation and settle the counter in one unit.
    async fn commit_reservation(
        &self,
        record: Reservation,
        free_delta: i32,
    ) -> Result<(), StoreError>;
    /// Delete a reservation and settle the counter in one unit. Returns the
    /// removed record.
    async fn remove_reservation(
        &self,
        id: ReservationId,
        free_delta: i32,
    ) -> Result<Reservation, StoreError>;
    /// Flip the signed flag to true, returning the previous value.
    async fn mark_signed(&self, id: ReservationId) -> Result<bool, StoreError>;
}

// ── Group-commit WAL channel ─────────────────────────────

pub(crate) enum WalCommand {
    Append {
        event: StoreEvent,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<StoreEvent>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(StoreEvent, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(StoreEvent, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── WAL-backed store ─────────────────────────────────────

struct RoomState {
    room: Room,
    seat_ids: Vec<SeatId>,
    blackouts: HashMap<NaiveDate, Vec<BlackoutEvent>>,
}

struct SeatState {
    seat: Seat,
    reservations: HashMap<NaiveDate, Vec<Reservation>>,
}

type SharedRoomState = Arc<RwLock<RoomState>>;
type SharedSeatState = Arc<RwLock<SeatState>>;

/// In-memory store rebuilt from an append-only log on open. Reservation
/// writes and their counter deltas travel in a single log record, so the
/// counter can never drift from reservation state across a crash.
pub struct WalStore {
    rooms: DashMap<RoomId, SharedRoomState>,
    seats: DashMap<SeatId, SharedSeatState>,
    /// Reverse lookup: reservation id → (seat, date)
    reservation_index: DashMap<ReservationId, (SeatId, NaiveDate)>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl WalStore {
    pub fn open(wal_path: &Path) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let wal = Wal::open(wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            rooms: DashMap::new(),
            seats: DashMap::new(),
            reservation_index: DashMap::new(),
            wal_tx,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly (no contention). Never use blocking_write here
        // because open may run inside an async context.
        for event in events {
            match event {
                StoreEvent::RoomAdded { room } => {
                    let state = RoomState {
                        room: room.clone(),
                        seat_ids: Vec::new(),
                        blackouts: HashMap::new(),
                    };
                    store.rooms.insert(room.id, Arc::new(RwLock::new(state)));
                }
                StoreEvent::SeatAdded { seat } => {
                    if let Some(entry) = store.rooms.get(&seat.room_id) {
                        let mut room = entry.try_write().expect("replay: uncontended write");
                        room.seat_ids.push(seat.id);
                    }
                    let state = SeatState {
                        seat: seat.clone(),
                        reservations: HashMap::new(),
                    };
                    store.seats.insert(seat.id, Arc::new(RwLock::new(state)));
                }
                StoreEvent::BlackoutAdded { event } => {
                    if let Some(entry) = store.rooms.get(&event.room_id) {
                        let mut room = entry.try_write().expect("replay: uncontended write");
                        room.blackouts.entry(event.date).or_default().push(event);
                    }
                }
                StoreEvent::ReservationCommitted { record, free_delta } => {
                    store.reservation_index.insert(record.id, (record.seat_id, record.date));
                    if let Some(entry) = store.seats.get(&record.seat_id) {
                        let mut seat = entry.try_write().expect("replay: uncontended write");
                        seat.reservations.entry(record.date).or_default().push(record.clone());
                    }
                    store.replay_counter(record.room_id, free_delta);
                }
                StoreEvent::ReservationCancelled { id, room_id, free_delta } => {
                    if let Some((_, (seat_id, date))) = store.reservation_index.remove(&id)
                        && let Some(entry) = store.seats.get(&seat_id)
                    {
                        let mut seat = entry.try_write().expect("replay: uncontended write");
                        if let Some(day) = seat.reservations.get_mut(&date) {
                            day.retain(|r| r.id != id);
                        }
                    }
                    store.replay_counter(room_id, free_delta);
                }
                StoreEvent::SignedIn { id } => {
                    if let Some(entry) = store.reservation_index.get(&id) {
                        let (seat_id, date) = *entry.value();
                        drop(entry);
                        if let Some(seat_entry) = store.seats.get(&seat_id) {
                            let mut seat =
                                seat_entry.try_write().expect("replay: uncontended write");
                            if let Some(day) = seat.reservations.get_mut(&date)
                                && let Some(r) = day.iter_mut().find(|r| r.id == id)
                            {
                                r.signed = true;
                            }
                        }
                    }
                }
            }
        }

        Ok(store)
    }

    fn replay_counter(&self, room_id: RoomId, free_delta: i32) {
        if free_delta == 0 {
            return;
        }
        if let Some(entry) = self.rooms.get(&room_id) {
            let mut room = entry.try_write().expect("replay: uncontended write");
            room.room.free_seats = room.room.free_seats.saturating_add_signed(free_delta);
        }
    }

    /// Write a record to the WAL via the background group-commit writer.
    async fn wal_append(&self, event: &StoreEvent) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Io("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Io("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    fn room_state(&self, id: RoomId) -> Result<SharedRoomState, StoreError> {
        self.rooms
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("room {id}")))
    }

    fn seat_state(&self, id: SeatId) -> Result<SharedSeatState, StoreError> {
        self.seats
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("seat {id}")))
    }

    fn locate_reservation(&self, id: ReservationId) -> Result<(SeatId, NaiveDate), StoreError> {
        self.reservation_index
            .get(&id)
            .map(|e| *e.value())
            .ok_or_else(|| StoreError::NotFound(format!("reservation {id}")))
    }

    // ── Catalog seeding (admin surface, not part of the engine contract) ──

    pub async fn add_room(&self, room: Room) -> Result<(), StoreError> {
        if self.rooms.len() >= MAX_ROOMS {
            return Err(StoreError::LimitExceeded("too many rooms"));
        }
        if self.rooms.contains_key(&room.id) {
            return Err(StoreError::AlreadyExists(format!("room {}", room.id)));
        }
        self.wal_append(&StoreEvent::RoomAdded { room: room.clone() }).await?;
        let state = RoomState {
            room: room.clone(),
            seat_ids: Vec::new(),
            blackouts: HashMap::new(),
        };
        self.rooms.insert(room.id, Arc::new(RwLock::new(state)));
        Ok(())
    }

    pub async fn add_seat(&self, seat: Seat) -> Result<(), StoreError> {
        if self.seats.contains_key(&seat.id) {
            return Err(StoreError::AlreadyExists(format!("seat {}", seat.id)));
        }
        let room_arc = self.room_state(seat.room_id)?;
        let mut room = room_arc.write().await;
        if room.seat_ids.len() >= MAX_SEATS_PER_ROOM {
            return Err(StoreError::LimitExceeded("too many seats in room"));
        }
        self.wal_append(&StoreEvent::SeatAdded { seat: seat.clone() }).await?;
        room.seat_ids.push(seat.id);
        let state = SeatState {
            seat: seat.clone(),
            reservations: HashMap::new(),
        };
        self.seats.insert(seat.id, Arc::new(RwLock::new(state)));
        Ok(())
    }

    pub async fn add_blackout(&self, event: BlackoutEvent) -> Result<(), StoreError> {
        if event.reason.len() > MAX_REASON_LEN {
            return Err(StoreError::LimitExceeded("blackout reason too long"));
        }
        let room_arc = self.room_state(event.room_id)?;
        let mut room = room_arc.write().await;
        let day = room.blackouts.entry(event.date).or_default();
        if day.len() >= MAX_BLACKOUTS_PER_ROOM_DATE {
            return Err(StoreError::LimitExceeded("too many blackouts for date"));
        }
        self.wal_append(&StoreEvent::BlackoutAdded { event: event.clone() }).await?;
        room.blackouts.entry(event.date).or_default().push(event);
        Ok(())
    }

    // ── Compaction ──────────────────────────────────────

    /// Rewrite the WAL with only the records needed to recreate the current
    /// state. Rooms carry their live counter, so re-committed reservations
    /// replay with a zero delta.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let mut events = Vec::new();

        let room_arcs: Vec<SharedRoomState> =
            self.rooms.iter().map(|e| e.value().clone()).collect();
        for room_arc in &room_arcs {
            let room = room_arc.read().await;
            events.push(StoreEvent::RoomAdded {
                room: room.room.clone(),
            });
        }
        let seat_arcs: Vec<SharedSeatState> =
            self.seats.iter().map(|e| e.value().clone()).collect();
        for seat_arc in &seat_arcs {
            let seat = seat_arc.read().await;
            events.push(StoreEvent::SeatAdded {
                seat: seat.seat.clone(),
            });
        }
        for room_arc in &room_arcs {
            let room = room_arc.read().await;
            for day in room.blackouts.values() {
                for event in day {
                    events.push(StoreEvent::BlackoutAdded { event: event.clone() });
                }
            }
        }
        for seat_arc in &seat_arcs {
            let seat = seat_arc.read().await;
            for day in seat.reservations.values() {
                for record in day {
                    events.push(StoreEvent::ReservationCommitted {
                        record: record.clone(),
                        free_delta: 0,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Io("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Io("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl Store for WalStore {
    async fn room(&self, id: RoomId) -> Result<Room, StoreError> {
        let arc = self.room_state(id)?;
        let room = arc.read().await;
        Ok(room.room.clone())
    }

    async fn rooms(&self) -> Result<Vec<Room>, StoreError> {
        let arcs: Vec<SharedRoomState> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut rooms = Vec::with_capacity(arcs.len());
        for arc in arcs {
            rooms.push(arc.read().await.room.clone());
        }
        rooms.sort_by_key(|r| r.id);
        Ok(rooms)
    }

    async fn seat(&self, id: SeatId) -> Result<Seat, StoreError> {
        let arc = self.seat_state(id)?;
        let seat = arc.read().await;
        Ok(seat.seat.clone())
    }

    async fn seats_in_room(&self, room: RoomId) -> Result<Vec<Seat>, StoreError> {
        let room_arc = self.room_state(room)?;
        let seat_ids = {
            let room = room_arc.read().await;
            let mut ids = room.seat_ids.clone();
            ids.sort();
            ids
        };
        let mut seats = Vec::with_capacity(seat_ids.len());
        for id in seat_ids {
            let arc = self.seat_state(id)?;
            seats.push(arc.read().await.seat.clone());
        }
        Ok(seats)
    }

    async fn blackouts_for(
        &self,
        room: RoomId,
        date: NaiveDate,
    ) -> Result<Vec<BlackoutEvent>, StoreError> {
        let room_arc = self.room_state(room)?;
        let room = room_arc.read().await;
        Ok(room.blackouts.get(&date).cloned().unwrap_or_default())
    }

    async fn reservations_for_seat(
        &self,
        seat: SeatId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, StoreError> {
        let arc = self.seat_state(seat)?;
        let seat = arc.read().await;
        Ok(seat.reservations.get(&date).cloned().unwrap_or_default())
    }

    async fn reservations_for_student(
        &self,
        student: &StudentId,
    ) -> Result<Vec<Reservation>, StoreError> {
        let arcs: Vec<SharedSeatState> = self.seats.iter().map(|e| e.value().clone()).collect();
        let mut records = Vec::new();
        for arc in arcs {
            let seat = arc.read().await;
            for day in seat.reservations.values() {
                records.extend(day.iter().filter(|r| &r.student_id == student).cloned());
            }
        }
        Ok(records)
    }

    async fn reservation(&self, id: ReservationId) -> Result<Reservation, StoreError> {
        let (seat_id, date) = self.locate_reservation(id)?;
        let arc = self.seat_state(seat_id)?;
        let seat = arc.read().await;
        seat.reservations
            .get(&date)
            .and_then(|day| day.iter().find(|r| r.id == id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("reservation {id}")))
    }

    async fn commit_reservation(
        &self,
        record: Reservation,
        free_delta: i32,
    ) -> Result<(), StoreError> {
        let seat_arc = self.seat_state(record.seat_id)?;
        let room_arc = self.room_state(record.room_id)?;

        let mut seat = seat_arc.write().await;
        if seat
            .reservations
            .get(&record.date)
            .is_some_and(|day| day.len() >= MAX_RESERVATIONS_PER_SEAT_DATE)
        {
            return Err(StoreError::LimitExceeded("too many reservations on seat"));
        }

        let event = StoreEvent::ReservationCommitted {
            record: record.clone(),
            free_delta,
        };
        self.wal_append(&event).await?;

        self.reservation_index.insert(record.id, (record.seat_id, record.date));
        seat.reservations.entry(record.date).or_default().push(record);
        drop(seat);

        if free_delta != 0 {
            let mut room = room_arc.write().await;
            room.room.free_seats = room.room.free_seats.saturating_add_signed(free_delta);
        }
        Ok(())
    }

    async fn remove_reservation(
        &self,
        id: ReservationId,
        free_delta: i32,
    ) -> Result<Reservation, StoreError> {
        let (seat_id, date) = self.locate_reservation(id)?;
        let seat_arc = self.seat_state(seat_id)?;

        let mut seat = seat_arc.write().await;
        let day = seat
            .reservations
            .get_mut(&date)
            .ok_or_else(|| StoreError::NotFound(format!("reservation {id}")))?;
        let pos = day
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("reservation {id}")))?;
        let room_id = day[pos].room_id;
        let room_arc = self.room_state(room_id)?;

        let event = StoreEvent::ReservationCancelled {
            id,
            room_id,
            free_delta,
        };
        self.wal_append(&event).await?;

        let removed = day.remove(pos);
        self.reservation_index.remove(&id);
        drop(seat);

        if free_delta != 0 {
            let mut room = room_arc.write().await;
            room.room.free_seats = room.room.free_seats.saturating_add_signed(free_delta);
        }
        Ok(removed)
    }

    async fn mark_signed(&self, id: ReservationId) -> Result<bool, StoreError> {
        let (seat_id, date) = self.locate_reservation(id)?;
        let seat_arc = self.seat_state(seat_id)?;

        let mut seat = seat_arc.write().await;
        let record = seat
            .reservations
            .get_mut(&date)
            .and_then(|day| day.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| StoreError::NotFound(format!("reservation {id}")))?;
        if record.signed {
            return Ok(true);
        }
        self.wal_append(&StoreEvent::SignedIn { id }).await?;
        record.signed = true;
        Ok(false)
    }
}

/// Background task that compacts the WAL once churn passes `threshold`
/// appended records, checking every `every`.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let appends = store.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match store.compact().await {
            Ok(()) => tracing::info!(appends, "compacted WAL"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}
