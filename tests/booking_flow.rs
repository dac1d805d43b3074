use std::sync::Arc;

use chrono::NaiveDate;
use ulid::Ulid;

use seatgrid::engine::{Engine, EngineConfig, EngineError};
use seatgrid::model::*;
use seatgrid::notify::NotifyHub;
use seatgrid::store::WalStore;

// ── Test infrastructure ──────────────────────────────────────

fn test_dir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("seatgrid_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 22).unwrap()
}

async fn seed(store: &WalStore, seats: u64) {
    store
        .add_room(Room {
            id: RoomId(1),
            floor: 2,
            total_seats: seats as u32,
            free_seats: seats as u32,
        })
        .await
        .unwrap();
    for i in 0..seats {
        store
            .add_seat(Seat {
                id: SeatId(100 + i),
                room_id: RoomId(1),
                traits: SeatTraits::default(),
            })
            .await
            .unwrap();
    }
}

fn engine_over(store: Arc<WalStore>) -> Arc<Engine> {
    Arc::new(Engine::new(
        store,
        Arc::new(NotifyHub::new()),
        EngineConfig::default(),
    ))
}

// ── End-to-end flow ──────────────────────────────────────────

#[tokio::test]
async fn book_cancel_and_survive_restart() {
    let dir = test_dir();
    let wal = dir.join("flow.wal");

    let booked_id;
    {
        let store = Arc::new(WalStore::open(&wal).unwrap());
        seed(&store, 2).await;
        let engine = engine_over(store);

        // The afternoon window is offered, then claimed
        let wanted = SlotMask::occupying(144..156);
        assert!(engine.is_available(SeatId(100), date(), &wanted).await.unwrap());
        booked_id = engine
            .create_reservation(SeatId(100), StudentId("s2001".into()), date(), wanted)
            .await
            .unwrap();

        // The map reflects the claim immediately
        let map = engine.availability_map(RoomId(1), date()).await.unwrap();
        let (_, mask) = map.iter().find(|(s, _)| s.id == SeatId(100)).unwrap();
        assert!(!mask.is_free(144));
        assert!(mask.is_free(156));
    }

    // A fresh process sees the same state
    let store = Arc::new(WalStore::open(&wal).unwrap());
    let engine = engine_over(store);
    let records = engine
        .reservations_for_student(&StudentId("s2001".into()))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, booked_id);

    engine.cancel_reservation(booked_id).await.unwrap();
    let mask = engine.seat_availability(SeatId(100), date()).await.unwrap();
    assert_eq!(mask, SlotMask::all_free());
}

#[tokio::test]
async fn racing_bookers_get_exactly_one_success() {
    let store = Arc::new(WalStore::open(&test_dir().join("race.wal")).unwrap());
    seed(&store, 1).await;
    let engine = engine_over(store);

    let wanted = SlotMask::occupying(96..108);
    let (a, b) = tokio::join!(
        engine.create_reservation(SeatId(100), StudentId("alice".into()), date(), wanted),
        engine.create_reservation(SeatId(100), StudentId("bob".into()), date(), wanted),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one of the racers may commit");
    let conflict = if a.is_err() { a } else { b };
    assert!(matches!(conflict, Err(EngineError::Conflict { .. })));

    // Exactly one reservation landed
    let mask = engine.seat_availability(SeatId(100), date()).await.unwrap();
    assert_eq!(mask.free_count(), 192 - 12);
}

#[tokio::test]
async fn contended_storm_admits_one_winner_per_window() {
    let store = Arc::new(WalStore::open(&test_dir().join("storm.wal")).unwrap());
    seed(&store, 1).await;
    let engine = engine_over(store);

    // 16 tasks fight over the same hour
    let wanted = SlotMask::occupying(12..24);
    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .create_reservation(SeatId(100), StudentId(format!("s{i}")), date(), wanted)
                .await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(EngineError::Conflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected failure: {other}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 15);
}

#[tokio::test]
async fn counter_consistent_across_restart() {
    let dir = test_dir();
    let wal = dir.join("counter.wal");

    {
        let store = Arc::new(WalStore::open(&wal).unwrap());
        seed(&store, 2).await;
        let engine = engine_over(store);
        engine
            .create_reservation(
                SeatId(100),
                StudentId("s1".into()),
                date(),
                SlotMask::all_occupied(),
            )
            .await
            .unwrap();
        assert_eq!(engine.room(RoomId(1)).await.unwrap().free_seats, 1);
    }

    let store = Arc::new(WalStore::open(&wal).unwrap());
    let engine = engine_over(store);
    assert_eq!(engine.room(RoomId(1)).await.unwrap().free_seats, 1);

    // Booking the second seat solid drains the room
    engine
        .create_reservation(
            SeatId(101),
            StudentId("s2".into()),
            date(),
            SlotMask::all_occupied(),
        )
        .await
        .unwrap();
    assert_eq!(engine.room(RoomId(1)).await.unwrap().free_seats, 0);
}
