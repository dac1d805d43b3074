use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use seatgrid::engine::{Engine, EngineConfig};
use seatgrid::model::{Room, RoomId};
use seatgrid::notify::NotifyHub;
use seatgrid::store::WalStore;
use seatgrid::timeslot;

/// Dump per-seat availability maps for a date — an operator's view of the
/// same aggregation the booking panels consume.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("SEATGRID_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    seatgrid::observability::init(metrics_port);

    let data_dir = std::env::var("SEATGRID_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let date = match std::env::var("SEATGRID_DATE") {
        Ok(s) => s.parse()?,
        Err(_) => chrono::Local::now().date_naive(),
    };
    let room_filter: Option<u32> = std::env::var("SEATGRID_ROOM")
        .ok()
        .and_then(|s| s.parse().ok());

    std::fs::create_dir_all(&data_dir)?;
    let wal_path = PathBuf::from(&data_dir).join("seatgrid.wal");
    let store = Arc::new(WalStore::open(&wal_path)?);
    let engine = Engine::new(store, Arc::new(NotifyHub::new()), EngineConfig::from_env());

    info!("seatgrid availability dump");
    info!("  data_dir: {data_dir}");
    info!("  date: {date}");

    let rooms: Vec<Room> = match room_filter {
        Some(id) => vec![engine.room(RoomId(id)).await?],
        None => engine.rooms().await?,
    };
    if rooms.is_empty() {
        info!("no rooms in store");
        return Ok(());
    }

    for room in rooms {
        println!(
            "room {} (floor {}, {}/{} seats free)",
            room.id, room.floor, room.free_seats, room.total_seats
        );
        let map = engine.availability_map(room.id, date).await?;
        for (seat, mask) in map {
            let ranges = timeslot::merged_free_ranges(&mask);
            let summary = if ranges.is_empty() {
                "fully booked".to_string()
            } else {
                ranges.join(", ")
            };
            println!("  seat {:>5}  {:>3} slots free  {}", seat.id, mask.free_count(), summary);
        }
    }

    Ok(())
}
