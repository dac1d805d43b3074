//! Seat-time availability and reservation conflict engine: per-seat
//! occupancy at 5-minute granularity, atomic conflict-checked booking, and
//! attribute-weighted seat recommendation.

pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;
pub mod timeslot;
pub mod wal;
