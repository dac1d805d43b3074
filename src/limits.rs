//! Hard input bounds enforced at the engine and store edges.

/// Longest accepted blackout reason string, in bytes.
pub const MAX_REASON_LEN: usize = 512;

/// Longest accepted student id, in bytes.
pub const MAX_STUDENT_ID_LEN: usize = 64;

/// Seats a single room may hold.
pub const MAX_SEATS_PER_ROOM: usize = 1024;

/// Rooms a single store may hold.
pub const MAX_ROOMS: usize = 4096;

/// Reservations accepted per seat and date. 192 disjoint single-slot
/// claims is the true ceiling; the margin absorbs cancelled-and-rebooked
/// churn within one aggregation window.
pub const MAX_RESERVATIONS_PER_SEAT_DATE: usize = 256;

/// Blackout events accepted per room and date.
pub const MAX_BLACKOUTS_PER_ROOM_DATE: usize = 64;
