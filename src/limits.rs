use crate::model::Ms;

/// Shortest bookable interval: one hour.
pub const MIN_BOOKING_MS: Ms = 3_600_000;
/// Longest bookable interval: five days.
pub const MAX_BOOKING_MS: Ms = 5 * 86_400_000;

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_RESOURCES: usize = 10_000;
pub const MAX_BOOKINGS_PER_RESOURCE: usize = 100_000;

/// Widest window accepted by `free_spans` (one year).
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 86_400_000;

/// Status filters carry one or two distinct values.
pub const MAX_STATUS_FILTER: usize = 2;
