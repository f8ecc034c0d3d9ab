use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::limits::{MAX_BOOKING_MS, MIN_BOOKING_MS};

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Opaque, already-authenticated identity handed to us by the account subsystem.
pub type RequesterId = Ulid;

/// Why a pair of timestamps is not an acceptable booking interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error("start must be earlier than end (start {start}, end {end})")]
    StartAfterEnd { start: Ms, end: Ms },
    #[error("interval is empty (start == end == {0})")]
    Empty(Ms),
    #[error(
        "booking must last between {min}ms and {max}ms, got {duration_ms}ms",
        min = MIN_BOOKING_MS,
        max = MAX_BOOKING_MS
    )]
    DurationOutOfBounds { duration_ms: Ms },
}

/// Half-open interval `[start, end)`. Always `start < end`; the only way in
/// from outside the crate is `try_new` (or deserializing, which goes through it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSpan")]
pub struct Span {
    start: Ms,
    end: Ms,
}

#[derive(Deserialize)]
struct RawSpan {
    start: Ms,
    end: Ms,
}

impl TryFrom<RawSpan> for Span {
    type Error = IntervalError;

    fn try_from(raw: RawSpan) -> Result<Self, Self::Error> {
        Span::try_new(raw.start, raw.end)
    }
}

impl Span {
    /// Validating constructor. Inverted and degenerate ranges are rejected
    /// with distinct errors so callers can tell the user which one they hit.
    pub fn try_new(start: Ms, end: Ms) -> Result<Self, IntervalError> {
        if start > end {
            return Err(IntervalError::StartAfterEnd { start, end });
        }
        if start == end {
            return Err(IntervalError::Empty(start));
        }
        Ok(Self { start, end })
    }

    /// Internal constructor for spans derived from already-valid spans.
    pub(crate) fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn start(&self) -> Ms {
        self.start
    }

    pub fn end(&self) -> Ms {
        self.end
    }

    /// Saturates at `Ms::MAX` for spans wider than the time type can express.
    pub fn duration_ms(&self) -> Ms {
        self.end.saturating_sub(self.start)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Placed,
    Denied,
}

/// Derived flag. Only meaningful right after a reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Availability {
    Available,
    Unavailable,
}

/// Who is asking. `Admin` bypasses ownership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Requester(RequesterId),
    Admin,
}

impl Actor {
    pub fn may_act_for(&self, owner: RequesterId) -> bool {
        match self {
            Actor::Admin => true,
            Actor::Requester(id) => *id == owner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub requester_id: RequesterId,
    pub span: Span,
    pub status: BookingStatus,
    /// Global admission order; survives restarts.
    pub seq: u64,
}

#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
    pub availability: Availability,
    /// Every booking admitted on this resource, in admission order.
    pub bookings: Vec<Booking>,
    /// PLACED bookings only, sorted by `span.start`. Pairwise disjoint.
    placed: Vec<(Span, Ulid)>,
    /// Set under the write lock when the resource is removed from the store.
    pub(crate) deleted: bool,
}

impl ResourceState {
    pub fn new(id: Ulid, name: String, capacity: u32) -> Self {
        Self {
            id,
            name,
            capacity,
            availability: Availability::Available,
            bookings: Vec::new(),
            placed: Vec::new(),
            deleted: false,
        }
    }

    /// Append a booking. PLACED bookings also enter the sorted conflict index.
    pub fn insert_booking(&mut self, booking: Booking) {
        if booking.status == BookingStatus::Placed {
            let pos = self
                .placed
                .binary_search_by_key(&booking.span.start, |(s, _)| s.start)
                .unwrap_or_else(|e| e);
            self.placed.insert(pos, (booking.span, booking.id));
        }
        self.bookings.push(booking);
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    /// Flip a booking to DENIED and drop it from the conflict index.
    /// Returns the updated booking, or None if the id is unknown here.
    pub fn deny_booking(&mut self, id: &Ulid) -> Option<&Booking> {
        let booking = self.bookings.iter_mut().find(|b| b.id == *id)?;
        booking.status = BookingStatus::Denied;
        if let Some(pos) = self.placed.iter().position(|(_, pid)| pid == id) {
            self.placed.remove(pos);
        }
        Some(&*booking)
    }

    /// PLACED bookings whose span overlaps the query window.
    /// Uses binary search to skip entries starting at or after `query.end`.
    pub fn placed_overlapping(&self, query: &Span) -> impl Iterator<Item = &(Span, Ulid)> {
        let right_bound = self.placed.partition_point(|(s, _)| s.start < query.end);
        self.placed[..right_bound]
            .iter()
            .filter(move |(s, _)| s.end > query.start)
    }

    /// First PLACED booking that conflicts with `span`, if any.
    pub fn find_conflict(&self, span: &Span) -> Option<Ulid> {
        self.placed_overlapping(span)
            .find(|(s, _)| s.overlaps(span))
            .map(|(_, id)| *id)
    }

    /// PLACED booking covering instant `t` (`start <= t < end`), if any.
    pub fn placed_covering(&self, t: Ms) -> Option<Ulid> {
        self.placed
            .iter()
            .take_while(|(s, _)| s.start <= t)
            .find(|(s, _)| s.contains_instant(t))
            .map(|(_, id)| *id)
    }

    /// Spans of all PLACED bookings, sorted by start.
    pub fn placed_spans(&self) -> impl Iterator<Item = Span> + '_ {
        self.placed.iter().map(|(s, _)| *s)
    }

    /// True if some PLACED booking has not yet ended at `now`.
    pub fn has_unfinished_placed(&self, now: Ms) -> bool {
        self.placed.iter().any(|(s, _)| s.end > now)
    }

    pub fn info(&self) -> ResourceInfo {
        ResourceInfo {
            id: self.id,
            name: self.name.clone(),
            capacity: self.capacity,
            availability: self.availability,
        }
    }
}

/// WAL record payloads. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated {
        id: Ulid,
        name: String,
        capacity: u32,
    },
    ResourceUpdated {
        id: Ulid,
        name: String,
        capacity: u32,
    },
    ResourceDeleted {
        id: Ulid,
    },
    BookingPlaced {
        id: Ulid,
        resource_id: Ulid,
        requester_id: RequesterId,
        span: Span,
        seq: u64,
    },
    BookingCancelled {
        id: Ulid,
        resource_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
    pub availability: Availability,
}

/// Administrative update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceUpdate {
    pub name: Option<String>,
    pub capacity: Option<u32>,
}
