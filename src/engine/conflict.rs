use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Duration policy: 1 hour to 5 days, both ends inclusive.
pub(crate) fn validate_duration(span: &Span) -> Result<(), EngineError> {
    let duration_ms = span.duration_ms();
    if !(MIN_BOOKING_MS..=MAX_BOOKING_MS).contains(&duration_ms) {
        return Err(IntervalError::DurationOutOfBounds { duration_ms }.into());
    }
    Ok(())
}

/// A booking may start exactly now, never before.
pub(crate) fn validate_not_past(span: &Span, now: Ms) -> Result<(), EngineError> {
    if span.start() < now {
        return Err(EngineError::IntervalInThePast {
            start: span.start(),
            now,
        });
    }
    Ok(())
}

/// Caller must hold the resource's write lock across this check and the insert.
pub(crate) fn check_no_conflict(rs: &ResourceState, span: &Span) -> Result<(), EngineError> {
    match rs.find_conflict(span) {
        Some(existing) => Err(EngineError::IntervalConflict(existing)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use ulid::Ulid;

    use super::*;

    const H: Ms = 3_600_000;
    const DAY: Ms = 86_400_000;

    fn resource_with(spans: &[(Ms, Ms)]) -> ResourceState {
        let mut rs = ResourceState::new(Ulid::new(), "hall".into(), 100);
        for (seq, &(start, end)) in spans.iter().enumerate() {
            rs.insert_booking(Booking {
                id: Ulid::new(),
                resource_id: rs.id,
                requester_id: Ulid::new(),
                span: Span::new(start, end),
                status: BookingStatus::Placed,
                seq: seq as u64,
            });
        }
        rs
    }

    #[test]
    fn duration_bounds_inclusive() {
        assert!(validate_duration(&Span::new(0, H)).is_ok());
        assert!(validate_duration(&Span::new(0, 5 * DAY)).is_ok());
        assert!(matches!(
            validate_duration(&Span::new(0, H - 1_000)),
            Err(EngineError::InvalidInterval(IntervalError::DurationOutOfBounds { duration_ms }))
                if duration_ms == H - 1_000
        ));
        assert!(matches!(
            validate_duration(&Span::new(0, 5 * DAY + 1_000)),
            Err(EngineError::InvalidInterval(IntervalError::DurationOutOfBounds { .. }))
        ));
    }

    #[test]
    fn starting_now_is_not_past() {
        let now = 10 * H;
        assert!(validate_not_past(&Span::new(now, now + H), now).is_ok());
        assert!(matches!(
            validate_not_past(&Span::new(now - 1, now + H), now),
            Err(EngineError::IntervalInThePast { .. })
        ));
    }

    #[test]
    fn conflict_four_clauses() {
        let rs = resource_with(&[(10 * H, 12 * H)]);
        // new start inside existing
        assert!(check_no_conflict(&rs, &Span::new(11 * H, 13 * H)).is_err());
        // new end inside existing
        assert!(check_no_conflict(&rs, &Span::new(9 * H, 11 * H)).is_err());
        // existing start inside new
        assert!(check_no_conflict(&rs, &Span::new(9 * H, 13 * H)).is_err());
        // existing end inside new, same start
        assert!(check_no_conflict(&rs, &Span::new(10 * H, 11 * H)).is_err());
        // identical
        assert!(check_no_conflict(&rs, &Span::new(10 * H, 12 * H)).is_err());
    }

    #[test]
    fn touching_intervals_do_not_conflict() {
        let rs = resource_with(&[(10 * H, 11 * H)]);
        assert!(check_no_conflict(&rs, &Span::new(11 * H, 12 * H)).is_ok());
        assert!(check_no_conflict(&rs, &Span::new(9 * H, 10 * H)).is_ok());
    }

    #[test]
    fn conflict_reports_existing_booking() {
        let rs = resource_with(&[(10 * H, 11 * H), (14 * H, 15 * H)]);
        let blocker = rs.bookings[1].id;
        match check_no_conflict(&rs, &Span::new(13 * H, 14 * H + 1)) {
            Err(EngineError::IntervalConflict(id)) => assert_eq!(id, blocker),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn gap_between_bookings_is_free() {
        let rs = resource_with(&[(10 * H, 11 * H), (13 * H, 14 * H)]);
        assert!(check_no_conflict(&rs, &Span::new(11 * H, 13 * H)).is_ok());
    }
}
