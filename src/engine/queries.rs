use std::time::Instant;

use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::{free_spans, reconcile_resource, ReconcileReport};
use super::{Engine, EngineError};

/// Status filters hold one or two values; duplicates collapse.
fn distinct_filter<T: PartialEq + Copy>(filter: &[T]) -> Result<Vec<T>, EngineError> {
    if filter.is_empty() || filter.len() > MAX_STATUS_FILTER {
        return Err(EngineError::InvalidStatusFilter(filter.len()));
    }
    let mut distinct = Vec::with_capacity(filter.len());
    for v in filter {
        if !distinct.contains(v) {
            distinct.push(*v);
        }
    }
    Ok(distinct)
}

impl Engine {
    // ── Availability reconciler ──────────────────────────────

    /// Recompute every resource's availability flag for `now`.
    ///
    /// Each resource is recomputed under its write lock, so the pass sees a
    /// consistent snapshot of that resource's PLACED bookings. Running it
    /// again with the same `now` and no intervening bookings changes nothing.
    pub async fn reconcile(&self, now: Ms) -> ReconcileReport {
        let started = Instant::now();
        let mut report = ReconcileReport::default();

        for (_, rs) in self.store.resource_handles() {
            let mut guard = rs.write().await;
            if guard.deleted {
                continue;
            }
            report.visited += 1;
            if reconcile_resource(&mut guard, now) {
                report.changed += 1;
            }
            if guard.availability == Availability::Unavailable {
                report.unavailable += 1;
            }
        }

        metrics::histogram!(observability::RECONCILE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(observability::RECONCILE_CHANGES_TOTAL).increment(report.changed as u64);
        debug!(
            "reconciled {} resources at {now}: {} changed, {} unavailable",
            report.visited, report.changed, report.unavailable
        );
        report
    }

    // ── Resource registry reads ──────────────────────────────

    /// Read one resource with its availability freshly reconciled.
    pub async fn get_resource(&self, id: Ulid) -> Result<ResourceInfo, EngineError> {
        let rs = self.resource(&id)?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::ResourceNotFound(id));
        }
        reconcile_resource(&mut guard, self.now_ms());
        Ok(guard.info())
    }

    /// All resources after a reconcile pass, ordered by id.
    pub async fn list_resources(&self) -> Vec<ResourceInfo> {
        self.reconcile(self.now_ms()).await;
        let mut out = Vec::new();
        for (_, rs) in self.store.resource_handles() {
            let guard = rs.read().await;
            if !guard.deleted {
                out.push(guard.info());
            }
        }
        out
    }

    /// Resources whose reconciled availability is in `filter` (one or two values).
    pub async fn list_resources_by_availability(
        &self,
        filter: &[Availability],
    ) -> Result<Vec<ResourceInfo>, EngineError> {
        let wanted = distinct_filter(filter)?;
        Ok(self
            .list_resources()
            .await
            .into_iter()
            .filter(|r| wanted.contains(&r.availability))
            .collect())
    }

    // ── Booking ledger reads ─────────────────────────────────

    /// False iff a PLACED booking on the resource overlaps `span`.
    pub async fn is_free(&self, resource_id: Ulid, span: Span) -> Result<bool, EngineError> {
        let rs = self.resource(&resource_id)?;
        let guard = rs.read().await;
        if guard.deleted {
            return Err(EngineError::ResourceNotFound(resource_id));
        }
        Ok(guard.find_conflict(&span).is_none())
    }

    /// Open sub-ranges of `window` on the resource.
    pub async fn free_spans(&self, resource_id: Ulid, window: Span) -> Result<Vec<Span>, EngineError> {
        if window.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let rs = self.resource(&resource_id)?;
        let guard = rs.read().await;
        if guard.deleted {
            return Err(EngineError::ResourceNotFound(resource_id));
        }
        Ok(free_spans(&guard, &window))
    }

    /// A booking, visible only to its requester or an admin.
    pub async fn get_booking(&self, booking_id: Ulid, actor: Actor) -> Result<Booking, EngineError> {
        let resource_id = self
            .store
            .get_resource_for_booking(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let rs = self
            .store
            .get_resource(&resource_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let guard = rs.read().await;
        if guard.deleted {
            return Err(EngineError::BookingNotFound(booking_id));
        }
        let booking = guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        if !actor.may_act_for(booking.requester_id) {
            return Err(EngineError::NotOwner(booking_id));
        }
        Ok(booking)
    }

    /// Bookings on one resource, admission order.
    pub async fn list_by_resource(&self, resource_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let rs = self.resource(&resource_id)?;
        let guard = rs.read().await;
        if guard.deleted {
            return Err(EngineError::ResourceNotFound(resource_id));
        }
        Ok(guard.bookings.clone())
    }

    pub async fn list_by_requester(&self, requester_id: RequesterId) -> Vec<Booking> {
        self.collect_bookings(|b| b.requester_id == requester_id).await
    }

    /// Bookings whose status is in `filter` (one or two values), admission order.
    pub async fn list_by_status(&self, filter: &[BookingStatus]) -> Result<Vec<Booking>, EngineError> {
        let wanted = distinct_filter(filter)?;
        Ok(self.collect_bookings(|b| wanted.contains(&b.status)).await)
    }

    /// Matching bookings across all resources, ordered by admission sequence.
    async fn collect_bookings(&self, keep: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        let mut out = Vec::new();
        for (_, rs) in self.store.resource_handles() {
            let guard = rs.read().await;
            if guard.deleted {
                continue;
            }
            out.extend(guard.bookings.iter().filter(|&b| keep(b)).cloned());
        }
        out.sort_by_key(|b| b.seq);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_accepts_one_or_two() {
        assert_eq!(
            distinct_filter(&[BookingStatus::Placed]).unwrap(),
            vec![BookingStatus::Placed]
        );
        assert_eq!(
            distinct_filter(&[BookingStatus::Denied, BookingStatus::Placed]).unwrap(),
            vec![BookingStatus::Denied, BookingStatus::Placed]
        );
    }

    #[test]
    fn filter_collapses_duplicates() {
        assert_eq!(
            distinct_filter(&[Availability::Available, Availability::Available]).unwrap(),
            vec![Availability::Available]
        );
    }

    #[test]
    fn filter_rejects_empty_and_oversized() {
        let empty: [BookingStatus; 0] = [];
        assert!(matches!(
            distinct_filter(&empty),
            Err(EngineError::InvalidStatusFilter(0))
        ));
        assert!(matches!(
            distinct_filter(&[
                BookingStatus::Placed,
                BookingStatus::Denied,
                BookingStatus::Placed
            ]),
            Err(EngineError::InvalidStatusFilter(3))
        ));
    }
}
