use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::reconcile_resource;
use super::conflict::{check_no_conflict, validate_duration, validate_not_past};
use super::{Engine, EngineError};

/// 1–120 characters of ASCII letters, digits, `.`, `-` or `_`.
fn validate_name(name: &str) -> Result<(), EngineError> {
    let ok = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if ok {
        Ok(())
    } else {
        Err(EngineError::InvalidName(name.to_string()))
    }
}

fn validate_capacity(capacity: u32) -> Result<(), EngineError> {
    if capacity == 0 {
        return Err(EngineError::InvalidCapacity);
    }
    Ok(())
}

impl Engine {
    // ── Resource registry ────────────────────────────────────

    pub async fn create_resource(
        &self,
        name: String,
        capacity: u32,
    ) -> Result<ResourceInfo, EngineError> {
        validate_name(&name)?;
        validate_capacity(capacity)?;
        if self.store.resource_count() >= MAX_RESOURCES {
            return Err(EngineError::LimitExceeded("too many resources"));
        }

        let _gate = self.compaction_gate.read().await;
        let id = Ulid::new();
        if !self.store.reserve_name(&name, id) {
            return Err(EngineError::DuplicateName(name));
        }

        let event = Event::ResourceCreated {
            id,
            name: name.clone(),
            capacity,
        };
        if let Err(e) = self.wal_append(&event).await {
            self.store.release_name(&name, id);
            return Err(e);
        }

        let rs = ResourceState::new(id, name, capacity);
        let info = rs.info();
        self.store.insert_resource(id, Arc::new(RwLock::new(rs)));
        metrics::gauge!(observability::RESOURCES_ACTIVE).set(self.store.resource_count() as f64);
        info!("created resource {id} ({})", info.name);
        Ok(info)
    }

    /// Change name and/or capacity. Availability is not writable from here.
    pub async fn update_resource(
        &self,
        id: Ulid,
        update: ResourceUpdate,
    ) -> Result<ResourceInfo, EngineError> {
        if let Some(ref name) = update.name {
            validate_name(name)?;
        }
        if let Some(capacity) = update.capacity {
            validate_capacity(capacity)?;
        }

        let _gate = self.compaction_gate.read().await;
        let rs = self.resource(&id)?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::ResourceNotFound(id));
        }

        let name = update.name.unwrap_or_else(|| guard.name.clone());
        let capacity = update.capacity.unwrap_or(guard.capacity);
        let renamed = name != guard.name;
        if renamed && !self.store.reserve_name(&name, id) {
            return Err(EngineError::DuplicateName(name));
        }

        let event = Event::ResourceUpdated {
            id,
            name: name.clone(),
            capacity,
        };
        if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
            if renamed {
                self.store.release_name(&name, id);
            }
            return Err(e);
        }

        reconcile_resource(&mut guard, self.now_ms());
        info!("updated resource {id} ({name}, capacity {capacity})");
        Ok(guard.info())
    }

    /// Remove a resource and its booking history. Refused while any PLACED
    /// booking on it has not yet ended.
    pub async fn delete_resource(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let rs = self.resource(&id)?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::ResourceNotFound(id));
        }
        if guard.has_unfinished_placed(self.now_ms()) {
            return Err(EngineError::ResourceHasActiveBookings(id));
        }

        self.wal_append(&Event::ResourceDeleted { id }).await?;
        guard.deleted = true;
        self.store.purge_resource(&guard);
        self.store.remove_resource(&id);
        metrics::gauge!(observability::RESOURCES_ACTIVE).set(self.store.resource_count() as f64);
        info!("deleted resource {id}");
        Ok(())
    }

    // ── Booking ledger ───────────────────────────────────────

    /// Admit a booking if the resource exists, the span is within the
    /// duration policy, does not start before now, and is free.
    pub async fn place(
        &self,
        resource_id: Ulid,
        requester_id: RequesterId,
        span: Span,
    ) -> Result<Booking, EngineError> {
        let result = self.place_checked(resource_id, requester_id, span).await;
        match &result {
            Ok(booking) => {
                metrics::counter!(observability::BOOKINGS_PLACED_TOTAL).increment(1);
                info!(
                    "placed booking {} on {resource_id} [{}, {})",
                    booking.id,
                    span.start(),
                    span.end()
                );
            }
            Err(e) => {
                metrics::counter!(observability::BOOKINGS_REJECTED_TOTAL, "reason" => e.label())
                    .increment(1);
                debug!("rejected booking on {resource_id}: {e}");
            }
        }
        result
    }

    async fn place_checked(
        &self,
        resource_id: Ulid,
        requester_id: RequesterId,
        span: Span,
    ) -> Result<Booking, EngineError> {
        validate_duration(&span)?;
        validate_not_past(&span, self.now_ms())?;

        let _gate = self.compaction_gate.read().await;
        let rs = self.resource(&resource_id)?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::ResourceNotFound(resource_id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many bookings on resource"));
        }

        check_no_conflict(&guard, &span)?;

        let booking = Booking {
            id: Ulid::new(),
            resource_id,
            requester_id,
            span,
            status: BookingStatus::Placed,
            seq: self.next_seq(),
        };
        let event = Event::BookingPlaced {
            id: booking.id,
            resource_id,
            requester_id,
            span,
            seq: booking.seq,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        reconcile_resource(&mut guard, self.now_ms());
        Ok(booking)
    }

    /// PLACED → DENIED. Only the owner or an admin may cancel; cancelling an
    /// already DENIED booking returns it unchanged.
    pub async fn cancel(&self, booking_id: Ulid, actor: Actor) -> Result<Booking, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let mut booking = guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;

        if !actor.may_act_for(booking.requester_id) {
            return Err(EngineError::NotOwner(booking_id));
        }
        if booking.status == BookingStatus::Denied {
            debug!("booking {booking_id} already denied");
            return Ok(booking);
        }

        let event = Event::BookingCancelled {
            id: booking_id,
            resource_id: booking.resource_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        booking.status = BookingStatus::Denied;

        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        info!("cancelled booking {booking_id} ({actor:?})");
        Ok(booking)
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.write().await;
        let mut events = Vec::new();

        for (_, rs) in self.store.resource_handles() {
            let guard = rs.read().await;
            events.push(Event::ResourceCreated {
                id: guard.id,
                name: guard.name.clone(),
                capacity: guard.capacity,
            });
            for b in &guard.bookings {
                events.push(Event::BookingPlaced {
                    id: b.id,
                    resource_id: guard.id,
                    requester_id: b.requester_id,
                    span: b.span,
                    seq: b.seq,
                });
                if b.status == BookingStatus::Denied {
                    events.push(Event::BookingCancelled {
                        id: b.id,
                        resource_id: guard.id,
                    });
                }
            }
        }

        let count = events.len();
        self.wal_compact(events).await?;
        info!("compacted WAL to {count} events");
        Ok(())
    }
}
