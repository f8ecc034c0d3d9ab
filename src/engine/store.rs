use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::SharedResourceState;

/// In-memory indices over the per-resource states. Only the `ResourceState`
/// contents need the per-resource lock; the maps here are sharded.
pub struct InMemoryStore {
    resources: DashMap<Ulid, SharedResourceState>,
    booking_to_resource: DashMap<Ulid, Ulid>,
    names: DashMap<String, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
            booking_to_resource: DashMap::new(),
            names: DashMap::new(),
        }
    }

    // ── Resources ────────────────────────────────────────────

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn get_resource(&self, id: &Ulid) -> Option<SharedResourceState> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn insert_resource(&self, id: Ulid, state: SharedResourceState) {
        self.resources.insert(id, state);
    }

    pub fn remove_resource(&self, id: &Ulid) -> Option<(Ulid, SharedResourceState)> {
        self.resources.remove(id)
    }

    /// Snapshot of all resource handles, sorted by id so passes over them are
    /// deterministic.
    pub fn resource_handles(&self) -> Vec<(Ulid, SharedResourceState)> {
        let mut handles: Vec<_> = self
            .resources
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        handles.sort_by_key(|(id, _)| *id);
        handles
    }

    // ── Name index ───────────────────────────────────────────

    /// Claim `name` for `id`. Fails if another resource holds it.
    /// Re-claiming a name the resource already owns succeeds.
    pub fn reserve_name(&self, name: &str, id: Ulid) -> bool {
        match self.names.entry(name.to_string()) {
            Entry::Occupied(e) => *e.get() == id,
            Entry::Vacant(e) => {
                e.insert(id);
                true
            }
        }
    }

    /// Drop `name` only if it still belongs to `id`.
    pub fn release_name(&self, name: &str, id: Ulid) {
        self.names.remove_if(name, |_, owner| *owner == id);
    }

    pub fn resource_for_name(&self, name: &str) -> Option<Ulid> {
        self.names.get(name).map(|e| *e.value())
    }

    // ── Booking index ────────────────────────────────────────

    pub fn get_resource_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_resource.get(booking_id).map(|e| *e.value())
    }

    pub fn booking_count(&self) -> usize {
        self.booking_to_resource.len()
    }

    // ── Event application ────────────────────────────────────

    /// Apply a resource-scoped event to a state the caller has locked.
    /// Create/Delete are handled at the map level by the caller.
    pub fn apply_event(&self, rs: &mut ResourceState, event: &Event) {
        match event {
            Event::BookingPlaced {
                id,
                resource_id,
                requester_id,
                span,
                seq,
            } => {
                rs.insert_booking(Booking {
                    id: *id,
                    resource_id: *resource_id,
                    requester_id: *requester_id,
                    span: *span,
                    status: BookingStatus::Placed,
                    seq: *seq,
                });
                self.booking_to_resource.insert(*id, *resource_id);
            }
            Event::BookingCancelled { id, .. } => {
                rs.deny_booking(id);
            }
            Event::ResourceUpdated { id, name, capacity } => {
                if rs.name != *name {
                    self.names.insert(name.clone(), *id);
                    self.release_name(&rs.name, *id);
                    rs.name = name.clone();
                }
                rs.capacity = *capacity;
            }
            Event::ResourceCreated { .. } | Event::ResourceDeleted { .. } => {}
        }
    }

    /// Forget a deleted resource's bookings and name.
    pub fn purge_resource(&self, rs: &ResourceState) {
        for b in &rs.bookings {
            self.booking_to_resource.remove(&b.id);
        }
        self.release_name(&rs.name, rs.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_reservation_is_exclusive() {
        let store = InMemoryStore::new();
        let a = Ulid::new();
        let b = Ulid::new();
        assert!(store.reserve_name("lab-1", a));
        assert!(!store.reserve_name("lab-1", b));
        assert!(store.reserve_name("lab-1", a)); // owner may re-claim
        assert_eq!(store.resource_for_name("lab-1"), Some(a));
    }

    #[test]
    fn release_name_respects_owner() {
        let store = InMemoryStore::new();
        let a = Ulid::new();
        store.reserve_name("lab-1", a);
        store.release_name("lab-1", Ulid::new());
        assert_eq!(store.resource_for_name("lab-1"), Some(a));
        store.release_name("lab-1", a);
        assert_eq!(store.resource_for_name("lab-1"), None);
    }

    #[test]
    fn apply_update_moves_name() {
        let store = InMemoryStore::new();
        let id = Ulid::new();
        store.reserve_name("old", id);
        let mut rs = ResourceState::new(id, "old".into(), 10);
        store.apply_event(
            &mut rs,
            &Event::ResourceUpdated {
                id,
                name: "new".into(),
                capacity: 20,
            },
        );
        assert_eq!(rs.name, "new");
        assert_eq!(rs.capacity, 20);
        assert_eq!(store.resource_for_name("new"), Some(id));
        assert_eq!(store.resource_for_name("old"), None);
    }

    #[test]
    fn purge_forgets_bookings_and_name() {
        let store = InMemoryStore::new();
        let id = Ulid::new();
        store.reserve_name("lab-2", id);
        let mut rs = ResourceState::new(id, "lab-2".into(), 10);
        let booking_id = Ulid::new();
        store.apply_event(
            &mut rs,
            &Event::BookingPlaced {
                id: booking_id,
                resource_id: id,
                requester_id: Ulid::new(),
                span: Span::new(0, 3_600_000),
                seq: 0,
            },
        );
        assert_eq!(store.get_resource_for_booking(&booking_id), Some(id));

        store.purge_resource(&rs);
        assert_eq!(store.get_resource_for_booking(&booking_id), None);
        assert_eq!(store.resource_for_name("lab-2"), None);
    }
}
