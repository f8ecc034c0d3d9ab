mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::{
    availability_at, free_spans, merge_overlapping, reconcile_resource, subtract_intervals,
    ReconcileReport,
};
pub use error::EngineError;
pub use store::InMemoryStore;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::model::*;
use crate::observability;
use crate::wal::Wal;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit:
/// block for the first append, drain whatever else is already queued, then
/// fsync once and answer every sender with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    // Keep ordering: flush what we have before compacting.
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let append_err = batch
        .iter()
        .find_map(|(event, _)| wal.append_buffered(event).err());
    // Flush even after an append error so a partial batch doesn't leak
    // into the next one.
    let flush_err = wal.flush_sync().err();
    match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// The booking ledger, resource registry and availability reconciler over a
/// single WAL.
///
/// Every mutation of a resource's bookings happens under that resource's
/// write lock, and the WAL append happens before the in-memory apply, so a
/// conflict check and the insert it guards form one atomic unit per
/// resource. Different resources never contend.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) clock: Arc<dyn Clock>,
    /// Mutations hold this shared; compaction holds it exclusively so no
    /// append can land between its snapshot and the log swap.
    pub(super) compaction_gate: RwLock<()>,
    next_seq: AtomicU64,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task.
    /// Must be called from within a tokio runtime.
    pub fn new(wal_path: PathBuf, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = InMemoryStore::new();
        let mut next_seq = 0u64;
        let mut states: HashMap<Ulid, ResourceState> = HashMap::new();

        for event in &events {
            match event {
                Event::ResourceCreated { id, name, capacity } => {
                    store.reserve_name(name, *id);
                    states.insert(*id, ResourceState::new(*id, name.clone(), *capacity));
                }
                Event::ResourceDeleted { id } => {
                    if let Some(rs) = states.remove(id) {
                        store.purge_resource(&rs);
                    }
                }
                other => {
                    if let Event::BookingPlaced { seq, .. } = other {
                        next_seq = next_seq.max(seq + 1);
                    }
                    if let Some(resource_id) = event_resource_id(other)
                        && let Some(rs) = states.get_mut(&resource_id) {
                            store.apply_event(rs, other);
                        }
                }
            }
        }

        for (id, rs) in states {
            store.insert_resource(id, Arc::new(RwLock::new(rs)));
        }
        metrics::gauge!(observability::RESOURCES_ACTIVE).set(store.resource_count() as f64);
        info!(
            "replayed {} events from {}: {} resources, {} bookings",
            events.len(),
            wal_path.display(),
            store.resource_count(),
            store.booking_count()
        );

        Ok(Self {
            store,
            wal_tx,
            clock,
            compaction_gate: RwLock::new(()),
            next_seq: AtomicU64::new(next_seq),
        })
    }

    /// Create the data directory if needed and open the configured WAL.
    pub fn open(config: &EngineConfig, clock: Arc<dyn Clock>) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Self::new(config.wal_path(), clock)
    }

    pub fn now_ms(&self) -> Ms {
        self.clock.now_ms()
    }

    pub(super) fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    async fn send_wal(&self, cmd: WalCommand) -> Result<(), EngineError> {
        self.wal_tx
            .send(cmd)
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send_wal(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) async fn wal_compact(&self, events: Vec<Event>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send_wal(WalCommand::Compact { events, response: tx })
            .await?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .send_wal(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// WAL-append, then apply to the locked state. Nothing is applied if the
    /// append fails.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut ResourceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(rs, event);
        Ok(())
    }

    /// Lookup resource handle or fail with `ResourceNotFound`.
    pub(super) fn resource(&self, id: &Ulid) -> Result<SharedResourceState, EngineError> {
        self.store
            .get_resource(id)
            .ok_or(EngineError::ResourceNotFound(*id))
    }

    /// Lookup booking → resource, acquire the resource's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<ResourceState>, EngineError> {
        let resource_id = self
            .store
            .get_resource_for_booking(booking_id)
            .ok_or(EngineError::BookingNotFound(*booking_id))?;
        let rs = self
            .store
            .get_resource(&resource_id)
            .ok_or(EngineError::BookingNotFound(*booking_id))?;
        let guard = rs.write_owned().await;
        if guard.deleted {
            return Err(EngineError::BookingNotFound(*booking_id));
        }
        Ok(guard)
    }
}

/// Extract the resource id from a resource-scoped event.
fn event_resource_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BookingPlaced { resource_id, .. } | Event::BookingCancelled { resource_id, .. } => {
            Some(*resource_id)
        }
        Event::ResourceUpdated { id, .. } => Some(*id),
        Event::ResourceCreated { .. } | Event::ResourceDeleted { .. } => None,
    }
}
