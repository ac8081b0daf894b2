mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod transitions;

pub use availability::{first_block, resolve, unavailable_days};
pub use error::{EngineError, Entity, Invalid};
pub use mutations::ReservationRequest;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use tracing::warn;
use ulid::Ulid;

use crate::clock::{Clock, SystemClock};
use crate::directory::Directory;
use crate::model::*;
use crate::notify::Notifier;
use crate::wal::Wal;

pub type SharedCalendar = Arc<RwLock<PropertyCalendar>>;

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

/// Owns the journal and batches appends for group commit: wait for one
/// append, drain whatever else is already queued, then fsync once for all.
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
                    // Commit what we have before anything that rewrites the file.
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-buffered bytes do not leak
    // into the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
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
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Apply an event to a property calendar (caller holds the lock).
fn apply_to_calendar(cal: &mut PropertyCalendar, event: &Event, entity_map: &DashMap<Ulid, PropertyId>) {
    match event {
        Event::RangeBlocked { range } => {
            entity_map.insert(range.id, range.property_id);
            cal.insert_blocked(range.clone());
        }
        Event::RangeUpdated {
            id,
            interval,
            reason,
            ..
        } => {
            if let Some(mut range) = cal.remove_blocked(*id) {
                range.interval = *interval;
                range.reason = reason.clone();
                cal.insert_blocked(range);
            }
        }
        Event::RangeUnblocked { id, .. } => {
            cal.remove_blocked(*id);
            entity_map.remove(id);
        }
        Event::ReservationPlaced { reservation } => {
            entity_map.insert(reservation.id, reservation.property_id);
            cal.insert_reservation(reservation.clone());
        }
        Event::ReservationStatusSet { id, status, .. } => {
            if let Some(r) = cal.reservation_mut(*id) {
                r.status = *status;
            }
        }
        Event::ReservationCancelled { id, released, .. } => {
            for range_id in released {
                cal.remove_blocked(*range_id);
                entity_map.remove(range_id);
            }
            if let Some(r) = cal.reservation_mut(*id) {
                r.status = ReservationStatus::Cancelled;
            }
        }
        Event::ReservationRescheduled {
            id,
            interval,
            nights,
            total_price,
            ..
        } => {
            if let Some(mut r) = cal.remove_reservation(*id) {
                r.interval = *interval;
                r.nights = *nights;
                r.total_price = *total_price;
                cal.insert_reservation(r);
            }
        }
    }
}

pub struct Engine {
    pub(super) calendars: DashMap<PropertyId, SharedCalendar>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) directory: Arc<dyn Directory>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) clock: Arc<dyn Clock>,
    /// Reverse lookup: reservation / blocked range id → property id
    pub(super) entity_to_property: DashMap<Ulid, PropertyId>,
    /// Writers share it for the whole of a mutation; compaction takes it
    /// exclusively so no append lands between snapshot and swap.
    pub(super) compaction_gate: RwLock<()>,
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            calendars: DashMap::new(),
            wal_tx,
            directory,
            notifier,
            clock: Arc::new(SystemClock),
            entity_to_property: DashMap::new(),
            compaction_gate: RwLock::new(()),
        };

        // Sole owner of every Arc during replay, so try_write never contends.
        // blocking_write would panic when this runs inside a runtime.
        for event in &events {
            let cal = engine.calendar_entry(event.property_id());
            let mut guard = cal.try_write().expect("replay: uncontended write");
            apply_to_calendar(&mut guard, event, &engine.entity_to_property);
        }
        if !events.is_empty() {
            tracing::info!(
                "replayed {} journal events across {} properties",
                events.len(),
                engine.calendars.len()
            );
        }

        Ok(engine)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub(super) fn today(&self) -> chrono::NaiveDate {
        self.clock.today()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_calendar(&self, property_id: &PropertyId) -> Option<SharedCalendar> {
        self.calendars.get(property_id).map(|e| e.value().clone())
    }

    /// Calendar for a property, created empty on first use.
    pub(super) fn calendar_entry(&self, property_id: PropertyId) -> SharedCalendar {
        self.calendars
            .entry(property_id)
            .or_insert_with(|| Arc::new(RwLock::new(PropertyCalendar::new(property_id))))
            .value()
            .clone()
    }

    pub fn property_for_entity(&self, entity_id: &Ulid) -> Option<PropertyId> {
        self.entity_to_property.get(entity_id).map(|e| *e.value())
    }

    /// Clone the calendar handles out of the map so no shard lock is held
    /// across an await.
    pub(super) fn all_calendars(&self) -> Vec<SharedCalendar> {
        self.calendars.iter().map(|e| e.value().clone()).collect()
    }

    /// WAL-append, apply, then hand the event to the notifier.
    pub(super) async fn persist_and_apply(
        &self,
        cal: &mut PropertyCalendar,
        event: Event,
    ) -> Result<(), EngineError> {
        self.wal_append(&event).await?;
        apply_to_calendar(cal, &event, &self.entity_to_property);
        self.dispatch(event);
        Ok(())
    }

    /// Fire-and-forget delivery. A failing notifier never undoes a write.
    fn dispatch(&self, event: Event) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let property_id = event.property_id();
            if let Err(e) = notifier.notify(property_id, &event).await {
                warn!("notify for property {property_id} failed: {e}");
                metrics::counter!(crate::observability::NOTIFY_FAILURES_TOTAL).increment(1);
            }
        });
    }

    /// Lookup entity → property, then take that property's write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity: Entity,
        entity_id: &Ulid,
    ) -> Result<(PropertyId, OwnedRwLockWriteGuard<PropertyCalendar>), EngineError> {
        let property_id = self
            .property_for_entity(entity_id)
            .ok_or(EngineError::NotFound(entity, *entity_id))?;
        let cal = self
            .get_calendar(&property_id)
            .ok_or(EngineError::NotFound(entity, *entity_id))?;
        Ok((property_id, cal.write_owned().await))
    }

    pub(super) async fn load_property(&self, property_id: PropertyId) -> Result<Property, EngineError> {
        self.directory
            .property(property_id)
            .await?
            .ok_or(EngineError::NotFound(Entity::Property, property_id))
    }

    /// Rewrite the journal with just the events that rebuild current state.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.write().await;

        let mut events = Vec::new();
        for cal in self.all_calendars() {
            let guard = cal.read().await;
            events.extend(guard.blocked.iter().map(|range| Event::RangeBlocked {
                range: range.clone(),
            }));
            events.extend(guard.reservations.iter().map(|r| Event::ReservationPlaced {
                reservation: r.clone(),
            }));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;

        metrics::counter!(crate::observability::COMPACTIONS_TOTAL).increment(1);
        tracing::info!("journal compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
