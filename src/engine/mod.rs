mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{free_windows, merge_overlapping, range_conflicts, subtract_ranges};
pub use error::Error;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::catalog::{SlotCatalog, weekday_from_index};
use crate::config::Config;
use crate::journal::Journal;
use crate::lock::LockManager;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::registry::TableRegistry;

pub type SharedDaySheet = Arc<RwLock<DaySheet>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
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

/// Background task owning the journal. Batches appends for group commit:
/// buffer the first append, drain whatever else is immediately queued, then
/// one fsync for the whole batch before answering every sender.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the batch first so the non-append command
                            // sees everything already acknowledged.
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut journal, &mut batch);
                metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(&mut batch, &result);

                if let Some(cmd) = deferred {
                    handle_non_append(&mut journal, cmd);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn flush_batch(
    journal: &mut Journal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = journal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partially buffered bytes don't
    // leak into the next batch (these senders are told the batch failed).
    let flush_err = journal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
    result: &io::Result<()>,
) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking core: table registry, slot catalog, per-(table, date) day
/// sheets, the lock manager, and the journal writer. The only way to
/// create, reschedule, or cancel a booking.
pub struct BookingEngine {
    pub registry: TableRegistry,
    pub(super) catalog: RwLock<SlotCatalog>,
    pub(super) sheets: DashMap<SheetKey, SharedDaySheet>,
    pub(super) bookings_index: DashMap<BookingId, SheetKey>,
    pub(super) blocks_index: DashMap<BlockId, SheetKey>,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) locks: LockManager,
    pub(super) lock_timeout: Duration,
}

impl BookingEngine {
    /// Replay the journal and start the group-commit writer. Must run inside
    /// a tokio runtime.
    pub fn open(
        cfg: &Config,
        notify: Arc<NotifyHub>,
        locks: LockManager,
    ) -> io::Result<Self> {
        std::fs::create_dir_all(&cfg.data_dir)?;
        let journal_path = cfg.journal_path();
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            registry: TableRegistry::new(),
            catalog: RwLock::new(SlotCatalog::new(cfg.default_slot_minutes)),
            sheets: DashMap::new(),
            bookings_index: DashMap::new(),
            blocks_index: DashMap::new(),
            journal_tx,
            notify,
            locks,
            lock_timeout: cfg.lock_timeout,
        };

        // Replay — we are the sole owner of every Arc here, so try_write
        // always succeeds instantly. blocking_write would panic if open ran
        // inside an async context.
        for event in &events {
            match event {
                Event::TableRegistered { table } => {
                    engine.registry.apply_registered(table.clone());
                }
                Event::TableUpdated { id, name, seats, shape } => {
                    engine.registry.apply_updated(*id, name.clone(), *seats, *shape);
                }
                Event::TableActiveSet { id, active } => {
                    engine.registry.apply_active(*id, *active);
                }
                Event::HoursSet { weekday, hours } => {
                    engine
                        .catalog
                        .try_write()
                        .expect("replay: uncontended write")
                        .apply_hours(weekday_from_index(*weekday), *hours);
                }
                Event::SlotsSet { weekday, slots } => {
                    engine
                        .catalog
                        .try_write()
                        .expect("replay: uncontended write")
                        .apply_slots(weekday_from_index(*weekday), slots.clone());
                }
                Event::PurgedBefore { date } => {
                    let stale: Vec<SheetKey> = engine
                        .sheets
                        .iter()
                        .filter(|e| e.key().1 < *date)
                        .map(|e| *e.key())
                        .collect();
                    for key in stale {
                        if let Some((_, sheet)) = engine.sheets.remove(&key) {
                            let guard =
                                sheet.try_read().expect("replay: uncontended read");
                            engine.drop_sheet_indexes(&guard);
                        }
                    }
                }
                other => {
                    if let Some(key) = event_sheet_key(other) {
                        let sheet = engine.sheet(key);
                        let mut guard =
                            sheet.try_write().expect("replay: uncontended write");
                        engine.apply_sheet_event(&mut guard, other);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// `open` with an in-process lock backend, for single-instance use.
    pub fn open_in_process(cfg: &Config, notify: Arc<NotifyHub>) -> io::Result<Self> {
        Self::open(cfg, notify, LockManager::in_process(cfg.lock_ttl))
    }

    /// The lock store, for wiring up the reaper's expired-holder sweep.
    pub fn lock_backend(&self) -> Arc<dyn crate::lock::LockBackend> {
        self.locks.backend()
    }

    /// Write an event through the background group-commit writer.
    pub(super) async fn journal_append(&self, event: &Event) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| Error::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| Error::Journal("journal writer dropped response".into()))?
            .map_err(|e| Error::Journal(e.to_string()))
    }

    /// Get or lazily create the sheet for one (table, date).
    pub(super) fn sheet(&self, key: SheetKey) -> SharedDaySheet {
        self.sheets
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(DaySheet::new(key.0, key.1))))
            .value()
            .clone()
    }

    pub(super) fn existing_sheet(&self, key: &SheetKey) -> Option<SharedDaySheet> {
        self.sheets.get(key).map(|e| e.value().clone())
    }

    /// Journal-append + apply + notify in one call, with the caller holding
    /// the sheet's write guard across all three.
    pub(super) async fn persist_and_apply(
        &self,
        sheet: &mut DaySheet,
        event: &Event,
    ) -> Result<(), Error> {
        self.journal_append(event).await?;
        self.apply_sheet_event(sheet, event);
        self.notify.send(sheet.table_id, event);
        Ok(())
    }

    /// Apply a sheet-scoped event and maintain the reverse indexes. The
    /// overlap refusal inside `insert_booking` is the storage-level guard:
    /// with a healthy journal it never fires, because the write path checks
    /// conflicts under the same guard before journaling.
    pub(super) fn apply_sheet_event(&self, sheet: &mut DaySheet, event: &Event) {
        match event {
            Event::BookingConfirmed { booking } => {
                if sheet.insert_booking(booking.clone()) {
                    self.bookings_index
                        .insert(booking.id, (sheet.table_id, sheet.date));
                } else {
                    tracing::warn!(
                        booking = %booking.id,
                        table = %sheet.table_id,
                        date = %sheet.date,
                        "dropped journal booking overlapping a confirmed one"
                    );
                }
            }
            Event::BookingCancelled { id, .. } => {
                if let Some(booking) = sheet.booking_mut(*id) {
                    booking.status = BookingStatus::Cancelled;
                }
            }
            Event::BookingContactUpdated { id, guest, .. } => {
                if let Some(booking) = sheet.booking_mut(*id) {
                    booking.guest = guest.clone();
                }
            }
            Event::BlockAdded { block } => {
                self.blocks_index
                    .insert(block.id, (sheet.table_id, sheet.date));
                sheet.insert_block(block.clone());
            }
            Event::BlockRemoved { id, .. } => {
                sheet.remove_block(*id);
                self.blocks_index.remove(id);
            }
            _ => {}
        }
    }

    pub(super) fn drop_sheet_indexes(&self, sheet: &DaySheet) {
        for booking in &sheet.bookings {
            self.bookings_index.remove(&booking.id);
        }
        for block in &sheet.blocks {
            self.blocks_index.remove(&block.id);
        }
    }

    /// Drop every sheet dated strictly before `cutoff`, returning how many
    /// bookings went with them. Waits out any in-flight display reads on
    /// each sheet before touching the indexes.
    pub(super) async fn purge_sheets_before(&self, cutoff: chrono::NaiveDate) -> usize {
        let stale: Vec<SheetKey> = self
            .sheets
            .iter()
            .filter(|e| e.key().1 < cutoff)
            .map(|e| *e.key())
            .collect();

        let mut purged = 0usize;
        for key in stale {
            if let Some((_, sheet)) = self.sheets.remove(&key) {
                let guard = sheet.read().await;
                purged += guard.bookings.len();
                self.drop_sheet_indexes(&guard);
            }
        }
        purged
    }

    /// Rewrite the journal with only the events needed to recreate live
    /// state: tables, the weekly catalog, then each surviving sheet.
    pub async fn compact_journal(&self) -> Result<(), Error> {
        let mut events = Vec::new();
        for table in self.registry.all_tables() {
            events.push(Event::TableRegistered { table });
        }
        events.extend(self.catalog.read().await.snapshot_events());

        let keys: Vec<SheetKey> = self.sheets.iter().map(|e| *e.key()).collect();
        for key in keys {
            let Some(sheet) = self.existing_sheet(&key) else { continue };
            let guard = sheet.read().await;
            for block in &guard.blocks {
                events.push(Event::BlockAdded { block: block.clone() });
            }
            for booking in &guard.bookings {
                // Cancelled bookings ride along with their terminal status.
                events.push(Event::BookingConfirmed { booking: booking.clone() });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| Error::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| Error::Journal("journal writer dropped response".into()))?
            .map_err(|e| Error::Journal(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Extract the (table, date) key from a sheet-scoped event.
fn event_sheet_key(event: &Event) -> Option<SheetKey> {
    match event {
        Event::BlockAdded { block } => Some((block.table_id, block.date)),
        Event::BlockRemoved { table_id, date, .. }
        | Event::BookingCancelled { table_id, date, .. }
        | Event::BookingContactUpdated { table_id, date, .. } => Some((*table_id, *date)),
        Event::BookingConfirmed { booking } => Some((booking.table_id, booking.date)),
        _ => None,
    }
}
