use std::time::Instant;

use chrono::{NaiveDate, Utc, Weekday};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{first_conflict, validate_guest, validate_party, validate_range};
use super::{BookingEngine, Error};

impl BookingEngine {
    // ── Table registry writes ────────────────────────────────

    pub async fn register_table(
        &self,
        number: String,
        name: Option<String>,
        seats: u32,
        shape: TableShape,
    ) -> Result<Table, Error> {
        if number.trim().is_empty() {
            return Err(Error::Validation("table number is required"));
        }
        if number.len() > MAX_TABLE_NUMBER_LEN {
            return Err(Error::LimitExceeded("table number too long"));
        }
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN
        {
            return Err(Error::LimitExceeded("table name too long"));
        }
        if seats == 0 || seats > MAX_SEATS {
            return Err(Error::Validation("seat count out of range"));
        }
        if self.registry.len() >= MAX_TABLES {
            return Err(Error::LimitExceeded("too many tables"));
        }
        if self.registry.contains_number(&number) {
            return Err(Error::Validation("table number already in use"));
        }

        let table = Table {
            id: Ulid::new(),
            number,
            name,
            seats,
            shape,
            is_active: true,
        };
        let event = Event::TableRegistered { table: table.clone() };
        self.journal_append(&event).await?;
        self.registry.apply_registered(table.clone());
        self.notify.send(table.id, &event);
        self.record_active_tables();
        Ok(table)
    }

    pub async fn update_table(
        &self,
        id: TableId,
        name: Option<String>,
        seats: u32,
        shape: TableShape,
    ) -> Result<Table, Error> {
        self.registry.get(&id)?;
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN
        {
            return Err(Error::LimitExceeded("table name too long"));
        }
        if seats == 0 || seats > MAX_SEATS {
            return Err(Error::Validation("seat count out of range"));
        }

        let event = Event::TableUpdated { id, name: name.clone(), seats, shape };
        self.journal_append(&event).await?;
        self.registry.apply_updated(id, name, seats, shape);
        self.notify.send(id, &event);
        self.registry.get(&id)
    }

    /// Flip a table in or out of the bookable set. Takes effect for the
    /// resolver immediately; existing bookings on the table are untouched
    /// and need explicit cancellation.
    pub async fn set_table_active(&self, id: TableId, active: bool) -> Result<(), Error> {
        self.registry.get(&id)?;
        let event = Event::TableActiveSet { id, active };
        self.journal_append(&event).await?;
        self.registry.apply_active(id, active);
        self.notify.send(id, &event);
        self.record_active_tables();
        Ok(())
    }

    // ── Catalog writes ───────────────────────────────────────

    pub async fn set_hours(&self, weekday: Weekday, hours: DayHours) -> Result<(), Error> {
        let mut catalog = self.catalog.write().await;
        catalog.check_hours(weekday, hours)?;
        let event = Event::HoursSet {
            weekday: weekday.num_days_from_monday() as u8,
            hours,
        };
        self.journal_append(&event).await?;
        catalog.apply_hours(weekday, hours);
        Ok(())
    }

    pub async fn set_slots(&self, weekday: Weekday, slots: Vec<TimeRange>) -> Result<(), Error> {
        let mut catalog = self.catalog.write().await;
        catalog.check_slots(weekday, &slots)?;
        let event = Event::SlotsSet {
            weekday: weekday.num_days_from_monday() as u8,
            slots: slots.clone(),
        };
        self.journal_append(&event).await?;
        catalog.apply_slots(weekday, slots);
        Ok(())
    }

    // ── Booking lifecycle ────────────────────────────────────

    /// Create a booking: validate, serialize on the (table, date) key,
    /// re-check availability under the lock, journal, apply. The lock is
    /// released on every exit path.
    pub async fn create_booking(
        &self,
        req: BookingRequest,
        actor: Actor,
    ) -> Result<Booking, Error> {
        let started = Instant::now();

        // All shape validation happens before any lock is attempted.
        let table = self.registry.get(&req.table_id)?;
        if !table.is_active {
            return Err(Error::Validation("table is not active"));
        }
        validate_range(&req.range)?;
        validate_party(req.party_size, table.seats)?;
        validate_guest(&req.guest)?;

        let key = LockKey { table_id: req.table_id, date: req.date };
        let token = self.locks.acquire(key, self.lock_timeout).await?;
        let result = self.create_booking_locked(req, actor).await;
        self.locks.release(token).await;

        let outcome = match &result {
            Ok(_) => "confirmed",
            Err(Error::SlotUnavailable { .. }) => "slot_unavailable",
            Err(_) => "error",
        };
        metrics::counter!(observability::BOOKING_OPS_TOTAL, "op" => "create", "outcome" => outcome)
            .increment(1);
        metrics::histogram!(observability::BOOKING_CREATE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn create_booking_locked(
        &self,
        req: BookingRequest,
        actor: Actor,
    ) -> Result<Booking, Error> {
        let sheet = self.sheet((req.table_id, req.date));
        let mut guard = sheet.write_owned().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_SHEET {
            return Err(Error::LimitExceeded("too many bookings for one table-day"));
        }

        // The availability snapshot the caller saw may be stale; this is the
        // authoritative re-check.
        if let Some(conflict) = first_conflict(&guard, &req.range, None) {
            return Err(Error::SlotUnavailable { table_id: req.table_id, conflict });
        }

        let booking = Booking {
            id: Ulid::new(),
            table_id: req.table_id,
            date: req.date,
            range: req.range,
            guest: req.guest,
            party_size: req.party_size,
            status: BookingStatus::Confirmed,
            source: req.source,
            created_by: actor.user,
            created_at: Utc::now(),
        };
        let event = Event::BookingConfirmed { booking: booking.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::debug!(booking = %booking.id, table = %booking.table_id,
            date = %booking.date, range = %booking.range, "booking confirmed");
        Ok(booking)
    }

    /// Cancel a booking. Cancelling twice is an [`Error::AlreadyCancelled`]
    /// and leaves the terminal state untouched; callers treating repeat
    /// cancels as success can match on that variant. The status check and
    /// flip happen under one sheet write guard (compare-and-set); no
    /// (table, date) lock is taken since cancellation only widens
    /// availability.
    pub async fn cancel_booking(&self, id: BookingId, _actor: Actor) -> Result<(), Error> {
        let key = *self
            .bookings_index
            .get(&id)
            .ok_or(Error::BookingNotFound(id))?;
        let sheet = self
            .existing_sheet(&key)
            .ok_or(Error::BookingNotFound(id))?;
        let mut guard = sheet.write_owned().await;
        let booking = guard.booking(id).ok_or(Error::BookingNotFound(id))?;
        if booking.status == BookingStatus::Cancelled {
            return Err(Error::AlreadyCancelled(id));
        }

        let event = Event::BookingCancelled { id, table_id: key.0, date: key.1 };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::BOOKING_OPS_TOTAL, "op" => "cancel", "outcome" => "cancelled")
            .increment(1);
        Ok(())
    }

    /// Move a booking to a new range (and optionally a new party size) on
    /// the same table and date. Modeled as cancel-then-recreate under a
    /// single (table, date) lock acquisition so the overlap re-check
    /// applies; on any failure the original booking is left untouched.
    pub async fn reschedule_booking(
        &self,
        id: BookingId,
        new_range: TimeRange,
        new_party_size: Option<u32>,
        actor: Actor,
    ) -> Result<Booking, Error> {
        let key = *self
            .bookings_index
            .get(&id)
            .ok_or(Error::BookingNotFound(id))?;
        validate_range(&new_range)?;
        let table = self.registry.get(&key.0)?;

        let lock_key = LockKey { table_id: key.0, date: key.1 };
        let token = self.locks.acquire(lock_key, self.lock_timeout).await?;
        let result = self
            .reschedule_locked(id, key, &table, new_range, new_party_size, actor)
            .await;
        self.locks.release(token).await;

        if result.is_ok() {
            metrics::counter!(observability::BOOKING_OPS_TOTAL, "op" => "reschedule", "outcome" => "confirmed")
                .increment(1);
        }
        result
    }

    async fn reschedule_locked(
        &self,
        id: BookingId,
        key: SheetKey,
        table: &Table,
        new_range: TimeRange,
        new_party_size: Option<u32>,
        actor: Actor,
    ) -> Result<Booking, Error> {
        let sheet = self
            .existing_sheet(&key)
            .ok_or(Error::BookingNotFound(id))?;
        let mut guard = sheet.write_owned().await;
        let existing = guard.booking(id).ok_or(Error::BookingNotFound(id))?;
        if existing.status == BookingStatus::Cancelled {
            return Err(Error::AlreadyCancelled(id));
        }

        let party_size = new_party_size.unwrap_or(existing.party_size);
        validate_party(party_size, table.seats)?;

        // The old booking still occupies its range, so exclude it from the
        // overlap re-check: shrinking or shifting within its own window is
        // always legal.
        if let Some(conflict) = first_conflict(&guard, &new_range, Some(id)) {
            return Err(Error::SlotUnavailable { table_id: key.0, conflict });
        }

        let replacement = Booking {
            id: Ulid::new(),
            table_id: key.0,
            date: key.1,
            range: new_range,
            guest: existing.guest.clone(),
            party_size,
            status: BookingStatus::Confirmed,
            source: existing.source,
            created_by: actor.user.or(existing.created_by),
            created_at: Utc::now(),
        };

        let cancel = Event::BookingCancelled { id, table_id: key.0, date: key.1 };
        self.persist_and_apply(&mut guard, &cancel).await?;
        let confirm = Event::BookingConfirmed { booking: replacement.clone() };
        self.persist_and_apply(&mut guard, &confirm).await?;
        Ok(replacement)
    }

    /// Guest-metadata fix (name, phone, occasion). Cannot affect
    /// availability, so it bypasses the lock manager entirely; the sheet
    /// write guard alone makes it atomic.
    pub async fn update_contact(&self, id: BookingId, guest: GuestInfo) -> Result<Booking, Error> {
        validate_guest(&guest)?;
        let key = *self
            .bookings_index
            .get(&id)
            .ok_or(Error::BookingNotFound(id))?;
        let sheet = self
            .existing_sheet(&key)
            .ok_or(Error::BookingNotFound(id))?;
        let mut guard = sheet.write_owned().await;
        guard.booking(id).ok_or(Error::BookingNotFound(id))?;

        let event = Event::BookingContactUpdated {
            id,
            table_id: key.0,
            date: key.1,
            guest,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        guard
            .booking(id)
            .cloned()
            .ok_or(Error::BookingNotFound(id))
    }

    // ── Table blocks ─────────────────────────────────────────

    /// Close a table for a window (maintenance, private party) without
    /// touching its existing bookings.
    pub async fn add_block(
        &self,
        table_id: TableId,
        date: NaiveDate,
        range: TimeRange,
        reason: Option<String>,
    ) -> Result<TableBlock, Error> {
        self.registry.get(&table_id)?;
        validate_range(&range)?;
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN
        {
            return Err(Error::LimitExceeded("block reason too long"));
        }

        let sheet = self.sheet((table_id, date));
        let mut guard = sheet.write_owned().await;
        if guard.blocks.len() >= MAX_BLOCKS_PER_SHEET {
            return Err(Error::LimitExceeded("too many blocks for one table-day"));
        }

        let block = TableBlock { id: Ulid::new(), table_id, date, range, reason };
        let event = Event::BlockAdded { block: block.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(block)
    }

    pub async fn remove_block(&self, id: BlockId) -> Result<(), Error> {
        let key = *self
            .blocks_index
            .get(&id)
            .ok_or(Error::BlockNotFound(id))?;
        let sheet = self
            .existing_sheet(&key)
            .ok_or(Error::BlockNotFound(id))?;
        let mut guard = sheet.write_owned().await;
        if guard.blocks.iter().all(|b| b.id != id) {
            return Err(Error::BlockNotFound(id));
        }

        let event = Event::BlockRemoved { id, table_id: key.0, date: key.1 };
        self.persist_and_apply(&mut guard, &event).await
    }

    // ── Administrative cleanup ───────────────────────────────

    /// Drop every day sheet dated strictly before `today`. Batch operation
    /// outside per-booking locking; idempotent, so re-running after a crash
    /// is safe. Returns the number of bookings removed.
    pub async fn purge_past(&self, today: NaiveDate) -> Result<usize, Error> {
        if !self.sheets.iter().any(|e| e.key().1 < today) {
            return Ok(0);
        }
        self.journal_append(&Event::PurgedBefore { date: today }).await?;
        let purged = self.purge_sheets_before(today).await;
        metrics::counter!(observability::BOOKINGS_PURGED_TOTAL).increment(purged as u64);
        tracing::info!(before = %today, purged, "purged past bookings");
        Ok(purged)
    }

    fn record_active_tables(&self) {
        metrics::gauge!(observability::TABLES_ACTIVE)
            .set(self.registry.active_tables().len() as f64);
    }
}
