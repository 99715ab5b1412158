use chrono::{NaiveDate, Weekday};

use crate::model::*;

use super::availability;
use super::conflict::validate_range;
use super::{BookingEngine, Error};

impl BookingEngine {
    /// Availability of every active table for one date and requested range.
    ///
    /// Read-only snapshot for display: it may be stale by the time a booking
    /// attempt lands, and the write path re-validates under the lock, so
    /// this never serializes against writers beyond the per-sheet guard.
    /// Inactive tables are excluded entirely, not marked unavailable.
    pub async fn resolve(
        &self,
        date: NaiveDate,
        range: TimeRange,
    ) -> Result<Vec<TableAvailability>, Error> {
        validate_range(&range)?;
        let mut out = Vec::new();
        for table in self.registry.active_tables() {
            let conflicts = match self.existing_sheet(&(table.id, date)) {
                Some(sheet) => {
                    let guard = sheet.read().await;
                    availability::range_conflicts(&guard, &range)
                }
                None => Vec::new(),
            };
            out.push(TableAvailability {
                is_available: conflicts.is_empty(),
                conflicts,
                table,
            });
        }
        Ok(out)
    }

    /// Maximal open windows for one table on one date: the day's catalog
    /// slots minus confirmed bookings and blocks. Inactive tables have no
    /// open windows.
    pub async fn free_windows(
        &self,
        table_id: TableId,
        date: NaiveDate,
    ) -> Result<Vec<TimeRange>, Error> {
        let table = self.registry.get(&table_id)?;
        if !table.is_active {
            return Ok(Vec::new());
        }
        let slots = self.catalog.read().await.list_slots(date)?;
        match self.existing_sheet(&(table_id, date)) {
            Some(sheet) => {
                let guard = sheet.read().await;
                Ok(availability::free_windows(&slots, &guard))
            }
            None => Ok(availability::merge_overlapping(&slots)),
        }
    }

    /// Ordered bookable windows for a date, straight from the catalog.
    pub async fn list_slots(&self, date: NaiveDate) -> Result<Vec<TimeRange>, Error> {
        self.catalog.read().await.list_slots(date)
    }

    pub async fn operating_hours(&self, weekday: Weekday) -> Option<DayHours> {
        self.catalog.read().await.hours(weekday)
    }

    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, Error> {
        let key = *self
            .bookings_index
            .get(&id)
            .ok_or(Error::BookingNotFound(id))?;
        let sheet = self
            .existing_sheet(&key)
            .ok_or(Error::BookingNotFound(id))?;
        let guard = sheet.read().await;
        guard.booking(id).cloned().ok_or(Error::BookingNotFound(id))
    }

    /// All bookings (any status) for one table and date, ordered by start.
    pub async fn bookings_on(&self, table_id: TableId, date: NaiveDate) -> Vec<Booking> {
        match self.existing_sheet(&(table_id, date)) {
            Some(sheet) => sheet.read().await.bookings.clone(),
            None => Vec::new(),
        }
    }

    /// Every booking on a date across all tables, ordered by table number
    /// then start (the host-stand day view).
    pub async fn bookings_for_date(&self, date: NaiveDate) -> Vec<Booking> {
        let keys: Vec<SheetKey> = self
            .sheets
            .iter()
            .filter(|e| e.key().1 == date)
            .map(|e| *e.key())
            .collect();
        let mut bookings = Vec::new();
        for key in keys {
            if let Some(sheet) = self.existing_sheet(&key) {
                bookings.extend(sheet.read().await.bookings.iter().cloned());
            }
        }
        bookings.sort_by(|a, b| {
            let num = |t: &Booking| {
                self.registry
                    .get(&t.table_id)
                    .map(|t| t.number)
                    .unwrap_or_default()
            };
            num(a).cmp(&num(b)).then(a.range.start.cmp(&b.range.start))
        });
        bookings
    }

    /// Bookings created by one user, newest date first.
    pub async fn bookings_for_user(&self, user: UserId) -> Vec<Booking> {
        let keys: Vec<SheetKey> = self.sheets.iter().map(|e| *e.key()).collect();
        let mut bookings = Vec::new();
        for key in keys {
            if let Some(sheet) = self.existing_sheet(&key) {
                bookings.extend(
                    sheet
                        .read()
                        .await
                        .bookings
                        .iter()
                        .filter(|b| b.created_by == Some(user))
                        .cloned(),
                );
            }
        }
        bookings.sort_by(|a, b| b.date.cmp(&a.date).then(a.range.start.cmp(&b.range.start)));
        bookings
    }

    pub async fn blocks_on(&self, table_id: TableId, date: NaiveDate) -> Vec<TableBlock> {
        match self.existing_sheet(&(table_id, date)) {
            Some(sheet) => sheet.read().await.blocks.clone(),
            None => Vec::new(),
        }
    }
}
