use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type TableId = Ulid;
pub type BookingId = Ulid;
pub type BlockId = Ulid;
pub type UserId = Ulid;

/// Half-open time-of-day window `[start, end)`. Never crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    /// Half-open overlap test: `[a, b)` and `[c, d)` intersect iff `a < d && c < b`.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableShape {
    Round,
    Rectangle,
    Booth,
}

/// A bookable table. `number` is the unique human-facing label; tables are
/// soft-deactivated, never removed, while bookings reference them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub number: String,
    pub name: Option<String>,
    pub seats: u32,
    pub shape: TableShape,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestInfo {
    pub name: String,
    pub phone: String,
    pub occasion: Option<String>,
}

/// Which channel created a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingSource {
    Web,
    Api,
    Phone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Guest,
    Admin,
}

/// Authenticated caller identity, supplied by the (external) auth layer.
/// The engine records it but does not re-validate credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user: Option<UserId>,
    pub role: Role,
}

impl Actor {
    pub fn guest() -> Self {
        Self { user: None, role: Role::Guest }
    }

    pub fn admin(user: UserId) -> Self {
        Self { user: Some(user), role: Role::Admin }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

/// A reservation of one table for one date and time window.
/// Lifecycle: created `Confirmed`, transitions once to `Cancelled`, never back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub table_id: TableId,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub guest: GuestInfo,
    pub party_size: u32,
    pub status: BookingStatus,
    pub source: BookingSource,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Admin-placed window during which a table cannot take new bookings.
/// Blocks do not cancel existing bookings; that needs an explicit admin action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBlock {
    pub id: BlockId,
    pub table_id: TableId,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub reason: Option<String>,
}

/// Operating hours for one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub closed: bool,
}

/// Input for `create_booking`. The range is either a catalog slot or a
/// custom window; the engine treats both identically.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub table_id: TableId,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub guest: GuestInfo,
    pub party_size: u32,
    pub source: BookingSource,
}

/// Serialization key for per-(table, date) mutual exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockKey {
    pub table_id: TableId,
    pub date: NaiveDate,
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.table_id, self.date)
    }
}

/// Identifies a sheet: one table on one calendar date.
pub type SheetKey = (TableId, NaiveDate);

/// All bookings and blocks for one table on one date, each list sorted by
/// `range.start`. This is the shared mutable resource the lock manager and
/// the day-sheet `RwLock` protect.
#[derive(Debug, Clone)]
pub struct DaySheet {
    pub table_id: TableId,
    pub date: NaiveDate,
    pub bookings: Vec<Booking>,
    pub blocks: Vec<TableBlock>,
}

impl DaySheet {
    pub fn new(table_id: TableId, date: NaiveDate) -> Self {
        Self {
            table_id,
            date,
            bookings: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Insert keeping sort order by range start. Refuses a `Confirmed`
    /// booking that overlaps an existing confirmed one; this is the storage
    /// guard behind the lock manager, not the primary conflict check.
    pub fn insert_booking(&mut self, booking: Booking) -> bool {
        if booking.status == BookingStatus::Confirmed
            && self
                .confirmed_overlapping(&booking.range)
                .any(|b| b.id != booking.id)
        {
            return false;
        }
        let pos = self
            .bookings
            .binary_search_by_key(&booking.range.start, |b| b.range.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
        true
    }

    pub fn insert_block(&mut self, block: TableBlock) {
        let pos = self
            .blocks
            .binary_search_by_key(&block.range.start, |b| b.range.start)
            .unwrap_or_else(|e| e);
        self.blocks.insert(pos, block);
    }

    pub fn remove_block(&mut self, id: BlockId) -> Option<TableBlock> {
        let pos = self.blocks.iter().position(|b| b.id == id)?;
        Some(self.blocks.remove(pos))
    }

    pub fn booking(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: BookingId) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Confirmed bookings whose range overlaps `query`. Binary search skips
    /// everything starting at or after `query.end`.
    pub fn confirmed_overlapping(&self, query: &TimeRange) -> impl Iterator<Item = &Booking> {
        let right = self
            .bookings
            .partition_point(|b| b.range.start < query.end);
        self.bookings[..right]
            .iter()
            .filter(move |b| b.status == BookingStatus::Confirmed && b.range.end > query.start)
    }

    /// Blocks whose range overlaps `query`.
    pub fn blocks_overlapping(&self, query: &TimeRange) -> impl Iterator<Item = &TableBlock> {
        let right = self.blocks.partition_point(|b| b.range.start < query.end);
        self.blocks[..right]
            .iter()
            .filter(move |b| b.range.end > query.start)
    }
}

/// Journal record format — flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TableRegistered {
        table: Table,
    },
    TableUpdated {
        id: TableId,
        name: Option<String>,
        seats: u32,
        shape: TableShape,
    },
    TableActiveSet {
        id: TableId,
        active: bool,
    },
    /// `weekday` is days from Monday (0..=6), matching the admin schema.
    HoursSet {
        weekday: u8,
        hours: DayHours,
    },
    SlotsSet {
        weekday: u8,
        slots: Vec<TimeRange>,
    },
    BlockAdded {
        block: TableBlock,
    },
    BlockRemoved {
        id: BlockId,
        table_id: TableId,
        date: NaiveDate,
    },
    BookingConfirmed {
        booking: Booking,
    },
    BookingCancelled {
        id: BookingId,
        table_id: TableId,
        date: NaiveDate,
    },
    BookingContactUpdated {
        id: BookingId,
        table_id: TableId,
        date: NaiveDate,
        guest: GuestInfo,
    },
    /// Administrative purge of every sheet dated strictly before `date`.
    PurgedBefore {
        date: NaiveDate,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    Booking,
    Block,
}

/// One entry standing in the way of a requested range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConflict {
    pub id: Ulid,
    pub range: TimeRange,
    pub kind: ConflictKind,
    pub label: Option<String>,
}

/// Availability verdict for one table, as consumed by the booking UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAvailability {
    pub table: Table,
    pub is_available: bool,
    pub conflicts: Vec<SlotConflict>,
}
