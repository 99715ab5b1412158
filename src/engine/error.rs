use chrono::Weekday;
use ulid::Ulid;

use crate::model::{BlockId, BookingId, LockKey, TableId};

/// Error taxonomy for the booking core. The HTTP collaborator maps these to
/// status codes: `Validation` → 400, `TableNotFound`/`BookingNotFound` → 404,
/// `SlotUnavailable`/`AlreadyCancelled` → 409, `LockTimeout` → 503/409,
/// `Configuration` → 422, the rest → 500.
#[derive(Debug)]
pub enum Error {
    /// Bad input shape: party size over capacity, inactive table, inverted
    /// range, oversized field.
    Validation(&'static str),
    TableNotFound(TableId),
    BookingNotFound(BookingId),
    BlockNotFound(BlockId),
    /// Lost the race: the table was booked (or blocked) for an overlapping
    /// range after the caller last saw availability. Retry needs a fresh
    /// availability read, not a blind resubmit.
    SlotUnavailable {
        table_id: TableId,
        conflict: Ulid,
    },
    /// Could not serialize the booking attempt within the timeout. Retryable
    /// as-is.
    LockTimeout(LockKey),
    /// No operating hours configured for the requested weekday.
    Configuration(Weekday),
    AlreadyCancelled(BookingId),
    LimitExceeded(&'static str),
    Journal(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "validation failed: {msg}"),
            Error::TableNotFound(id) => write!(f, "table not found: {id}"),
            Error::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            Error::BlockNotFound(id) => write!(f, "table block not found: {id}"),
            Error::SlotUnavailable { table_id, conflict } => write!(
                f,
                "table {table_id} was just booked (conflict with {conflict}); pick another slot"
            ),
            Error::LockTimeout(key) => {
                write!(f, "could not serialize booking attempt for {key}; try again")
            }
            Error::Configuration(weekday) => {
                write!(f, "no operating hours configured for {weekday}")
            }
            Error::AlreadyCancelled(id) => write!(f, "booking already cancelled: {id}"),
            Error::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            Error::Journal(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for Error {}
