use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::Error;

pub(crate) fn validate_range(range: &TimeRange) -> Result<(), Error> {
    if range.start >= range.end {
        return Err(Error::Validation("range start must precede range end"));
    }
    Ok(())
}

pub(crate) fn validate_party(party_size: u32, seats: u32) -> Result<(), Error> {
    if party_size == 0 {
        return Err(Error::Validation("party size must be at least 1"));
    }
    if party_size > MAX_PARTY_SIZE {
        return Err(Error::LimitExceeded("party size"));
    }
    if party_size > seats {
        return Err(Error::Validation("party size exceeds table capacity"));
    }
    Ok(())
}

pub(crate) fn validate_guest(guest: &GuestInfo) -> Result<(), Error> {
    if guest.name.trim().is_empty() {
        return Err(Error::Validation("guest name is required"));
    }
    if guest.name.len() > MAX_NAME_LEN {
        return Err(Error::LimitExceeded("guest name too long"));
    }
    if guest.phone.len() > MAX_PHONE_LEN {
        return Err(Error::LimitExceeded("guest phone too long"));
    }
    if let Some(occasion) = &guest.occasion
        && occasion.len() > MAX_OCCASION_LEN
    {
        return Err(Error::LimitExceeded("occasion note too long"));
    }
    Ok(())
}

/// The write-path re-check, run while holding the (table, date) lock and the
/// sheet's write guard. `exclude` skips one booking id so a reschedule does
/// not conflict with itself.
pub(crate) fn first_conflict(
    sheet: &DaySheet,
    range: &TimeRange,
    exclude: Option<Ulid>,
) -> Option<Ulid> {
    if let Some(booking) = sheet
        .confirmed_overlapping(range)
        .find(|b| Some(b.id) != exclude)
    {
        return Some(booking.id);
    }
    sheet.blocks_overlapping(range).next().map(|b| b.id)
}
