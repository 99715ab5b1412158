use crate::model::*;

// ── Availability algebra ──────────────────────────────────────────
//
// Pure functions over a sheet snapshot. Nothing here is a correctness
// mechanism for double-booking prevention: results can be stale by the time
// a booking attempt runs, which is why the write path re-checks under the
// (table, date) lock.

/// Everything standing in the way of `range`: confirmed bookings first,
/// then admin blocks, ordered by start. Cancelled bookings never appear.
pub fn range_conflicts(sheet: &DaySheet, range: &TimeRange) -> Vec<SlotConflict> {
    let mut conflicts: Vec<SlotConflict> = sheet
        .confirmed_overlapping(range)
        .map(|b| SlotConflict {
            id: b.id,
            range: b.range,
            kind: ConflictKind::Booking,
            label: Some(b.guest.name.clone()),
        })
        .collect();
    conflicts.extend(sheet.blocks_overlapping(range).map(|b| SlotConflict {
        id: b.id,
        range: b.range,
        kind: ConflictKind::Block,
        label: b.reason.clone(),
    }));
    conflicts.sort_by_key(|c| c.range.start);
    conflicts
}

/// Free sub-windows of the day's bookable windows once confirmed bookings
/// and blocks are carved out. `windows` must be sorted by start (the
/// catalog guarantees this).
pub fn free_windows(windows: &[TimeRange], sheet: &DaySheet) -> Vec<TimeRange> {
    let mut busy: Vec<TimeRange> = sheet
        .bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Confirmed)
        .map(|b| b.range)
        .chain(sheet.blocks.iter().map(|b| b.range))
        .collect();
    busy.sort_by_key(|r| r.start);

    let open = merge_overlapping(windows);
    if busy.is_empty() {
        return open;
    }
    subtract_ranges(&open, &merge_overlapping(&busy))
}

/// Merge sorted overlapping/adjacent ranges into disjoint ranges.
pub fn merge_overlapping(sorted: &[TimeRange]) -> Vec<TimeRange> {
    let mut merged: Vec<TimeRange> = Vec::new();
    for &range in sorted {
        if let Some(last) = merged.last_mut()
            && range.start <= last.end
        {
            last.end = last.end.max(range.end);
            continue;
        }
        merged.push(range);
    }
    merged
}

/// Subtract `to_remove` from `base`. Both inputs sorted and disjoint.
pub fn subtract_ranges(base: &[TimeRange], to_remove: &[TimeRange]) -> Vec<TimeRange> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut cursor = b.start;
        let end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= cursor {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < end {
            let r = &to_remove[j];
            if r.start > cursor {
                result.push(TimeRange::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
            j += 1;
        }

        if cursor < end {
            result.push(TimeRange::new(cursor, end));
        }
    }

    result
}
