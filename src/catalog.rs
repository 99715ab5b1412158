use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};

use crate::engine::Error;
use crate::limits::*;
use crate::model::{DayHours, TimeRange};

/// Weekly schedule of bookable windows.
///
/// Each weekday carries its operating hours plus, optionally, an explicit
/// list of slot windows. Without an explicit list, slots are generated by
/// stepping `slot_minutes` from open to close. Admin writes validate; reads
/// never do.
#[derive(Debug, Clone)]
pub struct SlotCatalog {
    days: [Option<DayConfig>; 7],
    slot_minutes: u32,
}

#[derive(Debug, Clone)]
struct DayConfig {
    hours: DayHours,
    /// Empty means "derive from hours".
    slots: Vec<TimeRange>,
}

fn day_index(weekday: Weekday) -> usize {
    weekday.num_days_from_monday() as usize
}

/// Inverse of `num_days_from_monday`, for decoding journal records.
pub(crate) fn weekday_from_index(i: u8) -> Weekday {
    match i % 7 {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

impl SlotCatalog {
    pub fn new(slot_minutes: u32) -> Self {
        Self {
            days: [const { None }; 7],
            slot_minutes: slot_minutes.clamp(MIN_SLOT_MINUTES, MAX_SLOT_MINUTES),
        }
    }

    /// Ordered bookable windows for `date`. Fails with
    /// [`Error::Configuration`] when the weekday has no hours or is closed.
    pub fn list_slots(&self, date: NaiveDate) -> Result<Vec<TimeRange>, Error> {
        let weekday = date.weekday();
        let day = self.days[day_index(weekday)]
            .as_ref()
            .filter(|d| !d.hours.closed)
            .ok_or(Error::Configuration(weekday))?;
        if !day.slots.is_empty() {
            return Ok(day.slots.clone());
        }
        Ok(generate_slots(&day.hours, self.slot_minutes))
    }

    pub fn hours(&self, weekday: Weekday) -> Option<DayHours> {
        self.days[day_index(weekday)].as_ref().map(|d| d.hours)
    }

    /// Validate new operating hours without applying them. Existing explicit
    /// slots must still fit inside the new hours.
    pub fn check_hours(&self, weekday: Weekday, hours: DayHours) -> Result<(), Error> {
        if !hours.closed && hours.open >= hours.close {
            return Err(Error::Validation("opening time must precede closing time"));
        }
        if let Some(day) = &self.days[day_index(weekday)]
            && !hours.closed
        {
            let window = TimeRange::new(hours.open, hours.close);
            if day.slots.iter().any(|s| !window.contains(s)) {
                return Err(Error::Validation("existing slots fall outside new hours"));
            }
        }
        Ok(())
    }

    /// Validate explicit slot windows without applying them: sorted, pairwise
    /// non-overlapping (contiguous or gapped both fine), inside hours.
    /// Overlap is rejected here, at admin-write time, never at read time.
    pub fn check_slots(&self, weekday: Weekday, slots: &[TimeRange]) -> Result<(), Error> {
        if slots.len() > MAX_SLOTS_PER_DAY {
            return Err(Error::LimitExceeded("too many slots for one day"));
        }
        let day = self.days[day_index(weekday)]
            .as_ref()
            .ok_or(Error::Configuration(weekday))?;
        if day.hours.closed {
            return Err(Error::Configuration(weekday));
        }
        let window = TimeRange::new(day.hours.open, day.hours.close);
        for slot in slots {
            if slot.start >= slot.end {
                return Err(Error::Validation("slot start must precede slot end"));
            }
            if !window.contains(slot) {
                return Err(Error::Validation("slot outside operating hours"));
            }
        }
        for pair in slots.windows(2) {
            if pair[1].start < pair[0].start {
                return Err(Error::Validation("slots must be sorted by start"));
            }
            if pair[0].overlaps(&pair[1]) {
                return Err(Error::Validation("slots must not overlap"));
            }
        }
        Ok(())
    }

    pub fn set_hours(&mut self, weekday: Weekday, hours: DayHours) -> Result<(), Error> {
        self.check_hours(weekday, hours)?;
        self.apply_hours(weekday, hours);
        Ok(())
    }

    pub fn set_slots(&mut self, weekday: Weekday, slots: Vec<TimeRange>) -> Result<(), Error> {
        self.check_slots(weekday, &slots)?;
        self.apply_slots(weekday, slots);
        Ok(())
    }

    /// Journal-replay path: trusts the event, skips validation.
    pub fn apply_hours(&mut self, weekday: Weekday, hours: DayHours) {
        let slot = &mut self.days[day_index(weekday)];
        match slot {
            Some(day) => day.hours = hours,
            None => *slot = Some(DayConfig { hours, slots: Vec::new() }),
        }
    }

    /// Journal-replay path: trusts the event, skips validation.
    pub fn apply_slots(&mut self, weekday: Weekday, slots: Vec<TimeRange>) {
        if let Some(day) = &mut self.days[day_index(weekday)] {
            day.slots = slots;
        }
    }

    /// Emit the events that recreate this catalog (journal compaction).
    pub fn snapshot_events(&self) -> Vec<crate::model::Event> {
        let mut events = Vec::new();
        for (i, day) in self.days.iter().enumerate() {
            if let Some(day) = day {
                events.push(crate::model::Event::HoursSet {
                    weekday: i as u8,
                    hours: day.hours,
                });
                if !day.slots.is_empty() {
                    events.push(crate::model::Event::SlotsSet {
                        weekday: i as u8,
                        slots: day.slots.clone(),
                    });
                }
            }
        }
        events
    }
}

/// Step `minutes`-wide windows from open to close; a trailing partial
/// window is dropped.
pub fn generate_slots(hours: &DayHours, minutes: u32) -> Vec<TimeRange> {
    let open = minutes_of_day(hours.open);
    let close = minutes_of_day(hours.close);
    let mut slots = Vec::new();
    let mut start = open;
    while start + minutes <= close {
        slots.push(TimeRange::new(
            time_of_minutes(start),
            time_of_minutes(start + minutes),
        ));
        start += minutes;
    }
    slots
}

fn minutes_of_day(t: NaiveTime) -> u32 {
    use chrono::Timelike;
    t.hour() * 60 + t.minute()
}

fn time_of_minutes(m: u32) -> NaiveTime {
    NaiveTime::from_num_seconds_from_midnight_opt(m * 60, 0)
        .expect("slot arithmetic stays within one day")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn hours(open: (u32, u32), close: (u32, u32)) -> DayHours {
        DayHours {
            open: t(open.0, open.1),
            close: t(close.0, close.1),
            closed: false,
        }
    }

    // 2024-01-01 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn unconfigured_weekday_is_a_configuration_error() {
        let catalog = SlotCatalog::new(60);
        match catalog.list_slots(monday()) {
            Err(Error::Configuration(weekday)) => assert_eq!(weekday, Weekday::Mon),
            other => panic!("expected Configuration error, got {other:?}"),
        }
    }

    #[test]
    fn closed_weekday_is_a_configuration_error() {
        let mut catalog = SlotCatalog::new(60);
        catalog
            .set_hours(
                Weekday::Mon,
                DayHours { open: t(0, 0), close: t(0, 0), closed: true },
            )
            .unwrap();
        assert!(matches!(
            catalog.list_slots(monday()),
            Err(Error::Configuration(Weekday::Mon))
        ));
    }

    #[test]
    fn generated_slots_step_through_hours() {
        let mut catalog = SlotCatalog::new(90);
        catalog.set_hours(Weekday::Mon, hours((18, 0), (23, 0))).unwrap();
        let slots = catalog.list_slots(monday()).unwrap();
        // 18:00-19:30, 19:30-21:00, 21:00-22:30; 22:30-24:00 does not fit.
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0], TimeRange::new(t(18, 0), t(19, 30)));
        assert_eq!(slots[2], TimeRange::new(t(21, 0), t(22, 30)));
    }

    #[test]
    fn explicit_slots_override_generation() {
        let mut catalog = SlotCatalog::new(60);
        catalog.set_hours(Weekday::Mon, hours((17, 0), (23, 0))).unwrap();
        let lunch_sittings = vec![
            TimeRange::new(t(17, 30), t(19, 0)),
            TimeRange::new(t(19, 30), t(21, 0)), // deliberate gap for turnover
        ];
        catalog.set_slots(Weekday::Mon, lunch_sittings.clone()).unwrap();
        assert_eq!(catalog.list_slots(monday()).unwrap(), lunch_sittings);
    }

    #[test]
    fn overlapping_slots_rejected_at_write_time() {
        let mut catalog = SlotCatalog::new(60);
        catalog.set_hours(Weekday::Mon, hours((17, 0), (23, 0))).unwrap();
        let result = catalog.set_slots(
            Weekday::Mon,
            vec![
                TimeRange::new(t(18, 0), t(19, 30)),
                TimeRange::new(t(19, 0), t(20, 0)),
            ],
        );
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn contiguous_slots_are_fine() {
        let mut catalog = SlotCatalog::new(60);
        catalog.set_hours(Weekday::Mon, hours((18, 0), (22, 0))).unwrap();
        catalog
            .set_slots(
                Weekday::Mon,
                vec![
                    TimeRange::new(t(18, 0), t(19, 0)),
                    TimeRange::new(t(19, 0), t(20, 0)),
                ],
            )
            .unwrap();
    }

    #[test]
    fn slots_outside_hours_rejected() {
        let mut catalog = SlotCatalog::new(60);
        catalog.set_hours(Weekday::Mon, hours((18, 0), (22, 0))).unwrap();
        let result = catalog.set_slots(
            Weekday::Mon,
            vec![TimeRange::new(t(17, 0), t(18, 30))],
        );
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn inverted_hours_rejected() {
        let mut catalog = SlotCatalog::new(60);
        let result = catalog.set_hours(Weekday::Mon, hours((22, 0), (18, 0)));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn shrinking_hours_under_existing_slots_rejected() {
        let mut catalog = SlotCatalog::new(60);
        catalog.set_hours(Weekday::Mon, hours((17, 0), (23, 0))).unwrap();
        catalog
            .set_slots(Weekday::Mon, vec![TimeRange::new(t(20, 0), t(22, 0))])
            .unwrap();
        let result = catalog.set_hours(Weekday::Mon, hours((17, 0), (21, 0)));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn snapshot_events_recreate_catalog() {
        let mut catalog = SlotCatalog::new(60);
        catalog.set_hours(Weekday::Fri, hours((18, 0), (23, 0))).unwrap();
        catalog
            .set_slots(Weekday::Fri, vec![TimeRange::new(t(18, 0), t(20, 0))])
            .unwrap();

        let mut rebuilt = SlotCatalog::new(60);
        for event in catalog.snapshot_events() {
            match event {
                crate::model::Event::HoursSet { weekday, hours } => {
                    rebuilt.apply_hours(weekday_from_index(weekday), hours);
                }
                crate::model::Event::SlotsSet { weekday, slots } => {
                    rebuilt.apply_slots(weekday_from_index(weekday), slots);
                }
                other => panic!("unexpected snapshot event {other:?}"),
            }
        }
        let friday = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(
            rebuilt.list_slots(friday).unwrap(),
            catalog.list_slots(friday).unwrap()
        );
    }
}
