// Time-of-day filtering of the trip log.
//
// A trip matches a filter minute when its start or its end minute lies within
// WINDOW_MINUTES of it. The distance is a plain subtraction on minutes since
// midnight: 23:50 and 00:05 are 1425 minutes apart, not 15.

use crate::bike_models::{BikeError, Result, Trip};
use chrono::NaiveTime;
use serde::{Serialize, Serializer};

pub const WINDOW_MINUTES: u16 = 60;
pub const MINUTES_PER_DAY: u16 = 1440;

/// Value the slider emits for "any time".
pub const ANY_TIME_SENTINEL: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFilter {
    #[default]
    AnyTime,
    Minute(u16),
}

impl TimeFilter {
    /// Decodes a slider value: `-1` is "any time", `0..=1439` a minute of the day.
    pub fn from_slider(value: i32) -> Result<Self> {
        match value {
            ANY_TIME_SENTINEL => Ok(TimeFilter::AnyTime),
            v if (0..MINUTES_PER_DAY as i32).contains(&v) => Ok(TimeFilter::Minute(v as u16)),
            v => Err(BikeError::InvalidFilter(v)),
        }
    }

    pub fn to_slider(self) -> i32 {
        match self {
            TimeFilter::AnyTime => ANY_TIME_SENTINEL,
            TimeFilter::Minute(m) => m as i32,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, TimeFilter::Minute(_))
    }

    /// 12-hour clock label for the filter minute, empty for "any time".
    pub fn label(self) -> String {
        match self {
            TimeFilter::AnyTime => String::new(),
            TimeFilter::Minute(m) => format_time(m),
        }
    }
}

impl Serialize for TimeFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.to_slider())
    }
}

/// Formats a minute of the day like `1:30 AM`.
pub fn format_time(minute: u16) -> String {
    let minute = u32::from(minute % MINUTES_PER_DAY);
    NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)
        .map(|t| t.format("%-I:%M %p").to_string())
        .unwrap_or_default()
}

pub fn within_window(trip_minute: u16, filter_minute: u16) -> bool {
    trip_minute.abs_diff(filter_minute) <= WINDOW_MINUTES
}

pub fn matches_filter(trip: &Trip, filter_minute: u16) -> bool {
    within_window(trip.start_minute(), filter_minute) || within_window(trip.end_minute(), filter_minute)
}

/// Trips selected by a filter. "Any time" borrows the whole log untouched.
#[derive(Debug, Clone)]
pub enum TripSubset<'a> {
    All(&'a [Trip]),
    Selected(Vec<&'a Trip>),
}

impl<'a> TripSubset<'a> {
    pub fn len(&self) -> usize {
        match self {
            TripSubset::All(trips) => trips.len(),
            TripSubset::Selected(trips) => trips.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &'a Trip> + '_> {
        match self {
            TripSubset::All(trips) => Box::new(trips.iter()),
            TripSubset::Selected(trips) => Box::new(trips.iter().copied()),
        }
    }
}

/// Linear scan over the whole log. Reference for `MinuteIndex::select`.
#[cfg(test)]
pub fn filter_trips(trips: &[Trip], filter: TimeFilter) -> TripSubset<'_> {
    match filter {
        TimeFilter::AnyTime => TripSubset::All(trips),
        TimeFilter::Minute(m) => {
            TripSubset::Selected(trips.iter().filter(|t| matches_filter(t, m)).collect())
        }
    }
}

/// Trip indices filed by start minute and by end minute, built once at load.
///
/// A filter becomes a union over the 121 buckets around the minute instead of
/// a scan of the log. Every hit is still checked with `matches_filter`, and the
/// union is sorted, so the subset keeps log order and equals a full scan.
#[derive(Debug, Clone)]
pub struct MinuteIndex {
    buckets: Vec<Vec<u32>>,
}

impl MinuteIndex {
    pub fn build(trips: &[Trip]) -> Self {
        let mut buckets = vec![Vec::new(); MINUTES_PER_DAY as usize];
        for (idx, trip) in trips.iter().enumerate() {
            let idx = idx as u32;
            let (start, end) = (trip.start_minute(), trip.end_minute());
            buckets[start as usize].push(idx);
            if end != start {
                buckets[end as usize].push(idx);
            }
        }
        MinuteIndex { buckets }
    }

    pub fn select<'a>(&self, trips: &'a [Trip], filter: TimeFilter) -> TripSubset<'a> {
        let minute = match filter {
            TimeFilter::AnyTime => return TripSubset::All(trips),
            TimeFilter::Minute(m) => m,
        };

        // A minute past the end of the day can leave the window empty.
        let lo = minute.saturating_sub(WINDOW_MINUTES) as usize;
        let hi = minute.saturating_add(WINDOW_MINUTES).min(MINUTES_PER_DAY - 1) as usize;
        let Some(window) = self.buckets.get(lo..=hi) else {
            return TripSubset::Selected(Vec::new());
        };

        let mut indices: Vec<u32> = window.iter().flatten().copied().collect();
        indices.sort_unstable();
        indices.dedup();

        TripSubset::Selected(
            indices
                .into_iter()
                .filter_map(|i| trips.get(i as usize))
                .filter(|trip| matches_filter(trip, minute))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(minute: u16) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(u32::from(minute / 60), u32::from(minute % 60), 0)
            .unwrap()
    }

    fn trip(start: u16, end: u16) -> Trip {
        Trip {
            start_station_id: "A".into(),
            end_station_id: "B".into(),
            started_at: at(start),
            ended_at: at(end),
        }
    }

    fn starts(subset: &TripSubset) -> Vec<u16> {
        subset.iter().map(Trip::start_minute).collect()
    }

    #[test]
    fn any_time_is_identity() {
        let trips = vec![trip(600, 610), trip(30, 45), trip(1400, 1410)];
        let subset = filter_trips(&trips, TimeFilter::AnyTime);

        match &subset {
            TripSubset::All(all) => assert!(std::ptr::eq(*all, trips.as_slice())),
            TripSubset::Selected(_) => panic!("any time must borrow the log"),
        }
        assert_eq!(starts(&subset), vec![600, 30, 1400]);
    }

    #[test]
    fn window_includes_nearby_starts() {
        let trips = vec![trip(530, 540), trip(545, 550), trip(360, 380)];
        let subset = filter_trips(&trips, TimeFilter::Minute(570));

        assert_eq!(starts(&subset), vec![530, 545]);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let trips = vec![trip(510, 511), trip(509, 509), trip(630, 631), trip(631, 632)];
        let subset = filter_trips(&trips, TimeFilter::Minute(570));

        assert_eq!(starts(&subset), vec![510, 630]);
    }

    #[test]
    fn end_minute_alone_can_match() {
        let trips = vec![trip(300, 520)];
        assert_eq!(filter_trips(&trips, TimeFilter::Minute(570)).len(), 1);
    }

    #[test]
    fn distance_does_not_wrap_midnight() {
        let trips = vec![trip(1430, 1435)];
        assert!(filter_trips(&trips, TimeFilter::Minute(5)).is_empty());

        let late = vec![trip(1425, 1425)];
        assert!(filter_trips(&late, TimeFilter::Minute(15)).is_empty());
    }

    #[test]
    fn index_matches_scan() {
        let trips: Vec<Trip> = (0..400u16)
            .map(|i| {
                let start = (i * 37) % MINUTES_PER_DAY;
                let end = (start + (i % 90) * 3) % MINUTES_PER_DAY;
                trip(start, end)
            })
            .collect();
        let index = MinuteIndex::build(&trips);

        for minute in [0u16, 5, 59, 60, 61, 480, 570, 719, 1379, 1380, 1439] {
            let filter = TimeFilter::Minute(minute);
            let scanned: Vec<*const Trip> = filter_trips(&trips, filter).iter().map(|t| t as *const Trip).collect();
            let indexed: Vec<*const Trip> = index.select(&trips, filter).iter().map(|t| t as *const Trip).collect();
            assert_eq!(scanned, indexed, "minute {}", minute);
        }

        assert_eq!(index.select(&trips, TimeFilter::AnyTime).len(), trips.len());
    }

    #[test]
    fn index_counts_trip_once_when_start_and_end_both_match() {
        let trips = vec![trip(560, 580)];
        let index = MinuteIndex::build(&trips);
        assert_eq!(index.select(&trips, TimeFilter::Minute(570)).len(), 1);
    }

    #[test]
    fn index_handles_minutes_past_end_of_day() {
        let trips = vec![trip(1400, 1439), trip(600, 610)];
        let index = MinuteIndex::build(&trips);

        for minute in [1440u16, 1460, 1499, 1500, 1501, 1600, u16::MAX] {
            let filter = TimeFilter::Minute(minute);
            assert_eq!(
                index.select(&trips, filter).len(),
                filter_trips(&trips, filter).len(),
                "minute {}",
                minute
            );
        }
        assert_eq!(index.select(&trips, TimeFilter::Minute(1460)).len(), 1);
        assert!(index.select(&[], TimeFilter::Minute(1600)).is_empty());
    }

    #[test]
    fn slider_decoding() {
        assert_eq!(TimeFilter::from_slider(-1).unwrap(), TimeFilter::AnyTime);
        assert_eq!(TimeFilter::from_slider(0).unwrap(), TimeFilter::Minute(0));
        assert_eq!(TimeFilter::from_slider(1439).unwrap(), TimeFilter::Minute(1439));
        assert!(matches!(TimeFilter::from_slider(1440), Err(BikeError::InvalidFilter(1440))));
        assert!(TimeFilter::from_slider(-2).is_err());
        assert_eq!(TimeFilter::Minute(90).to_slider(), 90);
    }

    #[test]
    fn time_labels() {
        assert_eq!(format_time(90), "1:30 AM");
        assert_eq!(format_time(0), "12:00 AM");
        assert_eq!(format_time(720), "12:00 PM");
        assert_eq!(format_time(1439), "11:59 PM");
        assert_eq!(TimeFilter::Minute(570).label(), "9:30 AM");
        assert_eq!(TimeFilter::AnyTime.label(), "");
    }
}
