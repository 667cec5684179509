// Trip log: parses the monthly trip export into validated trips.
//
// Only the station references and the two timestamps are read; the export's
// other columns (ride_id, rideable_type, member_casual, ...) are ignored.

use crate::bike_models::{BikeError, Result, Trip};
use crate::time_filter::{MinuteIndex, TimeFilter, TripSubset};
use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::io::Read;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Deserialize)]
struct TripRow {
    started_at: String,
    ended_at: String,
    start_station_id: Option<String>,
    end_station_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TripIngestReport {
    pub rows: usize,
    pub kept: usize,
    pub invalid_timestamps: usize,
}

#[derive(Debug, Clone)]
pub struct TripLog {
    trips: Vec<Trip>,
    index: MinuteIndex,
    report: TripIngestReport,
}

impl TripLog {
    /// Reads a trip CSV. Rows whose timestamps do not parse are dropped and
    /// counted; a structurally broken CSV is a source failure.
    pub fn from_csv<R: Read>(reader: R, tz: Tz) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut report = TripIngestReport::default();
        let mut trips = Vec::new();

        for result in csv_reader.deserialize::<TripRow>() {
            let row = result.map_err(|e| BikeError::ParseError(format!("Invalid trip row: {}", e)))?;
            report.rows += 1;

            let (Some(started_at), Some(ended_at)) = (
                parse_timestamp(&row.started_at, tz),
                parse_timestamp(&row.ended_at, tz),
            ) else {
                report.invalid_timestamps += 1;
                continue;
            };

            trips.push(Trip {
                start_station_id: normalize_station_ref(row.start_station_id),
                end_station_id: normalize_station_ref(row.end_station_id),
                started_at,
                ended_at,
            });
        }

        report.kept = trips.len();
        let mut log = Self::from_trips(trips);
        log.report = report;
        Ok(log)
    }

    pub fn from_trips(trips: Vec<Trip>) -> Self {
        let index = MinuteIndex::build(&trips);
        let report = TripIngestReport {
            rows: trips.len(),
            kept: trips.len(),
            invalid_timestamps: 0,
        };
        TripLog { trips, index, report }
    }

    pub fn trips(&self) -> &[Trip] {
        &self.trips
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn report(&self) -> &TripIngestReport {
        &self.report
    }

    /// Always filters the full log; filters never stack.
    pub fn filter(&self, filter: TimeFilter) -> TripSubset<'_> {
        self.index.select(&self.trips, filter)
    }
}

fn normalize_station_ref(raw: Option<String>) -> String {
    raw.map(|s| s.trim().to_string()).unwrap_or_default()
}

/// Parses an export timestamp into wall-clock time.
///
/// Naive timestamps are taken as local already. Timestamps carrying an offset
/// are converted into `tz` first so their time of day matches the map's clock.
pub fn parse_timestamp(raw: &str, tz: Tz) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&tz).naive_local())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::America::New_York;

    const SAMPLE: &str = "\
ride_id,rideable_type,started_at,ended_at,start_station_name,start_station_id,end_station_name,end_station_id,member_casual
r1,classic_bike,2024-03-01 08:00:12.345,2024-03-01 08:14:00.000,Kendall T,M32004,MIT Mass Ave,M32042,member
r2,electric_bike,2024-03-01 08:10:00,2024-03-01 08:20:00,MIT Mass Ave,M32042,,,casual
r3,classic_bike,yesterday,2024-03-01 09:00:00,Kendall T,M32004,Kendall T,M32004,member
";

    #[test]
    fn parses_export_rows() {
        let log = TripLog::from_csv(SAMPLE.as_bytes(), New_York).unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(
            log.report(),
            &TripIngestReport { rows: 3, kept: 2, invalid_timestamps: 1 }
        );

        let first = &log.trips()[0];
        assert_eq!(first.start_station_id, "M32004");
        assert_eq!(first.end_station_id, "M32042");
        assert_eq!(first.start_minute(), 480);
        assert_eq!(first.end_minute(), 494);

        // Missing end station survives as an unresolvable reference.
        assert_eq!(log.trips()[1].end_station_id, "");
    }

    #[test]
    fn offset_timestamps_use_configured_zone() {
        let t = parse_timestamp("2024-03-01T13:30:00Z", New_York).unwrap();
        assert_eq!((t.hour(), t.minute()), (8, 30));

        let naive = parse_timestamp("2024-03-01T13:30:00", New_York).unwrap();
        assert_eq!((naive.hour(), naive.minute()), (13, 30));

        assert_eq!(parse_timestamp("2024-03-01 07:05", New_York).unwrap().minute(), 5);
        assert!(parse_timestamp("not a time", New_York).is_none());
    }

    #[test]
    fn filter_runs_against_full_log() {
        let log = TripLog::from_csv(SAMPLE.as_bytes(), New_York).unwrap();

        assert_eq!(log.filter(TimeFilter::Minute(480)).len(), 2);
        assert_eq!(log.filter(TimeFilter::Minute(1200)).len(), 0);
        // A second filter is not narrowed by the first.
        assert_eq!(log.filter(TimeFilter::Minute(540)).len(), 2);
        assert_eq!(log.filter(TimeFilter::AnyTime).len(), 2);
    }

    #[test]
    fn missing_required_column_is_a_source_failure() {
        let broken = "start_station_id,end_station_id\nA,B\n";
        assert!(matches!(
            TripLog::from_csv(broken.as_bytes(), New_York),
            Err(BikeError::ParseError(_))
        ));
    }
}
