// Station registry: normalizes the raw station feed into validated stations.
//
// Feeds spell the same field several ways depending on the export. Each field
// has an ordered synonym list; the first present (non-null) synonym is the
// value used, and it is never consulted again after ingestion.

use crate::bike_models::{BikeError, Result, Station, StationId};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

const LONGITUDE_FIELDS: &[&str] = &["Long", "long", "lon", "Lon", "LONG"];
const LATITUDE_FIELDS: &[&str] = &["Lat", "lat", "latitude", "Latitude", "LAT"];
const ID_FIELDS: &[&str] = &["short_name", "Number", "number"];
const NAME_FIELDS: &[&str] = &["name", "Name", "NAME"];

/// Counts of what happened to the raw records during ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub raw_records: usize,
    pub kept: usize,
    pub invalid_coordinates: usize,
    pub missing_id: usize,
    pub duplicate_id: usize,
}

impl IngestReport {
    pub fn rejected(&self) -> usize {
        self.invalid_coordinates + self.missing_id + self.duplicate_id
    }
}

#[derive(Debug, Clone)]
pub struct StationRegistry {
    stations: Vec<Station>,
    report: IngestReport,
}

impl StationRegistry {
    /// Builds the registry from the feed document (`{"data": {"stations": [...]}}`).
    pub fn from_feed(feed: &Value) -> Result<Self> {
        let records = feed["data"]["stations"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        Self::from_records(records)
    }

    /// Normalizes raw records. Bad records are dropped; an empty result is fatal.
    pub fn from_records(records: &[Value]) -> Result<Self> {
        let mut report = IngestReport {
            raw_records: records.len(),
            ..IngestReport::default()
        };
        let mut seen = HashSet::new();
        let mut stations = Vec::with_capacity(records.len());

        for record in records {
            let Some(fields) = record.as_object() else {
                report.invalid_coordinates += 1;
                continue;
            };

            let (Some(longitude), Some(latitude)) = (
                coerce_coordinate(first_present(fields, LONGITUDE_FIELDS)),
                coerce_coordinate(first_present(fields, LATITUDE_FIELDS)),
            ) else {
                report.invalid_coordinates += 1;
                continue;
            };

            let Some(id) = resolve_id(fields) else {
                report.missing_id += 1;
                continue;
            };

            if !seen.insert(id.clone()) {
                report.duplicate_id += 1;
                continue;
            }

            let name = first_present(fields, NAME_FIELDS)
                .and_then(Value::as_str)
                .map(String::from);

            stations.push(Station {
                id,
                name,
                longitude,
                latitude,
            });
        }

        report.kept = stations.len();

        if stations.is_empty() {
            return Err(BikeError::NoValidStations(report.rejected()));
        }

        Ok(StationRegistry { stations, report })
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn report(&self) -> &IngestReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id.as_str() == id)
    }
}

fn first_present<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| fields.get(*name))
        .find(|value| !value.is_null())
}

/// Accepts JSON numbers and strings that parse as a finite number after
/// trimming. Unlike JavaScript's `Number(..)`, empty or blank strings, booleans
/// and hex literals such as `"0x1F"` are not coerced, so the record is dropped
/// instead of landing at 0 or a surprising value.
fn coerce_coordinate(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn resolve_id(fields: &Map<String, Value>) -> Option<StationId> {
    let id = match first_present(fields, ID_FIELDS)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then(|| StationId::new(id))
}
