// Per-station traffic aggregation.
//
// The result is a snapshot keyed by station id rather than counts written back
// onto the stations, so a frame never mixes counts from two filters.

use crate::bike_models::{Station, StationId, StationTraffic, Trip};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficSnapshot {
    order: Vec<StationId>,
    counts: HashMap<StationId, StationTraffic>,
}

impl TrafficSnapshot {
    pub fn get(&self, id: &StationId) -> StationTraffic {
        self.counts.get(id).copied().unwrap_or_default()
    }

    /// Counts in station order.
    pub fn iter(&self) -> impl Iterator<Item = (&StationId, StationTraffic)> + '_ {
        self.order.iter().map(|id| (id, self.get(id)))
    }

    pub fn max_total(&self) -> u32 {
        self.counts.values().map(|t| t.total_traffic).max().unwrap_or(0)
    }

    pub fn sum_arrivals(&self) -> u64 {
        self.counts.values().map(|t| u64::from(t.arrivals)).sum()
    }

    pub fn sum_departures(&self) -> u64 {
        self.counts.values().map(|t| u64::from(t.departures)).sum()
    }
}

/// Counts departures by start station and arrivals by end station.
///
/// Trips referencing stations outside `stations` count toward nothing.
/// Order of `trips` does not matter and nothing from a previous call is read.
pub fn compute_station_traffic<'a, I>(stations: &[Station], trips: I) -> TrafficSnapshot
where
    I: IntoIterator<Item = &'a Trip>,
{
    let mut departures: HashMap<&str, u32> = HashMap::new();
    let mut arrivals: HashMap<&str, u32> = HashMap::new();
    for trip in trips {
        *departures.entry(trip.start_station_id.as_str()).or_insert(0) += 1;
        *arrivals.entry(trip.end_station_id.as_str()).or_insert(0) += 1;
    }

    let mut snapshot = TrafficSnapshot {
        order: Vec::with_capacity(stations.len()),
        counts: HashMap::with_capacity(stations.len()),
    };

    for station in stations {
        let id = station.id.as_str();
        let traffic = if id.is_empty() {
            StationTraffic::default()
        } else {
            StationTraffic::new(
                arrivals.get(id).copied().unwrap_or(0),
                departures.get(id).copied().unwrap_or(0),
            )
        };
        snapshot.order.push(station.id.clone());
        snapshot.counts.insert(station.id.clone(), traffic);
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn station(id: &str) -> Station {
        Station {
            id: StationId::new(id),
            name: None,
            longitude: -71.09,
            latitude: 42.36,
        }
    }

    fn trip(start: &str, end: &str) -> Trip {
        let t = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        Trip {
            start_station_id: start.into(),
            end_station_id: end.into(),
            started_at: t,
            ended_at: t,
        }
    }

    #[test]
    fn counts_arrivals_and_departures() {
        let stations = vec![station("A"), station("B")];
        let trips = vec![trip("A", "B"), trip("B", "A"), trip("A", "A")];
        let snapshot = compute_station_traffic(&stations, &trips);

        assert_eq!(snapshot.get(&"A".into()), StationTraffic::new(2, 2));
        assert_eq!(snapshot.get(&"B".into()), StationTraffic::new(1, 1));
        assert_eq!(snapshot.max_total(), 4);
    }

    #[test]
    fn unknown_station_refs_count_nowhere() {
        let stations = vec![station("A"), station("B")];
        let trips = vec![trip("A", "Z"), trip("Z", "B"), trip("", ""), trip("Y", "Z")];
        let snapshot = compute_station_traffic(&stations, &trips);

        // Arrivals equal trips with a resolvable end; departures likewise for starts.
        assert_eq!(snapshot.sum_arrivals(), 1);
        assert_eq!(snapshot.sum_departures(), 1);
        assert_eq!(snapshot.get(&"A".into()), StationTraffic::new(0, 1));
        assert_eq!(snapshot.get(&"B".into()), StationTraffic::new(1, 0));
    }

    #[test]
    fn empty_id_station_contributes_zero() {
        let stations = vec![station(""), station("A")];
        let trips = vec![trip("", ""), trip("A", "")];
        let snapshot = compute_station_traffic(&stations, &trips);

        assert_eq!(snapshot.get(&"".into()), StationTraffic::default());
        assert_eq!(snapshot.get(&"A".into()), StationTraffic::new(0, 1));
    }

    #[test]
    fn idempotent_and_order_independent() {
        let stations = vec![station("A"), station("B"), station("C")];
        let mut trips = vec![trip("A", "B"), trip("B", "C"), trip("C", "A"), trip("A", "C")];

        let first = compute_station_traffic(&stations, &trips);
        let second = compute_station_traffic(&stations, &trips);
        assert_eq!(first, second);

        trips.reverse();
        let reversed = compute_station_traffic(&stations, &trips);
        for (id, traffic) in first.iter() {
            assert_eq!(reversed.get(id), traffic);
        }
    }

    #[test]
    fn stations_without_trips_are_zero() {
        let stations = vec![station("A")];
        let snapshot = compute_station_traffic(&stations, &Vec::<Trip>::new());

        assert_eq!(snapshot.get(&"A".into()), StationTraffic::default());
        assert_eq!(snapshot.max_total(), 0);
        assert_eq!(snapshot.iter().count(), 1);
    }
}
