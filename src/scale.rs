// Visual scales applied per station by the map.

use crate::bike_models::StationTraffic;
use crate::time_filter::TimeFilter;
use serde::Serialize;

/// Marker radius range (px) when all trips are shown.
pub const UNFILTERED_RANGE: (f64, f64) = (2.0, 20.0);
/// Marker radius range (px) when a time filter is active; filtered views are sparser.
pub const FILTERED_RANGE: (f64, f64) = (5.0, 40.0);

pub fn radius_range_for(filter: TimeFilter) -> (f64, f64) {
    if filter.is_active() {
        FILTERED_RANGE
    } else {
        UNFILTERED_RANGE
    }
}

/// Square-root scale from `[0, domain_max]` onto a pixel range, so marker
/// area rather than radius grows with traffic.
///
/// The domain is fixed from the unfiltered data; only the range changes with
/// the filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RadiusScale {
    domain_max: u32,
    range: (f64, f64),
}

impl RadiusScale {
    /// A zero maximum (no trips at all) falls back to 1.
    pub fn new(domain_max: u32) -> Self {
        RadiusScale {
            domain_max: domain_max.max(1),
            range: UNFILTERED_RANGE,
        }
    }

    pub fn with_range(self, range: (f64, f64)) -> Self {
        RadiusScale { range, ..self }
    }

    pub fn domain_max(&self) -> u32 {
        self.domain_max
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    pub fn radius(&self, total_traffic: u32) -> f64 {
        let (r0, r1) = self.range;
        let t = (f64::from(total_traffic)).sqrt() / f64::from(self.domain_max).sqrt();
        r0 + (r1 - r0) * t
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowBucket {
    ArrivalHeavy,
    Balanced,
    DepartureHeavy,
}

impl FlowBucket {
    pub fn value(self) -> f64 {
        match self {
            FlowBucket::ArrivalHeavy => 0.0,
            FlowBucket::Balanced => 0.5,
            FlowBucket::DepartureHeavy => 1.0,
        }
    }
}

/// Share of a station's traffic that leaves it. Unused stations read as balanced.
pub fn departure_ratio(traffic: StationTraffic) -> f64 {
    if traffic.total_traffic > 0 {
        f64::from(traffic.departures) / f64::from(traffic.total_traffic)
    } else {
        0.5
    }
}

/// Quantizes `[0, 1]` into equal-width buckets; values outside clamp to the ends.
#[derive(Debug, Clone, Serialize)]
pub struct FlowQuantizer {
    buckets: Vec<FlowBucket>,
}

impl Default for FlowQuantizer {
    fn default() -> Self {
        FlowQuantizer {
            buckets: vec![
                FlowBucket::ArrivalHeavy,
                FlowBucket::Balanced,
                FlowBucket::DepartureHeavy,
            ],
        }
    }
}

impl FlowQuantizer {
    pub fn buckets(&self) -> &[FlowBucket] {
        &self.buckets
    }

    pub fn quantize(&self, ratio: f64) -> FlowBucket {
        let n = self.buckets.len();
        let slot = if ratio.is_nan() {
            n / 2
        } else {
            ((ratio.clamp(0.0, 1.0) * n as f64).floor() as usize).min(n - 1)
        };
        self.buckets[slot]
    }

    pub fn bucket_for(&self, traffic: StationTraffic) -> FlowBucket {
        self.quantize(departure_ratio(traffic))
    }
}

pub fn tooltip(traffic: StationTraffic) -> String {
    format!(
        "{} trips ({} departures, {} arrivals)",
        traffic.total_traffic, traffic.departures, traffic.arrivals
    )
}
