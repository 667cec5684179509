// Recompute controller: filter change -> refilter -> reaggregate -> rescale -> redraw.
//
// Every event gets a generation number. Frames can be computed away from the
// controller (the HTTP server does it on a blocking worker) and are only
// committed when their generation is still the newest one issued, so whatever
// the last event asked for is what ends up drawn.

use crate::bike_models::{Station, StationTraffic, StationView};
use crate::registry::StationRegistry;
use crate::scale::{self, FlowQuantizer, RadiusScale};
use crate::time_filter::TimeFilter;
use crate::traffic::compute_station_traffic;
use crate::trip_log::TripLog;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "minute", rename_all = "snake_case")]
pub enum ControllerState {
    Unfiltered,
    Filtered(u16),
}

impl From<TimeFilter> for ControllerState {
    fn from(filter: TimeFilter) -> Self {
        match filter {
            TimeFilter::AnyTime => ControllerState::Unfiltered,
            TimeFilter::Minute(m) => ControllerState::Filtered(m),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrafficFrame {
    pub generation: u64,
    pub filter: TimeFilter,
    pub label: String,
    pub trip_count: usize,
    pub total_departures: u64,
    pub total_arrivals: u64,
    pub max_total: u32,
    pub radius_scale: RadiusScale,
    pub stations: Vec<StationView>,
}

impl TrafficFrame {
    pub fn station(&self, id: &str) -> Option<&StationView> {
        self.stations.iter().find(|s| s.id.as_str() == id)
    }
}

/// Receives every committed frame.
pub trait Renderer {
    fn redraw(&mut self, frame: Arc<TrafficFrame>);
}

/// Keeps the most recent frame for readers (the HTTP handlers).
#[derive(Debug, Default)]
pub struct LatestFrame {
    frame: Option<Arc<TrafficFrame>>,
}

impl LatestFrame {
    pub fn frame(&self) -> Option<Arc<TrafficFrame>> {
        self.frame.clone()
    }
}

impl Renderer for LatestFrame {
    fn redraw(&mut self, frame: Arc<TrafficFrame>) {
        self.frame = Some(frame);
    }
}

/// Immutable datasets plus the scale domain fixed from the unfiltered log.
#[derive(Debug)]
pub struct TrafficEngine {
    registry: StationRegistry,
    trips: TripLog,
    radius_scale: RadiusScale,
    flow: FlowQuantizer,
}

impl TrafficEngine {
    pub fn new(registry: StationRegistry, trips: TripLog) -> Self {
        let baseline = compute_station_traffic(registry.stations(), trips.trips());
        TrafficEngine {
            radius_scale: RadiusScale::new(baseline.max_total()),
            flow: FlowQuantizer::default(),
            registry,
            trips,
        }
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    pub fn trip_log(&self) -> &TripLog {
        &self.trips
    }

    pub fn radius_scale(&self) -> RadiusScale {
        self.radius_scale
    }

    pub fn flow(&self) -> &FlowQuantizer {
        &self.flow
    }

    /// Full recomputation over the whole trip log. Pure; safe off-thread.
    pub fn compute_frame(&self, filter: TimeFilter, generation: u64) -> TrafficFrame {
        let subset = self.trips.filter(filter);
        if subset.is_empty() {
            tracing::debug!("🕳️  No trips within the window of {}", filter.label());
        }
        let snapshot = compute_station_traffic(self.registry.stations(), subset.iter());
        let radius_scale = self.radius_scale.with_range(scale::radius_range_for(filter));

        let stations = self
            .registry
            .stations()
            .iter()
            .zip(snapshot.iter())
            .map(|(station, (_, traffic))| self.view(station, traffic, &radius_scale))
            .collect();

        TrafficFrame {
            generation,
            filter,
            label: filter.label(),
            trip_count: subset.len(),
            total_departures: snapshot.sum_departures(),
            total_arrivals: snapshot.sum_arrivals(),
            max_total: snapshot.max_total(),
            radius_scale,
            stations,
        }
    }

    fn view(
        &self,
        station: &Station,
        traffic: StationTraffic,
        radius_scale: &RadiusScale,
    ) -> StationView {
        StationView {
            id: station.id.clone(),
            name: station.name.clone(),
            longitude: station.longitude,
            latitude: station.latitude,
            arrivals: traffic.arrivals,
            departures: traffic.departures,
            total_traffic: traffic.total_traffic,
            radius: radius_scale.radius(traffic.total_traffic),
            departure_ratio: scale::departure_ratio(traffic),
            flow: self.flow.bucket_for(traffic).value(),
            tooltip: scale::tooltip(traffic),
        }
    }
}

/// Issued for one filter-selection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRequest {
    pub generation: u64,
    pub filter: TimeFilter,
}

pub struct RecomputeController<R: Renderer> {
    engine: Arc<TrafficEngine>,
    renderer: R,
    state: ControllerState,
    issued: u64,
}

impl<R: Renderer> RecomputeController<R> {
    /// Starts in the unfiltered state and draws the initial frame.
    pub fn new(engine: Arc<TrafficEngine>, renderer: R) -> Self {
        let mut controller = RecomputeController {
            engine,
            renderer,
            state: ControllerState::Unfiltered,
            issued: 0,
        };
        controller.transition(TimeFilter::AnyTime);
        controller
    }

    pub fn engine(&self) -> &Arc<TrafficEngine> {
        &self.engine
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn latest_generation(&self) -> u64 {
        self.issued
    }

    /// Registers a filter-selection event; any request issued earlier is now stale.
    pub fn begin(&mut self, filter: TimeFilter) -> FrameRequest {
        self.issued += 1;
        FrameRequest {
            generation: self.issued,
            filter,
        }
    }

    /// Draws `frame` if it answers the newest request. Stale frames are dropped.
    pub fn commit(&mut self, frame: TrafficFrame) -> Option<Arc<TrafficFrame>> {
        if frame.generation != self.issued {
            tracing::debug!(
                "⏭️  Discarding stale frame {} (latest is {})",
                frame.generation,
                self.issued
            );
            return None;
        }
        Some(self.accept(frame))
    }

    /// Synchronous transition: request, recompute and draw in one step.
    pub fn transition(&mut self, filter: TimeFilter) -> Arc<TrafficFrame> {
        let request = self.begin(filter);
        let frame = self.engine.compute_frame(request.filter, request.generation);
        self.accept(frame)
    }

    fn accept(&mut self, frame: TrafficFrame) -> Arc<TrafficFrame> {
        tracing::info!(
            "🔄 Frame {} ({}): {} stations from {} trips",
            frame.generation,
            if frame.label.is_empty() { "any time" } else { frame.label.as_str() },
            frame.stations.len(),
            frame.trip_count
        );
        self.state = frame.filter.into();
        let frame = Arc::new(frame);
        self.renderer.redraw(frame.clone());
        frame
    }
}
