// Bluebikes traffic API server
// Serves per-station trip counts, marker scales and time-of-day filtering to the map frontend.

use actix_cors::Cors;
use actix_files as fs;
use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, middleware, web};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::EnvFilter;

mod bike_models;
mod config;
mod controller;
mod registry;
mod scale;
mod sources;
mod time_filter;
mod traffic;
mod trip_log;

use bike_models::BikeError;
use controller::{ControllerState, LatestFrame, RecomputeController, TrafficEngine, TrafficFrame};
use registry::IngestReport;
use scale::FlowBucket;
use sources::DataSources;
use time_filter::TimeFilter;
use trip_log::TripIngestReport;

type Controller = RecomputeController<LatestFrame>;

#[derive(Clone)]
struct AppState {
    controller: Arc<Mutex<Controller>>,
    engine: Arc<TrafficEngine>,
}

impl AppState {
    fn new(engine: TrafficEngine) -> Self {
        let engine = Arc::new(engine);
        AppState {
            controller: Arc::new(Mutex::new(RecomputeController::new(
                engine.clone(),
                LatestFrame::default(),
            ))),
            engine,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Controller>, HttpResponse> {
        self.controller.lock().map_err(|e| {
            tracing::error!("❌ Failed to lock controller: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Controller unavailable".to_string()))
        })
    }

    fn latest_frame(&self) -> Result<Arc<TrafficFrame>, HttpResponse> {
        self.lock()?.renderer().frame().ok_or_else(|| {
            HttpResponse::ServiceUnavailable()
                .json(ApiResponse::<()>::error("Frame not yet available".to_string()))
        })
    }
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    timestamp: i64,
    sources: Vec<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().timestamp(),
            sources: vec!["Bluebikes".to_string()],
        }
    }

    fn error(message: String) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().timestamp(),
            sources: vec![],
        }
    }
}

#[derive(Deserialize)]
struct FilterRequest {
    minute: i32,
}

#[derive(Serialize)]
struct ScaleInfo {
    domain_max: u32,
    current_range: (f64, f64),
    unfiltered_range: (f64, f64),
    filtered_range: (f64, f64),
    flow_buckets: Vec<FlowBucketInfo>,
    window_minutes: u16,
}

#[derive(Serialize)]
struct FlowBucketInfo {
    bucket: FlowBucket,
    value: f64,
}

#[derive(Serialize)]
struct StatsInfo<'a> {
    stations: &'a IngestReport,
    trips: &'a TripIngestReport,
    state: ControllerState,
    generation: u64,
    label: String,
    filtered_trips: usize,
}

// ============================================================================
// API Endpoints
// ============================================================================

async fn get_frame(state: web::Data<AppState>) -> HttpResponse {
    match state.latest_frame() {
        Ok(frame) => {
            tracing::debug!("🗺️  Frame {} requested", frame.generation);
            HttpResponse::Ok().json(ApiResponse::success(frame.as_ref()))
        }
        Err(response) => response,
    }
}

async fn get_stations(state: web::Data<AppState>) -> HttpResponse {
    match state.latest_frame() {
        Ok(frame) => {
            tracing::debug!("📍 Stations requested: {} total", frame.stations.len());
            HttpResponse::Ok().json(ApiResponse::success(&frame.stations))
        }
        Err(response) => response,
    }
}

async fn get_station_by_id(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let station_id = path.into_inner();

    let frame = match state.latest_frame() {
        Ok(frame) => frame,
        Err(response) => return response,
    };

    match frame.station(&station_id) {
        Some(station) => HttpResponse::Ok().json(ApiResponse::success(station)),
        None => {
            tracing::debug!("⚠️  Station not found: {}", station_id);
            HttpResponse::NotFound()
                .json(ApiResponse::<()>::error(format!("Station '{}' not found", station_id)))
        }
    }
}

/// Slider event: `-1` for any time, otherwise a minute of the day.
async fn post_filter(state: web::Data<AppState>, body: web::Json<FilterRequest>) -> HttpResponse {
    let filter = match TimeFilter::from_slider(body.minute) {
        Ok(filter) => filter,
        Err(e) => {
            return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e.to_string()));
        }
    };

    let (request, engine) = match state.lock() {
        Ok(mut controller) => (controller.begin(filter), controller.engine().clone()),
        Err(response) => return response,
    };

    let frame = match tokio::task::spawn_blocking(move || {
        engine.compute_frame(request.filter, request.generation)
    })
    .await
    {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!("❌ Recompute task panicked: {}", e);
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Recompute task panicked".to_string()));
        }
    };

    let committed = match state.lock() {
        Ok(mut controller) => controller.commit(frame),
        Err(response) => return response,
    };

    match committed {
        Some(frame) => HttpResponse::Ok().json(ApiResponse::success(frame.as_ref())),
        None => HttpResponse::Conflict().json(ApiResponse::<()>::error(format!(
            "Filter {} superseded by a newer selection",
            filter.to_slider()
        ))),
    }
}

async fn get_scale(state: web::Data<AppState>) -> HttpResponse {
    let frame = match state.latest_frame() {
        Ok(frame) => frame,
        Err(response) => return response,
    };

    let flow_buckets = state
        .engine
        .flow()
        .buckets()
        .iter()
        .map(|&bucket| FlowBucketInfo {
            bucket,
            value: bucket.value(),
        })
        .collect();

    HttpResponse::Ok().json(ApiResponse::success(ScaleInfo {
        domain_max: state.engine.radius_scale().domain_max(),
        current_range: frame.radius_scale.range(),
        unfiltered_range: scale::UNFILTERED_RANGE,
        filtered_range: scale::FILTERED_RANGE,
        flow_buckets,
        window_minutes: time_filter::WINDOW_MINUTES,
    }))
}

async fn get_stats(state: web::Data<AppState>) -> HttpResponse {
    let (controller_state, generation, frame) = match state.lock() {
        Ok(controller) => (
            controller.state(),
            controller.latest_generation(),
            controller.renderer().frame(),
        ),
        Err(response) => return response,
    };

    HttpResponse::Ok().json(ApiResponse::success(StatsInfo {
        stations: state.engine.registry().report(),
        trips: state.engine.trip_log().report(),
        state: controller_state,
        generation,
        label: frame.as_ref().map(|f| f.label.clone()).unwrap_or_default(),
        filtered_trips: frame.map(|f| f.trip_count).unwrap_or(0),
    }))
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "Bluebikes Traffic API",
        "version": env!("CARGO_PKG_VERSION"),
        "stations": state.engine.registry().len(),
        "trips": state.engine.trip_log().len(),
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

/// Malformed filter bodies get the same envelope as every other error.
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    tracing::debug!("⚠️  Rejected request body: {}", err);
    let response = HttpResponse::BadRequest()
        .json(ApiResponse::<()>::error(format!("Invalid request body: {}", err)));
    InternalError::from_response(err, response).into()
}

fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check)).service(
        web::scope("/api/bikes")
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .route("/frame", web::get().to(get_frame))
            .route("/stations", web::get().to(get_stations))
            .route("/station/{id}", web::get().to(get_station_by_id))
            .route("/filter", web::post().to(post_filter))
            .route("/scale", web::get().to(get_scale))
            .route("/stats", web::get().to(get_stats)),
    );
}

// ============================================================================
// Server Setup
// ============================================================================

async fn run_server(app_state: AppState, args: config::Args) -> std::io::Result<()> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║   🚲 Bluebikes Traffic Server                              ║");
    println!("╚════════════════════════════════════════════════════════════╝\n");
    println!("🌐 Server running on: http://{}:{}", args.bind, args.port);
    println!("📍 Available Routes:");
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│   GET  /api/bikes/frame          - Latest frame             │");
    println!("│   GET  /api/bikes/stations       - Stations with traffic    │");
    println!("│   GET  /api/bikes/station/:id    - Station by ID            │");
    println!("│   POST /api/bikes/filter         - Select time {{minute}}     │");
    println!("│   GET  /api/bikes/scale          - Radius and flow scales   │");
    println!("│   GET  /api/bikes/stats          - Dataset statistics       │");
    println!("│   GET  /health                   - Health check             │");
    println!("└─────────────────────────────────────────────────────────────┘\n");

    let static_dir = args.static_dir.clone();
    if let Some(dir) = &static_dir {
        println!("📱 Frontend served from {:?}", dir);
    }

    HttpServer::new(move || {
        let static_dir = static_dir.clone();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(api_routes)
            .configure(move |cfg| {
                if let Some(dir) = static_dir {
                    cfg.service(fs::Files::new("/", dir).index_file("index.html"));
                }
            })
    })
    .bind((args.bind.as_str(), args.port))?
    .run()
    .await
}

fn load_engine(sources: &DataSources) -> Result<TrafficEngine, BikeError> {
    let registry = sources.load_stations()?;
    let trips = sources.load_trips()?;
    Ok(TrafficEngine::new(registry, trips))
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = config::Args::parse();

    tracing::info!("📡 Loading station feed and trip log...");
    let engine = match load_engine(&DataSources::from_args(&args)) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("❌ Failed to load datasets: {}", e);
            eprintln!("Server cannot start without both datasets.");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "✅ Ready: {} stations, {} trips, busiest station {} trips",
        engine.registry().len(),
        engine.trip_log().len(),
        engine.radius_scale().domain_max()
    );

    actix_web::rt::System::new().block_on(run_server(AppState::new(engine), args))
}
