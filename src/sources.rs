// Dataset loading for the station feed and the trip log.
//
// Sources are URLs or local paths. Downloads are kept on disk for a few days so
// restarts don't pull the monthly trip export (tens of MB) every time.
// Both loads are fatal on failure: nothing can be drawn without either dataset.

use crate::bike_models::{BikeError, Result};
use crate::config::Args;
use crate::registry::StationRegistry;
use crate::trip_log::TripLog;
use bytes::Bytes;
use chrono_tz::Tz;
use reqwest::blocking;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use zip::ZipArchive;

const REQUEST_TIMEOUT_SECS: u64 = 120;
const SECONDS_PER_DAY: u64 = 86400;

// ============================================================================
// Dataset Cache
// ============================================================================

#[derive(Debug, Clone)]
pub struct DatasetCache {
    dir: PathBuf,
    max_age_days: u64,
}

impl DatasetCache {
    pub fn new(max_age_days: u64) -> Self {
        let mut dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        dir.push("bike_traffic");
        Self::with_dir(dir, max_age_days)
    }

    pub fn with_dir(dir: PathBuf, max_age_days: u64) -> Self {
        DatasetCache { dir, max_age_days }
    }

    pub fn path(&self, name: &str, location: &str) -> PathBuf {
        let file = location
            .rsplit('/')
            .next()
            .unwrap_or(location)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect::<String>();
        self.dir.join(format!("{}_{}", name, file))
    }

    fn age_days(path: &Path) -> Option<u64> {
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now().duration_since(modified).unwrap_or_default();
        Some(age.as_secs() / SECONDS_PER_DAY)
    }

    pub fn load(&self, name: &str, location: &str) -> Option<Bytes> {
        let path = self.path(name, location);
        let age_days = Self::age_days(&path)?;

        if age_days >= self.max_age_days {
            tracing::info!("⚠️  {} cache expired (>{} days old), refreshing...", name, self.max_age_days);
            return None;
        }

        match fs::read(&path) {
            Ok(contents) => {
                tracing::info!("✓ {} cache loaded ({} days old, {} bytes)", name, age_days, contents.len());
                Some(Bytes::from(contents))
            }
            Err(e) => {
                tracing::warn!("⚠️  Failed to read {} cache file ({}), will refresh", name, e);
                None
            }
        }
    }

    pub fn save(&self, name: &str, location: &str, contents: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| BikeError::FileError(format!("Failed to create cache dir: {}", e)))?;

        let path = self.path(name, location);
        fs::write(&path, contents)
            .map_err(|e| BikeError::FileError(format!("Failed to write cache: {}", e)))?;

        tracing::info!("✓ {} cache saved to: {:?}", name, path);
        Ok(())
    }
}

// ============================================================================
// Sources
// ============================================================================

#[derive(Debug, Clone)]
pub struct DataSources {
    stations: String,
    trips: String,
    timezone: Tz,
    cache: Option<DatasetCache>,
}

impl DataSources {
    pub fn new(stations: impl Into<String>, trips: impl Into<String>, timezone: Tz) -> Self {
        DataSources {
            stations: stations.into(),
            trips: trips.into(),
            timezone,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: DatasetCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn from_args(args: &Args) -> Self {
        let sources = Self::new(args.stations_url.clone(), args.trips_url.clone(), args.timezone);
        if args.no_cache {
            sources
        } else {
            sources.with_cache(DatasetCache::new(args.cache_max_age_days))
        }
    }

    pub fn load_stations(&self) -> Result<StationRegistry> {
        let body = self.fetch("stations", &self.stations)?;
        let feed: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| BikeError::ParseError(format!("Invalid station JSON: {}", e)))?;

        let registry = StationRegistry::from_feed(&feed)?;
        let report = registry.report();
        tracing::info!(
            "📍 Stations: {} valid of {} ({} bad coordinates, {} without id, {} duplicates)",
            report.kept,
            report.raw_records,
            report.invalid_coordinates,
            report.missing_id,
            report.duplicate_id
        );
        Ok(registry)
    }

    pub fn load_trips(&self) -> Result<TripLog> {
        let body = self.fetch("trips", &self.trips)?;
        let log = if is_zip(&body) {
            let csv = read_first_csv(body)?;
            TripLog::from_csv(csv.as_slice(), self.timezone)?
        } else {
            TripLog::from_csv(&body[..], self.timezone)?
        };

        let report = log.report();
        tracing::info!(
            "🚲 Trips: {} loaded of {} rows ({} with unreadable timestamps)",
            report.kept,
            report.rows,
            report.invalid_timestamps
        );
        Ok(log)
    }

    fn fetch(&self, name: &str, location: &str) -> Result<Bytes> {
        if !is_remote(location) {
            tracing::info!("📂 Reading {} from {}", name, location);
            return fs::read(location)
                .map(Bytes::from)
                .map_err(|e| BikeError::FileError(format!("Failed to read {}: {}", location, e)));
        }

        if let Some(cached) = self.cache.as_ref().and_then(|c| c.load(name, location)) {
            return Ok(cached);
        }

        let body = download(location)?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save(name, location, &body) {
                tracing::warn!("⚠️  Warning: Could not cache {} ({})", name, e);
            }
        }
        Ok(body)
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn download(url: &str) -> Result<Bytes> {
    tracing::info!("📥 Downloading {}", url);

    let client = blocking::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| BikeError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| BikeError::NetworkError(format!("Failed to fetch {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(BikeError::NetworkError(format!(
            "Download failed with status: {}",
            response.status()
        )));
    }

    let body = response
        .bytes()
        .map_err(|e| BikeError::NetworkError(format!("Failed to read response: {}", e)))?;

    tracing::info!("   ✓ Downloaded {} bytes", body.len());
    Ok(body)
}

fn is_zip(body: &[u8]) -> bool {
    body.starts_with(b"PK\x03\x04")
}

/// Contents of the first `.csv` entry of a zip archive (macOS metadata skipped).
fn read_first_csv(body: Bytes) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(body))
        .map_err(|e| BikeError::ParseError(format!("Invalid zip archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| BikeError::ParseError(format!("Failed to read zip entry: {}", e)))?;

        if !file.name().ends_with(".csv") || file.name().starts_with("__MACOSX") {
            continue;
        }

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| BikeError::FileError(format!("Failed to extract {}: {}", file.name(), e)))?;
        return Ok(contents);
    }

    Err(BikeError::ParseError("No CSV file in trip archive".to_string()))
}
