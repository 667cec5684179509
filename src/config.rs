use chrono_tz::Tz;
use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_STATIONS_URL: &str = "https://dsc106.com/labs/lab07/data/bluebikes-stations.json";
pub const DEFAULT_TRIPS_URL: &str = "https://dsc106.com/labs/lab07/data/bluebikes-traffic-2024-03.csv";

#[derive(Parser, Debug, Clone)]
#[command(name = "bike-traffic")]
#[command(about = "Bluebikes station traffic server for the time-of-day map")]
pub struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, env = "BIKE_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port to run the HTTP server on
    #[arg(short, long, env = "BIKE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Station feed (URL or local path)
    #[arg(long, env = "BIKE_STATIONS_URL", default_value = DEFAULT_STATIONS_URL)]
    pub stations_url: String,

    /// Trip log CSV, optionally zipped (URL or local path)
    #[arg(long, env = "BIKE_TRIPS_URL", default_value = DEFAULT_TRIPS_URL)]
    pub trips_url: String,

    /// Zone used for timestamps that carry a UTC offset
    #[arg(long, env = "BIKE_TIMEZONE", default_value = "America/New_York", value_parser = parse_timezone)]
    pub timezone: Tz,

    /// Reuse downloaded datasets younger than this many days
    #[arg(long, env = "BIKE_CACHE_MAX_AGE_DAYS", default_value_t = 7)]
    pub cache_max_age_days: u64,

    /// Always download, never read or write the dataset cache
    #[arg(long, env = "BIKE_NO_CACHE")]
    pub no_cache: bool,

    /// Directory with the map frontend, served at `/`
    #[arg(long, env = "BIKE_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
}

fn parse_timezone(s: &str) -> Result<Tz, String> {
    s.parse::<Tz>()
        .map_err(|_| format!("unknown time zone '{}'", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn default_of(id: &str) -> String {
        let command = Args::command();
        let arg = command
            .get_arguments()
            .find(|arg| arg.get_id() == id)
            .unwrap();
        arg.get_default_values()[0].to_string_lossy().into_owned()
    }

    // Declared defaults, so BIKE_* variables in the environment cannot leak in.
    #[test]
    fn defaults() {
        assert_eq!(default_of("port"), "8080");
        assert_eq!(default_of("bind"), "0.0.0.0");
        assert_eq!(default_of("timezone"), "America/New_York");
        assert_eq!(default_of("stations_url"), DEFAULT_STATIONS_URL);
        assert_eq!(default_of("trips_url"), DEFAULT_TRIPS_URL);
        assert_eq!(default_of("cache_max_age_days"), "7");
        assert_eq!(parse_timezone("America/New_York"), Ok(chrono_tz::America::New_York));
    }

    #[test]
    fn overrides_and_bad_zone() {
        let args = Args::try_parse_from([
            "bike-traffic",
            "--port",
            "9000",
            "--trips-url",
            "data/trips.zip",
            "--timezone",
            "Europe/Paris",
            "--no-cache",
        ])
        .unwrap();
        assert_eq!(args.port, 9000);
        assert_eq!(args.trips_url, "data/trips.zip");
        assert_eq!(args.timezone, chrono_tz::Europe::Paris);
        assert!(args.no_cache);

        assert!(Args::try_parse_from(["bike-traffic", "--timezone", "Mars/Olympus"]).is_err());
    }
}
