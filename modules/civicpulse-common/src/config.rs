use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database (absent → in-memory store)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Web server
    pub api_host: String,
    pub api_port: u16,
    pub allowed_origins: Vec<String>,

    // Identity provider
    pub jwt_secret: String,
    pub jwt_issuer: String,

    // Queries
    pub nearby_default_radius_m: f64,
    /// `None` when unset or zero.
    pub nearby_max_results: Option<usize>,
    pub heatmap_precision: usize,
}

impl Config {
    /// Load configuration from `.env` (if present) and the environment.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            database_max_connections: parsed_env("DATABASE_MAX_CONNECTIONS", 10),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: parsed_env("API_PORT", 3000),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim().to_string())
                .collect(),
            jwt_secret: required_env("AUTH_JWT_SECRET"),
            jwt_issuer: env::var("AUTH_JWT_ISSUER").unwrap_or_else(|_| "civicpulse".to_string()),
            nearby_default_radius_m: parsed_env("NEARBY_DEFAULT_RADIUS_METERS", 5_000.0),
            nearby_max_results: result_cap(parsed_env("NEARBY_MAX_RESULTS", 0)),
            heatmap_precision: parsed_env::<usize>("HEATMAP_PRECISION", 6).clamp(1, 9),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid number")),
        Err(_) => default,
    }
}

/// Zero means "no cap".
fn result_cap(max: usize) -> Option<usize> {
    (max > 0).then_some(max)
}
