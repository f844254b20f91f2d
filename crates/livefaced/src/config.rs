use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the HTTP server.
    pub bind_addr: String,
    /// Directory of labeled reference images (the face gallery).
    pub gallery_dir: PathBuf,
    /// Base URL of the inference sidecar (landmarks + embeddings).
    pub inference_url: String,
    /// Euclidean-distance tolerance for a positive identity match.
    pub match_tolerance: f32,
    /// Seconds of inactivity before a liveness session is evicted.
    pub session_idle_secs: u64,
}

impl Config {
    /// Load configuration from `LIVEFACE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("LIVEFACE_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            gallery_dir: std::env::var("LIVEFACE_GALLERY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("database")),
            inference_url: std::env::var("LIVEFACE_INFERENCE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string()),
            match_tolerance: env_f32("LIVEFACE_MATCH_TOLERANCE", 0.5),
            session_idle_secs: env_u64("LIVEFACE_SESSION_IDLE_SECS", 120),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
