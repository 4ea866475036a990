use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Listen port (`PORT`, default 8000).
    pub port: u16,

    /// Where the state document lives (`DATA_DIR`, default `./data`).
    pub data_dir: PathBuf,

    /// Bearer token the GPU monitor must present (`GPU_MONITOR_TOKEN`).
    /// Ingest is refused entirely when unset.
    pub monitor_token: Option<String>,

    /// Display timezone override (`TZ`); the persisted config's timezone
    /// is used when absent.
    pub timezone_override: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8000);

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        Self {
            port,
            data_dir,
            monitor_token: std::env::var("GPU_MONITOR_TOKEN").ok(),
            timezone_override: std::env::var("TZ").ok(),
        }
    }
}
