use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the SQLite work queue database.
#[derive(Debug, Clone)]
pub struct QueueDbConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    /// Try to switch the database to WAL journaling on connect.
    pub wal: bool,
    pub busy_timeout: Duration,
}

impl QueueDbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: 5,
            wal: true,
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Like [`QueueDbConfig::new`], honouring `HARVESTER_DISABLE_WAL`.
    ///
    /// - `HARVESTER_DISABLE_WAL` (optional; `1`, `true`, `yes` or `on` keep
    ///   the default rollback journal)
    pub fn from_env(path: impl Into<PathBuf>) -> Self {
        let disable_wal = std::env::var("HARVESTER_DISABLE_WAL")
            .map(|raw| env_flag(&raw))
            .unwrap_or(false);
        Self::new(path).with_wal(!disable_wal)
    }

    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }
}

fn env_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
