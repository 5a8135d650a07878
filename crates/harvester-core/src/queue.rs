use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a URL in the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlStatus {
    Pending,
    Leased,
    Processed,
    Failed,
}

impl UrlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlStatus::Pending => "pending",
            UrlStatus::Leased => "leased",
            UrlStatus::Processed => "processed",
            UrlStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UrlStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(UrlStatus::Pending),
            "leased" => Ok(UrlStatus::Leased),
            "processed" => Ok(UrlStatus::Processed),
            "failed" => Ok(UrlStatus::Failed),
            _ => Err(format!("Unknown url status: {}", s)),
        }
    }
}

/// One row of the work queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    pub url: String,
    pub status: UrlStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub leased_at: Option<DateTime<Utc>>,
    pub first_seen: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub leased: u64,
    pub processed: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.leased + self.processed + self.failed
    }

    pub fn add(&mut self, status: UrlStatus, count: u64) {
        match status {
            UrlStatus::Pending => self.pending += count,
            UrlStatus::Leased => self.leased += count,
            UrlStatus::Processed => self.processed += count,
            UrlStatus::Failed => self.failed += count,
        }
    }
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pending={} leased={} processed={} failed={} total={}",
            self.pending,
            self.leased,
            self.processed,
            self.failed,
            self.total()
        )
    }
}
