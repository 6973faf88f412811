//! Types for downloaded data bundles and their files.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::Provider;

/// The dataset slice a bundle represents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: u16,
    pub month: u8,
    /// Cycle code (SmartMatch only), e.g. "N".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<String>,
}

impl Period {
    pub fn new(year: u16, month: u8) -> Self {
        Self {
            year,
            month,
            cycle: None,
        }
    }

    pub fn with_cycle(year: u16, month: u8, cycle: impl Into<String>) -> Self {
        Self {
            year,
            month,
            cycle: Some(cycle.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        (1..=12).contains(&self.month)
    }

    /// Directory-safe name, e.g. `2024-01` or `2024-01-N`.
    pub fn dir_name(&self) -> String {
        match &self.cycle {
            Some(cycle) => format!("{:04}-{:02}-{}", self.year, self.month, cycle),
            None => format!("{:04}-{:02}", self.year, self.month),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)?;
        if let Some(cycle) = &self.cycle {
            write!(f, " Cycle-{}", cycle)?;
        }
        Ok(())
    }
}

/// A file belonging to a bundle, as recorded by the crawler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleFile {
    pub id: i64,
    pub bundle_id: i64,
    pub file_name: String,
    /// Size as reported by the remote source.
    pub size: String,
    pub month: u8,
    pub year: u16,
    /// True once the local copy exists and passed size verification.
    pub on_disk: bool,
    pub date_downloaded: Option<DateTime<Utc>>,
}

/// A build-eligible dataset snapshot for one provider and period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: i64,
    pub provider: Provider,
    pub period: Period,
    pub is_ready_for_build: bool,
    pub is_build_complete: bool,
    /// Files in download order.
    pub files: Vec<BundleFile>,
}

impl Bundle {
    /// Human-readable label used in status snapshots.
    pub fn label(&self) -> String {
        self.period.to_string()
    }
}

/// A bundle to be inserted by the crawler.
#[derive(Debug, Clone)]
pub struct NewBundle {
    pub provider: Provider,
    pub period: Period,
    pub files: Vec<NewFile>,
}

impl NewBundle {
    pub fn new(provider: Provider, period: Period) -> Self {
        Self {
            provider,
            period,
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: NewFile) -> Self {
        self.files.push(file);
        self
    }
}

/// A file row written by the crawler.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub file_name: String,
    pub size: String,
    pub month: u8,
    pub year: u16,
    pub on_disk: bool,
    pub date_downloaded: Option<DateTime<Utc>>,
}

impl NewFile {
    /// A file that has not been downloaded yet.
    pub fn pending(file_name: impl Into<String>, size: impl Into<String>, period: &Period) -> Self {
        Self {
            file_name: file_name.into(),
            size: size.into(),
            month: period.month,
            year: period.year,
            on_disk: false,
            date_downloaded: None,
        }
    }

    /// A file whose local copy has been written and verified.
    pub fn downloaded(file_name: impl Into<String>, size: impl Into<String>, period: &Period) -> Self {
        Self {
            on_disk: true,
            date_downloaded: Some(Utc::now()),
            ..Self::pending(file_name, size, period)
        }
    }
}

/// Errors for bundle store operations.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("{provider} bundle {id} not found")]
    NotFound { provider: Provider, id: i64 },

    #[error("{provider} bundle for {period} already exists")]
    Duplicate { provider: Provider, period: Period },

    #[error("{provider} bundle {id} is already built")]
    AlreadyComplete { provider: Provider, id: i64 },

    #[error("{provider} bundle {id} is held by a running build")]
    Held { provider: Provider, id: i64 },

    #[error("invalid period: {0}")]
    InvalidPeriod(String),
}

impl From<rusqlite::Error> for BundleError {
    fn from(e: rusqlite::Error) -> Self {
        BundleError::StoreUnavailable(e.to_string())
    }
}
