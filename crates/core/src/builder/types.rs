//! Builder result types.

use serde::Serialize;

/// Answer to a start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StartOutcome {
    /// A new attempt is running on its own task.
    Started { attempt: u64 },
    /// A build was already running; the request was ignored.
    AlreadyInProgress { current_build: String },
}

/// How a build attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BuildOutcome {
    Built { label: String },
    NothingToBuild,
    Failed { reason: String },
    Cancelled,
}

impl BuildOutcome {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Built { .. } => "built",
            Self::NothingToBuild => "nothing_to_build",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Maps a tool's own 0-100 progress onto its slice of the overall bar.
///
/// Only positive differences are reported, so the overall progress never
/// moves backwards even if a tool does.
#[derive(Debug, Clone)]
pub struct PhaseProgress {
    slice: u32,
    reported: u32,
}

impl PhaseProgress {
    pub fn new(slice: u32) -> Self {
        Self { slice, reported: 0 }
    }

    /// Delta to add for a tool report of `percent`.
    pub fn update(&mut self, percent: u8) -> u32 {
        let target = self.slice * u32::from(percent.min(100)) / 100;
        let delta = target.saturating_sub(self.reported);
        self.reported += delta;
        delta
    }

    /// Delta that completes the slice.
    pub fn finish(&mut self) -> u32 {
        let delta = self.slice - self.reported;
        self.reported = self.slice;
        delta
    }
}

/// Split `total` across `weights`; the last share absorbs rounding.
pub fn split_budget(total: u32, weights: &[u32]) -> Vec<u32> {
    let sum: u32 = weights.iter().sum();
    if weights.is_empty() {
        return Vec::new();
    }
    if sum == 0 {
        let mut shares = vec![0; weights.len()];
        if let Some(last) = shares.last_mut() {
            *last = total;
        }
        return shares;
    }

    let mut shares: Vec<u32> = weights.iter().map(|w| total * w / sum).collect();
    let assigned: u32 = shares.iter().sum();
    if let Some(last) = shares.last_mut() {
        *last += total - assigned;
    }
    shares
}
