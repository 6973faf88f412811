//! Status snapshot wire types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::provider::Provider;
use crate::task::{TaskSnapshot, TaskStatus};

/// One provider's entry in a status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub status: TaskStatus,
    /// 0-100.
    pub progress: u8,
    pub current_build: String,
    /// Labels of bundles that are ready and not yet built, oldest first.
    pub available_builds: Vec<String>,
}

impl ProviderStatus {
    pub fn from_task(task: &TaskSnapshot, available_builds: Vec<String>) -> Self {
        Self {
            status: task.status,
            progress: task.progress.min(100),
            current_build: task.current_build.clone(),
            available_builds,
        }
    }
}

/// State of every provider, keyed by wire name.
///
/// Serializes as `{"SmartMatch": {...}, "Parascript": {...}, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSnapshot {
    pub providers: BTreeMap<Provider, ProviderStatus>,
}

impl StatusSnapshot {
    pub fn get(&self, provider: Provider) -> Option<&ProviderStatus> {
        self.providers.get(&provider)
    }

    pub fn insert(&mut self, provider: Provider, status: ProviderStatus) {
        self.providers.insert(provider, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::default();
        snapshot.insert(
            Provider::SmartMatch,
            ProviderStatus {
                status: TaskStatus::InProgress,
                progress: 42,
                current_build: "2024-01 Cycle-N".to_string(),
                available_builds: vec!["2024-01 Cycle-N".to_string(), "2024-02 Cycle-N".to_string()],
            },
        );
        snapshot.insert(
            Provider::RoyalMail,
            ProviderStatus {
                status: TaskStatus::Error,
                progress: 0,
                current_build: String::new(),
                available_builds: vec![],
            },
        );
        snapshot
    }

    #[test]
    fn test_wire_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        let sm = &value["SmartMatch"];
        assert_eq!(sm["status"], "InProgress");
        assert_eq!(sm["progress"], 42);
        assert_eq!(sm["currentBuild"], "2024-01 Cycle-N");
        assert_eq!(sm["availableBuilds"][1], "2024-02 Cycle-N");
        assert_eq!(value["RoyalMail"]["status"], "Error");
        assert!(value.get("Parascript").is_none());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let snapshot = sample();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: StatusSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
    }

    #[test]
    fn test_progress_clamped_from_task() {
        let mut task = TaskSnapshot::idle(Provider::Parascript);
        task.progress = 250;
        let status = ProviderStatus::from_task(&task, vec![]);
        assert_eq!(status.progress, 100);
    }
}
