//! Assembles status snapshots from task states and the bundle store.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::warn;

use crate::bundle::BundleStore;
use crate::provider::Provider;
use crate::task::{ChangeFeed, ComponentTaskState, TaskSnapshot};

use super::types::{ProviderStatus, StatusSnapshot};

struct BoardEntry {
    state: Arc<ComponentTaskState>,
    last_available: Mutex<Vec<String>>,
}

/// Read-only view over every provider's state.
///
/// Never mutates task state. If the store cannot be read, each provider keeps
/// its last known list of available builds.
pub struct StatusBoard {
    entries: Vec<BoardEntry>,
    store: Arc<dyn BundleStore>,
    feed: ChangeFeed,
}

impl StatusBoard {
    pub fn new(
        states: impl IntoIterator<Item = Arc<ComponentTaskState>>,
        store: Arc<dyn BundleStore>,
        feed: ChangeFeed,
    ) -> Self {
        let entries = states
            .into_iter()
            .map(|state| BoardEntry {
                state,
                last_available: Mutex::new(Vec::new()),
            })
            .collect();
        Self {
            entries,
            store,
            feed,
        }
    }

    /// Subscribe to state changes of every provider.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskSnapshot> {
        self.feed.subscribe()
    }

    pub fn providers(&self) -> impl Iterator<Item = Provider> + '_ {
        self.entries.iter().map(|e| e.state.provider())
    }

    pub fn task(&self, provider: Provider) -> Option<TaskSnapshot> {
        self.entries
            .iter()
            .find(|e| e.state.provider() == provider)
            .map(|e| e.state.snapshot())
    }

    /// Current state of every provider.
    pub fn snapshot(&self) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::default();
        for entry in &self.entries {
            let task = entry.state.snapshot();
            let available = self.available_builds(entry);
            snapshot.insert(task.provider, ProviderStatus::from_task(&task, available));
        }
        snapshot
    }

    fn available_builds(&self, entry: &BoardEntry) -> Vec<String> {
        let provider = entry.state.provider();
        let mut last = entry
            .last_available
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match self.store.list_ready_bundles(provider) {
            Ok(bundles) => {
                *last = bundles.iter().map(|b| b.label()).collect();
            }
            Err(e) => {
                warn!(provider = %provider, "Using last known builds, store read failed: {}", e);
            }
        }
        last.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{
        Bundle, BundleError, NewBundle, NewFile, Period, SqliteBundleStore,
    };
    use crate::task::TaskStatus;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store wrapper whose reads can be switched off.
    struct FlakyStore {
        inner: SqliteBundleStore,
        down: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> Result<(), BundleError> {
            if self.down.load(Ordering::SeqCst) {
                Err(BundleError::StoreUnavailable("connection lost".into()))
            } else {
                Ok(())
            }
        }
    }

    impl BundleStore for FlakyStore {
        fn list_ready_bundles(&self, provider: Provider) -> Result<Vec<Bundle>, BundleError> {
            self.check()?;
            self.inner.list_ready_bundles(provider)
        }
        fn list_bundles(&self, provider: Provider) -> Result<Vec<Bundle>, BundleError> {
            self.check()?;
            self.inner.list_bundles(provider)
        }
        fn get_bundle(&self, provider: Provider, id: i64) -> Result<Bundle, BundleError> {
            self.inner.get_bundle(provider, id)
        }
        fn insert_bundle(&self, bundle: NewBundle) -> Result<Bundle, BundleError> {
            self.inner.insert_bundle(bundle)
        }
        fn upsert_file(
            &self,
            provider: Provider,
            bundle_id: i64,
            file: NewFile,
        ) -> Result<crate::bundle::BundleFile, BundleError> {
            self.inner.upsert_file(provider, bundle_id, file)
        }
        fn set_ready_for_build(&self, provider: Provider, id: i64, ready: bool) -> Result<(), BundleError> {
            self.inner.set_ready_for_build(provider, id, ready)
        }
        fn hold(&self, provider: Provider, id: i64) -> Result<(), BundleError> {
            self.inner.hold(provider, id)
        }
        fn release(&self, provider: Provider, id: i64) {
            self.inner.release(provider, id)
        }
        fn mark_build_complete(&self, provider: Provider, id: i64) -> Result<(), BundleError> {
            self.inner.mark_build_complete(provider, id)
        }
    }

    fn board_with(store: Arc<dyn BundleStore>) -> (StatusBoard, Vec<Arc<ComponentTaskState>>) {
        let feed = ChangeFeed::default();
        let states: Vec<_> = Provider::ALL
            .into_iter()
            .map(|p| Arc::new(ComponentTaskState::new(p, feed.clone())))
            .collect();
        (StatusBoard::new(states.clone(), store, feed), states)
    }

    fn insert_ready(store: &dyn BundleStore, provider: Provider, period: Period) {
        let bundle = store.insert_bundle(NewBundle::new(provider, period)).unwrap();
        store.set_ready_for_build(provider, bundle.id, true).unwrap();
    }

    #[test]
    fn test_snapshot_lists_every_provider() {
        let store = Arc::new(SqliteBundleStore::in_memory().unwrap());
        let (board, _) = board_with(store);
        let snapshot = board.snapshot();

        assert_eq!(snapshot.providers.len(), 3);
        for provider in Provider::ALL {
            assert_eq!(snapshot.get(provider).unwrap().status, TaskStatus::Ready);
        }
    }

    #[test]
    fn test_available_builds_are_ready_labels() {
        let store = Arc::new(SqliteBundleStore::in_memory().unwrap());
        insert_ready(store.as_ref(), Provider::SmartMatch, Period::with_cycle(2024, 2, "N"));
        insert_ready(store.as_ref(), Provider::SmartMatch, Period::with_cycle(2024, 1, "N"));
        store
            .insert_bundle(NewBundle::new(Provider::SmartMatch, Period::with_cycle(2024, 3, "N")))
            .unwrap();

        let (board, _) = board_with(store);
        let snapshot = board.snapshot();

        assert_eq!(
            snapshot.get(Provider::SmartMatch).unwrap().available_builds,
            vec!["2024-01 Cycle-N".to_string(), "2024-02 Cycle-N".to_string()]
        );
    }

    #[test]
    fn test_store_outage_keeps_last_known_builds() {
        let store = Arc::new(FlakyStore {
            inner: SqliteBundleStore::in_memory().unwrap(),
            down: AtomicBool::new(false),
        });
        insert_ready(store.as_ref(), Provider::RoyalMail, Period::new(2024, 7));
        let (board, states) = board_with(store.clone());

        let before = board.snapshot();
        store.down.store(true, Ordering::SeqCst);
        states[2].start("2024-07").unwrap();
        let during = board.snapshot();

        let rm = during.get(Provider::RoyalMail).unwrap();
        assert_eq!(rm.available_builds, before.get(Provider::RoyalMail).unwrap().available_builds);
        assert_eq!(rm.status, TaskStatus::InProgress);
    }

    #[test]
    fn test_board_never_mutates_state() {
        let store = Arc::new(SqliteBundleStore::in_memory().unwrap());
        let (board, states) = board_with(store);
        states[0].start("2024-01 Cycle-N").unwrap();
        states[0].advance_progress(30);

        let _ = board.snapshot();
        let _ = board.snapshot();
        assert_eq!(states[0].snapshot().progress, 30);
        assert_eq!(board.task(Provider::SmartMatch).unwrap().progress, 30);
    }
}
