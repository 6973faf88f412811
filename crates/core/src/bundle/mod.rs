//! Bundle store - durable records of downloaded data bundles and their files.
//!
//! The crawler inserts bundles and files and flips the readiness flag; a
//! builder reads ready bundles, holds one while it builds, and marks it
//! complete afterwards.

mod sqlite;
mod types;

pub use sqlite::SqliteBundleStore;
pub use types::*;

use crate::provider::Provider;

/// Trait for bundle storage.
///
/// All operations are atomic with respect to the flags they touch: a reader
/// never observes a bundle with half-written files or flags.
pub trait BundleStore: Send + Sync {
    /// Bundles with `is_ready_for_build` set and `is_build_complete` unset,
    /// oldest period first.
    fn list_ready_bundles(&self, provider: Provider) -> Result<Vec<Bundle>, BundleError>;

    /// All bundles of a provider, oldest period first.
    fn list_bundles(&self, provider: Provider) -> Result<Vec<Bundle>, BundleError>;

    /// Get a single bundle with its files.
    fn get_bundle(&self, provider: Provider, id: i64) -> Result<Bundle, BundleError>;

    /// Insert a bundle together with its initial files.
    fn insert_bundle(&self, bundle: NewBundle) -> Result<Bundle, BundleError>;

    /// Insert or update a file, keyed by its name within the bundle.
    fn upsert_file(
        &self,
        provider: Provider,
        bundle_id: i64,
        file: NewFile,
    ) -> Result<BundleFile, BundleError>;

    /// Set the crawler-side readiness flag.
    ///
    /// Clearing the flag fails with [`BundleError::Held`] while a build holds
    /// the bundle.
    fn set_ready_for_build(&self, provider: Provider, id: i64, ready: bool) -> Result<(), BundleError>;

    /// Claim a bundle for the duration of a build.
    fn hold(&self, provider: Provider, id: i64) -> Result<(), BundleError>;

    /// Release a claim taken with [`BundleStore::hold`].
    fn release(&self, provider: Provider, id: i64);

    /// Flip `is_build_complete` to true. Succeeds at most once per bundle.
    fn mark_build_complete(&self, provider: Provider, id: i64) -> Result<(), BundleError>;
}
