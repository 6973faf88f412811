//! Testing utilities and mock implementations.
//!
//! Provides a mock [`ToolInvoker`](crate::process::ToolInvoker) and fixtures
//! for seeding a bundle store and a download area, so builder and server tests
//! run without the real directory tools.
//!
//! # Example
//!
//! ```rust,ignore
//! use dirforge_core::testing::{fixtures, MockToolInvoker};
//!
//! let store = SqliteBundleStore::in_memory()?;
//! let bundle = fixtures::ready_bundle(&store, &downloads, Provider::RoyalMail, Period::new(2024, 1));
//! let tools = MockToolInvoker::new();
//! ```

mod mock_tool_invoker;

pub use mock_tool_invoker::{MockBehavior, MockToolInvoker};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::builder::ProviderConfig;
    use crate::bundle::{Bundle, BundleStore, NewBundle, NewFile, Period};
    use crate::provider::Provider;

    /// Insert a bundle with one downloaded file and write that file under
    /// `<download_dir>/<period>/`.
    pub fn downloaded_bundle(
        store: &dyn BundleStore,
        download_dir: &Path,
        provider: Provider,
        period: Period,
    ) -> Bundle {
        let dir = download_dir.join(period.dir_name());
        std::fs::create_dir_all(&dir).expect("create download dir");
        let file_name = format!("{}-{}.zip", provider.as_str().to_lowercase(), period.dir_name());
        std::fs::write(dir.join(&file_name), b"raw directory data").expect("write download");

        let file = NewFile::downloaded(file_name, "18", &period);
        store
            .insert_bundle(NewBundle::new(provider, period).with_file(file))
            .expect("insert bundle")
    }

    /// Like [`downloaded_bundle`], then flagged ready for build.
    pub fn ready_bundle(
        store: &dyn BundleStore,
        download_dir: &Path,
        provider: Provider,
        period: Period,
    ) -> Bundle {
        let bundle = downloaded_bundle(store, download_dir, provider, period);
        store
            .set_ready_for_build(provider, bundle.id, true)
            .expect("set ready");
        store.get_bundle(provider, bundle.id).expect("reload bundle")
    }

    /// Provider config pointing at mock tool names inside `root`.
    pub fn provider_config(root: &Path, provider: Provider) -> ProviderConfig {
        let mut config = ProviderConfig::new(
            root.join("downloads").join(provider.as_str()),
            "/opt/dirtools/compile",
        );
        config.working_dir = root.join("work");
        config.converter_path = Some("/opt/dirtools/convert".into());
        config
    }
}
