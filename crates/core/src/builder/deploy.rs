//! Copies finished directories into the target application's data area.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::provider::Provider;

use super::error::BuildError;

/// Destination of a provider's output for one period.
pub fn deploy_dir(target: &Path, provider: Provider, period_dir: &str) -> PathBuf {
    target.join(provider.as_str()).join(period_dir)
}

/// Copy every file under `source` into `destination`, overwriting.
///
/// Running it twice with the same input leaves the same tree. Returns the
/// number of files copied.
pub async fn deploy_output(source: &Path, destination: &Path) -> Result<usize, BuildError> {
    let deploy_err = |reason: String| BuildError::Deploy {
        path: destination.to_path_buf(),
        reason,
    };

    fs::create_dir_all(destination)
        .await
        .map_err(|e| deploy_err(e.to_string()))?;

    let mut copied = 0;
    let mut pending = vec![(source.to_path_buf(), destination.to_path_buf())];

    while let Some((from_dir, to_dir)) = pending.pop() {
        let mut entries = fs::read_dir(&from_dir)
            .await
            .map_err(|e| deploy_err(format!("reading {}: {}", from_dir.display(), e)))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| deploy_err(e.to_string()))?
        {
            let from = entry.path();
            let to = to_dir.join(entry.file_name());
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| deploy_err(e.to_string()))?;

            if file_type.is_dir() {
                fs::create_dir_all(&to)
                    .await
                    .map_err(|e| deploy_err(format!("creating {}: {}", to.display(), e)))?;
                pending.push((from, to));
            } else {
                let bytes = fs::copy(&from, &to)
                    .await
                    .map_err(|e| deploy_err(format!("copying {}: {}", from.display(), e)))?;
                debug!("Deployed {} ({} bytes)", to.display(), bytes);
                copied += 1;
            }
        }
    }

    info!("Deployed {} files to {}", copied, destination.display());
    Ok(copied)
}
