//! Single-instance lock file.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::types::LifecycleError;

/// Held for the life of the process; the file is removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Create the lock file exclusively and write our pid into it.
    ///
    /// A lock whose pid no longer runs is reclaimed.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LifecycleError> {
        let path = path.into();

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id()).map_err(|e| lock_error(&path, e))?;
                    info!("Acquired instance lock {}", path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    match read_pid(&path) {
                        Some(pid) if process_alive(pid) => {
                            return Err(LifecycleError::AlreadyRunning { pid, path });
                        }
                        stale => {
                            warn!("Removing stale lock {} (pid {:?})", path.display(), stale);
                            match std::fs::remove_file(&path) {
                                Ok(()) => {}
                                Err(e) if e.kind() == ErrorKind::NotFound => {}
                                Err(e) => return Err(lock_error(&path, e)),
                            }
                        }
                    }
                }
                Err(e) => return Err(lock_error(&path, e)),
            }
        }

        Err(lock_error(
            &path,
            std::io::Error::new(
                ErrorKind::AlreadyExists,
                "lock was re-created while reclaiming it",
            ),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock {}: {}", self.path.display(), e);
        }
    }
}

fn lock_error(path: &Path, source: std::io::Error) -> LifecycleError {
    LifecycleError::Lock {
        path: path.to_path_buf(),
        source,
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    // Without a cheap liveness check, never steal a lock
    true
}
