//! PID file lifecycle (spec §5, §6): "created at daemon start if
//! configured, removed on normal exit and on the crash handler's final
//! path."

use std::path::{Path, PathBuf};

use ply_core::Result;

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id to `path`, truncating any stale file
    /// left behind by a previous run that crashed before cleanup.
    pub fn create(path: &Path) -> Result<Self> {
        std::fs::write(path, format!("{}\n", std::process::id()))?;
        Ok(Self { path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove pid file {}: {e}", self.path.display());
            }
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Path used by the crash handler, which must avoid the heap-allocating
/// cleanup `Drop`/`std::fs` would otherwise pull in: `nix::unistd::unlink`
/// stack-allocates its path buffer for paths under `PATH_MAX`, unlike
/// `std::fs::remove_file`'s `CString::new`.
pub fn unlink_best_effort(path: &Path) {
    let _ = nix::unistd::unlink(path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_writes_current_pid_and_remove_deletes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plymouthd.pid");
        let pid_file = PidFile::create(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
        pid_file.remove();
        assert!(!path.exists());
    }
}
