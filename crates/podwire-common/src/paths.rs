//! Standard filesystem paths for podwire.

use std::path::PathBuf;

use once_cell::sync::Lazy;

/// Default root directory for podwire data.
pub static PODWIRE_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("PODWIRE_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/podwire"))
});

/// Default runtime directory for podwire.
pub static PODWIRE_RUNTIME_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("PODWIRE_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/run/podwire"))
});

/// Standard paths used by the podwire daemon.
#[derive(Debug, Clone)]
pub struct PodwirePaths {
    /// Root data directory (default: /var/lib/podwire).
    pub root: PathBuf,
    /// Runtime directory (default: /run/podwire).
    pub runtime: PathBuf,
}

impl PodwirePaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let runtime = root.join("run");
        Self { root, runtime }
    }

    /// Directory holding the mirrored resource records.
    #[must_use]
    pub fn store(&self) -> PathBuf {
        self.root.join("store")
    }

    /// Default location of the daemon configuration file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root.join("podwired.toml")
    }

    /// PID file of the daemon.
    #[must_use]
    pub fn pid_file(&self) -> PathBuf {
        self.runtime.join("podwired.pid")
    }

    /// Create all necessary directories.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.runtime)?;
        std::fs::create_dir_all(self.store())?;
        Ok(())
    }
}

impl Default for PodwirePaths {
    fn default() -> Self {
        Self {
            root: PODWIRE_ROOT.clone(),
            runtime: PODWIRE_RUNTIME_DIR.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_root() {
        let paths = PodwirePaths::with_root("/tmp/podwire-test");
        assert_eq!(paths.store(), PathBuf::from("/tmp/podwire-test/store"));
        assert_eq!(paths.runtime, PathBuf::from("/tmp/podwire-test/run"));
        assert_eq!(
            paths.pid_file(),
            PathBuf::from("/tmp/podwire-test/run/podwired.pid")
        );
    }

    #[test]
    fn config_file_under_root() {
        let paths = PodwirePaths::with_root("/etc/podwire");
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/etc/podwire/podwired.toml")
        );
    }

    #[test]
    fn create_dirs_builds_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PodwirePaths::with_root(dir.path().join("podwire"));
        paths.create_dirs().unwrap();
        assert!(paths.store().is_dir());
        assert!(paths.runtime.is_dir());
    }
}
