//! Worker discovery and loading

use crate::description::WorkerDescription;
use crate::error::HostError;
use crate::library::WorkerLibrary;
use anyhow::Result;
use directories::BaseDirs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info};

/// Environment variable naming the worker library to load
pub const WORKER_LIBRARY_ENV: &str = "WORKER_LIBRARY_FILE";

/// Library loaded when [`WORKER_LIBRARY_ENV`] is unset
pub const DEFAULT_WORKER_LIBRARY: &str = "libworker.so";

/// Path of the worker library selected by the environment
pub fn library_path_from_env() -> PathBuf {
    match std::env::var(WORKER_LIBRARY_ENV) {
        Ok(value) if !value.trim().is_empty() => expand_tilde(Path::new(value.trim())),
        _ => PathBuf::from(DEFAULT_WORKER_LIBRARY),
    }
}

/// Statistics from scanning a worker directory
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    /// Library files found
    pub total: usize,
    /// Libraries accepted as workers
    pub loaded: usize,
    /// Libraries rejected
    pub failed: usize,
}

/// A worker accepted into a catalog
pub struct LoadedWorker {
    pub description: WorkerDescription,
    pub library: WorkerLibrary,
}

impl LoadedWorker {
    pub fn name(&self) -> &str {
        &self.description.name
    }

    pub fn path(&self) -> &Path {
        self.library.path()
    }
}

impl std::fmt::Debug for LoadedWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedWorker")
            .field("path", &self.library.path())
            .field("name", &self.description.name)
            .field("version", &self.description.version)
            .finish()
    }
}

/// Set of workers with distinct names
#[derive(Debug, Default)]
pub struct WorkerCatalog {
    workers: Vec<LoadedWorker>,
}

impl WorkerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every worker library directly inside `dir`
    ///
    /// Scans the directory for dynamic library files (.dylib on macOS, .so on Linux,
    /// .dll on Windows) and attempts to load each one as a worker. A missing
    /// directory yields empty statistics.
    pub fn load_directory(&mut self, dir: &Path) -> Result<LoadStats> {
        let mut stats = LoadStats::default();

        if !dir.exists() {
            info!("Worker directory does not exist: {}", dir.display());
            return Ok(stats);
        }

        if !dir.is_dir() {
            return Err(HostError::NotADirectory(dir.to_path_buf()).into());
        }

        info!("Scanning worker directory: {}", dir.display());

        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| Self::is_worker_library(p))
            .collect();
        paths.sort();

        for path in paths {
            stats.total += 1;
            match self.load_worker(&path) {
                Ok(name) => {
                    stats.loaded += 1;
                    info!("Loaded worker: {} ({})", name, path.display());
                }
                Err(e) => {
                    stats.failed += 1;
                    error!("Failed to load worker {}: {}", path.display(), e);
                }
            }
        }

        Ok(stats)
    }

    /// Load a single worker library and add it to the catalog
    pub fn load_worker(&mut self, path: &Path) -> Result<String> {
        let library = WorkerLibrary::load(path)?;
        self.insert(library)
    }

    /// Add an already loaded library, rejecting a name the catalog already holds
    pub fn insert(&mut self, library: WorkerLibrary) -> Result<String> {
        let description = library.describe()?;
        debug!(
            "Worker '{}' {} passed descriptor checks",
            description.name, description.version
        );

        if self.get(&description.name).is_some() {
            return Err(HostError::DuplicateWorker(description.name).into());
        }

        library.ensure_initialized();
        let name = description.name.clone();
        self.workers.push(LoadedWorker {
            description,
            library,
        });
        Ok(name)
    }

    /// Check if a path is a worker library based on extension
    fn is_worker_library(path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }

        let Some(ext) = path.extension() else {
            return false;
        };

        #[cfg(target_os = "macos")]
        let expected = "dylib";

        #[cfg(target_os = "windows")]
        let expected = "dll";

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let expected = "so";

        ext == expected
    }

    pub fn workers(&self) -> &[LoadedWorker] {
        &self.workers
    }

    pub fn get(&self, name: &str) -> Option<&LoadedWorker> {
        self.workers.iter().find(|w| w.name() == name)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

/// Resolve a leading `~` component against the user's home directory.
/// Paths are returned unchanged when no home directory can be determined.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(components.as_path()))
            .unwrap_or_else(|| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_is_worker_library() {
        // The file check comes first, so missing paths are never libraries
        assert!(!WorkerCatalog::is_worker_library(Path::new(
            "/tmp/nonexistent/libworker.so"
        )));

        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("worker.txt");
        std::fs::write(&text, b"").unwrap();
        assert!(!WorkerCatalog::is_worker_library(&text));
    }

    #[test]
    fn test_expand_tilde() {
        let Some(dirs) = BaseDirs::new() else {
            return;
        };
        let home = dirs.home_dir();

        assert_eq!(home.join("workers"), expand_tilde(Path::new("~/workers")));
        assert_eq!(home, expand_tilde(Path::new("~")));
        assert_eq!(
            home.join("a").join("b.so"),
            expand_tilde(Path::new("~/a/b.so"))
        );
    }

    #[test]
    fn test_expand_tilde_leaves_other_paths() {
        assert_eq!(
            Path::new("/absolute/path"),
            expand_tilde(Path::new("/absolute/path"))
        );
        assert_eq!(Path::new("~user/lib"), expand_tilde(Path::new("~user/lib")));
        assert_eq!(Path::new("lib/~/x"), expand_tilde(Path::new("lib/~/x")));
    }

    #[test]
    #[serial]
    fn test_library_path_from_env() {
        unsafe {
            std::env::remove_var(WORKER_LIBRARY_ENV);
        }
        assert_eq!(PathBuf::from(DEFAULT_WORKER_LIBRARY), library_path_from_env());

        unsafe {
            std::env::set_var(WORKER_LIBRARY_ENV, "/opt/workers/libcopy.so");
        }
        assert_eq!(PathBuf::from("/opt/workers/libcopy.so"), library_path_from_env());

        unsafe {
            std::env::remove_var(WORKER_LIBRARY_ENV);
        }
    }

    #[test]
    fn test_missing_directory_yields_empty_stats() {
        let mut catalog = WorkerCatalog::new();
        let stats = catalog
            .load_directory(Path::new("/nonexistent/workerlink/workers"))
            .unwrap();
        assert_eq!(LoadStats::default(), stats);
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = WorkerCatalog::new().load_directory(file.path()).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_broken_library_counts_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let name = if cfg!(target_os = "macos") {
            "libbroken.dylib"
        } else if cfg!(target_os = "windows") {
            "broken.dll"
        } else {
            "libbroken.so"
        };
        std::fs::write(dir.path().join(name), b"not a shared object").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let mut catalog = WorkerCatalog::new();
        let stats = catalog.load_directory(dir.path()).unwrap();
        assert_eq!(1, stats.total);
        assert_eq!(0, stats.loaded);
        assert_eq!(1, stats.failed);
    }
}
