use jwalk::{DirEntry, Parallelism, WalkDir};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::ScanConfig;
use crate::node::ScanResult;
use crate::render::format_size;
use crate::tree::FileTree;

const REPORT_INTERVAL_MS: u64 = 100;

/// Directory chain of Docker Desktop's VM disk image on macOS. Its apparent
/// size is huge and sparse, so it is left out of scans.
const DOCKER_VM_COMPONENTS: [&str; 5] = ["Library", "Containers", "com.docker.docker", "Data", "vms"];

pub type ProgressReporter = Arc<dyn Fn(ScanProgress) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Path does not exist: {0}")]
    InvalidPath(String),

    #[error("Cannot resolve {path}: {source}")]
    Resolve {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Scan thread stopped before reporting a result")]
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Directory entries are still being listed
    Walking,
    /// Listing is done; metadata is being read
    Measuring,
}

/// Running totals of a scan. `file_count` and `total_size` grow toward the
/// values of the final [`ScanResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub entries: u64,
    pub measured: u64,
    pub file_count: u64,
    pub total_size: u64,
}

impl ScanProgress {
    /// Share of listed entries already measured. Unknown while walking.
    pub fn fraction(&self) -> Option<f32> {
        match self.phase {
            ScanPhase::Walking => None,
            ScanPhase::Measuring if self.entries == 0 => Some(1.0),
            ScanPhase::Measuring => {
                Some((self.measured as f32 / self.entries as f32).clamp(0.0, 1.0))
            }
        }
    }

    /// One-line status text for the viewers.
    pub fn summary(&self) -> String {
        match self.fraction() {
            None => format!("Listing... {} entries", self.entries),
            Some(fraction) => format!(
                "Measuring {:.0}%: {} files, {}",
                fraction * 100.0,
                self.file_count,
                format_size(self.total_size)
            ),
        }
    }
}

/// Counters shared by the walk and the measuring threads.
struct Tally {
    reporter: Option<ProgressReporter>,
    started: Instant,
    entries: AtomicU64,
    measured: AtomicU64,
    file_count: AtomicU64,
    total_size: AtomicU64,
    last_report_ms: AtomicU64,
}

impl Tally {
    fn new(reporter: Option<ProgressReporter>) -> Self {
        Self {
            reporter,
            started: Instant::now(),
            entries: AtomicU64::new(0),
            measured: AtomicU64::new(0),
            file_count: AtomicU64::new(0),
            total_size: AtomicU64::new(0),
            last_report_ms: AtomicU64::new(0),
        }
    }

    fn add_file(&self, size: u64) {
        self.file_count.fetch_add(1, Ordering::Relaxed);
        self.total_size.fetch_add(size, Ordering::Relaxed);
    }

    fn snapshot(&self, phase: ScanPhase) -> ScanProgress {
        ScanProgress {
            phase,
            entries: self.entries.load(Ordering::Relaxed),
            measured: self.measured.load(Ordering::Relaxed),
            file_count: self.file_count.load(Ordering::Relaxed),
            total_size: self.total_size.load(Ordering::Relaxed),
        }
    }

    fn report(&self, phase: ScanPhase) {
        if let Some(reporter) = self.reporter.as_ref() {
            reporter(self.snapshot(phase));
        }
    }

    /// Report at most once per interval across all threads.
    fn report_throttled(&self, phase: ScanPhase) {
        if self.reporter.is_none() {
            return;
        }
        let now_ms = self.started.elapsed().as_millis() as u64;
        let last = self.last_report_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < REPORT_INTERVAL_MS {
            return;
        }
        if self
            .last_report_ms
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.report(phase);
        }
    }
}

/// One measured file system entry
#[derive(Debug, Clone)]
struct Record {
    path: PathBuf,
    size: u64,
    is_dir: bool,
}

impl Record {
    fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        let is_dir = metadata.is_dir();
        Self {
            path,
            size: if is_dir { 0 } else { metadata.len() },
            is_dir,
        }
    }
}

/// Parallel file system crawler producing [`ScanResult`] snapshots
#[derive(Debug, Clone, Default)]
pub struct FileCrawler {
    config: ScanConfig,
}

impl FileCrawler {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn scan<P: AsRef<Path>>(&self, root: P) -> Result<ScanResult, ScanError> {
        self.scan_with_progress(root, None)
    }

    /// Measure everything under `root`. A file root yields a single leaf.
    /// Entries that cannot be listed or measured are skipped.
    pub fn scan_with_progress<P: AsRef<Path>>(
        &self,
        root: P,
        reporter: Option<ProgressReporter>,
    ) -> Result<ScanResult, ScanError> {
        let requested = root.as_ref();
        if !requested.exists() {
            return Err(ScanError::InvalidPath(requested.display().to_string()));
        }
        let resolve_err = |source| ScanError::Resolve {
            path: requested.display().to_string(),
            source,
        };
        let root_path = std::fs::canonicalize(requested).map_err(resolve_err)?;
        let root_metadata = std::fs::metadata(&root_path).map_err(resolve_err)?;

        tracing::info!("Scanning {}", root_path.display());
        let tally = Tally::new(reporter);

        let records = if root_metadata.is_dir() {
            let entries = self.walk(&root_path, &tally);
            tally.report(ScanPhase::Measuring);
            measure(&entries, &tally)
        } else {
            tally.entries.store(1, Ordering::Relaxed);
            tally.measured.store(1, Ordering::Relaxed);
            tally.add_file(root_metadata.len());
            vec![Record::from_metadata(root_path.clone(), &root_metadata)]
        };
        tally.report(ScanPhase::Measuring);

        let mut tree = FileTree::new(&root_path);
        for record in records {
            tree.upsert_node(record.path, record.size, record.is_dir);
        }
        tree.calculate_sizes();

        let result = ScanResult {
            root: tree.to_treemap_node(),
            scan_time_ms: tally.started.elapsed().as_millis() as u64,
            file_count: tree.file_count(),
            total_size: tree.total_size(),
        };

        tracing::info!(
            "Scanned {} in {}ms: {} files, {}",
            root_path.display(),
            result.scan_time_ms,
            result.file_count,
            format_size(result.total_size)
        );

        Ok(result)
    }

    /// List every entry below `root`, including `root` itself.
    fn walk(&self, root: &Path, tally: &Tally) -> Vec<DirEntry<((), ())>> {
        let skip_docker_vms = self.config.skip_docker_vms;

        WalkDir::new(root)
            .skip_hidden(!self.config.include_hidden)
            .parallelism(Parallelism::RayonNewPool(worker_threads()))
            .process_read_dir(move |_, _, _, children| {
                if skip_docker_vms {
                    children.retain(|child| {
                        child
                            .as_ref()
                            .map_or(true, |entry| !is_docker_vm_path(&entry.path()))
                    });
                }
            })
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => {
                    tally.entries.fetch_add(1, Ordering::Relaxed);
                    tally.report_throttled(ScanPhase::Walking);
                    Some(entry)
                }
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Read metadata for all listed entries on a dedicated rayon pool.
fn measure(entries: &[DirEntry<((), ())>], tally: &Tally) -> Vec<Record> {
    let work = || {
        entries
            .par_iter()
            .filter_map(|entry| {
                tally.measured.fetch_add(1, Ordering::Relaxed);
                let path = entry.path();
                let record = match entry.metadata() {
                    Ok(metadata) => Record::from_metadata(path, &metadata),
                    Err(e) => {
                        tracing::debug!("No metadata for {}: {}", path.display(), e);
                        return None;
                    }
                };
                if !record.is_dir {
                    tally.add_file(record.size);
                }
                tally.report_throttled(ScanPhase::Measuring);
                Some(record)
            })
            .collect::<Vec<_>>()
    };

    match ThreadPoolBuilder::new().num_threads(worker_threads()).build() {
        Ok(pool) => pool.install(work),
        Err(e) => {
            tracing::warn!("Falling back to the global thread pool: {}", e);
            work()
        }
    }
}

/// Metadata reads block on I/O, so use more threads than cores.
fn worker_threads() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    (cores * 2).clamp(4, 64)
}

fn is_docker_vm_path(path: &Path) -> bool {
    let parts: Vec<&str> = path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    parts
        .windows(DOCKER_VM_COMPONENTS.len())
        .any(|window| window == DOCKER_VM_COMPONENTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use std::sync::Mutex;

    fn temp_root() -> tempfile::TempDir {
        // Default temp names start with a dot, which would count as hidden
        tempfile::Builder::new()
            .prefix("diskmap-scan")
            .tempdir()
            .expect("create temp dir")
    }

    fn create_test_dir() -> tempfile::TempDir {
        let dir = temp_root();
        let sub = dir.path().join("subdir");
        fs::create_dir_all(&sub).unwrap();
        File::create(sub.join("a.txt")).unwrap().write_all(b"hello").unwrap();
        File::create(dir.path().join("b.txt")).unwrap().write_all(b"world!").unwrap();
        dir
    }

    #[test]
    fn test_scan_temp_dir() {
        let dir = create_test_dir();
        let result = FileCrawler::default().scan(dir.path()).unwrap();

        assert_eq!(result.file_count, 2);
        assert_eq!(result.total_size, 11);
        assert_eq!(result.root.size, 11.0);
        assert!(result.root.is_dir);
        assert_eq!(result.root.children.len(), 2);

        let subdir = result
            .root
            .children
            .iter()
            .find(|c| c.name == "subdir")
            .unwrap();
        assert!(subdir.is_dir);
        assert_eq!(subdir.size, 5.0);
    }

    #[test]
    fn test_scan_single_file() {
        let dir = temp_root();
        let file = dir.path().join("one.bin");
        File::create(&file).unwrap().write_all(&[7u8; 1234]).unwrap();

        let result = FileCrawler::default().scan(&file).unwrap();

        assert_eq!(result.file_count, 1);
        assert_eq!(result.total_size, 1234);
        assert_eq!(result.root.name, "one.bin");
        assert_eq!(result.root.size, 1234.0);
        assert!(!result.root.is_dir);
        assert!(result.root.children.is_empty());
    }

    #[test]
    fn test_scan_empty_dir() {
        let dir = temp_root();
        let result = FileCrawler::default().scan(dir.path()).unwrap();

        assert_eq!(result.file_count, 0);
        assert_eq!(result.total_size, 0);
        assert!(result.root.is_dir);
        assert!(result.root.children.is_empty());
    }

    #[test]
    fn test_scan_invalid_path() {
        let err = FileCrawler::default()
            .scan("/nonexistent_diskmap_12345_folder")
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidPath(_)));
    }

    #[test]
    fn test_hidden_entries_respect_config() {
        let dir = create_test_dir();
        File::create(dir.path().join(".hidden")).unwrap().write_all(b"xyz").unwrap();

        let with_hidden = FileCrawler::default().scan(dir.path()).unwrap();
        assert_eq!(with_hidden.total_size, 14);

        let config = ScanConfig {
            include_hidden: false,
            ..ScanConfig::default()
        };
        let without_hidden = FileCrawler::new(config).scan(dir.path()).unwrap();
        assert_eq!(without_hidden.total_size, 11);
    }

    #[test]
    fn test_last_progress_matches_result() {
        let dir = create_test_dir();
        let events: Arc<Mutex<Vec<ScanProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let reporter: ProgressReporter = Arc::new(move |p| sink.lock().unwrap().push(p));

        let result = FileCrawler::default()
            .scan_with_progress(dir.path(), Some(reporter))
            .unwrap();

        let events = events.lock().unwrap();
        let last = events.last().expect("at least one progress event");
        assert_eq!(last.phase, ScanPhase::Measuring);
        assert_eq!(last.fraction(), Some(1.0));
        assert_eq!(last.file_count, result.file_count);
        assert_eq!(last.total_size, result.total_size);
        // root, subdir and two files
        assert_eq!(last.entries, 4);
    }

    #[test]
    fn test_progress_summary() {
        let walking = ScanProgress {
            phase: ScanPhase::Walking,
            entries: 12,
            measured: 0,
            file_count: 0,
            total_size: 0,
        };
        assert_eq!(walking.fraction(), None);
        assert_eq!(walking.summary(), "Listing... 12 entries");

        let measuring = ScanProgress {
            phase: ScanPhase::Measuring,
            measured: 6,
            file_count: 5,
            total_size: 2048,
            ..walking
        };
        assert_eq!(measuring.fraction(), Some(0.5));
        assert_eq!(measuring.summary(), "Measuring 50%: 5 files, 2.0 KB");
    }

    #[test]
    fn test_docker_vm_path_detection() {
        let docker_vm_file = Path::new(
            "/Users/demo/Library/Containers/com.docker.docker/Data/vms/0/data/Docker.raw",
        );
        let normal_file = Path::new("/Users/demo/Documents/test.txt");
        let scattered = Path::new("/Library/x/Containers/com.docker.docker/Data/vms");

        assert!(is_docker_vm_path(docker_vm_file));
        assert!(!is_docker_vm_path(normal_file));
        assert!(!is_docker_vm_path(scattered));
    }
}
