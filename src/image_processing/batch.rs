use rayon::ThreadPoolBuilder;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{info, warn};
use walkdir::WalkDir;

use super::convert::convert_one;
use super::paths::{remove_original, resolve_output_path};
use super::{ConversionConfig, ConversionResult, RunSummary};
use crate::error::ConvertError;
use crate::utils::has_valid_extension;

/// Extensions picked up during discovery (matched case-insensitively)
pub const SOURCE_EXTENSIONS: &[&str] = &["avif"];

/// A discovered source file and its size in bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Files converted sequentially by one worker
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Batch {
    pub files: Vec<SourceFile>,
    pub bytes: u64,
}

/// Cooperative cancellation flag shared between the caller and the workers.
///
/// Workers check it before taking a batch and before each file; files not
/// started when it trips are reported as cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Passed to the progress callback after every finished file
#[derive(Debug)]
pub struct ProgressEvent<'a> {
    pub completed: usize,
    pub total: usize,
    pub result: &'a ConversionResult,
}

/// Completed/total counter shared by all workers
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    pub completed: usize,
    pub total: usize,
}

/// Progress tracking for one run
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            state: Mutex::new(ProgressState { completed: 0, total }),
            start_time: Instant::now(),
        }
    }

    /// Count one finished file and notify `progress` while still holding the
    /// lock, so callbacks observe a strictly increasing `completed`.
    pub fn record<P>(&self, result: &ConversionResult, progress: &P) -> ProgressState
    where
        P: Fn(&ProgressEvent<'_>),
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.completed += 1;
        progress(&ProgressEvent {
            completed: state.completed,
            total: state.total,
            result,
        });
        *state
    }

    pub fn snapshot(&self) -> ProgressState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Files per second since the tracker was created
    pub fn items_per_second(&self) -> f64 {
        let completed = self.snapshot().completed;
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();
        if completed == 0 || elapsed_secs == 0.0 {
            return 0.0;
        }
        completed as f64 / elapsed_secs
    }
}

/// Find every source file under `input_dir`, in lexicographic order
pub fn discover_sources(input_dir: &Path, recursive: bool) -> Vec<SourceFile> {
    let walker = WalkDir::new(input_dir)
        .follow_links(false)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    let mut sources = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || !has_valid_extension(path, SOURCE_EXTENSIONS) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        sources.push(SourceFile {
            path: path.to_path_buf(),
            size,
        });
    }

    sources.sort_by(|a, b| a.path.cmp(&b.path));
    sources
}

/// Group files largest-first into batches of at most `threshold` bytes.
///
/// A file bigger than the threshold always gets a batch of its own.
pub fn partition_batches(mut files: Vec<SourceFile>, threshold: u64) -> Vec<Batch> {
    // Stable sort: equal sizes keep discovery order
    files.sort_by(|a, b| b.size.cmp(&a.size));

    let mut batches = Vec::new();
    let mut current = Batch::default();

    for file in files {
        if !current.files.is_empty() && current.bytes.saturating_add(file.size) > threshold {
            batches.push(std::mem::take(&mut current));
        }
        current.bytes = current.bytes.saturating_add(file.size);
        current.files.push(file);
    }

    if !current.files.is_empty() {
        batches.push(current);
    }

    batches
}

/// Convert every source file under `config.input_dir`.
///
/// Only a missing or invalid input directory (or a worker pool that cannot be
/// built) is returned as an error; per-file failures are counted in the summary.
pub fn convert_all<P>(config: &ConversionConfig, progress: P) -> Result<RunSummary, ConvertError>
where
    P: Fn(&ProgressEvent<'_>) + Sync,
{
    let start = Instant::now();
    let input_dir = config.input_dir.as_path();

    if !input_dir.exists() {
        return Err(ConvertError::InputDirMissing(input_dir.to_path_buf()));
    }
    if !input_dir.is_dir() {
        return Err(ConvertError::InputNotDirectory(input_dir.to_path_buf()));
    }

    let sources = discover_sources(input_dir, config.recursive);
    if sources.is_empty() {
        info!(input = %input_dir.display(), "No AVIF files found");
        return Ok(RunSummary {
            duration: start.elapsed(),
            ..RunSummary::default()
        });
    }

    let total = sources.len();
    let batches = partition_batches(sources, config.batch_threshold);
    let workers = config.max_workers.max(1).min(batches.len());

    info!(
        input = %input_dir.display(),
        files = total,
        batches = batches.len(),
        workers,
        "Starting conversion"
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("avif2png-worker-{}", i))
        .build()?;

    let tracker = ProgressTracker::new(total);
    let results: Mutex<Vec<ConversionResult>> = Mutex::new(Vec::with_capacity(total));
    let next_batch = AtomicUsize::new(0);

    // Workers pull batches in order, so the largest ones start first
    pool.scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|_| loop {
                if config.cancel.is_cancelled() {
                    break;
                }
                let index = next_batch.fetch_add(1, Ordering::SeqCst);
                let Some(batch) = batches.get(index) else {
                    break;
                };
                run_batch(batch, config, &tracker, &results, &progress);
            });
        }
    });

    let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
    results.sort_by(|a, b| a.source.cmp(&b.source));

    let succeeded = results.iter().filter(|r| r.succeeded).count();
    let failed = results.len() - succeeded;
    let cancelled = total - results.len();

    let summary = RunSummary {
        succeeded,
        failed,
        cancelled,
        results,
        duration: start.elapsed(),
    };

    info!(
        succeeded,
        failed,
        cancelled,
        files_per_second = tracker.items_per_second(),
        elapsed_ms = summary.duration.as_millis() as u64,
        "Conversion finished"
    );

    Ok(summary)
}

fn run_batch<P>(
    batch: &Batch,
    config: &ConversionConfig,
    tracker: &ProgressTracker,
    results: &Mutex<Vec<ConversionResult>>,
    progress: &P,
) where
    P: Fn(&ProgressEvent<'_>),
{
    for file in &batch.files {
        if config.cancel.is_cancelled() {
            return;
        }

        let output = resolve_output_path(
            &file.path,
            &config.input_dir,
            config.output_dir.as_deref(),
            config.recursive,
        );
        let result = convert_one(&file.path, &output, &config.specs, config.check_bit_depth);

        if result.succeeded && config.remove_originals {
            remove_original(&file.path);
        }

        tracker.record(&result, progress);
        results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_processing::bit_depth::measure_bit_depth;
    use crate::image_processing::{
        DitherMode, ImageType, QuantizationSpec, QuantizeMethod, RenderAction, TypeSpecs,
    };
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    const MIB: u64 = 1024 * 1024;

    fn source(name: &str, size: u64) -> SourceFile {
        SourceFile {
            path: PathBuf::from(name),
            size,
        }
    }

    fn write_source(path: &Path, color: [u8; 3]) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        RgbImage::from_pixel(32, 32, Rgb(color))
            .save_with_format(path, image::ImageFormat::Png)
            .unwrap();
    }

    fn no_progress(_: &ProgressEvent<'_>) {}

    #[test]
    fn test_partition_isolates_oversized_file() {
        let files = vec![
            source("a.avif", MIB),
            source("big.avif", 6 * MIB),
            source("b.avif", MIB),
            source("c.avif", MIB),
        ];
        let batches = partition_batches(files, 5 * MIB);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].files, vec![source("big.avif", 6 * MIB)]);
        assert_eq!(batches[1].files.len(), 3);
        assert_eq!(batches[1].bytes, 3 * MIB);
    }

    #[test]
    fn test_partition_respects_threshold_largest_first() {
        let files = vec![
            source("1.avif", 2 * MIB),
            source("2.avif", 3 * MIB),
            source("3.avif", 4 * MIB),
            source("4.avif", MIB),
        ];
        let batches = partition_batches(files, 5 * MIB);

        let sizes: Vec<Vec<u64>> = batches
            .iter()
            .map(|b| b.files.iter().map(|f| f.size / MIB).collect())
            .collect();
        assert_eq!(sizes, vec![vec![4], vec![3, 2], vec![1]]);
        assert!(batches.iter().all(|b| b.bytes <= 5 * MIB));

        assert!(partition_batches(Vec::new(), 5 * MIB).is_empty());
    }

    #[test]
    fn test_progress_tracker_counts() {
        let tracker = ProgressTracker::new(3);
        assert_eq!(tracker.snapshot(), ProgressState { completed: 0, total: 3 });
        assert_eq!(tracker.items_per_second(), 0.0);

        let result = ConversionResult::failure(Path::new("x.avif"), Path::new("x.png"), None, "boom");
        let seen = Mutex::new(Vec::new());
        for _ in 0..3 {
            tracker.record(&result, &|event: &ProgressEvent<'_>| {
                seen.lock().unwrap().push((event.completed, event.total));
            });
        }

        assert_eq!(seen.into_inner().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(tracker.snapshot().completed, 3);
    }

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_missing_input_dir_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = ConversionConfig::new(dir.path().join("nope"));
        let err = convert_all(&config, no_progress).unwrap_err();
        assert!(matches!(err, ConvertError::InputDirMissing(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let file = dir.path().join("file.avif");
        std::fs::write(&file, b"x").unwrap();
        let err = convert_all(&ConversionConfig::new(&file), no_progress).unwrap_err();
        assert!(matches!(err, ConvertError::InputNotDirectory(_)));
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        let out = dir.path().join("out");

        let mut config = ConversionConfig::new(dir.path());
        config.output_dir = Some(out.clone());
        let summary = convert_all(&config, no_progress).unwrap();

        assert_eq!((summary.succeeded, summary.failed, summary.cancelled), (0, 0, 0));
        assert!(!out.exists());
    }

    #[test]
    fn test_gray_and_red_scenario() {
        let dir = TempDir::new().unwrap();
        write_source(&dir.path().join("gray.avif"), [128, 128, 128]);
        write_source(&dir.path().join("red.avif"), [255, 0, 0]);
        let out = dir.path().join("out");

        let mut config = ConversionConfig::new(dir.path());
        config.output_dir = Some(out.clone());
        config.check_bit_depth = true;
        let summary = convert_all(&config, no_progress).unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);

        let gray = measure_bit_depth(&out.join("gray.png")).unwrap();
        assert!(gray.colors <= 16);
        assert!(gray.palette);

        let red = measure_bit_depth(&out.join("red.png")).unwrap();
        assert!(!red.palette);

        let red_result = summary.results.iter().find(|r| r.file_name() == "red.avif").unwrap();
        assert_eq!(red_result.image_type, Some(ImageType::Color));
        assert_eq!(red_result.action, Some(RenderAction::Unmodified));
        assert!(red_result.bit_depth.is_some());

        // Originals are kept unless removal is requested
        assert!(dir.path().join("gray.avif").exists());
        assert!(dir.path().join("red.avif").exists());
    }

    #[test]
    fn test_progress_reaches_total_exactly_once() {
        let dir = TempDir::new().unwrap();
        for i in 0..7 {
            write_source(&dir.path().join(format!("img_{}.avif", i)), [i * 30, i * 30, i * 30]);
        }
        std::fs::write(dir.path().join("corrupt.avif"), b"garbage").unwrap();

        let mut config = ConversionConfig::new(dir.path());
        config.max_workers = 3;
        config.batch_threshold = 1; // one file per batch
        let events = Mutex::new(Vec::new());
        let summary = convert_all(&config, |event: &ProgressEvent<'_>| {
            events.lock().unwrap().push((event.completed, event.total));
        })
        .unwrap();

        assert_eq!(summary.succeeded + summary.failed, 8);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures().next().unwrap().file_name(), "corrupt.avif");

        let events = events.into_inner().unwrap();
        let completed: Vec<usize> = events.iter().map(|(c, _)| *c).collect();
        assert_eq!(completed, (1..=8).collect::<Vec<_>>());
        assert!(events.iter().all(|(_, total)| *total == 8));
        assert_eq!(events.iter().filter(|(c, t)| c == t).count(), 1);
    }

    #[test]
    fn test_remove_originals() {
        let dir = TempDir::new().unwrap();
        let keep = dir.path().join("keep");
        let remove = dir.path().join("remove");
        write_source(&keep.join("a.avif"), [10, 10, 10]);
        write_source(&remove.join("a.avif"), [10, 10, 10]);
        std::fs::write(remove.join("broken.avif"), b"garbage").unwrap();

        let summary = convert_all(&ConversionConfig::new(&keep), no_progress).unwrap();
        assert_eq!(summary.succeeded, 1);
        assert!(keep.join("a.avif").exists());
        assert!(keep.join("a.png").exists());

        let mut config = ConversionConfig::new(&remove);
        config.remove_originals = true;
        let summary = convert_all(&config, no_progress).unwrap();
        assert_eq!((summary.succeeded, summary.failed), (1, 1));
        assert!(!remove.join("a.avif").exists());
        assert!(remove.join("a.png").exists());
        // Failed conversions never lose their source
        assert!(remove.join("broken.avif").exists());
    }

    #[test]
    fn test_recursive_mirrors_tree() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        let out = dir.path().join("out");
        write_source(&input.join("top.avif"), [0, 0, 0]);
        write_source(&input.join("vol1/ch1/page.AVIF"), [0, 0, 255]);

        let mut config = ConversionConfig::new(&input);
        config.output_dir = Some(out.clone());
        config.recursive = true;
        let summary = convert_all(&config, no_progress).unwrap();
        assert_eq!(summary.succeeded, 2);
        assert!(out.join("top.png").exists());
        assert!(out.join("vol1/ch1/page.png").exists());

        // Non-recursive runs ignore nested files
        let flat_out = dir.path().join("flat");
        let mut config = ConversionConfig::new(&input);
        config.output_dir = Some(flat_out.clone());
        let summary = convert_all(&config, no_progress).unwrap();
        assert_eq!(summary.total(), 1);
        assert!(flat_out.join("top.png").exists());
        assert!(!flat_out.join("page.png").exists());
    }

    #[test]
    fn test_recursive_without_output_writes_beside_source() {
        let dir = TempDir::new().unwrap();
        write_source(&dir.path().join("a/b/c.avif"), [1, 2, 3]);

        let mut config = ConversionConfig::new(dir.path());
        config.recursive = true;
        let summary = convert_all(&config, no_progress).unwrap();
        assert_eq!(summary.succeeded, 1);
        assert!(dir.path().join("a/b/c.png").exists());
    }

    #[test]
    fn test_per_type_bit_depth_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gradient.avif");
        RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 90]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        let mut config = ConversionConfig::new(dir.path());
        config.check_bit_depth = true;
        config.specs = TypeSpecs {
            color: QuantizationSpec::new(Some(3), QuantizeMethod::MedianCut, DitherMode::None),
            ..TypeSpecs::default()
        };
        let summary = convert_all(&config, no_progress).unwrap();

        let result = &summary.results[0];
        assert!(result.succeeded);
        assert!(result.bit_depth.unwrap().colors <= 8);
        assert!(result.bit_depth.unwrap().bits <= 3);
    }

    #[test]
    fn test_invalid_bit_depth_counts_as_failure() {
        let dir = TempDir::new().unwrap();
        write_source(&dir.path().join("gray.avif"), [50, 50, 50]);
        write_source(&dir.path().join("red.avif"), [255, 0, 0]);

        let mut config = ConversionConfig::new(dir.path());
        config.specs.gray = QuantizationSpec::new(Some(0), QuantizeMethod::FastOctree, DitherMode::None);
        let summary = convert_all(&config, no_progress).unwrap();

        assert_eq!((summary.succeeded, summary.failed), (1, 1));
        assert!(!dir.path().join("gray.png").exists());
        assert!(dir.path().join("red.png").exists());
    }

    #[test]
    fn test_cancelled_run_processes_nothing() {
        let dir = TempDir::new().unwrap();
        for i in 0..4 {
            write_source(&dir.path().join(format!("{}.avif", i)), [9, 9, 9]);
        }

        let config = ConversionConfig::new(dir.path());
        config.cancel.cancel();
        let summary = convert_all(&config, no_progress).unwrap();

        assert_eq!((summary.succeeded, summary.failed, summary.cancelled), (0, 0, 4));
        assert_eq!(summary.total(), 4);
        assert!(!dir.path().join("0.png").exists());
    }

    #[test]
    fn test_cancel_from_progress_callback() {
        let dir = TempDir::new().unwrap();
        for i in 0..6 {
            write_source(&dir.path().join(format!("{}.avif", i)), [9, 9, 9]);
        }

        let mut config = ConversionConfig::new(dir.path());
        config.max_workers = 1;
        let token = config.cancel.clone();
        let summary = convert_all(&config, |event: &ProgressEvent<'_>| {
            if event.completed == 2 {
                token.cancel();
            }
        })
        .unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.cancelled, 4);
        assert_eq!(summary.total(), 6);
    }
}
