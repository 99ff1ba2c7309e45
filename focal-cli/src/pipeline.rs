//! One manifest run: walk, read, detect, merge, write.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use focal_core::FaceDetector;
use focal_utils::{AppSettings, absolutize, timing_guard};
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::{
    cache::{FileStamp, ManifestCache, settings_fingerprint},
    detect::{DetectionGate, detect_focus},
    dimensions::read_dimensions,
    error::ManifestError,
    manifest::{AssetPath, Manifest, ManifestEntry},
    walker::AssetWalker,
};

/// Lifecycle of a [`ManifestPipeline`]. A retry is a fresh pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Done,
    Failed,
}

/// Counts reported at the end of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Image files found by the walker.
    pub discovered: usize,
    /// Entries written to the manifest.
    pub processed: usize,
    /// Files left out of the manifest.
    pub skipped: usize,
    /// Entries written without focus because detection failed or timed out.
    pub detection_failures: usize,
    /// Entries reused from the cache.
    pub cache_hits: usize,
    pub output_path: PathBuf,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} of {} image(s), skipped {}",
            self.processed, self.discovered, self.skipped
        )?;
        if self.detection_failures > 0 {
            write!(f, ", {} without focus after detection errors", self.detection_failures)?;
        }
        if self.cache_hits > 0 {
            write!(f, ", {} from cache", self.cache_hits)?;
        }
        write!(f, "\nManifest written to {}", self.output_path.display())
    }
}

/// Resolved inputs of a run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub model_path: PathBuf,
    pub asset_root: PathBuf,
    pub output_path: PathBuf,
    pub cache_path: Option<PathBuf>,
    pub extensions: Vec<String>,
    /// `0` uses one worker per core.
    pub workers: usize,
    pub detection_timeout: Option<Duration>,
    /// Cache fingerprint of the detection settings.
    pub fingerprint: String,
}

impl PipelineOptions {
    /// Resolve relative paths in `settings` against the current directory.
    pub fn from_settings(settings: &AppSettings) -> Result<Self> {
        let manifest = &settings.manifest;
        Ok(Self {
            model_path: absolutize(settings.model_path())?,
            asset_root: absolutize(&manifest.asset_root)?,
            output_path: absolutize(&manifest.output_path)?,
            cache_path: manifest.cache_path.as_ref().map(absolutize).transpose()?,
            extensions: manifest.extensions.clone(),
            workers: settings.pipeline.workers,
            detection_timeout: settings.pipeline.detection_timeout(),
            fingerprint: settings_fingerprint(settings),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntrySource {
    Fresh,
    Cached,
    DetectionFailed,
}

#[derive(Debug)]
struct ProcessedFile {
    key: AssetPath,
    entry: ManifestEntry,
    stamp: Option<FileStamp>,
    source: EntrySource,
}

/// Drives a single manifest build.
#[derive(Debug)]
pub struct ManifestPipeline {
    options: PipelineOptions,
    state: PipelineState,
}

impl ManifestPipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Build and write the manifest.
    ///
    /// `load_detector` runs first; if it fails no file is touched. Per-file
    /// failures are logged and skipped. Only detector loading, opening the
    /// asset root, and writing the artifact end the run with an error.
    pub fn run<F>(&mut self, load_detector: F) -> Result<RunSummary, ManifestError>
    where
        F: FnOnce() -> Result<Arc<dyn FaceDetector>>,
    {
        self.transition(PipelineState::Running);
        let result = self.execute(load_detector);
        match &result {
            Ok(_) => self.transition(PipelineState::Done),
            Err(err) => {
                warn!("Manifest run failed: {err}");
                self.transition(PipelineState::Failed);
            }
        }
        result
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("Manifest pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn execute<F>(&self, load_detector: F) -> Result<RunSummary, ManifestError>
    where
        F: FnOnce() -> Result<Arc<dyn FaceDetector>>,
    {
        let _guard = timing_guard("focal_cli::manifest_run", log::Level::Info);
        let options = &self.options;

        let detector = load_detector().map_err(|err| ManifestError::FatalInit {
            path: options.model_path.clone(),
            reason: format!("{err:#}"),
        })?;

        let walker = AssetWalker::new(&options.asset_root, &options.extensions)?;
        let root = walker.root().to_path_buf();
        let files = walker.collect::<Result<Vec<_>, _>>()?;
        info!("Found {} image(s) under {}", files.len(), root.display());

        let previous = options
            .cache_path
            .as_deref()
            .map(|path| ManifestCache::load_or_empty(path, &options.fingerprint));
        // Rebuilt from this run only, so removed files drop out of the cache.
        let mut cache = previous
            .as_ref()
            .map(|_| ManifestCache::new(options.fingerprint.clone()));

        let outcomes = self.process_all(&files, &root, &detector, previous.as_ref());

        let mut manifest = Manifest::new();
        let mut summary = RunSummary {
            discovered: files.len(),
            processed: 0,
            skipped: 0,
            detection_failures: 0,
            cache_hits: 0,
            output_path: options.output_path.clone(),
        };
        for outcome in outcomes {
            let processed = match outcome {
                Ok(processed) => processed,
                Err(err) => {
                    warn!("Skipping: {err}");
                    summary.skipped += 1;
                    continue;
                }
            };
            match processed.source {
                EntrySource::Cached => summary.cache_hits += 1,
                EntrySource::DetectionFailed => summary.detection_failures += 1,
                EntrySource::Fresh => {}
            }
            if let (Some(cache), Some(stamp)) = (cache.as_mut(), processed.stamp)
                && processed.source != EntrySource::DetectionFailed
            {
                cache.insert(processed.key.clone(), stamp, processed.entry.clone());
            }
            if let Some(replaced) = manifest.insert(processed.key.clone(), processed.entry) {
                warn!("{}: duplicate manifest key, replaced {replaced:?}", processed.key);
            }
            summary.processed += 1;
        }

        manifest.write_to(&options.output_path)?;
        info!(
            "Wrote {} manifest entr(ies) to {}",
            manifest.len(),
            options.output_path.display()
        );

        if let (Some(cache), Some(path)) = (cache.as_ref(), options.cache_path.as_deref())
            && let Err(err) = cache.save(path)
        {
            warn!("Failed to update manifest cache: {err:#}");
        }

        Ok(summary)
    }

    fn process_all(
        &self,
        files: &[PathBuf],
        root: &Path,
        detector: &Arc<dyn FaceDetector>,
        cache: Option<&ManifestCache>,
    ) -> Vec<Result<ProcessedFile, ManifestError>> {
        let timeout = self.options.detection_timeout;
        let process = |path: &PathBuf, gate: &Arc<DetectionGate>| {
            process_file(path, root, detector, cache, timeout, gate)
        };

        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|index| format!("focal-worker-{index}"));
        if self.options.workers > 0 {
            builder = builder.num_threads(self.options.workers);
        }
        match builder.build() {
            Ok(pool) => {
                let workers = pool.current_num_threads();
                debug!("Processing with {workers} worker(s)");
                // Timed-out detections keep their slot, so inference never
                // outnumbers the workers.
                let gate = DetectionGate::new(workers);
                pool.install(|| files.par_iter().map(|path| process(path, &gate)).collect())
            }
            Err(err) => {
                warn!("Worker pool unavailable ({err}); processing sequentially");
                let gate = DetectionGate::new(1);
                files.iter().map(|path| process(path, &gate)).collect()
            }
        }
    }
}

fn process_file(
    path: &Path,
    root: &Path,
    detector: &Arc<dyn FaceDetector>,
    cache: Option<&ManifestCache>,
    timeout: Option<Duration>,
    gate: &Arc<DetectionGate>,
) -> Result<ProcessedFile, ManifestError> {
    let key = AssetPath::from_root(root, path).map_err(|err| {
        ManifestError::file_read(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, format!("{err:#}")),
        )
    })?;
    let metadata = fs::metadata(path).map_err(|source| ManifestError::file_read(path, source))?;
    let stamp = FileStamp::from_metadata(&metadata);

    if let (Some(cache), Some(stamp)) = (cache, stamp.as_ref())
        && let Some(entry) = cache.lookup(&key, stamp)
    {
        debug!("{key}: reused cached entry");
        return Ok(ProcessedFile {
            key,
            entry: entry.clone(),
            stamp: Some(*stamp),
            source: EntrySource::Cached,
        });
    }

    let info = read_dimensions(path)?;
    let mut source = EntrySource::Fresh;
    let focus = if info.is_jpeg() {
        match detect_focus(detector, path, timeout, gate) {
            Ok(focus) => focus,
            Err(err) => {
                warn!("{err}");
                source = EntrySource::DetectionFailed;
                None
            }
        }
    } else {
        None
    };
    debug!(
        "{key}: {}x{} {}{}",
        info.width,
        info.height,
        info.type_tag(),
        if focus.is_some() { " with focus" } else { "" }
    );

    Ok(ProcessedFile {
        key,
        entry: ManifestEntry {
            width: info.width,
            height: info.height,
            kind: info.type_tag(),
            focus,
        },
        stamp,
        source,
    })
}
