//! Focus detection with a per-file time limit.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Condvar, Mutex, PoisonError, mpsc},
    thread,
    time::Duration,
};

use focal_core::{FaceDetector, FocusPoint};

use crate::error::ManifestError;

/// Caps the number of detector calls running at once, including helpers a
/// caller has already given up on.
#[derive(Debug)]
pub struct DetectionGate {
    capacity: usize,
    in_flight: Mutex<usize>,
    freed: Condvar,
}

impl DetectionGate {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            in_flight: Mutex::new(0),
            freed: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Detector calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `wait` for a free slot.
    fn acquire(gate: &Arc<Self>, wait: Duration) -> Option<GatePermit> {
        let guard = gate.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut in_flight, _) = gate
            .freed
            .wait_timeout_while(guard, wait, |count| *count >= gate.capacity)
            .unwrap_or_else(PoisonError::into_inner);
        if *in_flight >= gate.capacity {
            return None;
        }
        *in_flight += 1;
        Some(GatePermit(Arc::clone(gate)))
    }
}

/// A held slot; released when the detector call it covers returns or unwinds.
struct GatePermit(Arc<DetectionGate>);

impl Drop for GatePermit {
    fn drop(&mut self) {
        let mut in_flight = self.0.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        *in_flight = in_flight.saturating_sub(1);
        self.0.freed.notify_one();
    }
}

/// Locate the focus of the image at `path`.
///
/// With a `timeout`, the detector runs on a helper thread and the call gives
/// up once the limit passes; the helper is left to finish on its own but keeps
/// its `gate` slot until it does. Waiting for a slot counts against the same
/// limit. A panic inside the detector is reported as a detection error.
pub fn detect_focus(
    detector: &Arc<dyn FaceDetector>,
    path: &Path,
    timeout: Option<Duration>,
    gate: &Arc<DetectionGate>,
) -> Result<Option<FocusPoint>, ManifestError> {
    let Some(limit) = timeout else {
        return detector
            .locate_focus(path)
            .map_err(|err| ManifestError::detection(path, format!("{err:#}")));
    };

    let Some(permit) = DetectionGate::acquire(gate, limit) else {
        return Err(ManifestError::detection(
            path,
            format!(
                "no free detection slot within {limit:?} ({} still running)",
                gate.capacity()
            ),
        ));
    };

    let (tx, rx) = mpsc::sync_channel(1);
    let worker = Arc::clone(detector);
    let owned: PathBuf = path.to_path_buf();
    thread::Builder::new()
        .name("focal-detect".into())
        .spawn(move || {
            // Unwinding drops `permit` before `tx`, so a panic frees the slot
            // before the caller sees the disconnect.
            let tx = tx;
            let permit = permit;
            let result = worker.locate_focus(&owned);
            drop(permit);
            // The receiver is gone when the caller already timed out.
            let _ = tx.send(result);
        })
        .map_err(|err| ManifestError::detection(path, format!("failed to spawn detector: {err}")))?;

    match rx.recv_timeout(limit) {
        Ok(Ok(focus)) => Ok(focus),
        Ok(Err(err)) => Err(ManifestError::detection(path, format!("{err:#}"))),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ManifestError::detection(
            path,
            format!("timed out after {limit:?}"),
        )),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(ManifestError::detection(path, "detector panicked"))
        }
    }
}
