/*
    chronos-core
    https://github.com/dbalsom/chronos-backup

    Copyright 2026 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    src/progress.rs

    Structured progress events and cooperative cancellation (C8). Mirrors
    the teacher's `LoadingStatus`/`LoadingCallback` progress-callback
    capability in lib.rs, generalized from a single f64 to the full event
    record spec.md §6 describes, and broken out of any host/UI reference
    per the design notes (no cyclic references to the host).
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{ChronosError, ChronosResult};

/// A single progress event: bytes done/total, throughput, ETA and a
/// human-readable status line.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationProgress {
    pub percent: f64,
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub bytes_per_second: f64,
    pub time_remaining: Option<Duration>,
    pub status_message: String,
}

impl OperationProgress {
    /// A progress event with no meaningful byte count yet (e.g. while
    /// snapshotting or attaching a container).
    pub fn indeterminate(status: &str) -> Self {
        OperationProgress {
            percent: 0.0,
            bytes_done: 0,
            bytes_total: 0,
            bytes_per_second: 0.0,
            time_remaining: None,
            status_message: status.to_string(),
        }
    }

    pub fn complete(bytes_total: u64, status: &str) -> Self {
        OperationProgress {
            percent: 100.0,
            bytes_done: bytes_total,
            bytes_total,
            bytes_per_second: 0.0,
            time_remaining: None,
            status_message: status.to_string(),
        }
    }
}

/// Consumes [`OperationProgress`] events from any thread. The core never
/// holds a reference back into a UI or host object — only this capability.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: OperationProgress);
}

/// A reporter that discards every event; used by engines/tests that don't
/// care about progress cadence.
pub struct NullProgressReporter;
impl ProgressReporter for NullProgressReporter {
    fn report(&self, _progress: OperationProgress) {}
}

/// Throttles raw byte counters into `OperationProgress` events, reporting at
/// most once per `min_interval` and only once at least `min_bytes` of new
/// work has been processed, or at 100% — spec.md §4.10 step 5's cadence
/// rule, generalized for reuse by every engine.
pub struct ProgressThrottle {
    bytes_total: u64,
    min_interval: Duration,
    min_bytes: u64,
    start: Instant,
    last_report: Instant,
    last_bytes: u64,
}

impl ProgressThrottle {
    pub fn new(bytes_total: u64) -> Self {
        let now = Instant::now();
        ProgressThrottle {
            bytes_total,
            min_interval: Duration::from_millis(500),
            min_bytes: 10 * 1024 * 1024,
            start: now,
            last_report: now,
            last_bytes: 0,
        }
    }

    /// Reports `bytes_done`/`status` through `reporter` if the cadence rule
    /// allows it. `force` bypasses the cadence rule (used for the 100% and
    /// initial events).
    pub fn maybe_report(&mut self, bytes_done: u64, status: &str, force: bool, reporter: &dyn ProgressReporter) {
        let now = Instant::now();
        let at_end = bytes_done >= self.bytes_total && self.bytes_total > 0;
        let enough_time = now.duration_since(self.last_report) >= self.min_interval;
        let enough_bytes = bytes_done.saturating_sub(self.last_bytes) >= self.min_bytes;
        if !(force || at_end || (enough_time && enough_bytes)) {
            return;
        }
        let elapsed = now.duration_since(self.start).as_secs_f64().max(1e-6);
        let bps = bytes_done as f64 / elapsed;
        let remaining_bytes = self.bytes_total.saturating_sub(bytes_done);
        let time_remaining = if bps > 0.0 { Some(Duration::from_secs_f64(remaining_bytes as f64 / bps)) } else { None };
        let percent = if self.bytes_total > 0 { (bytes_done as f64 / self.bytes_total as f64) * 100.0 } else { 0.0 };
        reporter.report(OperationProgress {
            percent,
            bytes_done,
            bytes_total: self.bytes_total,
            bytes_per_second: bps,
            time_remaining,
            status_message: status.to_string(),
        });
        self.last_report = now;
        self.last_bytes = bytes_done;
    }
}

/// A cooperative cancellation checkpoint. Cloning shares the same
/// underlying flag, so a UI thread can call [`CancelHandle::cancel`] while
/// an engine thread calls [`CancelHandle::check`].
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        CancelHandle { flag: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fails the current operation with [`ChronosError::Cancelled`] if a
    /// cancellation was requested. `Cancelled` is a distinct error variant
    /// and must never be folded into an I/O error kind (spec.md §7).
    pub fn check(&self) -> ChronosResult<()> {
        if self.is_cancelled() {
            Err(ChronosError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
