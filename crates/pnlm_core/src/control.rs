//! Cooperative cancellation and progress reporting for one enhancement run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation flag shared between a run and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The run stops after its current stage.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Wraps an optional callback; clamps to `[0, 1]` and never reports a value
/// below one already reported.
pub struct ProgressReporter<'a> {
    callback: Option<&'a mut dyn FnMut(f32)>,
    last: f32,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(callback: Option<&'a mut dyn FnMut(f32)>) -> Self {
        Self {
            callback,
            last: 0.0,
        }
    }

    pub fn report(&mut self, fraction: f32) {
        let value = if fraction.is_nan() {
            self.last
        } else {
            fraction.clamp(0.0, 1.0).max(self.last)
        };
        self.last = value;
        if let Some(cb) = self.callback.as_mut() {
            cb(value);
        }
    }

    /// Report `start + local * (end - start)` for a sub-range of the run.
    pub fn report_within(&mut self, start: f32, end: f32, local: f32) {
        self.report(start + local.clamp(0.0, 1.0) * (end - start));
    }

    pub fn last(&self) -> f32 {
        self.last
    }
}
