// Metrics hooks for the remediation pipeline.
//
// Callers install a global `RemediationMetrics` implementation via
// [`set_remediation_metrics`]; every `RemediationPipeline` then reports each cascade stage it
// attempts. A pipeline built with `with_metrics` reports to its own observer instead.
use std::sync::{Arc, RwLock};
use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::pipeline::Stage;

/// What a stage produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage returned this many items and ended the cascade.
    Hit(usize),
    /// Nothing found; the cascade moved on.
    Empty,
    /// The stage failed; the failure was logged and treated as empty.
    Failed,
}

/// Metrics observer for remediation requests.
pub trait RemediationMetrics: Send + Sync {
    /// Record one attempted stage.
    ///
    /// `latency` is the wall-clock time spent in the stage, including embedding and search.
    /// Stages that were skipped because they are not configured are not recorded.
    fn record_stage(&self, stage: Stage, latency: Duration, outcome: StageOutcome);
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn RemediationMetrics>>> {
    static METRICS: OnceCell<RwLock<Option<Arc<dyn RemediationMetrics>>>> = OnceCell::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn RemediationMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

/// Install or clear the global remediation metrics recorder.
///
/// Usually called once at service startup.
pub fn set_remediation_metrics(recorder: Option<Arc<dyn RemediationMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}
