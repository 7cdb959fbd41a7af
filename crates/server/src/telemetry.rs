use matcher::{RemediationMetrics, Stage, StageOutcome};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Install the global Prometheus recorder and return the handle that renders `/metrics`.
///
/// Histogram upkeep runs on a background task every five seconds.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("seconds".to_string()), LATENCY_BUCKETS)?
        .install_recorder()?;

    let upkeep = handle.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            upkeep.run_upkeep();
        }
    });

    Ok(handle)
}

/// Forwards cascade stage reports to the `metrics` facade.
///
/// - `remediation_stage_total{stage, outcome}`
/// - `remediation_stage_duration_seconds{stage}`
/// - `remediation_items_returned{stage}`
#[derive(Debug, Default, Clone, Copy)]
pub struct StageMetrics;

impl RemediationMetrics for StageMetrics {
    fn record_stage(&self, stage: Stage, latency: Duration, outcome: StageOutcome) {
        let outcome_label = match outcome {
            StageOutcome::Hit(_) => "hit",
            StageOutcome::Empty => "empty",
            StageOutcome::Failed => "failed",
        };
        metrics::counter!(
            "remediation_stage_total",
            "stage" => stage.as_str(),
            "outcome" => outcome_label
        )
        .increment(1);
        metrics::histogram!("remediation_stage_duration_seconds", "stage" => stage.as_str())
            .record(latency.as_secs_f64());
        if let StageOutcome::Hit(items) = outcome {
            metrics::histogram!("remediation_items_returned", "stage" => stage.as_str())
                .record(items as f64);
        }
    }
}
