//! Per-run timing accumulation.

use std::time::Instant;

use chrono::Utc;

use cardscan_core::{PipelineMetrics, StageMetric};

/// Request-scoped recorder for stage durations. One recorder per pipeline
/// run, never shared across runs.
pub struct MetricsRecorder {
    started_at: chrono::DateTime<Utc>,
    run_start: Instant,
    stages: Vec<StageMetric>,
}

impl MetricsRecorder {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            run_start: Instant::now(),
            stages: Vec::new(),
        }
    }

    /// Mark the start of a stage
    pub fn stage_start(&self) -> Instant {
        Instant::now()
    }

    /// Record a finished stage
    pub fn record(&mut self, name: &str, from: Instant) {
        self.stages.push(StageMetric {
            name: name.to_string(),
            duration_ms: from.elapsed().as_millis() as u64,
        });
    }

    /// Close the run and produce the metrics breakdown
    pub fn finish(self) -> PipelineMetrics {
        PipelineMetrics {
            started_at: self.started_at,
            finished_at: Utc::now(),
            total_ms: self.run_start.elapsed().as_millis() as u64,
            stages: self.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_is_monotonic() {
        let mut recorder = MetricsRecorder::start();

        let s = recorder.stage_start();
        std::thread::sleep(std::time::Duration::from_millis(2));
        recorder.record("local field extraction", s);

        let s = recorder.stage_start();
        recorder.record("confidence arbitration", s);

        let metrics = recorder.finish();
        assert_eq!(metrics.stages.len(), 2);
        assert!(metrics.is_monotonic());
        assert!(metrics.total_ms >= metrics.stages[0].duration_ms);
    }
}
