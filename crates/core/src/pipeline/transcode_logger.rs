use std::collections::HashMap;
use std::time::Instant;

/// Cross-cutting logger for transcode events.
///
/// Keeps the pump free of any particular output mechanism; the CLI logs
/// through the `log` crate, tests discard everything.
pub trait TranscodeLogger: Send {
    /// Record how long one named stage took (e.g. a pull or a wait).
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. samples per buffer).
    ///
    /// The pump reports the length of every pushed buffer as
    /// `audio_seconds`.
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullTranscodeLogger;

impl TranscodeLogger for NullTranscodeLogger {
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Metric the realtime speed in the summary is derived from.
pub const AUDIO_SECONDS_METRIC: &str = "audio_seconds";

/// Logger for the CLI: tracks per-stage timing and metrics and logs a
/// summary when the run ends.
pub struct LogTranscodeLogger {
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
}

impl LogTranscodeLogger {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
        }
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let audio_seconds: f64 = self
            .metrics_for(AUDIO_SECONDS_METRIC)
            .map_or(0.0, |values| values.iter().sum());
        let mut lines = Vec::new();

        lines.push(format!(
            "Transcode summary ({audio_seconds:.1}s of audio, {:.1}s total):",
            elapsed_ms / 1000.0
        ));

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = if durations.is_empty() {
                0.0
            } else {
                total_ms / durations.len() as f64
            };
            lines.push(format!(
                "  {stage:12}: {:6} calls  avg {avg_ms:6.2}ms  total {total_ms:7.0}ms",
                durations.len()
            ));
        }

        let mut metric_names: Vec<_> = self.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            let values = &self.metrics[name];
            let sum: f64 = values.iter().sum();
            let avg = if values.is_empty() {
                0.0
            } else {
                sum / values.len() as f64
            };
            lines.push(format!("  {name}: avg {avg:.1}  total {sum:.0}"));
        }

        if audio_seconds > 0.0 && elapsed_ms > 0.0 {
            let speed = audio_seconds / (elapsed_ms / 1000.0);
            lines.push(format!("  Speed: {speed:.1}x realtime"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

impl Default for LogTranscodeLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscodeLogger for LogTranscodeLogger {
    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
