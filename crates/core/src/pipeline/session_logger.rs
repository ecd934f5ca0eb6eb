use std::collections::BTreeMap;
use std::time::Instant;

/// Observer for per-frame session events.
///
/// The library only reports; what happens to the numbers (log lines, a
/// summary, nothing) is up to the caller.
pub trait SessionLogger: Send {
    /// One frame finished.
    fn frame_done(&mut self, frame_index: usize);

    /// Wall time of a named stage for one frame or face.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A sampled value such as the number of faces tracked.
    fn metric(&mut self, name: &str, value: f64);

    /// Emitted once when the session ends. Default: no-op.
    fn summary(&self) {}
}

pub struct NullSessionLogger;

impl SessionLogger for NullSessionLogger {
    fn frame_done(&mut self, _frame_index: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Series {
    pub count: usize,
    pub total: f64,
    pub max: f64,
}

impl Series {
    fn push(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.max = if self.count == 1 { value } else { self.max.max(value) };
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Accumulates stage timings and metrics and logs a summary at the end.
///
/// Progress is logged every `report_every` frames.
pub struct StdoutSessionLogger {
    report_every: usize,
    timings: BTreeMap<String, Series>,
    metrics: BTreeMap<String, Series>,
    started: Instant,
    frames: usize,
}

impl StdoutSessionLogger {
    pub fn new(report_every: usize) -> Self {
        Self {
            report_every: report_every.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            started: Instant::now(),
            frames: 0,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn timing_series(&self, stage: &str) -> Option<&Series> {
        self.timings.get(stage)
    }

    pub fn metric_series(&self, name: &str) -> Option<&Series> {
        self.metrics.get(name)
    }

    /// `None` until something was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Session summary: {} frames in {elapsed:.1}s",
            self.frames
        )];
        for (stage, s) in &self.timings {
            lines.push(format!(
                "  {stage:22} {:5} runs  mean {:7.2}ms  max {:7.2}ms",
                s.count,
                s.mean(),
                s.max
            ));
        }
        for (name, s) in &self.metrics {
            lines.push(format!("  {name:22} mean {:.2}  max {:.0}", s.mean(), s.max));
        }
        if self.frames > 0 && elapsed > 0.0 {
            lines.push(format!("  {:.1} fps", self.frames as f64 / elapsed));
        }
        Some(lines.join("\n"))
    }
}

impl Default for StdoutSessionLogger {
    fn default() -> Self {
        Self::new(30)
    }
}

impl SessionLogger for StdoutSessionLogger {
    fn frame_done(&mut self, frame_index: usize) {
        self.frames += 1;
        if self.frames % self.report_every == 0 {
            log::info!("Processed {} frames (last #{frame_index})", self.frames);
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings.entry(stage.to_string()).or_default().push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
