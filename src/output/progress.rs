//! Terminal progress bar and progress.csv

use crate::output::{ResultSink, Row};
use crate::state::{ProgressSink, ProgressUpdate};
use std::sync::Arc;
use std::time::Duration;

const BAR_LENGTH: usize = 20;

/// Prints a progress line for every analytics update and logs it to progress.csv
pub struct ProgressBar {
    sink: Arc<dyn ResultSink>,
    print: bool,
}

impl ProgressBar {
    pub fn new(sink: Arc<dyn ResultSink>) -> Self {
        Self { sink, print: true }
    }

    /// A progress bar that only writes progress.csv
    pub fn quiet(sink: Arc<dyn ResultSink>) -> Self {
        Self { sink, print: false }
    }
}

impl ProgressSink for ProgressBar {
    fn emit(&self, update: &ProgressUpdate) {
        let line = ProgressLine::from_update(update);
        if self.print {
            println!("{}", line.render());
        }
        let row = line.to_row(chrono::Utc::now().timestamp_millis() as f64 / 1000.0);
        if let Err(e) = self.sink.append_rows("progress.csv", &[row]) {
            tracing::warn!("Failed to write progress.csv: {}", e);
        }
    }
}

/// The derived numbers shown on one progress line
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressLine {
    pub iteration: usize,
    pub total: usize,
    pub percent: f64,
    pub filled: usize,
    /// Pages per second
    pub speed: f64,
    pub elapsed: Duration,
    pub remaining: Duration,
}

impl ProgressLine {
    pub fn from_update(update: &ProgressUpdate) -> Self {
        let (percent, filled) = if update.total == 0 {
            (0.0, 0)
        } else {
            (
                100.0 * update.iteration as f64 / update.total as f64,
                (BAR_LENGTH * update.iteration / update.total).min(BAR_LENGTH),
            )
        };

        let elapsed_secs = update.elapsed.as_secs_f64();
        let mut speed = if elapsed_secs > 0.0 {
            update.iteration as f64 / elapsed_secs
        } else {
            0.0
        };
        if speed == 0.0 {
            speed = 0.0001;
        }
        let left = update.total.saturating_sub(update.iteration) as f64;

        Self {
            iteration: update.iteration,
            total: update.total,
            percent,
            filled,
            speed,
            elapsed: update.elapsed,
            remaining: Duration::try_from_secs_f64(left / speed).unwrap_or(Duration::MAX),
        }
    }

    /// `|████----| 12.5% p:5/40 v:0.83p/s t:00:00:06  t-:00:00:42`
    pub fn render(&self) -> String {
        format!(
            "|{}{}| {:.1}% p:{}/{} v:{:.2}p/s t:{}  t-:{}",
            "█".repeat(self.filled),
            "-".repeat(BAR_LENGTH - self.filled),
            self.percent,
            self.iteration,
            self.total,
            self.speed,
            format_duration(self.elapsed),
            format_duration(self.remaining)
        )
    }

    pub fn to_row(&self, time: f64) -> Row {
        Row::new()
            .with("time", format!("{:.3}", time))
            .with("iteration", self.iteration)
            .with("total", self.total)
            .with("speed", format!("{:.2}", self.speed))
            .with("percent", format!("{:.1}", self.percent))
            .with("elapsed", format_duration(self.elapsed))
            .with("remaining", format_duration(self.remaining))
    }
}

/// Formats a duration as `HH:MM:SS`
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
