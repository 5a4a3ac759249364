//! Progress feed parsing for a single running ffmpeg job.
//!
//! ffmpeg writes `key=value` lines on stdout when started with
//! `-progress pipe:1`; each frame ends with `progress=continue` or
//! `progress=end`. The monitor is fed one character at a time.

use crate::timespec::format_hms;
use std::collections::HashMap;
use std::io::Write;

/// Width of the rendered bar in cells
pub const BAR_WIDTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Accumulating,
    Finished,
}

/// One parsed snapshot of the progress feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressFrame {
    pub out_time_secs: f64,
    pub fps: f64,
    pub speed: String,
    pub terminal: bool,
}

/// What a sink receives per reporting tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    /// 0..=100, never decreasing within one job
    pub percentage: u8,
    pub line: String,
    pub terminal: bool,
}

/// Receiver of rendered progress.
pub trait ProgressSink: Send {
    fn report(&mut self, report: &ProgressReport);
}

/// Redraws a single status line on stderr.
#[derive(Debug, Default)]
pub struct TerminalProgress {
    label: String,
}

impl TerminalProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

impl ProgressSink for TerminalProgress {
    fn report(&mut self, report: &ProgressReport) {
        let mut stderr = std::io::stderr().lock();
        let _ = if self.label.is_empty() {
            write!(stderr, "\r{}", report.line)
        } else {
            write!(stderr, "\r{} {}", self.label, report.line)
        };
        if report.terminal {
            let _ = writeln!(stderr);
        }
        let _ = stderr.flush();
    }
}

impl ProgressSink for Vec<ProgressReport> {
    fn report(&mut self, report: &ProgressReport) {
        self.push(report.clone());
    }
}

/// Line-buffered progress state machine for one job.
pub struct ProgressMonitor<'a> {
    total_secs: f64,
    buffer: String,
    fields: HashMap<String, String>,
    state: State,
    last_percentage: u8,
    sink: &'a mut dyn ProgressSink,
}

impl<'a> ProgressMonitor<'a> {
    /// `total_secs` is the expected output duration and never changes.
    pub fn new(total_secs: f64, sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            total_secs,
            buffer: String::new(),
            fields: HashMap::new(),
            state: State::Accumulating,
            last_percentage: 0,
            sink,
        }
    }

    /// Consumes one character. Returns true once the final frame has been
    /// reported; further input is ignored.
    pub fn feed(&mut self, ch: char) -> bool {
        if self.state == State::Finished {
            return true;
        }

        match ch {
            '\n' => {
                let line = std::mem::take(&mut self.buffer);
                self.handle_line(&line);
            }
            '\r' => {}
            other => self.buffer.push(other),
        }

        self.state == State::Finished
    }

    /// Reports 100% if the feed ended without `progress=end`.
    pub fn finish(&mut self) {
        if self.state != State::Finished {
            self.report_final();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    fn handle_line(&mut self, line: &str) {
        let Some((key, value)) = line.split_once('=') else {
            return;
        };
        let key = key.trim();
        let value = value.trim();

        match (key, value) {
            ("progress", "continue") => self.report(),
            ("progress", "end") => self.report_final(),
            _ => {
                self.fields.insert(key.to_string(), value.to_string());
            }
        }
    }

    /// Current frame built from the fields seen so far.
    pub fn frame(&self) -> ProgressFrame {
        ProgressFrame {
            out_time_secs: self.out_time_secs(),
            fps: self
                .fields
                .get("fps")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(0.0),
            speed: self
                .fields
                .get("speed")
                .cloned()
                .unwrap_or_else(|| "N/A".to_string()),
            terminal: self.state == State::Finished,
        }
    }

    fn out_time_secs(&self) -> f64 {
        let from_text = self.fields.get("out_time").and_then(|v| parse_out_time(v));
        let from_us = || {
            self.fields
                .get("out_time_us")
                .and_then(|v| v.parse::<i64>().ok())
                .map(|us| us as f64 / 1_000_000.0)
        };
        from_text.or_else(from_us).unwrap_or(0.0).max(0.0)
    }

    fn report(&mut self) {
        let frame = self.frame();
        let raw = if self.total_secs > 0.0 && self.total_secs.is_finite() {
            (frame.out_time_secs / self.total_secs * 100.0).floor()
        } else {
            0.0
        };
        let percentage = (raw.clamp(0.0, 100.0) as u8).max(self.last_percentage);
        self.emit(percentage, &frame, false);
    }

    fn report_final(&mut self) {
        self.state = State::Finished;
        let mut frame = self.frame();
        frame.out_time_secs = frame.out_time_secs.max(self.total_secs);
        self.emit(100, &frame, true);
    }

    fn emit(&mut self, percentage: u8, frame: &ProgressFrame, terminal: bool) {
        self.last_percentage = percentage;
        let report = ProgressReport {
            percentage,
            line: render_line(percentage, frame, self.total_secs),
            terminal,
        };
        self.sink.report(&report);
    }
}

/// Parses ffmpeg's `HH:MM:SS.micro` clock. Negative or garbled values
/// (ffmpeg prints both early in a run) give `None`.
fn parse_out_time(raw: &str) -> Option<f64> {
    let mut parts = raw.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

/// `[████------] 40% | Time: 00:00:04.000 / 00:00:10.000 | FPS: 30.0 | Speed: 1.2x`
pub fn render_line(percentage: u8, frame: &ProgressFrame, total_secs: f64) -> String {
    let filled = BAR_WIDTH * percentage.min(100) as usize / 100;
    let bar: String = "█".repeat(filled) + &"-".repeat(BAR_WIDTH - filled);
    format!(
        "[{}] {:>3}% | Time: {} / {} | FPS: {:.1} | Speed: {}",
        bar,
        percentage,
        format_hms(frame.out_time_secs),
        format_hms(total_secs),
        frame.fps,
        frame.speed
    )
}


#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn feed_str(monitor: &mut ProgressMonitor<'_>, text: &str) -> bool {
        let mut done = false;
        for ch in text.chars() {
            done = monitor.feed(ch);
        }
        done
    }

    #[test]
    fn test_reports_on_continue_and_end() {
        let mut reports: Vec<ProgressReport> = Vec::new();
        let mut monitor = ProgressMonitor::new(20.0, &mut reports);
        let feed = "frame=10\nfps=25.0\nout_time=00:00:05.000000\nspeed=2.0x\nprogress=continue\n\
                    out_time=00:00:10.000000\nprogress=continue\n\
                    progress=end\n";
        assert!(feed_str(&mut monitor, feed));
        monitor.finish();
        drop(monitor);

        let percents: Vec<u8> = reports.iter().map(|r| r.percentage).collect();
        assert_eq!(percents, vec![25, 50, 100]);
        assert!(reports[0].line.contains("FPS: 25.0"));
        assert!(reports[0].line.contains("Speed: 2.0x"));
        assert!(reports[2].terminal);
    }

    #[test]
    fn test_input_after_end_is_ignored() {
        let mut reports: Vec<ProgressReport> = Vec::new();
        let mut monitor = ProgressMonitor::new(10.0, &mut reports);
        feed_str(&mut monitor, "progress=end\nout_time=00:00:01.0\nprogress=continue\n");
        assert!(monitor.is_finished());
        drop(monitor);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].percentage, 100);
    }

    #[test]
    fn test_only_continue_and_end_trigger_reports() {
        let mut reports: Vec<ProgressReport> = Vec::new();
        let mut monitor = ProgressMonitor::new(10.0, &mut reports);
        assert!(!feed_str(&mut monitor, "out_time=00:00:04.0\nprogress=paused\nprogress=\n"));
        assert_eq!(monitor.frame().out_time_secs, 4.0);
        feed_str(&mut monitor, "progress=continue\n");
        drop(monitor);
        let percents: Vec<u8> = reports.iter().map(|r| r.percentage).collect();
        assert_eq!(percents, vec![40]);
    }

    #[test]
    fn test_finish_without_end_reports_once() {
        let mut reports: Vec<ProgressReport> = Vec::new();
        let mut monitor = ProgressMonitor::new(10.0, &mut reports);
        feed_str(&mut monitor, "out_time=00:00:09.0\nprogress=continue\n");
        monitor.finish();
        monitor.finish();
        drop(monitor);
        let percents: Vec<u8> = reports.iter().map(|r| r.percentage).collect();
        assert_eq!(percents, vec![90, 100]);
    }

    #[test]
    fn test_malformed_out_time_falls_back() {
        let mut reports: Vec<ProgressReport> = Vec::new();
        let mut monitor = ProgressMonitor::new(10.0, &mut reports);
        feed_str(&mut monitor, "out_time=-577014:32:22.77\nprogress=continue\n");
        feed_str(&mut monitor, "out_time=N/A\nout_time_us=3000000\nprogress=continue\n");
        drop(monitor);
        let percents: Vec<u8> = reports.iter().map(|r| r.percentage).collect();
        assert_eq!(percents, vec![0, 30]);
    }

    #[test]
    fn test_overshoot_clamps_to_100() {
        let mut reports: Vec<ProgressReport> = Vec::new();
        let mut monitor = ProgressMonitor::new(10.0, &mut reports);
        feed_str(&mut monitor, "out_time=00:00:30.0\nprogress=continue\n");
        drop(monitor);
        assert_eq!(reports[0].percentage, 100);
        assert!(!reports[0].terminal);
    }

    #[test]
    fn test_render_line_bar_width() {
        let frame = ProgressFrame {
            out_time_secs: 5.0,
            fps: 30.0,
            speed: "1.0x".to_string(),
            terminal: false,
        };
        let line = render_line(50, &frame, 10.0);
        assert_eq!(line.matches('█').count(), BAR_WIDTH / 2);
        assert_eq!(line.matches('-').count(), BAR_WIDTH / 2);
        assert!(line.contains("00:00:05.000 / 00:00:10.000"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_percentages_monotonic_bounded_and_end_at_100(
            total in 1.0f64..5000.0,
            times in proptest::collection::vec(0.0f64..10000.0, 0..30),
        ) {
            let mut reports: Vec<ProgressReport> = Vec::new();
            let mut monitor = ProgressMonitor::new(total, &mut reports);
            for t in &times {
                let us = (*t * 1_000_000.0) as i64;
                feed_str(&mut monitor, &format!("out_time_us={}\nprogress=continue\n", us));
            }
            feed_str(&mut monitor, "progress=end\n");
            monitor.finish();
            drop(monitor);

            prop_assert_eq!(reports.len(), times.len() + 1);
            for pair in reports.windows(2) {
                prop_assert!(pair[0].percentage <= pair[1].percentage);
            }
            prop_assert!(reports.iter().all(|r| r.percentage <= 100));
            prop_assert_eq!(reports.last().map(|r| r.percentage), Some(100));
            prop_assert_eq!(reports.iter().filter(|r| r.terminal).count(), 1);
        }
    }
}
