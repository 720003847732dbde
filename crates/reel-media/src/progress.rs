//! FFmpeg progress parsing.
//!
//! ffmpeg runs with `-v info -progress pipe:2`, so stderr interleaves the
//! per-input `Duration:` headers with `key=value` progress blocks. The parser
//! learns the total duration from the headers and turns every elapsed-time
//! key into a percentage.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static INPUT_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Input #(\d+)").unwrap());

static DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap());

static STATS_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap());

/// Which input durations make up the output duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeline {
    /// The output is as long as input #0 (single-input transforms; image
    /// backgrounds are looped and cut to the primary input).
    #[default]
    Primary,
    /// The output is every input played back to back (merge).
    Concatenated,
}

/// Stateful parser over ffmpeg's stderr lines.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    timeline: Timeline,
    durations: BTreeMap<usize, f64>,
    current_input: Option<usize>,
    in_outputs: bool,
}

impl ProgressParser {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            ..Default::default()
        }
    }

    /// Feed one stderr line. Returns the unclamped percentage when the line
    /// carries an elapsed time and the total is known; every other line
    /// yields `None`.
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        let line = line.trim_end();

        if let Some(caps) = INPUT_HEADER.captures(line) {
            self.current_input = caps[1].parse().ok();
            return None;
        }

        if line.trim_start().starts_with("Output #") {
            self.in_outputs = true;
            return None;
        }

        if let Some(caps) = DURATION.captures(line) {
            if !self.in_outputs {
                if let Some(secs) = hms_to_secs(&caps[1], &caps[2], &caps[3]) {
                    let index = self
                        .current_input
                        .take()
                        .unwrap_or_else(|| self.durations.len());
                    self.durations.entry(index).or_insert(secs);
                }
            }
            return None;
        }

        let elapsed = match line.trim().split_once('=') {
            Some(("out_time_us", value)) | Some(("out_time_ms", value)) => {
                // out_time_ms is also microseconds
                value
                    .parse::<i64>()
                    .ok()
                    .filter(|us| *us >= 0)
                    .map(|us| us as f64 / 1_000_000.0)
            }
            Some(("out_time", value)) => parse_timestamp(value),
            _ if line.contains("bitrate=") => STATS_TIME
                .captures(line)
                .and_then(|caps| hms_to_secs(&caps[1], &caps[2], &caps[3])),
            _ => None,
        }?;

        let total = self.total().filter(|t| *t > 0.0)?;
        Some(elapsed / total * 100.0)
    }

    fn total(&self) -> Option<f64> {
        match self.timeline {
            Timeline::Primary => self.durations.get(&0).copied(),
            Timeline::Concatenated if self.durations.is_empty() => None,
            Timeline::Concatenated => Some(self.durations.values().sum()),
        }
    }
}

/// Turns raw percentages into the values actually published: clamped to
/// `0..=99` and strictly increasing, so a job never appears to regress.
#[derive(Debug, Clone, Default)]
pub struct ProgressGate {
    last: u8,
}

impl ProgressGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value to publish, or `None` if it would not advance.
    pub fn admit(&mut self, percent: f64) -> Option<u8> {
        if !percent.is_finite() {
            return None;
        }
        let clamped = percent.floor().clamp(0.0, 99.0) as u8;
        if clamped > self.last {
            self.last = clamped;
            Some(clamped)
        } else {
            None
        }
    }

}

/// Parse `HH:MM:SS.micro`. Negative or `N/A` timestamps yield `None`.
fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.trim().splitn(3, ':');
    let (h, m, s) = (parts.next()?, parts.next()?, parts.next()?);
    hms_to_secs(h, m, s)
}

fn hms_to_secs(h: &str, m: &str, s: &str) -> Option<f64> {
    let h: u64 = h.parse().ok()?;
    let m: u64 = m.parse().ok()?;
    let s: f64 = s.parse().ok()?;
    if !s.is_finite() || s < 0.0 {
        return None;
    }
    Some((h * 3600 + m * 60) as f64 + s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut ProgressParser, lines: &[&str]) -> Vec<f64> {
        lines.iter().filter_map(|l| parser.feed(l)).collect()
    }

    #[test]
    fn test_primary_timeline_uses_first_input() {
        let mut parser = ProgressParser::new(Timeline::Primary);
        let out = feed_all(
            &mut parser,
            &[
                "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'in.mp4':",
                "  Duration: 00:00:10.00, start: 0.000000, bitrate: 1205 kb/s",
                "Input #1, png_pipe, from 'bg.png':",
                "  Duration: 00:00:40.00, start: 0.000000, bitrate: N/A",
                "Output #0, mp4, to 'out.mp4':",
                "  Duration: 00:00:99.00",
                "out_time_us=5000000",
                "progress=continue",
            ],
        );
        assert_eq!(out.len(), 1);
        assert!((out[0] - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_concatenated_timeline_sums_inputs() {
        let mut parser = ProgressParser::new(Timeline::Concatenated);
        let out = feed_all(
            &mut parser,
            &[
                "Input #0, mov, from 'a.mp4':",
                "  Duration: 00:00:10.00, start: 0.000000, bitrate: 900 kb/s",
                "Input #1, mov, from 'b.mp4':",
                "  Duration: 00:00:30.00, start: 0.000000, bitrate: 900 kb/s",
                "out_time=00:00:20.000000",
            ],
        );
        assert!((out[0] - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_out_time_ms_is_microseconds() {
        let mut parser = ProgressParser::new(Timeline::Primary);
        parser.feed("  Duration: 00:01:40.00, start: 0.000000, bitrate: 1 kb/s");
        let pct = parser.feed("out_time_ms=25000000").unwrap();
        assert!((pct - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_classic_stats_line() {
        let mut parser = ProgressParser::new(Timeline::Primary);
        parser.feed("  Duration: 00:00:20.00, start: 0.000000, bitrate: 1 kb/s");
        let pct = parser
            .feed("frame=  120 fps=30 q=28.0 size=256kB time=00:00:05.00 bitrate=419.4kbits/s speed=1.2x")
            .unwrap();
        assert!((pct - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_no_percentage_before_duration_is_known() {
        let mut parser = ProgressParser::new(Timeline::Primary);
        assert_eq!(parser.feed("out_time_us=1000000"), None);
        parser.feed("  Duration: 00:00:04.00, start: 0.000000, bitrate: 1 kb/s");
        assert_eq!(parser.feed("out_time_us=1000000"), Some(25.0));
    }

    #[test]
    fn test_unusable_values_are_ignored() {
        let mut parser = ProgressParser::new(Timeline::Primary);
        parser.feed("  Duration: 00:00:20.00, start: 0.000000, bitrate: 1 kb/s");
        assert_eq!(parser.feed("out_time_us=N/A"), None);
        assert_eq!(parser.feed("out_time_us=-577014000"), None);
        assert_eq!(parser.feed("out_time=-00:00:00.100000"), None);
        assert_eq!(parser.feed("speed=1.5x"), None);
        assert_eq!(parser.feed("[aac @ 0x55] Qavg: 1234.5"), None);
    }

    #[test]
    fn test_progress_markers_yield_nothing() {
        let mut parser = ProgressParser::new(Timeline::Primary);
        parser.feed("  Duration: 00:00:04.00, start: 0.000000, bitrate: 1 kb/s");
        assert_eq!(parser.feed("progress=continue"), None);
        assert_eq!(parser.feed("progress=end"), None);
    }

    #[test]
    fn test_gate_clamps_and_never_regresses() {
        let mut gate = ProgressGate::new();
        assert_eq!(gate.admit(0.4), None);
        assert_eq!(gate.admit(12.7), Some(12));
        assert_eq!(gate.admit(12.9), None);
        assert_eq!(gate.admit(8.0), None);
        assert_eq!(gate.admit(100.0), Some(99));
        assert_eq!(gate.admit(140.0), None);
        assert_eq!(gate.admit(f64::NAN), None);
    }
}
