//! Speaking-time estimates for script lines and cumulative chapter start times.
//!
//! The compositor places sound-effect cues and the subtitle track places dialogue
//! cues with the same [`TimingModel`] and the same [`ChapterTimeline`], so audio and
//! subtitles agree on where every chapter begins.

use crate::core::model::ScriptLine;
use serde::{Deserialize, Serialize};

/// Assumed narration speaking rate.
pub const CHARS_PER_SECOND: f64 = 15.0;
/// Floor for a single dialogue line, so near-empty lines still take time.
pub const MIN_LINE_SECONDS: f64 = 1.0;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct TimingModel {
    #[serde(default = "default_chars_per_second")]
    pub chars_per_second: f64,
    #[serde(default = "default_min_line_seconds")]
    pub min_line_seconds: f64,
}

fn default_chars_per_second() -> f64 {
    CHARS_PER_SECOND
}
fn default_min_line_seconds() -> f64 {
    MIN_LINE_SECONDS
}

impl Default for TimingModel {
    fn default() -> Self {
        Self {
            chars_per_second: CHARS_PER_SECOND,
            min_line_seconds: MIN_LINE_SECONDS,
        }
    }
}

/// Estimated start of a cue line, relative to its chapter's speech.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CueOffset {
    pub line_index: usize,
    pub offset_sec: f64,
}

/// Estimated placement of a dialogue line, relative to its chapter's speech.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSpan {
    pub line_index: usize,
    pub start_sec: f64,
    pub duration_sec: f64,
}

impl TimingModel {
    pub fn line_duration(&self, text: &str) -> f64 {
        let rate = if self.chars_per_second > 0.0 {
            self.chars_per_second
        } else {
            CHARS_PER_SECOND
        };
        let chars = text.trim().chars().count() as f64;
        (chars / rate).max(self.min_line_seconds.max(0.0))
    }

    /// Offsets for every cue line, in line order. Cues do not advance the clock.
    pub fn cue_offsets(&self, lines: &[ScriptLine]) -> Vec<CueOffset> {
        let mut elapsed = 0.0;
        let mut offsets = Vec::new();
        for (line_index, line) in lines.iter().enumerate() {
            if line.is_cue() {
                offsets.push(CueOffset {
                    line_index,
                    offset_sec: elapsed,
                });
            } else {
                elapsed += self.line_duration(&line.text);
            }
        }
        offsets
    }

    pub fn dialogue_spans(&self, lines: &[ScriptLine]) -> Vec<LineSpan> {
        let mut elapsed = 0.0;
        let mut spans = Vec::new();
        for (line_index, line) in lines.iter().enumerate() {
            if line.is_cue() {
                continue;
            }
            let duration_sec = self.line_duration(&line.text);
            spans.push(LineSpan {
                line_index,
                start_sec: elapsed,
                duration_sec,
            });
            elapsed += duration_sec;
        }
        spans
    }
}

/// Start times of back-to-back chapters given their speech durations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChapterTimeline {
    starts: Vec<f64>,
    durations: Vec<f64>,
    total: f64,
}

impl ChapterTimeline {
    pub fn from_durations(durations: impl IntoIterator<Item = f64>) -> Self {
        let mut timeline = Self::default();
        for duration in durations {
            let duration = duration.max(0.0);
            timeline.starts.push(timeline.total);
            timeline.durations.push(duration);
            timeline.total += duration;
        }
        timeline
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn start(&self, index: usize) -> f64 {
        self.starts[index]
    }

    pub fn duration(&self, index: usize) -> f64 {
        self.durations[index]
    }

    pub fn end(&self, index: usize) -> f64 {
        self.starts[index] + self.durations[index]
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}
