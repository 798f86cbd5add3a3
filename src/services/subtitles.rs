use crate::core::model::{Chapter, Podcast};
use crate::services::resolver::ResolvedPodcast;
use crate::utils::timing::{ChapterTimeline, TimingModel};
use std::fmt::Write as _;

const WRAP_WIDTH: usize = 42;

#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    pub start_sec: f64,
    pub end_sec: f64,
    pub text: String,
}

/// One cue per dialogue line, timed on the same chapter timeline as the mix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleTrack {
    cues: Vec<SubtitleCue>,
}

impl SubtitleTrack {
    /// `chapters` must be the chapters on `timeline`, in the same order.
    ///
    /// Lines sit on the same estimated offsets the compositor uses for cues. The
    /// last line of a chapter runs to the chapter end; lines estimated to start
    /// after the speech has ended are dropped.
    pub fn build<'a>(
        chapters: impl IntoIterator<Item = &'a Chapter>,
        timeline: &ChapterTimeline,
        timing: &TimingModel,
    ) -> Self {
        let mut cues = Vec::new();
        for (slot, chapter) in chapters.into_iter().enumerate().take(timeline.len()) {
            let chapter_start = timeline.start(slot);
            let chapter_end = timeline.end(slot);
            let first = cues.len();

            for span in timing.dialogue_spans(&chapter.lines) {
                let text = chapter.lines[span.line_index].text.trim();
                if text.is_empty() {
                    continue;
                }
                let start_sec = chapter_start + span.start_sec;
                if start_sec >= chapter_end {
                    break;
                }
                cues.push(SubtitleCue {
                    start_sec,
                    end_sec: (start_sec + span.duration_sec).min(chapter_end),
                    text: text.to_string(),
                });
            }

            if cues.len() > first {
                if let Some(last) = cues.last_mut() {
                    last.end_sec = chapter_end;
                }
            }
        }
        Self { cues }
    }

    pub fn for_podcast(podcast: &Podcast, resolved: &ResolvedPodcast, timing: &TimingModel) -> Self {
        Self::build(
            resolved.chapters.iter().map(|rc| &podcast.chapters[rc.index]),
            &resolved.timeline(),
            timing,
        )
    }

    pub fn cues(&self) -> &[SubtitleCue] {
        &self.cues
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for (i, cue) in self.cues.iter().enumerate() {
            let _ = writeln!(out, "{}", i + 1);
            let _ = writeln!(
                out,
                "{} --> {}",
                format_srt_time(cue.start_sec),
                format_srt_time(cue.end_sec)
            );
            for line in wrap_text(&cue.text, WRAP_WIDTH) {
                let _ = writeln!(out, "{}", line);
            }
            out.push('\n');
        }
        out
    }
}

fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
