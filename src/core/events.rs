use log::{debug, info, warn};
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Speech,
    Music,
    SoundEffect,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetKind::Speech => "speech",
            AssetKind::Music => "music",
            AssetKind::SoundEffect => "sound effect",
        };
        f.write_str(name)
    }
}

/// Diagnostics raised while resolving, mixing and exporting.
#[derive(Debug, Clone, PartialEq)]
pub enum MixEvent {
    AssetResolved {
        kind: AssetKind,
        name: String,
        duration_sec: f64,
    },
    /// A recoverable asset failure; the overlay is left out of the mix.
    AssetSkipped {
        kind: AssetKind,
        name: String,
        reason: String,
    },
    ChapterScheduled {
        chapter: String,
        start_sec: f64,
        duration_sec: f64,
    },
    MusicScheduled {
        chapter: String,
        track: String,
        fade_in: bool,
        fade_out: bool,
    },
    CueScheduled {
        chapter: String,
        name: String,
        at_sec: f64,
    },
    Rendered {
        duration_sec: f64,
        sources: usize,
    },
    ImageSubstituted {
        index: usize,
        reason: String,
    },
    VideoCancelled,
}

/// Receives diagnostics. Implementations decide where they are surfaced.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: MixEvent);
}

/// Forwards events to the `log` facade.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: MixEvent) {
        match event {
            MixEvent::AssetResolved {
                kind,
                name,
                duration_sec,
            } => debug!("Resolved {} '{}' ({:.2}s)", kind, name, duration_sec),
            MixEvent::AssetSkipped { kind, name, reason } => {
                warn!("Skipping {} '{}': {}", kind, name, reason)
            }
            MixEvent::ChapterScheduled {
                chapter,
                start_sec,
                duration_sec,
            } => info!(
                "Chapter '{}' at {:.2}s ({:.2}s)",
                chapter, start_sec, duration_sec
            ),
            MixEvent::MusicScheduled {
                chapter,
                track,
                fade_in,
                fade_out,
            } => debug!(
                "Music '{}' under chapter '{}' (fade in: {}, fade out: {})",
                track, chapter, fade_in, fade_out
            ),
            MixEvent::CueScheduled {
                chapter,
                name,
                at_sec,
            } => debug!("Cue '{}' in chapter '{}' at {:.2}s", name, chapter, at_sec),
            MixEvent::Rendered {
                duration_sec,
                sources,
            } => info!(
                "Rendered {:.2}s of audio from {} sources",
                duration_sec, sources
            ),
            MixEvent::ImageSubstituted { index, reason } => {
                warn!("Image {} replaced with placeholder: {}", index, reason)
            }
            MixEvent::VideoCancelled => info!("Video export cancelled"),
        }
    }
}

/// Keeps every event in memory, e.g. for a diagnostics panel.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<MixEvent>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<MixEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: MixEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemorySink::default();
        sink.emit(MixEvent::VideoCancelled);
        sink.emit(MixEvent::AssetSkipped {
            kind: AssetKind::Music,
            name: "theme".to_string(),
            reason: "404".to_string(),
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], MixEvent::VideoCancelled);
        assert!(matches!(
            &events[1],
            MixEvent::AssetSkipped { kind: AssetKind::Music, name, .. } if name == "theme"
        ));
    }

    #[test]
    fn asset_kind_display() {
        assert_eq!(AssetKind::SoundEffect.to_string(), "sound effect");
        assert_eq!(AssetKind::Speech.to_string(), "speech");
    }
}
