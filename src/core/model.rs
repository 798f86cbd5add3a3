use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Reserved speaker label marking a script line as a sound-effect cue.
pub const SFX_SPEAKER: &str = "SFX";

pub const DEFAULT_GLOBAL_MUSIC_VOLUME: f32 = 0.3;

/// Where an asset's bytes come from. Decided once when a project is loaded.
#[derive(Clone, Default)]
pub enum AssetRef {
    #[default]
    Missing,
    /// Bytes already attached earlier in the pipeline; no fetch needed.
    PreFetched(Arc<Vec<u8>>),
    /// An http(s) URL or a storage path still to be read.
    Unresolved(String),
}

impl AssetRef {
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::PreFetched(Arc::new(bytes.into()))
    }

    pub fn location(location: impl Into<String>) -> Self {
        Self::Unresolved(location.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl fmt::Debug for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "Missing"),
            Self::PreFetched(bytes) => write!(f, "PreFetched({} bytes)", bytes.len()),
            Self::Unresolved(location) => write!(f, "Unresolved({location})"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChapterStatus {
    #[default]
    Pending,
    Generating,
    Completed,
    Error,
}

/// Sound-effect descriptor from the effects catalog.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SoundEffect {
    pub id: u64,
    pub name: String,
    /// Preview URLs keyed by quality, e.g. `preview-hq-mp3`.
    #[serde(default)]
    pub previews: BTreeMap<String, String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
}

impl SoundEffect {
    const PREVIEW_PREFERENCE: [&'static str; 2] = ["preview-hq-mp3", "preview-lq-mp3"];

    pub fn preview_url(&self) -> Option<&str> {
        Self::PREVIEW_PREFERENCE
            .iter()
            .find_map(|quality| self.previews.get(*quality))
            .or_else(|| self.previews.values().next())
            .map(String::as_str)
    }
}

/// Background-music descriptor from the music catalog.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MusicTrack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artist_name: String,
    pub audio_url: String,
}

#[derive(Debug, Clone)]
pub struct ScriptLine {
    pub speaker: String,
    pub text: String,
    pub sound_effect: Option<Arc<SoundEffect>>,
    pub sfx_asset: AssetRef,
    pub volume: Option<f32>,
}

impl ScriptLine {
    pub fn dialogue(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            sound_effect: None,
            sfx_asset: AssetRef::Missing,
            volume: None,
        }
    }

    pub fn cue(text: impl Into<String>, sfx_asset: AssetRef, volume: Option<f32>) -> Self {
        Self {
            speaker: SFX_SPEAKER.to_string(),
            text: text.into(),
            sound_effect: None,
            sfx_asset,
            volume,
        }
    }

    pub fn is_cue(&self) -> bool {
        self.speaker.trim().eq_ignore_ascii_case(SFX_SPEAKER)
    }

    /// Name used in diagnostics for this line's effect.
    pub fn cue_name(&self) -> &str {
        self.sound_effect
            .as_deref()
            .map(|sfx| sfx.name.as_str())
            .unwrap_or(self.text.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub lines: Vec<ScriptLine>,
    pub speech: AssetRef,
    pub music: Option<Arc<MusicTrack>>,
    pub music_asset: AssetRef,
    pub music_volume: Option<f32>,
    pub status: ChapterStatus,
}

impl Chapter {
    pub fn new(id: impl Into<String>, speech: AssetRef) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            lines: Vec::new(),
            status: if speech.is_missing() {
                ChapterStatus::Pending
            } else {
                ChapterStatus::Completed
            },
            speech,
            music: None,
            music_asset: AssetRef::Missing,
            music_volume: None,
        }
    }

    pub fn with_lines(mut self, lines: Vec<ScriptLine>) -> Self {
        self.lines = lines;
        self
    }

    pub fn with_music(mut self, track: Arc<MusicTrack>, asset: AssetRef) -> Self {
        self.music = Some(track);
        self.music_asset = asset;
        self
    }
}

/// Aggregate root: the ordered chapters plus podcast-wide settings.
#[derive(Debug, Clone)]
pub struct Podcast {
    pub title: String,
    pub chapters: Vec<Chapter>,
    pub global_music_volume: f32,
}

impl Podcast {
    pub fn new(title: impl Into<String>, chapters: Vec<Chapter>) -> Self {
        Self {
            title: title.into(),
            chapters,
            global_music_volume: DEFAULT_GLOBAL_MUSIC_VOLUME,
        }
    }

    pub fn music_volume_for(&self, chapter: &Chapter) -> f32 {
        chapter.music_volume.unwrap_or(self.global_music_volume)
    }
}

/// One still image shown for a fixed time in the video export.
#[derive(Debug, Clone)]
pub struct Slide {
    pub image: AssetRef,
    pub duration_sec: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cue_detection_ignores_case_and_padding() {
        assert!(ScriptLine::cue("thunder", AssetRef::Missing, None).is_cue());
        assert!(ScriptLine::dialogue(" sfx ", "boom").is_cue());
        assert!(!ScriptLine::dialogue("Host", "Welcome back").is_cue());
    }

    #[test]
    fn preview_prefers_high_quality_mp3() {
        let mut previews = BTreeMap::new();
        previews.insert("preview-lq-ogg".to_string(), "https://a/lq.ogg".to_string());
        previews.insert("preview-lq-mp3".to_string(), "https://a/lq.mp3".to_string());
        previews.insert("preview-hq-mp3".to_string(), "https://a/hq.mp3".to_string());
        let sfx = SoundEffect {
            id: 7,
            name: "rain".to_string(),
            previews,
            username: None,
            license: None,
        };
        assert_eq!(sfx.preview_url(), Some("https://a/hq.mp3"));

        let only_ogg = SoundEffect {
            previews: BTreeMap::from([(
                "preview-lq-ogg".to_string(),
                "https://a/lq.ogg".to_string(),
            )]),
            ..sfx
        };
        assert_eq!(only_ogg.preview_url(), Some("https://a/lq.ogg"));
    }

    #[test]
    fn chapter_music_volume_falls_back_to_global() {
        let a = Chapter::new("a", AssetRef::bytes(vec![1u8]));
        let mut b = Chapter::new("b", AssetRef::bytes(vec![1u8]));
        b.music_volume = Some(0.8);
        let mut podcast = Podcast::new("show", vec![a, b]);
        podcast.global_music_volume = 0.1;

        assert_eq!(podcast.music_volume_for(&podcast.chapters[0]), 0.1);
        assert_eq!(podcast.music_volume_for(&podcast.chapters[1]), 0.8);
    }

    #[test]
    fn new_chapter_status_tracks_speech_presence() {
        assert_eq!(
            Chapter::new("a", AssetRef::Missing).status,
            ChapterStatus::Pending
        );
        assert_eq!(
            Chapter::new("b", AssetRef::location("speech/b.mp3")).status,
            ChapterStatus::Completed
        );
    }
}
