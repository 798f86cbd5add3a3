use crate::core::config::AudioConfig;
use crate::core::error::{PodcastError, PodcastResult};
use crate::core::events::{EventSink, MixEvent};
use crate::core::model::Podcast;
use crate::services::resolver::ResolvedPodcast;
use crate::services::session::{Fade, GainEnvelope, RenderSession, ScheduledSource, SourceRole};
use crate::utils::audio::AudioBuffer;
use crate::utils::timing::TimingModel;
use std::sync::Arc;

/// Length of the music fade at a chapter boundary where the track changes.
pub const CROSSFADE_SECONDS: f64 = 1.5;
pub const DEFAULT_SFX_VOLUME: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixSettings {
    pub crossfade_sec: f64,
    pub default_sfx_volume: f32,
    pub timing: TimingModel,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            crossfade_sec: CROSSFADE_SECONDS,
            default_sfx_volume: DEFAULT_SFX_VOLUME,
            timing: TimingModel::default(),
        }
    }
}

impl From<&AudioConfig> for MixSettings {
    fn from(config: &AudioConfig) -> Self {
        Self {
            crossfade_sec: config.crossfade_seconds.max(0.0),
            default_sfx_volume: config.default_sfx_volume,
            timing: config.timing,
        }
    }
}

/// Lays chapters end to end, beds music under them and drops sound effects on
/// their estimated cue times.
pub struct Compositor {
    settings: MixSettings,
    events: Arc<dyn EventSink>,
}

impl Compositor {
    pub fn new(settings: MixSettings, events: Arc<dyn EventSink>) -> Self {
        Self { settings, events }
    }

    pub fn settings(&self) -> &MixSettings {
        &self.settings
    }

    /// Builds the render session for `resolved` without rendering it.
    ///
    /// The session uses the first chapter's sample rate and channel count; other
    /// formats are converted while mixing.
    pub fn schedule(&self, podcast: &Podcast, resolved: &ResolvedPodcast) -> PodcastResult<RenderSession> {
        let first = resolved
            .chapters
            .first()
            .ok_or(PodcastError::NoAudioAssets)?;

        let timeline = resolved.timeline();
        let sample_rate = first.speech.sample_rate;
        let frames = (timeline.total() * f64::from(sample_rate)).round() as usize;
        if timeline.total() <= 0.0 || frames == 0 {
            return Err(PodcastError::ZeroDuration);
        }

        let mut session = RenderSession::new(sample_rate, first.speech.channels, frames);

        // Track ids actually playing under each included chapter.
        let playing: Vec<Option<&str>> = resolved
            .chapters
            .iter()
            .map(|rc| {
                rc.music
                    .as_ref()
                    .and(podcast.chapters[rc.index].music.as_ref())
                    .map(|track| track.id.as_str())
            })
            .collect();

        let crossfade = self.settings.crossfade_sec.max(0.0);
        let mut music_carry = 0.0;

        for (slot, rc) in resolved.chapters.iter().enumerate() {
            let chapter = &podcast.chapters[rc.index];
            let start = timeline.start(slot);
            let end = timeline.end(slot);

            session.schedule(ScheduledSource::once(
                SourceRole::Speech,
                chapter.title.clone(),
                rc.speech.clone(),
                start,
                1.0,
            ));
            self.events.emit(MixEvent::ChapterScheduled {
                chapter: chapter.title.clone(),
                start_sec: start,
                duration_sec: timeline.duration(slot),
            });

            let (Some(buffer), Some(track)) = (&rc.music, &chapter.music) else {
                continue;
            };
            let previous = slot.checked_sub(1).and_then(|p| playing[p]);
            let next = playing.get(slot + 1).copied().flatten();
            let fade_in = previous != Some(track.id.as_str());
            let fade_out = next != Some(track.id.as_str());

            // A track carried over from the previous chapter keeps playing where it was.
            let offset = if fade_in { 0.0 } else { music_carry };
            let track_len = buffer.duration_sec();
            music_carry = if track_len > 0.0 {
                (offset + timeline.duration(slot)) % track_len
            } else {
                0.0
            };

            session.schedule(ScheduledSource {
                role: SourceRole::Music,
                label: track.name.clone(),
                buffer: buffer.clone(),
                start_sec: start,
                offset_sec: offset,
                end_sec: Some(end),
                looped: true,
                gain: GainEnvelope {
                    level: podcast.music_volume_for(chapter),
                    fade_in: fade_in.then(|| Fade::new(start, start + crossfade)),
                    fade_out: fade_out.then(|| Fade::new((end - crossfade).max(start), end)),
                },
            });
            self.events.emit(MixEvent::MusicScheduled {
                chapter: chapter.title.clone(),
                track: track.name.clone(),
                fade_in,
                fade_out,
            });
        }

        for (slot, rc) in resolved.chapters.iter().enumerate() {
            let chapter = &podcast.chapters[rc.index];
            let start = timeline.start(slot);

            for cue in self.settings.timing.cue_offsets(&chapter.lines) {
                let Some(buffer) = rc.cues.get(&cue.line_index) else {
                    continue;
                };
                let line = &chapter.lines[cue.line_index];
                let at_sec = start + cue.offset_sec;
                session.schedule(ScheduledSource::once(
                    SourceRole::SoundEffect,
                    line.cue_name(),
                    buffer.clone(),
                    at_sec,
                    line.volume.unwrap_or(self.settings.default_sfx_volume),
                ));
                self.events.emit(MixEvent::CueScheduled {
                    chapter: chapter.title.clone(),
                    name: line.cue_name().to_string(),
                    at_sec,
                });
            }
        }

        Ok(session)
    }

    /// Schedules and renders the whole podcast into one buffer.
    pub async fn compose(&self, podcast: &Podcast, resolved: &ResolvedPodcast) -> PodcastResult<AudioBuffer> {
        let session = self.schedule(podcast, resolved)?;
        let sources = session.sources().len();

        let buffer = tokio::task::spawn_blocking(move || session.render())
            .await
            .map_err(|e| anyhow::anyhow!("render task failed: {e}"))?;

        self.events.emit(MixEvent::Rendered {
            duration_sec: buffer.duration_sec(),
            sources,
        });
        Ok(buffer)
    }
}
