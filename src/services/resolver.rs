use crate::core::error::{PodcastError, PodcastResult, ResolveError};
use crate::core::events::{AssetKind, EventSink, MixEvent};
use crate::core::io::Storage;
use crate::core::model::{AssetRef, Chapter, Podcast};
use crate::services::fetch::{is_remote, AssetFetcher};
use crate::utils::audio::{decode_audio, AudioBuffer};
use crate::utils::timing::ChapterTimeline;
use anyhow::Context;
use futures_util::StreamExt;
use indicatif::ProgressBar;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Decoded audio for one chapter that made it onto the timeline.
#[derive(Debug, Clone)]
pub struct ResolvedChapter {
    /// Position in `Podcast::chapters`.
    pub index: usize,
    pub speech: Arc<AudioBuffer>,
    pub music: Option<Arc<AudioBuffer>>,
    /// Sound effects keyed by script line index.
    pub cues: HashMap<usize, Arc<AudioBuffer>>,
}

/// Chapters with decodable speech, in podcast order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPodcast {
    pub chapters: Vec<ResolvedChapter>,
}

impl ResolvedPodcast {
    pub fn timeline(&self) -> ChapterTimeline {
        ChapterTimeline::from_durations(self.chapters.iter().map(|c| c.speech.duration_sec()))
    }
}

pub struct AssetResolver {
    fetcher: Arc<dyn AssetFetcher>,
    storage: Arc<dyn Storage>,
    events: Arc<dyn EventSink>,
    concurrency: usize,
    progress: Option<ProgressBar>,
}

impl AssetResolver {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, storage: Arc<dyn Storage>, events: Arc<dyn EventSink>) -> Self {
        Self {
            fetcher,
            storage,
            events,
            concurrency: 4,
            progress: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Raw bytes behind an asset reference.
    pub async fn load_bytes(&self, asset: &AssetRef) -> Result<Arc<Vec<u8>>, ResolveError> {
        match asset {
            AssetRef::Missing => Err(ResolveError::Missing),
            AssetRef::PreFetched(bytes) => Ok(bytes.clone()),
            AssetRef::Unresolved(location) if is_remote(location) => {
                Ok(Arc::new(self.fetcher.fetch(location).await?))
            }
            AssetRef::Unresolved(location) => {
                let bytes = self
                    .storage
                    .read(location)
                    .await
                    .with_context(|| format!("Failed to read {}", location))?;
                Ok(Arc::new(bytes))
            }
        }
    }

    pub async fn load_audio(&self, asset: &AssetRef) -> Result<Arc<AudioBuffer>, ResolveError> {
        let bytes = self.load_bytes(asset).await?;
        Ok(Arc::new(decode_audio(&bytes)?))
    }

    /// Speech failures are fatal. A chapter without speech yet is simply left out.
    pub async fn resolve_speech(&self, chapter: &Chapter) -> PodcastResult<Option<Arc<AudioBuffer>>> {
        if chapter.speech.is_missing() {
            debug!("Chapter '{}' has no speech yet, leaving it out", chapter.id);
            return Ok(None);
        }

        let buffer = self
            .load_audio(&chapter.speech)
            .await
            .map_err(|source| PodcastError::SpeechDecode {
                chapter: chapter.title.clone(),
                source,
            })?;
        self.events.emit(MixEvent::AssetResolved {
            kind: AssetKind::Speech,
            name: chapter.title.clone(),
            duration_sec: buffer.duration_sec(),
        });
        Ok(Some(buffer))
    }

    /// Overlay failures are reported and the overlay is dropped.
    pub async fn resolve_overlay(&self, kind: AssetKind, name: &str, asset: &AssetRef) -> Option<Arc<AudioBuffer>> {
        match self.load_audio(asset).await {
            Ok(buffer) => {
                self.events.emit(MixEvent::AssetResolved {
                    kind,
                    name: name.to_string(),
                    duration_sec: buffer.duration_sec(),
                });
                Some(buffer)
            }
            Err(e) => {
                self.events.emit(MixEvent::AssetSkipped {
                    kind,
                    name: name.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn tick(&self) {
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
    }

    pub async fn resolve_podcast(&self, podcast: &Podcast) -> PodcastResult<ResolvedPodcast> {
        if let Some(pb) = &self.progress {
            let cues: usize = podcast
                .chapters
                .iter()
                .map(|c| c.lines.iter().filter(|l| l.is_cue()).count())
                .sum();
            let music = podcast.chapters.iter().filter(|c| c.music.is_some()).count();
            pb.set_length((podcast.chapters.len() + music + cues) as u64);
        }

        // Speech
        let mut speech: Vec<(usize, PodcastResult<Option<Arc<AudioBuffer>>>)> =
            futures_util::stream::iter(podcast.chapters.iter().enumerate())
                .map(|(i, chapter)| async move {
                    let result = self.resolve_speech(chapter).await;
                    self.tick();
                    (i, result)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        speech.sort_by_key(|(i, _)| *i);

        let mut chapters = Vec::new();
        for (index, result) in speech {
            if let Some(buffer) = result? {
                chapters.push(ResolvedChapter {
                    index,
                    speech: buffer,
                    music: None,
                    cues: HashMap::new(),
                });
            }
        }

        // Music, once per track
        let mut tracks: Vec<(&str, &str, &AssetRef)> = Vec::new();
        for resolved in &chapters {
            let chapter = &podcast.chapters[resolved.index];
            if let Some(track) = &chapter.music {
                if !tracks.iter().any(|(id, _, _)| *id == track.id) {
                    tracks.push((track.id.as_str(), track.name.as_str(), &chapter.music_asset));
                }
            }
        }
        let music: HashMap<&str, Option<Arc<AudioBuffer>>> = futures_util::stream::iter(tracks)
            .map(|(id, name, asset)| async move {
                let buffer = self.resolve_overlay(AssetKind::Music, name, asset).await;
                (id, buffer)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        // Sound effects
        let mut cue_jobs = Vec::new();
        for (slot, resolved) in chapters.iter_mut().enumerate() {
            let chapter = &podcast.chapters[resolved.index];
            if let Some(track) = &chapter.music {
                resolved.music = music.get(track.id.as_str()).cloned().flatten();
                self.tick();
            }
            for (line_index, line) in chapter.lines.iter().enumerate() {
                if line.is_cue() {
                    cue_jobs.push((slot, line_index, line));
                }
            }
        }
        let cues: Vec<(usize, usize, Option<Arc<AudioBuffer>>)> = futures_util::stream::iter(cue_jobs)
            .map(|(slot, line_index, line)| async move {
                let buffer = self
                    .resolve_overlay(AssetKind::SoundEffect, line.cue_name(), &line.sfx_asset)
                    .await;
                self.tick();
                (slot, line_index, buffer)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        for (slot, line_index, buffer) in cues {
            if let Some(buffer) = buffer {
                chapters[slot].cues.insert(line_index, buffer);
            }
        }

        if let Some(pb) = &self.progress {
            pb.finish_with_message("Assets resolved");
        }
        Ok(ResolvedPodcast { chapters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;
    use crate::core::model::{MusicTrack, ScriptLine, SoundEffect};
    use crate::utils::testing::{constant_wav, recording_sink, skipped_names, StaticFetcher};
    use std::collections::BTreeMap;

    fn resolver(fetcher: Arc<StaticFetcher>, events: Arc<dyn EventSink>) -> AssetResolver {
        AssetResolver::new(fetcher, Arc::new(NativeStorage::new()), events)
    }

    fn effect(name: &str, url: &str) -> Arc<SoundEffect> {
        Arc::new(SoundEffect {
            id: 1,
            name: name.to_string(),
            previews: BTreeMap::from([("preview-hq-mp3".to_string(), url.to_string())]),
            username: None,
            license: None,
        })
    }

    fn cue_with(effect: Arc<SoundEffect>, asset: AssetRef) -> ScriptLine {
        let mut line = ScriptLine::cue(effect.name.clone(), asset, None);
        line.sound_effect = Some(effect);
        line
    }

    #[tokio::test]
    async fn prefetched_effect_is_used_without_any_request() {
        let fetcher = Arc::new(StaticFetcher::default());
        let sink = recording_sink();
        let url = "https://cdn.freesound.org/previews/door.mp3";
        let chapter = Chapter::new("c1", AssetRef::bytes(constant_wav(8_000, 1, 1.0, 0.1))).with_lines(vec![
            ScriptLine::dialogue("Host", "Knock knock."),
            cue_with(effect("door", url), AssetRef::bytes(constant_wav(8_000, 1, 0.2, 0.3))),
        ]);

        let resolved = resolver(fetcher.clone(), sink.clone())
            .resolve_podcast(&Podcast::new("show", vec![chapter]))
            .await
            .unwrap();

        assert_eq!(fetcher.request_count(), 0);
        assert!(resolved.chapters[0].cues.contains_key(&1));
        assert!(skipped_names(&sink.events()).is_empty());
    }

    #[tokio::test]
    async fn broken_overlays_are_skipped_and_speech_survives() {
        let music_url = "https://storage.jamendo.com/missing.mp3";
        let fetcher = Arc::new(StaticFetcher::default());
        let sink = recording_sink();
        let track = Arc::new(MusicTrack {
            id: "9".to_string(),
            name: "Gone".to_string(),
            artist_name: String::new(),
            audio_url: music_url.to_string(),
        });
        let chapter = Chapter::new("c1", AssetRef::bytes(constant_wav(8_000, 1, 2.0, 0.1)))
            .with_music(track, AssetRef::location(music_url))
            .with_lines(vec![
                cue_with(effect("garbage", "https://cdn.freesound.org/g.mp3"), AssetRef::bytes(b"not audio".to_vec())),
                ScriptLine::cue("unlinked", AssetRef::Missing, None),
            ]);

        let resolved = resolver(fetcher.clone(), sink.clone())
            .resolve_podcast(&Podcast::new("show", vec![chapter]))
            .await
            .unwrap();

        let chapter = &resolved.chapters[0];
        assert!((chapter.speech.duration_sec() - 2.0).abs() < 1e-9);
        assert!(chapter.music.is_none());
        assert!(chapter.cues.is_empty());
        assert_eq!(fetcher.request_count(), 1);

        let mut skipped = skipped_names(&sink.events());
        skipped.sort();
        assert_eq!(skipped, vec!["Gone", "garbage", "unlinked"]);
    }

    #[tokio::test]
    async fn effect_without_samples_is_skipped() {
        let fetcher = Arc::new(StaticFetcher::default());
        let sink = recording_sink();
        let empty = crate::services::encoder::encode_wav(&AudioBuffer::new(8_000, 1, vec![])).unwrap();
        let chapter = Chapter::new("c1", AssetRef::bytes(constant_wav(8_000, 1, 1.0, 0.1)))
            .with_lines(vec![cue_with(effect("hush", "https://cdn.freesound.org/hush.mp3"), AssetRef::bytes(empty))]);

        let resolved = resolver(fetcher, sink.clone())
            .resolve_podcast(&Podcast::new("show", vec![chapter]))
            .await
            .unwrap();

        assert!(resolved.chapters[0].cues.is_empty());
        assert_eq!(skipped_names(&sink.events()), vec!["hush"]);
    }

    #[tokio::test]
    async fn undecodable_speech_is_fatal() {
        let fetcher = Arc::new(StaticFetcher::default());
        let podcast = Podcast::new(
            "show",
            vec![
                Chapter::new("ok", AssetRef::bytes(constant_wav(8_000, 1, 1.0, 0.1))),
                Chapter::new("broken", AssetRef::bytes(b"<html>nope</html>".to_vec())),
            ],
        );

        let err = resolver(fetcher, recording_sink())
            .resolve_podcast(&podcast)
            .await
            .unwrap_err();
        match err {
            PodcastError::SpeechDecode { chapter, source } => {
                assert_eq!(chapter, "broken");
                assert!(matches!(source, ResolveError::Decode(_)));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn shared_track_is_fetched_once_and_pending_chapters_are_left_out() {
        let url = "https://prod-1.storage.jamendo.com/theme.mp3";
        let fetcher = Arc::new(StaticFetcher::default().with(url, constant_wav(8_000, 1, 1.0, 0.2)));
        let track = Arc::new(MusicTrack {
            id: "168".to_string(),
            name: "Theme".to_string(),
            artist_name: "Someone".to_string(),
            audio_url: url.to_string(),
        });
        let speech = || AssetRef::bytes(constant_wav(8_000, 1, 1.0, 0.1));
        let podcast = Podcast::new(
            "show",
            vec![
                Chapter::new("a", speech()).with_music(track.clone(), AssetRef::location(url)),
                Chapter::new("pending", AssetRef::Missing),
                Chapter::new("b", speech()).with_music(track, AssetRef::location(url)),
            ],
        );

        let resolved = resolver(fetcher.clone(), recording_sink())
            .resolve_podcast(&podcast)
            .await
            .unwrap();

        assert_eq!(fetcher.request_count(), 1);
        assert_eq!(
            resolved.chapters.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert!(resolved.chapters.iter().all(|c| c.music.is_some()));
        assert_eq!(resolved.timeline().start(1), 1.0);
    }

    #[tokio::test]
    async fn speech_paths_are_read_from_storage() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("c1.wav");
        let storage = NativeStorage::new();
        storage
            .write(path.to_str().unwrap(), &constant_wav(8_000, 2, 0.5, 0.1))
            .await?;

        let chapter = Chapter::new("c1", AssetRef::location(path.to_str().unwrap()));
        let buffer = resolver(Arc::new(StaticFetcher::default()), recording_sink())
            .resolve_speech(&chapter)
            .await?
            .unwrap();
        assert_eq!(buffer.channels, 2);
        assert!((buffer.duration_sec() - 0.5).abs() < 1e-9);
        Ok(())
    }
}
