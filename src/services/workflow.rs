use crate::core::config::Config;
use crate::core::events::{EventSink, MixEvent};
use crate::core::io::Storage;
use crate::core::project::load_project;
use crate::services::compositor::{Compositor, MixSettings};
use crate::services::encoder::{encode_wav, ExportFormat, MasterEncoder};
use crate::services::fetch::AssetFetcher;
use crate::services::resolver::AssetResolver;
use crate::services::subtitles::SubtitleTrack;
use crate::services::video::{prepare_slides, FfmpegVideoBackend, VideoBackend, VideoJob, VideoOutcome};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const VIDEO_PROGRESS_STEPS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub audio_path: PathBuf,
    pub subtitles_path: PathBuf,
    pub video: Option<VideoOutcome>,
    pub duration_sec: f64,
}

pub struct PodcastWorkflow {
    config: Config,
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn AssetFetcher>,
    events: Arc<dyn EventSink>,
    video_backend: Option<Arc<dyn VideoBackend>>,
}

impl PodcastWorkflow {
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn AssetFetcher>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
            events,
            video_backend: None,
        }
    }

    pub fn with_video_backend(mut self, backend: Arc<dyn VideoBackend>) -> Self {
        self.video_backend = Some(backend);
        self
    }

    fn resolver(&self) -> AssetResolver {
        AssetResolver::new(self.fetcher.clone(), self.storage.clone(), self.events.clone())
            .with_concurrency(self.config.proxy.concurrency)
    }

    /// Loads a project, mixes it and writes the audio, subtitle and video outputs.
    pub async fn run(&self, project_path: &str, cancel: CancellationToken) -> Result<WorkflowReport> {
        println!("Loading project {}...", project_path);
        let project = load_project(self.storage.as_ref(), project_path).await?;
        let podcast = &project.podcast;

        println!("Resolving assets...");
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("#>-"),
        );
        let resolver = self.resolver().with_progress(pb);
        let resolved = resolver.resolve_podcast(podcast).await?;

        println!("Mixing {} chapters...", resolved.chapters.len());
        let compositor = Compositor::new(MixSettings::from(&self.config.audio), self.events.clone());
        let buffer = compositor.compose(podcast, &resolved).await?;

        let stem = output_stem(&podcast.title);
        let output_dir = Path::new(&self.config.output_folder);
        let format = self.config.audio.export_format;

        let encoder = MasterEncoder::new(self.config.video.ffmpeg.clone());
        let audio = encoder
            .encode(&buffer, format, self.config.audio.mp3_bitrate)
            .await?;
        let audio_path = output_dir.join(format!("{}.{}", stem, format.extension()));
        self.storage
            .write(&audio_path.to_string_lossy(), &audio)
            .await
            .with_context(|| format!("Failed to write {}", audio_path.display()))?;
        println!("Audio written to {}", audio_path.display());

        let subtitles = SubtitleTrack::for_podcast(podcast, &resolved, &compositor.settings().timing);
        let subtitles_path = output_dir.join(format!("{}.srt", stem));
        self.storage
            .write(&subtitles_path.to_string_lossy(), subtitles.to_srt().as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", subtitles_path.display()))?;

        let video = if self.config.video.enabled {
            let audio_wav = match format {
                ExportFormat::Wav => audio,
                ExportFormat::Mp3 => encode_wav(&buffer)?,
            };
            let slides = prepare_slides(
                &self.resolver(),
                &project.slides,
                self.events.as_ref(),
                self.config.video.width,
                self.config.video.height,
                buffer.duration_sec(),
            )
            .await?;
            let job = VideoJob {
                audio_wav,
                subtitles,
                slides,
                total_duration_sec: buffer.duration_sec(),
                output: output_dir.join(format!("{}.mp4", stem)),
            };
            Some(self.render_video(job, cancel).await?)
        } else {
            None
        };

        Ok(WorkflowReport {
            audio_path,
            subtitles_path,
            video,
            duration_sec: buffer.duration_sec(),
        })
    }

    async fn render_video(&self, job: VideoJob, cancel: CancellationToken) -> Result<VideoOutcome> {
        let backend: Arc<dyn VideoBackend> = match &self.video_backend {
            Some(backend) => backend.clone(),
            None => Arc::new(FfmpegVideoBackend::new(&self.config.video)?),
        };

        println!("Rendering video ({} slides)...", job.slides.len());
        let pb = ProgressBar::new(VIDEO_PROGRESS_STEPS);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% ({eta})")?
                .progress_chars("#>-"),
        );
        let bar = pb.clone();
        let progress = move |fraction: f64| {
            bar.set_position((fraction * VIDEO_PROGRESS_STEPS as f64) as u64);
        };

        let outcome = backend.render(job, &progress, cancel).await?;
        match &outcome {
            VideoOutcome::Completed(path) => {
                pb.finish_with_message("Video complete");
                println!("Video written to {}", path.display());
            }
            VideoOutcome::Cancelled => {
                pb.abandon();
                self.events.emit(MixEvent::VideoCancelled);
            }
        }
        Ok(outcome)
    }
}

/// File-name-safe stem for a podcast title.
pub fn output_stem(title: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "podcast".to_string()
    } else {
        stem.to_string()
    }
}
