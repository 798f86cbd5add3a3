//! Slideshow video export: slides, the rendered mix and burned-in subtitles.

use crate::core::config::VideoConfig;
use crate::core::error::{PodcastError, PodcastResult};
use crate::core::events::{EventSink, MixEvent};
use crate::core::model::Slide;
use crate::services::resolver::AssetResolver;
use crate::services::subtitles::SubtitleTrack;
use anyhow::Context;
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use log::{debug, info};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const PLACEHOLDER_COLOR: Rgb<u8> = Rgb([18, 18, 24]);

/// A slide ready for the encoder: PNG bytes plus how long it stays on screen.
#[derive(Debug, Clone)]
pub struct PreparedSlide {
    pub png: Vec<u8>,
    pub duration_sec: f64,
}

#[derive(Debug, Clone)]
pub struct VideoJob {
    pub audio_wav: Vec<u8>,
    pub subtitles: SubtitleTrack,
    pub slides: Vec<PreparedSlide>,
    pub total_duration_sec: f64,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VideoOutcome {
    Completed(PathBuf),
    Cancelled,
}

#[async_trait]
pub trait VideoBackend: Send + Sync {
    /// Encodes `job`. `progress` receives the fraction of the total duration done.
    async fn render(
        &self,
        job: VideoJob,
        progress: &(dyn Fn(f64) + Send + Sync),
        cancel: CancellationToken,
    ) -> PodcastResult<VideoOutcome>;
}

fn encode_png(image: DynamicImage) -> PodcastResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| PodcastError::export(format!("failed to encode slide: {e}")))?;
    Ok(cursor.into_inner())
}

pub fn placeholder_png(width: u32, height: u32) -> PodcastResult<Vec<u8>> {
    let image = RgbImage::from_pixel(width.max(2), height.max(2), PLACEHOLDER_COLOR);
    encode_png(DynamicImage::ImageRgb8(image))
}

/// Loads and normalizes slide images. A slide that cannot be loaded is replaced by
/// a placeholder frame and reported; the export goes on.
///
/// The last slide is stretched so the slideshow covers `total_duration_sec`.
pub async fn prepare_slides(
    resolver: &AssetResolver,
    slides: &[Slide],
    events: &dyn EventSink,
    width: u32,
    height: u32,
    total_duration_sec: f64,
) -> PodcastResult<Vec<PreparedSlide>> {
    let mut prepared = Vec::with_capacity(slides.len().max(1));

    for (index, slide) in slides.iter().enumerate() {
        let decoded = match resolver.load_bytes(&slide.image).await {
            Ok(bytes) => image::load_from_memory(&bytes).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let png = match decoded {
            Ok(image) => encode_png(image)?,
            Err(reason) => {
                events.emit(MixEvent::ImageSubstituted { index, reason });
                placeholder_png(width, height)?
            }
        };
        prepared.push(PreparedSlide {
            png,
            duration_sec: slide.duration_sec.max(0.0),
        });
    }

    if prepared.is_empty() {
        prepared.push(PreparedSlide {
            png: placeholder_png(width, height)?,
            duration_sec: total_duration_sec,
        });
    }

    let shown: f64 = prepared.iter().map(|s| s.duration_sec).sum();
    if shown < total_duration_sec {
        if let Some(last) = prepared.last_mut() {
            last.duration_sec += total_duration_sec - shown;
        }
    }

    Ok(prepared)
}

/// ffconcat script for slides written as `slide_{i}.png`.
fn concat_script(slides: &[PreparedSlide]) -> String {
    let mut script = String::from("ffconcat version 1.0\n");
    for (i, slide) in slides.iter().enumerate() {
        script.push_str(&format!("file 'slide_{}.png'\nduration {:.3}\n", i, slide.duration_sec));
    }
    // The concat demuxer ignores the last duration unless the file is repeated.
    if !slides.is_empty() {
        script.push_str(&format!("file 'slide_{}.png'\n", slides.len() - 1));
    }
    script
}

/// Seconds of output encoded so far, from one `-progress` line.
fn parse_progress_line(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // ffmpeg reports microseconds under both keys.
        "out_time_us" | "out_time_ms" => value.parse::<f64>().ok().map(|us| us / 1_000_000.0),
        _ => None,
    }
}

pub struct FfmpegVideoBackend {
    ffmpeg: String,
    width: u32,
    height: u32,
    fps: u32,
}

impl FfmpegVideoBackend {
    pub fn new(config: &VideoConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            ffmpeg: config.ffmpeg.clone(),
            width: config.width,
            height: config.height,
            fps: config.fps,
        })
    }

    fn filter_graph(&self, with_subtitles: bool) -> String {
        let (w, h) = (self.width, self.height);
        let mut graph = format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,fps={},format=yuv420p",
            self.fps
        );
        if with_subtitles {
            graph.push_str(",subtitles=subs.srt:force_style='Fontsize=22,Outline=2,Shadow=0'");
        }
        graph
    }

    async fn write_inputs(&self, dir: &Path, job: &VideoJob) -> PodcastResult<()> {
        tokio::fs::write(dir.join("audio.wav"), &job.audio_wav)
            .await
            .context("failed to stage audio for video export")?;
        tokio::fs::write(dir.join("subs.srt"), job.subtitles.to_srt())
            .await
            .context("failed to stage subtitles for video export")?;
        for (i, slide) in job.slides.iter().enumerate() {
            tokio::fs::write(dir.join(format!("slide_{}.png", i)), &slide.png)
                .await
                .context("failed to stage slide for video export")?;
        }
        tokio::fs::write(dir.join("slides.ffconcat"), concat_script(&job.slides))
            .await
            .context("failed to stage slide list for video export")?;
        Ok(())
    }
}

fn absolute(path: &Path) -> PodcastResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    Ok(cwd.join(path))
}

#[async_trait]
impl VideoBackend for FfmpegVideoBackend {
    async fn render(
        &self,
        job: VideoJob,
        progress: &(dyn Fn(f64) + Send + Sync),
        cancel: CancellationToken,
    ) -> PodcastResult<VideoOutcome> {
        if cancel.is_cancelled() {
            return Ok(VideoOutcome::Cancelled);
        }
        if job.slides.is_empty() {
            return Err(PodcastError::export("video export needs at least one slide"));
        }

        let output = absolute(&job.output)?;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
        }

        let work_dir = tempfile::tempdir().context("failed to create video work directory")?;
        self.write_inputs(work_dir.path(), &job).await?;

        let mut child = Command::new(&self.ffmpeg)
            .current_dir(work_dir.path())
            .args(["-y", "-hide_banner", "-loglevel", "error", "-nostats"])
            .args(["-progress", "pipe:1"])
            .args(["-f", "concat", "-safe", "0", "-i", "slides.ffconcat"])
            .args(["-i", "audio.wav"])
            .arg("-vf")
            .arg(self.filter_graph(!job.subtitles.is_empty()))
            .args(["-map", "0:v:0", "-map", "1:a:0"])
            .args(["-c:v", "libx264", "-preset", "veryfast", "-c:a", "aac", "-b:a", "192k"])
            .arg("-t")
            .arg(format!("{:.3}", job.total_duration_sec))
            .arg("-shortest")
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PodcastError::export(format!("failed to start '{}': {e}", self.ffmpeg)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PodcastError::export("ffmpeg stdout unavailable"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| PodcastError::export("ffmpeg stderr unavailable"))?;
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        info!("Rendering video to {}", output.display());
        let total = job.total_duration_sec.max(f64::EPSILON);
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Video export cancelled, stopping ffmpeg");
                    let _ = child.kill().await;
                    return Ok(VideoOutcome::Cancelled);
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(done) = parse_progress_line(&line) {
                            progress((done / total).clamp(0.0, 1.0));
                        }
                    }
                    Ok(None) => break,
                    Err(e) => return Err(PodcastError::export(format!("failed to read ffmpeg progress: {e}"))),
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Ok(VideoOutcome::Cancelled);
            }
            status = child.wait() => status
                .map_err(|e| PodcastError::export(format!("ffmpeg did not finish: {e}")))?,
        };
        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(PodcastError::export(format!(
                "ffmpeg exited with {}: {}",
                status,
                stderr.trim()
            )));
        }

        progress(1.0);
        Ok(VideoOutcome::Completed(output))
    }
}
