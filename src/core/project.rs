//! Project documents written by the script, speech and catalog stages.
//!
//! Asset sources are turned into [`AssetRef`]s once, here, so later stages never
//! have to guess where bytes come from.

use crate::core::io::Storage;
use crate::core::model::{
    AssetRef, Chapter, ChapterStatus, MusicTrack, Podcast, ScriptLine, Slide, SoundEffect,
    DEFAULT_GLOBAL_MUSIC_VOLUME,
};
use anyhow::{Context, Result};
use base64::Engine;
use log::{debug, warn};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum AssetSource {
    Path { path: String },
    Url { url: String },
    Base64 { base64: String },
}

#[derive(Debug, Deserialize)]
struct ProjectFile {
    title: String,
    #[serde(default = "default_global_music_volume")]
    global_music_volume: f32,
    #[serde(default)]
    chapters: Vec<ChapterFile>,
    #[serde(default)]
    slides: Vec<SlideFile>,
}

#[derive(Debug, Deserialize)]
struct ChapterFile {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    status: Option<ChapterStatus>,
    #[serde(default)]
    speech: Option<AssetSource>,
    #[serde(default)]
    music: Option<MusicTrack>,
    /// Pre-downloaded copy of `music`.
    #[serde(default)]
    music_path: Option<String>,
    #[serde(default)]
    music_volume: Option<f32>,
    #[serde(default)]
    lines: Vec<LineFile>,
}

#[derive(Debug, Deserialize)]
struct LineFile {
    speaker: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    sound_effect: Option<SoundEffect>,
    /// Pre-downloaded copy of `sound_effect`.
    #[serde(default)]
    sfx_path: Option<String>,
    #[serde(default)]
    volume: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct SlideFile {
    image: AssetSource,
    duration_sec: f64,
}

fn default_global_music_volume() -> f32 {
    DEFAULT_GLOBAL_MUSIC_VOLUME
}

/// A loaded project: the podcast plus the slides for the video export.
#[derive(Debug, Clone)]
pub struct Project {
    pub podcast: Podcast,
    pub slides: Vec<Slide>,
}

/// Reads a project document. Relative paths inside it are taken relative to the
/// document's own directory.
pub async fn load_project(storage: &dyn Storage, path: &str) -> Result<Project> {
    let bytes = storage
        .read(path)
        .await
        .with_context(|| format!("Failed to read project file {}", path))?;
    let file: ProjectFile = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse project file {}", path))?;

    let base_dir = Path::new(path).parent().unwrap_or_else(|| Path::new(""));
    let mut chapters = Vec::with_capacity(file.chapters.len());
    for chapter in file.chapters {
        chapters.push(ingest_chapter(storage, base_dir, chapter).await?);
    }

    let mut slides = Vec::with_capacity(file.slides.len());
    for (index, slide) in file.slides.into_iter().enumerate() {
        let image = asset_from_source(base_dir, slide.image)
            .with_context(|| format!("Invalid image for slide {}", index))?;
        slides.push(Slide {
            image,
            duration_sec: slide.duration_sec.max(0.0),
        });
    }

    let mut podcast = Podcast::new(file.title, chapters);
    podcast.global_music_volume = file.global_music_volume;
    debug!(
        "Loaded project '{}' with {} chapters and {} slides",
        podcast.title,
        podcast.chapters.len(),
        slides.len()
    );

    Ok(Project { podcast, slides })
}

async fn ingest_chapter(storage: &dyn Storage, base_dir: &Path, file: ChapterFile) -> Result<Chapter> {
    let speech = match file.speech {
        Some(source) => asset_from_source(base_dir, source)
            .with_context(|| format!("Invalid speech for chapter '{}'", file.id))?,
        None => AssetRef::Missing,
    };

    let mut chapter = Chapter::new(file.id, speech);
    if let Some(title) = file.title {
        chapter.title = title;
    }
    if let Some(status) = file.status {
        chapter.status = status;
    }
    chapter.music_volume = file.music_volume;

    if let Some(track) = file.music {
        let asset = match read_blob(storage, base_dir, file.music_path.as_deref()).await {
            Some(asset) => asset,
            None if !track.audio_url.trim().is_empty() => AssetRef::location(track.audio_url.clone()),
            None => AssetRef::Missing,
        };
        chapter = chapter.with_music(Arc::new(track), asset);
    }

    let mut lines = Vec::with_capacity(file.lines.len());
    for line in file.lines {
        lines.push(ingest_line(storage, base_dir, line).await);
    }

    Ok(chapter.with_lines(lines))
}

async fn ingest_line(storage: &dyn Storage, base_dir: &Path, file: LineFile) -> ScriptLine {
    let mut line = ScriptLine::dialogue(file.speaker, file.text);
    if !line.is_cue() {
        return line;
    }

    let blob = read_blob(storage, base_dir, file.sfx_path.as_deref()).await;
    let effect = file.sound_effect.map(Arc::new);
    line.sfx_asset = match blob {
        Some(asset) => asset,
        None => effect
            .as_deref()
            .and_then(SoundEffect::preview_url)
            .map(AssetRef::location)
            .unwrap_or_default(),
    };
    line.sound_effect = effect;
    line.volume = file.volume;
    line
}

/// Reads a pre-downloaded asset. A broken blob falls back to the catalog URL.
async fn read_blob(storage: &dyn Storage, base_dir: &Path, path: Option<&str>) -> Option<AssetRef> {
    let path = resolve_path(base_dir, path?);
    match storage.read(&path).await {
        Ok(bytes) => Some(AssetRef::bytes(bytes)),
        Err(e) => {
            warn!("Could not read pre-downloaded asset {}: {}", path, e);
            None
        }
    }
}

fn asset_from_source(base_dir: &Path, source: AssetSource) -> Result<AssetRef> {
    Ok(match source {
        AssetSource::Path { path } => AssetRef::location(resolve_path(base_dir, &path)),
        AssetSource::Url { url } => AssetRef::location(url),
        AssetSource::Base64 { base64 } => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(base64.trim())
                .context("Invalid base64 payload")?;
            AssetRef::bytes(bytes)
        }
    })
}

fn resolve_path(base_dir: &Path, path: &str) -> String {
    let candidate = Path::new(path);
    if candidate.is_absolute() || base_dir.as_os_str().is_empty() {
        path.to_string()
    } else {
        base_dir.join(candidate).to_string_lossy().into_owned()
    }
}
