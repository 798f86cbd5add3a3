use crate::core::error::{PodcastError, PodcastResult};
use crate::utils::audio::AudioBuffer;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Wav,
    Mp3,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Mp3 => "mp3",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(try_from = "u32", into = "u32")]
pub enum Mp3Bitrate {
    Kbps128,
    #[default]
    Kbps192,
    Kbps256,
    Kbps320,
}

impl Mp3Bitrate {
    pub fn kbps(&self) -> u32 {
        match self {
            Mp3Bitrate::Kbps128 => 128,
            Mp3Bitrate::Kbps192 => 192,
            Mp3Bitrate::Kbps256 => 256,
            Mp3Bitrate::Kbps320 => 320,
        }
    }
}

impl TryFrom<u32> for Mp3Bitrate {
    type Error = String;

    fn try_from(kbps: u32) -> Result<Self, Self::Error> {
        match kbps {
            128 => Ok(Mp3Bitrate::Kbps128),
            192 => Ok(Mp3Bitrate::Kbps192),
            256 => Ok(Mp3Bitrate::Kbps256),
            320 => Ok(Mp3Bitrate::Kbps320),
            other => Err(format!(
                "unsupported mp3 bitrate {} kbps (expected 128, 192, 256 or 320)",
                other
            )),
        }
    }
}

impl From<Mp3Bitrate> for u32 {
    fn from(bitrate: Mp3Bitrate) -> Self {
        bitrate.kbps()
    }
}

/// Serializes a buffer as 16-bit PCM RIFF/WAVE at the buffer's own format.
pub fn encode_wav(buffer: &AudioBuffer) -> PodcastResult<Vec<u8>> {
    if buffer.channels == 0 || buffer.sample_rate == 0 {
        return Err(PodcastError::export(format!(
            "cannot encode audio with {} channels at {} Hz",
            buffer.channels, buffer.sample_rate
        )));
    }

    let spec = hound::WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| PodcastError::export(format!("failed to start WAV stream: {e}")))?;
        for sample in &buffer.samples {
            let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
            writer
                .write_sample(value)
                .map_err(|e| PodcastError::export(format!("failed to write WAV sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| PodcastError::export(format!("failed to finalize WAV: {e}")))?;
    }

    Ok(cursor.into_inner())
}

pub fn is_ffmpeg_on_path() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Turns the rendered mix into the downloadable file.
pub struct MasterEncoder {
    ffmpeg: String,
}

impl Default for MasterEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl MasterEncoder {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    pub async fn encode(
        &self,
        buffer: &AudioBuffer,
        format: ExportFormat,
        bitrate: Mp3Bitrate,
    ) -> PodcastResult<Vec<u8>> {
        match format {
            ExportFormat::Wav => encode_wav(buffer),
            ExportFormat::Mp3 => self.encode_mp3(buffer, bitrate).await,
        }
    }

    /// Pipes a WAV rendition of `buffer` through ffmpeg's LAME encoder.
    pub async fn encode_mp3(&self, buffer: &AudioBuffer, bitrate: Mp3Bitrate) -> PodcastResult<Vec<u8>> {
        let wav = encode_wav(buffer)?;
        debug!(
            "Encoding {:.2}s to mp3 at {} kbps",
            buffer.duration_sec(),
            bitrate.kbps()
        );

        let mut child = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-f", "wav", "-i", "pipe:0"])
            .args(["-c:a", "libmp3lame", "-b:a"])
            .arg(format!("{}k", bitrate.kbps()))
            .args(["-f", "mp3", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PodcastError::export(format!("failed to start '{}': {e}", self.ffmpeg)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PodcastError::export("ffmpeg stdin unavailable"))?;
        let writer = tokio::spawn(async move {
            stdin.write_all(&wav).await?;
            stdin.shutdown().await?;
            Ok::<(), std::io::Error>(())
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| PodcastError::export(format!("ffmpeg did not finish: {e}")))?;
        let write_result = writer
            .await
            .map_err(|e| PodcastError::export(format!("ffmpeg input task failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PodcastError::export(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        write_result
            .map_err(|e| PodcastError::export(format!("failed to stream audio to ffmpeg: {e}")))?;
        if output.stdout.is_empty() {
            return Err(PodcastError::export("ffmpeg produced no mp3 data"));
        }

        info!("Encoded mp3 ({} bytes)", output.stdout.len());
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::audio::decode_audio;

    #[test]
    fn wav_header_matches_buffer_format() {
        let buffer = AudioBuffer::new(22_050, 1, vec![0.0, 0.5, -0.5, 1.0]);
        let wav = encode_wav(&buffer).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte canonical header plus 2 bytes per sample.
        assert_eq!(wav.len(), 44 + 4 * 2);

        let reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 22_050);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let buffer = AudioBuffer::new(8_000, 1, vec![3.0, -3.0]);
        let wav = encode_wav(&buffer).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    fn degenerate_buffer_is_an_export_error() {
        let err = encode_wav(&AudioBuffer::new(0, 2, vec![])).unwrap_err();
        assert!(matches!(err, PodcastError::Export(_)));
    }

    #[test]
    fn bitrate_parsing() {
        assert_eq!(Mp3Bitrate::try_from(256).unwrap(), Mp3Bitrate::Kbps256);
        assert!(Mp3Bitrate::try_from(100).is_err());
        assert_eq!(u32::from(Mp3Bitrate::default()), 192);
        assert_eq!(ExportFormat::Mp3.extension(), "mp3");
    }

    #[tokio::test]
    async fn wav_export_goes_through_master_encoder() {
        let buffer = AudioBuffer::new(16_000, 2, vec![0.1; 16_000 * 2]);
        let bytes = MasterEncoder::default()
            .encode(&buffer, ExportFormat::Wav, Mp3Bitrate::default())
            .await
            .unwrap();
        let decoded = decode_audio(&bytes).unwrap();
        assert_eq!(decoded.frames(), 16_000);
    }

    #[tokio::test]
    async fn missing_ffmpeg_binary_is_an_export_error() {
        let encoder = MasterEncoder::new("definitely-not-an-ffmpeg-binary");
        let buffer = AudioBuffer::new(8_000, 1, vec![0.0; 800]);
        let err = encoder.encode_mp3(&buffer, Mp3Bitrate::Kbps128).await.unwrap_err();
        assert!(matches!(err, PodcastError::Export(_)));
    }

    #[tokio::test]
    async fn mp3_export_decodes_back() {
        if !is_ffmpeg_on_path() {
            return;
        }
        let buffer = AudioBuffer::new(44_100, 2, vec![0.2; 44_100 * 2]);
        let mp3 = MasterEncoder::default()
            .encode(&buffer, ExportFormat::Mp3, Mp3Bitrate::Kbps128)
            .await
            .unwrap();
        let decoded = decode_audio(&mp3).unwrap();
        assert!((decoded.duration_sec() - 1.0).abs() < 0.2);
    }
}
