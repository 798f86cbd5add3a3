//! Offline render session: a fixed-length output buffer plus the sources
//! scheduled onto it. Each render owns a fresh session and consumes it.

use crate::utils::audio::AudioBuffer;
use std::sync::Arc;

/// A linear ramp between two absolute session times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    pub start_sec: f64,
    pub end_sec: f64,
}

impl Fade {
    pub fn new(start_sec: f64, end_sec: f64) -> Self {
        Self { start_sec, end_sec }
    }

    /// 0.0 before the ramp, 1.0 after it.
    pub fn progress(&self, t: f64) -> f32 {
        if self.end_sec <= self.start_sec {
            return if t >= self.end_sec { 1.0 } else { 0.0 };
        }
        ((t - self.start_sec) / (self.end_sec - self.start_sec)).clamp(0.0, 1.0) as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainEnvelope {
    pub level: f32,
    pub fade_in: Option<Fade>,
    pub fade_out: Option<Fade>,
}

impl GainEnvelope {
    pub fn constant(level: f32) -> Self {
        Self {
            level,
            fade_in: None,
            fade_out: None,
        }
    }

    pub fn gain_at(&self, t: f64) -> f32 {
        let fade_in = self.fade_in.map_or(1.0, |f| f.progress(t));
        let fade_out = self.fade_out.map_or(1.0, |f| 1.0 - f.progress(t));
        self.level * fade_in * fade_out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRole {
    Speech,
    Music,
    SoundEffect,
}

#[derive(Debug, Clone)]
pub struct ScheduledSource {
    pub role: SourceRole,
    pub label: String,
    pub buffer: Arc<AudioBuffer>,
    pub start_sec: f64,
    /// Position inside `buffer` heard at `start_sec`.
    pub offset_sec: f64,
    /// Absolute stop time; `None` plays to the end of the buffer (or session when looped).
    pub end_sec: Option<f64>,
    pub looped: bool,
    pub gain: GainEnvelope,
}

impl ScheduledSource {
    pub fn once(role: SourceRole, label: impl Into<String>, buffer: Arc<AudioBuffer>, start_sec: f64, level: f32) -> Self {
        Self {
            role,
            label: label.into(),
            buffer,
            start_sec,
            offset_sec: 0.0,
            end_sec: None,
            looped: false,
            gain: GainEnvelope::constant(level),
        }
    }
}

pub struct RenderSession {
    sample_rate: u32,
    channels: u16,
    frames: usize,
    sources: Vec<ScheduledSource>,
}

impl RenderSession {
    pub fn new(sample_rate: u32, channels: u16, frames: usize) -> Self {
        Self {
            sample_rate,
            channels,
            frames,
            sources: Vec::new(),
        }
    }

    pub fn schedule(&mut self, source: ScheduledSource) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[ScheduledSource] {
        &self.sources
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn duration_sec(&self) -> f64 {
        self.frames as f64 / f64::from(self.sample_rate.max(1))
    }

    /// Mixes every scheduled source into one buffer.
    ///
    /// Sources are read at their own rate with linear interpolation. Anything
    /// past the end of the session is cut off, and the sum is clamped to [-1, 1].
    pub fn render(self) -> AudioBuffer {
        let out_channels = usize::from(self.channels);
        let rate = f64::from(self.sample_rate.max(1));
        let mut out = AudioBuffer::silent(self.sample_rate, self.channels, self.frames);

        for source in &self.sources {
            let buffer = source.buffer.as_ref();
            let src_frames = buffer.frames();
            if src_frames == 0 || buffer.sample_rate == 0 || out_channels == 0 {
                continue;
            }
            let src_rate = f64::from(buffer.sample_rate);

            let start_frame = (source.start_sec * rate).round().max(0.0) as usize;
            let stop_sec = match source.end_sec {
                Some(end) => end,
                None if source.looped => self.duration_sec(),
                None => {
                    source.start_sec + (buffer.duration_sec() - source.offset_sec).max(0.0)
                }
            };
            let end_frame = ((stop_sec * rate).round().max(0.0) as usize).min(self.frames);

            for dst in start_frame..end_frame {
                let rel_sec = (dst - start_frame) as f64 / rate + source.offset_sec;
                let mut pos = rel_sec * src_rate;
                if !pos.is_finite() || pos < 0.0 {
                    break;
                }
                if source.looped {
                    pos %= src_frames as f64;
                } else if pos >= src_frames as f64 {
                    break;
                }

                let frame0 = (pos.floor() as usize).min(src_frames - 1);
                let frame1 = if source.looped {
                    (frame0 + 1) % src_frames
                } else {
                    (frame0 + 1).min(src_frames - 1)
                };
                let frac = (pos - frame0 as f64) as f32;

                let gain = source.gain.gain_at(dst as f64 / rate);
                if gain == 0.0 {
                    continue;
                }

                let base = dst * out_channels;
                for channel in 0..out_channels {
                    let v0 = buffer.sample_for_output(frame0, channel, out_channels);
                    let v1 = buffer.sample_for_output(frame1, channel, out_channels);
                    out.samples[base + channel] += (v0 + (v1 - v0) * frac) * gain;
                }
            }
        }

        for sample in &mut out.samples {
            *sample = sample.clamp(-1.0, 1.0);
        }
        out
    }
}
