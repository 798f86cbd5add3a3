use crate::core::error::ResolveError;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded PCM audio. Samples are interleaved `f32` in `[-1.0, 1.0]`.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels,
            samples,
        }
    }

    pub fn silent(sample_rate: u32, channels: u16, frames: usize) -> Self {
        Self::new(
            sample_rate,
            channels,
            vec![0.0; frames * usize::from(channels)],
        )
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Sample of `channel` at `frame`, as heard on an output with `out_channels`.
    ///
    /// Mono sources feed every output channel; a mono output averages the first
    /// two source channels; otherwise surplus source channels are dropped.
    pub fn sample_for_output(&self, frame: usize, channel: usize, out_channels: usize) -> f32 {
        let channels = usize::from(self.channels);
        let base = frame * channels;
        if channels == 1 {
            return self.samples[base];
        }
        if out_channels == 1 {
            return (self.samples[base] + self.samples[base + 1]) * 0.5;
        }
        self.samples[base + channel.min(channels - 1)]
    }
}

/// Decodes a complete in-memory audio file (mp3, wav, flac, ogg, aac, ...).
pub fn decode_audio(bytes: &[u8]) -> Result<AudioBuffer, ResolveError> {
    if bytes.is_empty() {
        return Err(ResolveError::decode("empty audio payload"));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ResolveError::decode(format!("unrecognized audio format: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ResolveError::decode("no audio track found"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| ResolveError::decode(format!("unsupported codec: {e}")))?;

    let mut sample_rate = codec_params.sample_rate;
    let mut channels = codec_params.channels.map(|c| c.count() as u16);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(ResolveError::decode(format!("failed to read packet: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = Some(spec.rate);
                channels = Some(spec.channels.count() as u16);

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(ResolveError::decode(format!("decoder failed: {e}"))),
        }
    }

    let sample_rate = sample_rate
        .filter(|rate| *rate > 0)
        .ok_or_else(|| ResolveError::decode("unknown sample rate"))?;
    let channels = channels
        .filter(|count| *count > 0)
        .ok_or_else(|| ResolveError::decode("unknown channel layout"))?;
    if samples.is_empty() {
        return Err(ResolveError::decode("no audio decoded"));
    }

    Ok(AudioBuffer::new(sample_rate, channels, samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::encoder::encode_wav;

    #[test]
    fn decode_round_trips_wav_format_and_length() {
        let source = AudioBuffer::new(8_000, 2, vec![0.25; 8_000 * 2]);
        let wav = encode_wav(&source).unwrap();

        let decoded = decode_audio(&wav).unwrap();
        assert_eq!(decoded.sample_rate, 8_000);
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.frames(), 8_000);
        assert!((decoded.duration_sec() - 1.0).abs() < 1e-9);
        assert!((decoded.samples[10] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn header_only_wav_is_a_decode_error() {
        let wav = encode_wav(&AudioBuffer::new(8_000, 1, vec![])).unwrap();
        let err = decode_audio(&wav).unwrap_err();
        assert!(matches!(err, ResolveError::Decode(_)));
        assert!(err.to_string().contains("no audio decoded"));
    }

    #[test]
    fn decode_rejects_non_audio_bytes() {
        let err = decode_audio(b"this is definitely not an audio file").unwrap_err();
        assert!(matches!(err, ResolveError::Decode(_)));
        assert!(matches!(decode_audio(&[]), Err(ResolveError::Decode(_))));
    }

    #[test]
    fn channel_mapping_for_output_layouts() {
        let mono = AudioBuffer::new(10, 1, vec![0.5, -0.5]);
        assert_eq!(mono.sample_for_output(1, 0, 2), -0.5);
        assert_eq!(mono.sample_for_output(1, 1, 2), -0.5);

        let stereo = AudioBuffer::new(10, 2, vec![0.2, 0.6, 1.0, 0.0]);
        assert!((stereo.sample_for_output(0, 0, 1) - 0.4).abs() < 1e-6);
        assert_eq!(stereo.sample_for_output(1, 1, 2), 0.0);
        assert_eq!(stereo.sample_for_output(1, 0, 2), 1.0);
    }

    #[test]
    fn duration_handles_degenerate_buffers() {
        assert_eq!(AudioBuffer::new(0, 1, vec![0.0; 4]).duration_sec(), 0.0);
        assert_eq!(AudioBuffer::new(44_100, 0, vec![]).frames(), 0);
        assert_eq!(AudioBuffer::silent(100, 2, 50).samples.len(), 100);
    }
}
