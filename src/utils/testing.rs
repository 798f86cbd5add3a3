//! Fixtures shared by unit tests across modules.

use crate::core::error::ResolveError;
use crate::core::events::{MemorySink, MixEvent};
use crate::services::encoder::encode_wav;
use crate::services::fetch::AssetFetcher;
use crate::utils::audio::AudioBuffer;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// WAV bytes holding a constant `value` for `seconds`.
pub fn constant_wav(sample_rate: u32, channels: u16, seconds: f64, value: f32) -> Vec<u8> {
    let frames = (seconds * f64::from(sample_rate)).round() as usize;
    let buffer = AudioBuffer::new(
        sample_rate,
        channels,
        vec![value; frames * usize::from(channels)],
    );
    encode_wav(&buffer).unwrap()
}

/// Serves canned bytes per URL and counts requests.
#[derive(Default)]
pub struct StaticFetcher {
    responses: HashMap<String, Vec<u8>>,
    pub requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.responses.insert(url.to_string(), bytes);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl AssetFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| ResolveError::fetch(format!("404 for {url}")))
    }
}

pub fn recording_sink() -> Arc<MemorySink> {
    Arc::new(MemorySink::default())
}

pub fn skipped_names(events: &[MixEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            MixEvent::AssetSkipped { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

