pub type PodcastResult<T> = Result<T, PodcastError>;

/// Failures that abort a render or an export.
#[derive(thiserror::Error, Debug)]
pub enum PodcastError {
    #[error("no audio assets to assemble")]
    NoAudioAssets,

    #[error("assembled audio has zero duration")]
    ZeroDuration,

    #[error("speech audio for chapter '{chapter}' could not be loaded: {source}")]
    SpeechDecode {
        chapter: String,
        #[source]
        source: ResolveError,
    },

    #[error("export error: {0}")]
    Export(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PodcastError {
    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }
}

/// Failure to turn a single asset reference into decoded audio.
///
/// Whether this is fatal depends on the asset: the compositor aborts on speech
/// failures and skips music or sound-effect overlays.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("asset is missing")]
    Missing,

    #[error("host '{0}' is not an allowed catalog host")]
    HostNotAllowed(String),

    #[error("invalid asset location '{0}'")]
    InvalidLocation(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ResolveError {
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_messages_name_the_resource() {
        assert_eq!(
            PodcastError::NoAudioAssets.to_string(),
            "no audio assets to assemble"
        );
        assert!(PodcastError::ZeroDuration.to_string().contains("zero duration"));

        let err = PodcastError::SpeechDecode {
            chapter: "intro".to_string(),
            source: ResolveError::decode("not audio"),
        };
        let msg = err.to_string();
        assert!(msg.contains("intro"));
        assert!(msg.contains("not audio"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ResolveError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
