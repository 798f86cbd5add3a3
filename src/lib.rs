pub mod core;
pub mod services;
pub mod utils;

pub use crate::core::config::Config;
pub use crate::core::error::{PodcastError, PodcastResult, ResolveError};
pub use crate::core::model::{AssetRef, Chapter, Podcast, ScriptLine};
pub use crate::services::workflow::{PodcastWorkflow, WorkflowReport};
