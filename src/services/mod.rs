pub mod compositor;
pub mod encoder;
pub mod fetch;
pub mod resolver;
pub mod session;
pub mod subtitles;
pub mod video;
pub mod workflow;
