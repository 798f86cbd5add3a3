pub mod config;
pub mod error;
pub mod events;
pub mod io;
pub mod model;
pub mod project;
