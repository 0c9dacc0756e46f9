//! Core engine module
//!
//! Window and event loop hosting, configuration and frame timing.

mod config;
mod engine;
mod time;

pub use config::{ConfigError, EngineConfig, load_settings, save_settings};
pub use engine::{Engine, SceneApp};
pub use time::Time;
