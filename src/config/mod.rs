pub mod database;
pub mod settings;

pub use settings::{ConfigError, Settings};
