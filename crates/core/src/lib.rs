#![forbid(unsafe_code)]

pub mod error;
pub mod level;
pub mod merge;
pub mod model;
pub mod progression;
pub mod settings;
pub mod streak;
pub mod time;
pub mod unlock;

pub use error::Error;
pub use settings::{ConfigError, ProgressionSettings};
pub use time::{Clock, DayBoundary};
