pub mod classifier;
pub mod config;
pub mod error;
pub mod genre;
pub mod hasher;
pub mod linker;
pub mod model;
pub mod pipeline;
pub mod placement;
pub mod platform;
pub mod probe;
pub mod progress;
pub mod prompt;
pub mod provider;
pub mod report;
pub mod resolver;
pub mod scanner;
pub mod storage;
pub mod text;

pub use config::{AppConfig, FileAge, RunOptions};
pub use error::Error;
pub use model::{Category, MediaKind, Video};
pub use pipeline::Pipeline;
pub use progress::{CancelFlag, ProgressReporter, SilentReporter};
pub use report::{Outcome, RunReport};
