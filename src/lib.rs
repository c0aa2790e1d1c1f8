pub mod align;
pub mod classifier;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod example_set;
pub mod extract;
pub mod features;
pub mod nlp;
pub mod pipeline;
pub mod streaming;
pub mod synthesizer;
pub mod trainer;

pub use config::{files_handling, Config, RunParams};
pub use error::{Result, WsdError};
pub use pipeline::{Pipeline, RunOutcome};
