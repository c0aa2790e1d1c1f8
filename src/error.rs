use thiserror::Error;

pub type Result<T> = std::result::Result<T, WsdError>;

#[derive(Debug, Error)]
pub enum WsdError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("classifier {0} does not support incremental updates")]
    NotIncremental(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("npy error: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),

    #[error("invalid link pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("could not build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("annotation failed: {0}")]
    Annotation(String),

    #[error("schema mismatch: {0}")]
    Schema(String),

    #[error("classifier was used before it was trained")]
    Untrained,

    #[error("batch did not drain within {minutes} minutes")]
    DrainTimeout { minutes: u64 },

    // the resumable position is reported so that a new run can start with `skip_lines`
    #[error("failed to persist batch {batch}: {source}; last completed batch is {last_completed}, restart with skip_lines = {skip_lines}")]
    Persist {
        batch: usize,
        last_completed: usize,
        skip_lines: usize,
        #[source]
        source: Box<WsdError>,
    },
}
