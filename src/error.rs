use thiserror::Error;

/// Failures talking to Jenkins or interpreting what it sent back
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure or non-success HTTP status
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },

    /// Failure writing console text to the output
    #[error("could not write build log: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL {0}")]
    Url(String),

    /// `buildWithParameters` answered without a queue location
    #[error("build trigger for job {0} returned no Location header")]
    MissingLocation(String),

    #[error("log response is missing the {0} header")]
    MissingHeader(&'static str),

    #[error("log response header {name} has invalid value {value:?}")]
    InvalidHeader { name: &'static str, value: String },

    /// The queue item never got an executor, so there is no build number to follow
    #[error("queue item {0} has not been scheduled to an executor yet")]
    NotScheduled(String),

    #[error("build did not finish within {0:?}")]
    TimedOut(std::time::Duration),

    #[error("unexpected build result {0}")]
    BuildFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
