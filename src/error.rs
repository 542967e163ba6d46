use std::sync::Arc;

use thiserror::Error;

use crate::strategy::StrategyError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the Unleash client.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Transport failure or non-successful response status while fetching features.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
    /// Features response body could not be decoded.
    #[error("error decoding features response")]
    Decode(#[source] Arc<serde_json::Error>),
    #[error("invalid features_endpoint configuration")]
    InvalidEndpoint(#[source] url::ParseError),
    /// A registered strategy factory failed to produce a strategy. This is a configuration error
    /// and is never retried.
    #[error("strategy {name:?} is misconfigured")]
    InvalidStrategy {
        name: String,
        #[source]
        source: StrategyError,
    },
}

impl Error {
    /// Returns `true` for errors raised while acquiring features from the server. These are the
    /// errors that failover recovers from.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Decode(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Decode(Arc::new(value))
    }
}
