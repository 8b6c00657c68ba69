use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The kind catalog could not be obtained. Fatal to startup.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery endpoint {endpoint} unreachable: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: BoxError,
    },
    #[error("malformed catalog: {0}")]
    Malformed(String),
}

impl DiscoveryError {
    pub fn unreachable(endpoint: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Unreachable { endpoint: endpoint.into(), source: source.into() }
    }
}

/// A normalized document could not be rendered to text.
#[derive(Debug, Error)]
#[error("rendering document: {0}")]
pub struct SerializationError(#[from] pub serde_yaml::Error);
