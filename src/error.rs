use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Wrong collection name '{0}'. Available: SENTINEL-1, SENTINEL-2, SENTINEL-3, SENTINEL-5P")]
    InvalidCollection(String),

    #[error("Wrong product type '{product_type}' for collection {collection}. Available: {available}")]
    InvalidProductType {
        collection: String,
        product_type: String,
        available: String,
    },

    #[error("Catalog unreachable: {0}")]
    CatalogUnreachable(String),

    #[error("Malformed catalog response: {0}")]
    MalformedResponse(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Unable to fetch asset {id}: {reason}")]
    AssetFetchFailed { id: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unable to persist run report: {0}")]
    Report(String),
}

/// Discriminant of [`Error`], cheap to copy into driver state and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidCollection,
    InvalidProductType,
    CatalogUnreachable,
    MalformedResponse,
    AuthenticationFailed,
    AssetFetchFailed,
    Config,
    Report,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCollection(_) => ErrorKind::InvalidCollection,
            Self::InvalidProductType { .. } => ErrorKind::InvalidProductType,
            Self::CatalogUnreachable(_) => ErrorKind::CatalogUnreachable,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            Self::AssetFetchFailed { .. } => ErrorKind::AssetFetchFailed,
            Self::Config(_) => ErrorKind::Config,
            Self::Report(_) => ErrorKind::Report,
        }
    }

    pub(crate) fn fetch(id: &str, reason: impl ToString) -> Self {
        Self::AssetFetchFailed {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
