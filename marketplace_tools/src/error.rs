use sg_common::http::HttpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketplaceApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("Unexpected response shape: {0}")]
    UnexpectedResponse(String),
}
