use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("login form is missing required field {0}")]
    FormFieldMissing(String),
    #[error("portal rejected the credentials")]
    RejectedCredentials,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("portal returned server error {0}")]
    ServerError(u16),
    #[error("portal session expired")]
    SessionExpired,
    #[error("portal returned unexpected status {0}")]
    UnexpectedStatus(u16),
    #[error("re-authentication failed: {0}")]
    Auth(#[from] AuthFailure),
}
