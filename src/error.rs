use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Failures that prevent an actor from completing an interaction.
///
/// A non-success status returned by the service is not one of these: it is
/// recorded as the actor's last response and asserted on by the caller.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response body: {0}")]
    UnexpectedBody(#[from] serde_json::Error),

    #[error("{actor} has not registered")]
    NotRegistered { actor: String },

    #[error("{actor} has no session token")]
    NotAuthenticated { actor: String },

    #[error("{actor} has not received a response yet")]
    NoResponse { actor: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("Step declared twice: {0}")]
    DuplicateStep(String),

    #[error("Step {step} depends on {predecessor}, which is not declared before it")]
    UnknownPredecessor { step: String, predecessor: String },
}
