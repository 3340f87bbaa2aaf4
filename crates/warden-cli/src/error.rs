// Error types for the ACL HTTP client and the commands built on it

use warden_acl::{AclError, StoreError};
use warden_acl::rules::RuleError;

/// Errors raised while talking to the ACL HTTP API
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Unexpected response code: {status} ({body})")]
    RequestFailed { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ClientError> for StoreError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::RequestFailed { status: 404, body } => StoreError::NotFound(body),
            err @ ClientError::RequestFailed { .. } => StoreError::Rejected(err.to_string()),
            err => StoreError::Other(err.into()),
        }
    }
}

/// Failures of a CLI command. Each renders as the single line printed on stderr.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Error connecting to Warden agent: {0}")]
    Connect(#[source] ClientError),

    #[error("Cannot update a token without specifying the --id parameter")]
    MissingTokenId,

    #[error("Error determining token ID: {0}")]
    ResolveToken(#[source] AclError),

    #[error("Error when retrieving current token: {0}")]
    ReadToken(#[source] AclError),

    #[error("Error resolving policy ID {id}: {source}")]
    ResolvePolicy {
        id: String,
        #[source]
        source: AclError,
    },

    #[error("Failed to update token {id}: {source}")]
    UpdateToken {
        id: String,
        #[source]
        source: AclError,
    },

    #[error("Failed ACL bootstrapping: {0}")]
    Bootstrap(#[source] AclError),

    #[error("Error reading rules: {0}")]
    ReadRules(#[source] std::io::Error),

    #[error("Error translating rules: {0}")]
    Translate(#[source] RuleError),

    #[error("Error translating token rules: {0}")]
    TranslateToken(#[source] AclError),

    #[error("Error writing output: {0}")]
    Output(#[from] std::io::Error),
}
