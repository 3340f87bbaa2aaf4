//! Error types for the ACL core
//!
//! - `AclError`: everything an ACL operation can report to its caller
//! - `ErrorKind`: the coarse class an `AclError` belongs to
//! - `StoreError`: failures surfaced by an `AclStore` implementation

/// Message fragment a store uses to signal that bootstrap already happened.
/// Matched in error text so the signal survives transports that only carry strings.
pub const BOOTSTRAP_NOT_ALLOWED: &str = "ACL bootstrap no longer allowed";

/// Error class, used by boundaries to choose a response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AmbiguousIdentifier,
    BadRequest,
    Forbidden,
    Operational,
}

#[derive(thiserror::Error, Debug)]
pub enum AclError {
    #[error("{0}")]
    NotFound(String),

    #[error("Multiple {kind} IDs found with prefix {prefix:?}: {}", .matches.join(", "))]
    AmbiguousIdentifier {
        kind: &'static str,
        prefix: String,
        matches: Vec<String>,
    },

    #[error("{0}")]
    BadRequest(String),

    #[error("Method {method} not allowed, expected one of {}", .allowed.join(", "))]
    MethodNotAllowed {
        method: String,
        allowed: &'static [&'static str],
    },

    #[error("ACL support disabled")]
    AclDisabled,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Permission denied: {0}")]
    BootstrapAlreadyDone(String),

    #[error("The specified token does not have any rules set")]
    NoLegacyRules,

    #[error(transparent)]
    Operational(#[from] anyhow::Error),
}

impl AclError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AclError::NotFound(_) => ErrorKind::NotFound,
            AclError::AmbiguousIdentifier { .. } => ErrorKind::AmbiguousIdentifier,
            AclError::BadRequest(_) | AclError::MethodNotAllowed { .. } => ErrorKind::BadRequest,
            AclError::AclDisabled
            | AclError::PermissionDenied(_)
            | AclError::BootstrapAlreadyDone(_)
            | AclError::NoLegacyRules => ErrorKind::Forbidden,
            AclError::Operational(_) => ErrorKind::Operational,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        AclError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AclError::NotFound(msg.into())
    }
}

/// Errors reported by a store implementation
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("ACL bootstrap no longer allowed (reset index: {reset_index})")]
    BootstrapNotAllowed { reset_index: u64 },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<StoreError> for AclError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BootstrapNotAllowed { .. } => AclError::BootstrapAlreadyDone(err.to_string()),
            StoreError::NotFound(msg) => AclError::NotFound(msg),
            StoreError::Rejected(msg) if msg.contains(BOOTSTRAP_NOT_ALLOWED) => {
                AclError::BootstrapAlreadyDone(msg)
            }
            StoreError::Rejected(msg) => AclError::Operational(anyhow::anyhow!(msg)),
            StoreError::Other(e) if e.to_string().contains(BOOTSTRAP_NOT_ALLOWED) => {
                AclError::BootstrapAlreadyDone(e.to_string())
            }
            StoreError::Other(e) => AclError::Operational(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_identifier_names_matches() {
        let err = AclError::AmbiguousIdentifier {
            kind: "token",
            prefix: "aaaa".to_string(),
            matches: vec!["aaaa1111".to_string(), "aaaa2222".to_string()],
        };
        assert_eq!(
            err.to_string(),
            r#"Multiple token IDs found with prefix "aaaa": aaaa1111, aaaa2222"#
        );
        assert_eq!(err.kind(), ErrorKind::AmbiguousIdentifier);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(AclError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(AclError::bad_request("x").kind(), ErrorKind::BadRequest);
        assert_eq!(AclError::AclDisabled.kind(), ErrorKind::Forbidden);
        assert_eq!(AclError::NoLegacyRules.kind(), ErrorKind::Forbidden);
        assert_eq!(
            AclError::MethodNotAllowed {
                method: "POST".to_string(),
                allowed: &["GET"],
            }
            .kind(),
            ErrorKind::BadRequest
        );
    }

    #[test]
    fn test_store_bootstrap_error_maps_to_forbidden() {
        let err: AclError = StoreError::BootstrapNotAllowed { reset_index: 7 }.into();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(
            err.to_string(),
            "Permission denied: ACL bootstrap no longer allowed (reset index: 7)"
        );
    }

    #[test]
    fn test_store_bootstrap_signal_in_text_maps_to_forbidden() {
        let err: AclError =
            StoreError::Rejected("Unexpected response code: 403 (Permission denied: ACL bootstrap no longer allowed (reset index: 12))".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err: AclError =
            StoreError::Other(anyhow::anyhow!("rpc error: ACL bootstrap no longer allowed")).into();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_other_store_errors_are_operational() {
        let err: AclError = StoreError::Other(anyhow::anyhow!("connection refused")).into();
        assert_eq!(err.kind(), ErrorKind::Operational);
        assert_eq!(err.to_string(), "connection refused");

        let err: AclError = StoreError::Rejected("No path to datacenter".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Operational);
    }
}
