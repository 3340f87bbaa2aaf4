// HTTP mapping of ACL errors
// Local wrapper so actix's ResponseError can be implemented for the foreign AclError

use actix_web::http::StatusCode;
use actix_web::http::header::{self, ContentType};
use actix_web::{HttpResponse, ResponseError};
use warden_acl::{AclError, ErrorKind};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub AclError);

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError(AclError::bad_request(msg))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            AclError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            AclError::AclDisabled => StatusCode::UNAUTHORIZED,
            err => match err.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::AmbiguousIdentifier | ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::Operational => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(target: "warden_server::acl", "ACL request failed: {}", self);
        }

        let mut builder = HttpResponse::build(status);
        if let AclError::MethodNotAllowed { allowed, .. } = &self.0 {
            builder.insert_header((header::ALLOW, allowed.join(", ")));
        }
        builder
            .content_type(ContentType::plaintext())
            .body(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use actix_web::body::to_bytes;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AclError::not_found("ACL not found"), StatusCode::NOT_FOUND),
            (AclError::bad_request("Missing token ID"), StatusCode::BAD_REQUEST),
            (
                AclError::AmbiguousIdentifier {
                    kind: "token",
                    prefix: "a".to_string(),
                    matches: vec!["ab".to_string(), "ac".to_string()],
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                AclError::MethodNotAllowed {
                    method: "POST".to_string(),
                    allowed: &["GET", "PUT", "DELETE"],
                },
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (AclError::AclDisabled, StatusCode::UNAUTHORIZED),
            (
                AclError::BootstrapAlreadyDone("ACL bootstrap no longer allowed".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (AclError::NoLegacyRules, StatusCode::FORBIDDEN),
            (
                AclError::Operational(anyhow::anyhow!("store unavailable")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError(err).status_code(), status);
        }
    }

    #[actix_rt::test]
    async fn test_body_is_message_text() {
        let resp = ApiError(AclError::AclDisabled).error_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body, "ACL support disabled");
    }

    #[test]
    fn test_method_not_allowed_sets_allow_header() {
        let resp = ApiError(AclError::MethodNotAllowed {
            method: "PATCH".to_string(),
            allowed: &["GET", "PUT", "DELETE"],
        })
        .error_response();
        assert_eq!(
            resp.headers().get(header::ALLOW).unwrap(),
            "GET, PUT, DELETE"
        );
    }
}
