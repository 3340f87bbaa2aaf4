//! ACL HTTP handlers
//!
//! Thin adapters between actix requests and [`AclDispatcher`]: they pick the
//! credential, datacenter and identifiers out of the request, decode the body into the
//! operation's request type and render the result as JSON.

use std::sync::Arc;

use actix_web::http::header::ContentType;
use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use warden_acl::model::Token;
use warden_acl::{
    AclDispatcher, AclError, AclOperation, CrudResource, PolicyIdType, RequestContext,
    TokenCloneRequest,
};

use crate::error::ApiError;

pub const X_CONSUL_TOKEN: &str = "X-Consul-Token";

/// Shared handle registered as app data
pub type AclState = web::Data<Arc<AclDispatcher>>;

/// Bootstrap result, with the secret repeated as `ID` for older clients
#[derive(Debug, Serialize)]
struct BootstrapResponse {
    #[serde(rename = "ID")]
    id: String,
    #[serde(flatten)]
    token: Token,
}

/// Query parameters understood by the ACL endpoints; a repeated one is rejected
#[derive(Debug, Default, Deserialize)]
struct AclQuery {
    token: Option<String>,
    dc: Option<String>,
    #[serde(rename = "idType")]
    id_type: Option<String>,
    policy: Option<String>,
}

fn acl_query(req: &HttpRequest) -> Result<AclQuery, ApiError> {
    web::Query::<AclQuery>::from_query(req.query_string())
        .map(web::Query::into_inner)
        .map_err(|e| ApiError::bad_request(format!("Invalid query string: {}", e)))
}

/// Caller credential: `X-Consul-Token` header first, then the `token` query parameter
pub fn extract_token(req: &HttpRequest) -> Result<Option<String>, ApiError> {
    if let Some(token) = req.headers().get(X_CONSUL_TOKEN)
        && let Ok(token_str) = token.to_str()
        && !token_str.is_empty()
    {
        return Ok(Some(token_str.to_string()));
    }
    Ok(acl_query(req)?.token)
}

fn request_context(req: &HttpRequest) -> Result<RequestContext, ApiError> {
    let ctx = RequestContext::new(extract_token(req)?.unwrap_or_default());
    Ok(match acl_query(req)?.dc {
        Some(dc) => ctx.with_datacenter(dc),
        None => ctx,
    })
}

fn policy_id_type(req: &HttpRequest) -> Result<PolicyIdType, ApiError> {
    match acl_query(req)?.id_type {
        Some(value) if !value.is_empty() => Ok(value.parse()?),
        _ => Ok(PolicyIdType::Id),
    }
}

fn decode_body<T: DeserializeOwned>(body: &[u8], what: &str) -> Result<T, AclError> {
    serde_json::from_slice(body)
        .map_err(|e| AclError::bad_request(format!("{} decoding failed: {}", what, e)))
}

/// Decode an optional body; an empty one yields the default value
fn decode_optional_body<T: DeserializeOwned + Default>(
    body: &[u8],
    what: &str,
) -> Result<T, AclError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        Ok(T::default())
    } else {
        decode_body(body, what)
    }
}

fn plain_text(text: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body(text)
}

/// PUT|POST /v1/acl/bootstrap
pub async fn bootstrap(acl: AclState, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let token = acl.bootstrap(&request_context(&req)?).await?;
    Ok(HttpResponse::Ok().json(BootstrapResponse {
        id: token.secret_id.clone(),
        token,
    }))
}

/// GET /v1/acl/replication
pub async fn replication_status(
    acl: AclState,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let status = acl.replication_status(&request_context(&req)?).await?;
    Ok(HttpResponse::Ok().json(status))
}

/// POST /v1/acl/rules/translate
pub async fn translate_rules(acl: AclState, body: web::Bytes) -> Result<HttpResponse, ApiError> {
    let rules = std::str::from_utf8(&body)
        .map_err(|e| ApiError::bad_request(format!("Failed to read body: {}", e)))?;
    Ok(plain_text(acl.translate_rules(rules)?))
}

/// GET /v1/acl/rules/translate/{token_id}
pub async fn translate_token_rules(
    acl: AclState,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let translated = acl
        .translate_token_rules(&request_context(&req)?, &path.into_inner())
        .await?;
    Ok(plain_text(translated))
}

/// GET /v1/acl/policies
pub async fn list_policies(acl: AclState, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let policies = acl.list_policies(&request_context(&req)?).await?;
    Ok(HttpResponse::Ok().json(policies))
}

/// PUT /v1/acl/policy
pub async fn create_policy(
    acl: AclState,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    acl.check_enabled(AclOperation::PolicyWrite)?;
    let request = decode_body(&body, "Policy")?;
    let policy = acl
        .write_policy(&request_context(&req)?, None, PolicyIdType::Id, request)
        .await?;
    Ok(HttpResponse::Ok().json(policy))
}

/// GET|PUT|DELETE /v1/acl/policy/{id}?idType=id|name
pub async fn policy_crud(
    acl: AclState,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let operation = acl.crud_operation(CrudResource::Policy, req.method().as_str())?;
    let id = path.into_inner();
    let id_type = policy_id_type(&req)?;
    let ctx = request_context(&req)?;

    match operation {
        AclOperation::PolicyRead => {
            let policy = acl.read_policy(&ctx, &id, id_type).await?;
            Ok(HttpResponse::Ok().json(policy))
        }
        AclOperation::PolicyWrite => {
            let request = decode_body(&body, "Policy")?;
            let policy = acl.write_policy(&ctx, Some(&id), id_type, request).await?;
            Ok(HttpResponse::Ok().json(policy))
        }
        AclOperation::PolicyDelete => {
            acl.delete_policy(&ctx, &id, id_type).await?;
            Ok(HttpResponse::Ok().json(true))
        }
        other => Err(ApiError(AclError::Operational(anyhow::anyhow!(
            "unexpected policy operation {:?}",
            other
        )))),
    }
}

/// GET /v1/acl/tokens?policy=<id>
pub async fn list_tokens(acl: AclState, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let policy = acl_query(&req)?.policy;
    let tokens = acl
        .list_tokens(&request_context(&req)?, policy.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(tokens))
}

/// PUT /v1/acl/token
pub async fn create_token(
    acl: AclState,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    acl.check_enabled(AclOperation::TokenWrite)?;
    let request = decode_body(&body, "Token")?;
    let token = acl.write_token(&request_context(&req)?, None, request).await?;
    Ok(HttpResponse::Ok().json(token))
}

/// GET /v1/acl/token/self
pub async fn token_self(acl: AclState, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let token = acl.token_self(&request_context(&req)?).await?;
    Ok(HttpResponse::Ok().json(token))
}

/// GET|PUT|DELETE /v1/acl/token/{id}
pub async fn token_crud(
    acl: AclState,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let operation = acl.crud_operation(CrudResource::Token, req.method().as_str())?;
    let id = path.into_inner();
    let ctx = request_context(&req)?;

    match operation {
        AclOperation::TokenRead => {
            let token = acl.read_token(&ctx, &id).await?;
            Ok(HttpResponse::Ok().json(token))
        }
        AclOperation::TokenWrite => {
            let request = decode_body(&body, "Token")?;
            let token = acl.write_token(&ctx, Some(&id), request).await?;
            Ok(HttpResponse::Ok().json(token))
        }
        AclOperation::TokenDelete => {
            acl.delete_token(&ctx, &id).await?;
            Ok(HttpResponse::Ok().json(true))
        }
        other => Err(ApiError(AclError::Operational(anyhow::anyhow!(
            "unexpected token operation {:?}",
            other
        )))),
    }
}

/// PUT|POST /v1/acl/token/clone/{id}
pub async fn clone_token(
    acl: AclState,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    acl.check_enabled(AclOperation::TokenClone)?;
    let request: TokenCloneRequest = decode_optional_body(&body, "Token")?;
    let token = acl
        .clone_token(&request_context(&req)?, &path.into_inner(), request)
        .await?;
    Ok(HttpResponse::Ok().json(token))
}

/// PUT /v1/acl/token/upgrade/{id}
pub async fn upgrade_token(
    acl: AclState,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    acl.check_enabled(AclOperation::TokenUpgrade)?;
    let request = decode_optional_body(&body, "Token")?;
    let token = acl
        .upgrade_token(&request_context(&req)?, &path.into_inner(), request)
        .await?;
    Ok(HttpResponse::Ok().json(token))
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn test_extract_token_prefers_header() {
        let req = TestRequest::default()
            .uri("/v1/acl/token/self?token=from-query")
            .insert_header((X_CONSUL_TOKEN, "from-header"))
            .to_http_request();
        assert_eq!(extract_token(&req).unwrap().as_deref(), Some("from-header"));

        let req = TestRequest::default()
            .uri("/v1/acl/token/self?token=from-query")
            .to_http_request();
        assert_eq!(extract_token(&req).unwrap().as_deref(), Some("from-query"));

        let req = TestRequest::default().uri("/v1/acl/token/self").to_http_request();
        assert_eq!(extract_token(&req).unwrap(), None);
    }

    #[test]
    fn test_request_context_datacenter() {
        let req = TestRequest::default()
            .uri("/v1/acl/policies?dc=dc2")
            .to_http_request();
        assert_eq!(request_context(&req).unwrap().datacenter.as_deref(), Some("dc2"));

        let req = TestRequest::default().uri("/v1/acl/policies").to_http_request();
        assert_eq!(request_context(&req).unwrap().datacenter, None);
    }

    #[test]
    fn test_repeated_query_parameter_is_rejected() {
        let req = TestRequest::default()
            .uri("/v1/acl/policies?dc=dc1&dc=dc2")
            .to_http_request();
        let err = request_context(&req).unwrap_err();
        assert_eq!(err.0.kind(), warden_acl::ErrorKind::BadRequest);
        assert!(err.to_string().starts_with("Invalid query string: "));

        // The header credential does not need the query string
        let req = TestRequest::default()
            .uri("/v1/acl/token/self?token=a&token=b")
            .insert_header((X_CONSUL_TOKEN, "from-header"))
            .to_http_request();
        assert_eq!(extract_token(&req).unwrap().as_deref(), Some("from-header"));
        assert!(policy_id_type(&req).is_err());
    }

    #[test]
    fn test_policy_id_type_param() {
        let req = TestRequest::default()
            .uri("/v1/acl/policy/web?idType=name")
            .to_http_request();
        assert_eq!(policy_id_type(&req).unwrap(), PolicyIdType::Name);

        let req = TestRequest::default()
            .uri("/v1/acl/policy/web?idType=label")
            .to_http_request();
        assert_eq!(
            policy_id_type(&req).unwrap_err().to_string(),
            "Invalid value for idType parameter"
        );
    }

    #[test]
    fn test_optional_body() {
        let request: TokenCloneRequest = decode_optional_body(b"  \n", "Token").unwrap();
        assert!(request.description.is_empty());

        let request: TokenCloneRequest =
            decode_optional_body(br#"{"Description": "copy"}"#, "Token").unwrap();
        assert_eq!(request.description, "copy");

        let err = decode_optional_body::<TokenCloneRequest>(b"{", "Token").unwrap_err();
        assert!(err.to_string().starts_with("Token decoding failed: "));
    }

    #[test]
    fn test_bootstrap_response_shape() {
        let response = BootstrapResponse {
            id: "secret".to_string(),
            token: Token {
                accessor_id: "accessor".to_string(),
                secret_id: "secret".to_string(),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["ID"], "secret");
        assert_eq!(json["AccessorID"], "accessor");
        assert_eq!(json["SecretID"], "secret");
    }
}
