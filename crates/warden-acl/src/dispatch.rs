//! ACL request dispatch
//!
//! Every ACL operation enters through [`AclDispatcher`]. Requests are decoded into a
//! typed schema per operation, normalized (path/payload identifier consistency,
//! `CreateTime` parsing, rule validation) and only then handed to the [`AclStore`].
//! Nothing is written to the store when validation fails.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bootstrap;
use crate::error::AclError;
use crate::model::{
    ANONYMOUS_TOKEN_ID, DEFAULT_DATACENTER, Policy, PolicyIdType, PolicyLink, PolicyListStub,
    ReplicationStatus, Syntax, Token, TokenIdType, TokenListStub,
};
use crate::rules::{PolicyRules, translate_legacy_rules};
use crate::store::AclStore;

const ACL_NOT_FOUND: &str = "ACL not found";

/// Injected dispatcher settings
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// When false every operation except rule translation fails with `AclDisabled`
    pub acl_enabled: bool,
    /// Datacenter used when a request does not name one
    pub datacenter: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            acl_enabled: true,
            datacenter: DEFAULT_DATACENTER.to_string(),
        }
    }
}

/// Per-request caller data
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub datacenter: Option<String>,
    /// Caller's secret, forwarded unchanged to the store
    pub credential: String,
}

impl RequestContext {
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            datacenter: None,
            credential: credential.into(),
        }
    }

    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        let datacenter = datacenter.into();
        self.datacenter = (!datacenter.is_empty()).then_some(datacenter);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AclOperation {
    Bootstrap,
    ReplicationStatus,
    TranslateRules,
    TranslateTokenRules,
    PolicyList,
    PolicyRead,
    PolicyWrite,
    PolicyDelete,
    TokenList,
    TokenRead,
    TokenWrite,
    TokenDelete,
    TokenSelf,
    TokenClone,
    TokenUpgrade,
}

impl AclOperation {
    /// Whether the operation is refused while ACLs are disabled
    pub fn requires_acl(self) -> bool {
        !matches!(
            self,
            AclOperation::TranslateRules | AclOperation::TranslateTokenRules
        )
    }
}

/// Record family addressed by a CRUD route
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrudResource {
    Policy,
    Token,
}

/// Verb of a single-record CRUD request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrudVerb {
    Read,
    Write,
    Delete,
}

impl CrudVerb {
    pub const ALLOWED_METHODS: &'static [&'static str] = &["GET", "PUT", "DELETE"];

    pub fn from_method(method: &str) -> Result<Self, AclError> {
        match method {
            "GET" => Ok(CrudVerb::Read),
            "PUT" => Ok(CrudVerb::Write),
            "DELETE" => Ok(CrudVerb::Delete),
            _ => Err(AclError::MethodNotAllowed {
                method: method.to_string(),
                allowed: Self::ALLOWED_METHODS,
            }),
        }
    }

    pub fn operation(self, resource: CrudResource) -> AclOperation {
        match (resource, self) {
            (CrudResource::Policy, CrudVerb::Read) => AclOperation::PolicyRead,
            (CrudResource::Policy, CrudVerb::Write) => AclOperation::PolicyWrite,
            (CrudResource::Policy, CrudVerb::Delete) => AclOperation::PolicyDelete,
            (CrudResource::Token, CrudVerb::Read) => AclOperation::TokenRead,
            (CrudResource::Token, CrudVerb::Write) => AclOperation::TokenWrite,
            (CrudResource::Token, CrudVerb::Delete) => AclOperation::TokenDelete,
        }
    }
}

// ============================================================================
// Request schema
// ============================================================================

/// Token create/update payload
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TokenWriteRequest {
    #[serde(rename = "AccessorID", default)]
    pub accessor_id: String,
    #[serde(rename = "SecretID", default)]
    pub secret_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub policies: Vec<PolicyLink>,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub rules: String,
    /// RFC 3339 text, parsed during normalization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
}

/// Policy create/update payload. Any submitted `Syntax` is ignored.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyWriteRequest {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: String,
    #[serde(default)]
    pub datacenters: Vec<String>,
}

/// Optional body of a clone request
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TokenCloneRequest {
    #[serde(default)]
    pub description: String,
}

fn check_links(links: &[PolicyLink]) -> Result<(), AclError> {
    if links.iter().any(PolicyLink::is_empty) {
        return Err(AclError::bad_request(
            "Policy links must have an ID or Name",
        ));
    }
    Ok(())
}

/// Turn a token payload into the record to store.
///
/// `path_id` is the accessor ID from the URL, `None` for creates.
pub fn normalize_token_write(
    path_id: Option<&str>,
    request: TokenWriteRequest,
) -> Result<Token, AclError> {
    let create_time = match request.create_time.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| AclError::bad_request(format!("Token decoding failed: {}", e)))?,
        ),
    };

    let mut accessor_id = request.accessor_id;
    if let Some(path_id) = path_id.filter(|id| !id.is_empty()) {
        if accessor_id.is_empty() {
            accessor_id = path_id.to_string();
        } else if accessor_id != path_id {
            return Err(AclError::bad_request(
                "Token Accessor ID in URL and payload do not match",
            ));
        }
    }

    check_links(&request.policies)?;

    Ok(Token {
        accessor_id,
        secret_id: request.secret_id,
        description: request.description,
        policies: request.policies,
        local: request.local,
        rules: request.rules,
        create_time,
        ..Default::default()
    })
}

/// Turn a policy payload into the record to store.
///
/// `path_id` is the URL identifier, interpreted according to `id_type`.
pub fn normalize_policy_write(
    path_id: Option<&str>,
    id_type: PolicyIdType,
    request: PolicyWriteRequest,
) -> Result<Policy, AclError> {
    let mut policy = Policy {
        id: request.id,
        name: request.name,
        description: request.description,
        rules: request.rules,
        syntax: Syntax::Current,
        datacenters: request.datacenters,
        ..Default::default()
    };

    if let Some(path_id) = path_id.filter(|id| !id.is_empty()) {
        let (field, label) = match id_type {
            PolicyIdType::Id => (&mut policy.id, "ID"),
            PolicyIdType::Name => (&mut policy.name, "Name"),
        };
        if field.is_empty() {
            *field = path_id.to_string();
        } else if field.as_str() != path_id {
            return Err(AclError::bad_request(format!(
                "Policy {} in URL and payload do not match",
                label
            )));
        }
    }

    if policy.name.is_empty() {
        return Err(AclError::bad_request("Invalid Policy: no Name is set"));
    }
    PolicyRules::parse(&policy.rules, Syntax::Current).map_err(|e| {
        AclError::bad_request(format!("Failed to parse policy rules: {}", e))
    })?;

    Ok(policy)
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct AclDispatcher {
    config: DispatcherConfig,
    store: Arc<dyn AclStore>,
}

impl AclDispatcher {
    pub fn new(config: DispatcherConfig, store: Arc<dyn AclStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AclStore> {
        &self.store
    }

    /// Fail with `AclDisabled` when `operation` needs ACLs and they are off
    pub fn check_enabled(&self, operation: AclOperation) -> Result<(), AclError> {
        if operation.requires_acl() && !self.config.acl_enabled {
            return Err(AclError::AclDisabled);
        }
        Ok(())
    }

    /// Resolve the operation of a single-record CRUD route from its HTTP method
    pub fn crud_operation(
        &self,
        resource: CrudResource,
        method: &str,
    ) -> Result<AclOperation, AclError> {
        // capability check precedes method validation
        self.check_enabled(CrudVerb::Read.operation(resource))?;
        Ok(CrudVerb::from_method(method)?.operation(resource))
    }

    fn datacenter<'a>(&'a self, ctx: &'a RequestContext) -> &'a str {
        ctx.datacenter.as_deref().unwrap_or(&self.config.datacenter)
    }

    pub async fn bootstrap(&self, ctx: &RequestContext) -> Result<Token, AclError> {
        self.check_enabled(AclOperation::Bootstrap)?;
        bootstrap::bootstrap(self.store.as_ref(), self.datacenter(ctx)).await
    }

    pub async fn replication_status(
        &self,
        ctx: &RequestContext,
    ) -> Result<ReplicationStatus, AclError> {
        self.check_enabled(AclOperation::ReplicationStatus)?;
        Ok(self.store.replication_status(self.datacenter(ctx)).await?)
    }

    pub fn translate_rules(&self, rules: &str) -> Result<String, AclError> {
        translate_legacy_rules(rules).map_err(|e| AclError::bad_request(e.to_string()))
    }

    pub async fn translate_token_rules(
        &self,
        ctx: &RequestContext,
        token_id: &str,
    ) -> Result<String, AclError> {
        if token_id.is_empty() {
            return Err(AclError::bad_request("Missing token ID"));
        }
        let token = self
            .store
            .read_token(self.datacenter(ctx), token_id, TokenIdType::Accessor)
            .await?
            .ok_or_else(|| AclError::not_found(ACL_NOT_FOUND))?;
        if token.rules.is_empty() {
            return Err(AclError::NoLegacyRules);
        }
        translate_legacy_rules(&token.rules).map_err(|e| {
            AclError::Operational(anyhow::anyhow!("Failed to parse legacy rules: {}", e))
        })
    }

    pub async fn list_policies(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<PolicyListStub>, AclError> {
        self.check_enabled(AclOperation::PolicyList)?;
        let policies = self.store.list_policies(self.datacenter(ctx)).await?;
        Ok(policies.iter().map(Policy::stub).collect())
    }

    pub async fn read_policy(
        &self,
        ctx: &RequestContext,
        id: &str,
        id_type: PolicyIdType,
    ) -> Result<Policy, AclError> {
        self.check_enabled(AclOperation::PolicyRead)?;
        if id.is_empty() {
            return Err(AclError::bad_request("Missing policy ID"));
        }
        self.store
            .read_policy(self.datacenter(ctx), id, id_type)
            .await?
            .ok_or_else(|| AclError::not_found(ACL_NOT_FOUND))
    }

    /// Create (`path_id` of `None`) or update a policy
    pub async fn write_policy(
        &self,
        ctx: &RequestContext,
        path_id: Option<&str>,
        id_type: PolicyIdType,
        request: PolicyWriteRequest,
    ) -> Result<Policy, AclError> {
        self.check_enabled(AclOperation::PolicyWrite)?;
        let datacenter = self.datacenter(ctx);
        let mut policy = normalize_policy_write(path_id, id_type, request)?;

        // a name-addressed update targets the policy currently holding that name
        if id_type == PolicyIdType::Name
            && let Some(name) = path_id.filter(|name| !name.is_empty())
        {
            let existing = self
                .store
                .read_policy(datacenter, name, PolicyIdType::Name)
                .await?
                .ok_or_else(|| AclError::not_found(format!("Cannot find policy {}", name)))?;
            if policy.id.is_empty() {
                policy.id = existing.id;
            } else if policy.id != existing.id {
                return Err(AclError::bad_request(
                    "Policy ID in URL and payload do not match",
                ));
            }
        }

        let policy = self
            .store
            .upsert_policy(datacenter, policy, &ctx.credential)
            .await?;
        tracing::info!(policy_id = %policy.id, name = %policy.name, "ACL policy written");
        Ok(policy)
    }

    pub async fn delete_policy(
        &self,
        ctx: &RequestContext,
        id: &str,
        id_type: PolicyIdType,
    ) -> Result<(), AclError> {
        self.check_enabled(AclOperation::PolicyDelete)?;
        if id.is_empty() {
            return Err(AclError::bad_request("Missing policy ID"));
        }
        let datacenter = self.datacenter(ctx);

        let policy_id = match id_type {
            PolicyIdType::Id => id.to_string(),
            PolicyIdType::Name => match self
                .store
                .read_policy(datacenter, id, PolicyIdType::Name)
                .await?
            {
                Some(policy) => policy.id,
                None => return Ok(()),
            },
        };

        self.store
            .delete_policy(datacenter, &policy_id, &ctx.credential)
            .await?;
        tracing::info!(policy_id = %policy_id, "ACL policy deleted");
        Ok(())
    }

    /// List tokens, optionally only those linked to `policy`
    pub async fn list_tokens(
        &self,
        ctx: &RequestContext,
        policy: Option<&str>,
    ) -> Result<Vec<TokenListStub>, AclError> {
        self.check_enabled(AclOperation::TokenList)?;
        let tokens = self.store.list_tokens(self.datacenter(ctx)).await?;
        Ok(tokens
            .iter()
            .filter(|token| match policy {
                Some(policy) if !policy.is_empty() => token.links_policy(policy),
                _ => true,
            })
            .map(Token::stub)
            .collect())
    }

    pub async fn read_token(&self, ctx: &RequestContext, id: &str) -> Result<Token, AclError> {
        self.check_enabled(AclOperation::TokenRead)?;
        if id.is_empty() {
            return Err(AclError::bad_request("Missing token ID"));
        }
        self.store
            .read_token(self.datacenter(ctx), id, TokenIdType::Accessor)
            .await?
            .ok_or_else(|| AclError::not_found(ACL_NOT_FOUND))
    }

    /// Create (`path_id` of `None`) or update a token
    pub async fn write_token(
        &self,
        ctx: &RequestContext,
        path_id: Option<&str>,
        request: TokenWriteRequest,
    ) -> Result<Token, AclError> {
        self.check_enabled(AclOperation::TokenWrite)?;
        let datacenter = self.datacenter(ctx);
        let token = normalize_token_write(path_id, request)?;

        if let Some(id) = path_id.filter(|id| !id.is_empty())
            && self
                .store
                .read_token(datacenter, id, TokenIdType::Accessor)
                .await?
                .is_none()
        {
            return Err(AclError::not_found(format!("Cannot find token {}", id)));
        }

        let token = self
            .store
            .upsert_token(datacenter, token, &ctx.credential)
            .await?;
        tracing::info!(accessor_id = %token.accessor_id, "ACL token written");
        Ok(token)
    }

    pub async fn delete_token(&self, ctx: &RequestContext, id: &str) -> Result<(), AclError> {
        self.check_enabled(AclOperation::TokenDelete)?;
        if id.is_empty() {
            return Err(AclError::bad_request("Missing token ID"));
        }
        self.store
            .delete_token(self.datacenter(ctx), id, &ctx.credential)
            .await?;
        tracing::info!(accessor_id = %id, "ACL token deleted");
        Ok(())
    }

    /// Read the token the caller authenticates with; no credential means the anonymous token
    pub async fn token_self(&self, ctx: &RequestContext) -> Result<Token, AclError> {
        self.check_enabled(AclOperation::TokenSelf)?;
        let datacenter = self.datacenter(ctx);
        let token = if ctx.credential.is_empty() {
            self.store
                .read_token(datacenter, ANONYMOUS_TOKEN_ID, TokenIdType::Accessor)
                .await?
        } else {
            self.store
                .read_token(datacenter, &ctx.credential, TokenIdType::Secret)
                .await?
        };
        token.ok_or_else(|| AclError::not_found(ACL_NOT_FOUND))
    }

    pub async fn clone_token(
        &self,
        ctx: &RequestContext,
        id: &str,
        request: TokenCloneRequest,
    ) -> Result<Token, AclError> {
        self.check_enabled(AclOperation::TokenClone)?;
        if id.is_empty() {
            return Err(AclError::bad_request("Missing token ID"));
        }
        let description = (!request.description.is_empty()).then_some(request.description);
        let token = self
            .store
            .clone_token(self.datacenter(ctx), id, description, &ctx.credential)
            .await?;
        tracing::info!(source = %id, accessor_id = %token.accessor_id, "ACL token cloned");
        Ok(token)
    }

    /// Move a legacy token's embedded rules into a linked policy
    pub async fn upgrade_token(
        &self,
        ctx: &RequestContext,
        id: &str,
        request: TokenWriteRequest,
    ) -> Result<Token, AclError> {
        self.check_enabled(AclOperation::TokenUpgrade)?;
        if id.is_empty() {
            return Err(AclError::bad_request("Missing token ID"));
        }
        let token = normalize_token_write(Some(id), request)?;
        let datacenter = self.datacenter(ctx);

        let current = self
            .store
            .read_token(datacenter, id, TokenIdType::Accessor)
            .await?
            .ok_or_else(|| AclError::not_found(ACL_NOT_FOUND))?;
        if current.rules.is_empty() {
            return Err(AclError::NoLegacyRules);
        }

        let token = self
            .store
            .upgrade_token(datacenter, token, &ctx.credential)
            .await?;
        tracing::info!(accessor_id = %token.accessor_id, "Legacy ACL token upgraded");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{ErrorKind, StoreError};
    use crate::memory::MemoryAclStore;
    use crate::model::{GLOBAL_MANAGEMENT_POLICY_ID, GLOBAL_MANAGEMENT_POLICY_NAME};

    fn dispatcher() -> AclDispatcher {
        AclDispatcher::new(
            DispatcherConfig::default(),
            Arc::new(MemoryAclStore::new("dc1")),
        )
    }

    fn policy_request(name: &str) -> PolicyWriteRequest {
        PolicyWriteRequest {
            name: name.to_string(),
            rules: r#"key_prefix "" { policy = "read" }"#.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_crud_verb_table() {
        assert_eq!(
            CrudVerb::from_method("GET").unwrap().operation(CrudResource::Token),
            AclOperation::TokenRead
        );
        assert_eq!(
            CrudVerb::from_method("DELETE").unwrap().operation(CrudResource::Policy),
            AclOperation::PolicyDelete
        );
        let err = CrudVerb::from_method("POST").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Method POST not allowed, expected one of GET, PUT, DELETE"
        );
    }

    #[test]
    fn test_token_write_adopts_path_id() {
        let token = normalize_token_write(Some("abcd"), TokenWriteRequest::default()).unwrap();
        assert_eq!(token.accessor_id, "abcd");
    }

    #[test]
    fn test_token_write_id_mismatch() {
        let request = TokenWriteRequest {
            accessor_id: "efgh".to_string(),
            ..Default::default()
        };
        let err = normalize_token_write(Some("abcd"), request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(
            err.to_string(),
            "Token Accessor ID in URL and payload do not match"
        );
    }

    #[test]
    fn test_token_write_parses_create_time() {
        let request: TokenWriteRequest = serde_json::from_str(
            r#"{"Description": "x", "CreateTime": "2018-10-24T12:25:06.921933-04:00"}"#,
        )
        .unwrap();
        let token = normalize_token_write(None, request).unwrap();
        assert_eq!(
            token.create_time.unwrap().to_rfc3339(),
            "2018-10-24T16:25:06.921933+00:00"
        );

        let request = TokenWriteRequest {
            create_time: Some("yesterday".to_string()),
            ..Default::default()
        };
        let err = normalize_token_write(None, request).unwrap_err();
        assert!(err.to_string().starts_with("Token decoding failed: "));
    }

    #[test]
    fn test_token_write_rejects_empty_link() {
        let request = TokenWriteRequest {
            policies: vec![PolicyLink::default()],
            ..Default::default()
        };
        assert_eq!(
            normalize_token_write(None, request).unwrap_err().kind(),
            ErrorKind::BadRequest
        );
    }

    #[test]
    fn test_policy_write_consistency() {
        let request = PolicyWriteRequest {
            id: "p2".to_string(),
            ..policy_request("web")
        };
        let err = normalize_policy_write(Some("p1"), PolicyIdType::Id, request).unwrap_err();
        assert_eq!(err.to_string(), "Policy ID in URL and payload do not match");

        let err = normalize_policy_write(Some("db"), PolicyIdType::Name, policy_request("web"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Policy Name in URL and payload do not match");

        let policy = normalize_policy_write(
            Some("web"),
            PolicyIdType::Name,
            policy_request(""),
        )
        .unwrap();
        assert_eq!(policy.name, "web");
        assert_eq!(policy.syntax, Syntax::Current);
    }

    #[test]
    fn test_policy_write_validates_rules() {
        let request = PolicyWriteRequest {
            rules: r#"key "a" { policy = "maybe" }"#.to_string(),
            ..policy_request("web")
        };
        let err = normalize_policy_write(None, PolicyIdType::Id, request).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Failed to parse policy rules: invalid access level: "maybe""#
        );

        let err = normalize_policy_write(None, PolicyIdType::Id, policy_request("")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid Policy: no Name is set");
    }

    #[tokio::test]
    async fn test_disabled_acl_refuses_everything_but_translation() {
        let dispatcher = AclDispatcher::new(
            DispatcherConfig {
                acl_enabled: false,
                ..Default::default()
            },
            Arc::new(MemoryAclStore::new("dc1")),
        );
        let ctx = RequestContext::default();

        let err = dispatcher.bootstrap(&ctx).await.unwrap_err();
        assert!(matches!(err, AclError::AclDisabled));
        assert!(dispatcher.list_tokens(&ctx, None).await.is_err());
        assert!(dispatcher.token_self(&ctx).await.is_err());
        assert!(matches!(
            dispatcher.crud_operation(CrudResource::Policy, "GET"),
            Err(AclError::AclDisabled)
        ));

        let translated = dispatcher
            .translate_rules(r#"node "" { policy = "read" }"#)
            .unwrap();
        assert_eq!(translated, "node_prefix \"\" {\n  policy = \"read\"\n}\n");
    }

    #[tokio::test]
    async fn test_policy_crud() {
        let dispatcher = dispatcher();
        let ctx = RequestContext::new("root");

        let created = dispatcher
            .write_policy(&ctx, None, PolicyIdType::Id, policy_request("read-only"))
            .await
            .unwrap();

        let read = dispatcher
            .read_policy(&ctx, "read-only", PolicyIdType::Name)
            .await
            .unwrap();
        assert_eq!(read.id, created.id);

        let updated = dispatcher
            .write_policy(
                &ctx,
                Some("read-only"),
                PolicyIdType::Name,
                PolicyWriteRequest {
                    description: "renamed".to_string(),
                    ..policy_request("")
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.description, "renamed");

        let stubs = dispatcher.list_policies(&ctx).await.unwrap();
        assert_eq!(stubs.len(), 2);

        dispatcher
            .delete_policy(&ctx, "read-only", PolicyIdType::Name)
            .await
            .unwrap();
        let err = dispatcher
            .read_policy(&ctx, &created.id, PolicyIdType::Id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = dispatcher
            .read_policy(&ctx, "", PolicyIdType::Id)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing policy ID");
    }

    #[tokio::test]
    async fn test_token_crud_and_policy_filter() {
        let dispatcher = dispatcher();
        let ctx = RequestContext::new("root");

        let linked = dispatcher
            .write_token(
                &ctx,
                None,
                TokenWriteRequest {
                    description: "ops".to_string(),
                    policies: vec![PolicyLink::by_name(GLOBAL_MANAGEMENT_POLICY_NAME)],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let plain = dispatcher
            .write_token(&ctx, None, TokenWriteRequest::default())
            .await
            .unwrap();

        let stubs = dispatcher
            .list_tokens(&ctx, Some(GLOBAL_MANAGEMENT_POLICY_ID))
            .await
            .unwrap();
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].accessor_id, linked.accessor_id);

        let all = dispatcher.list_tokens(&ctx, None).await.unwrap();
        assert_eq!(all.len(), 3);

        let updated = dispatcher
            .write_token(
                &ctx,
                Some(&plain.accessor_id),
                TokenWriteRequest {
                    description: "plain v2".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.accessor_id, plain.accessor_id);
        assert_eq!(updated.secret_id, plain.secret_id);

        dispatcher.delete_token(&ctx, &plain.accessor_id).await.unwrap();
        let err = dispatcher
            .read_token(&ctx, &plain.accessor_id)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ACL not found");
    }

    #[tokio::test]
    async fn test_token_self() {
        let dispatcher = dispatcher();
        let token = dispatcher
            .write_token(&RequestContext::default(), None, TokenWriteRequest::default())
            .await
            .unwrap();

        let own = dispatcher
            .token_self(&RequestContext::new(token.secret_id.clone()))
            .await
            .unwrap();
        assert_eq!(own.accessor_id, token.accessor_id);

        let anonymous = dispatcher.token_self(&RequestContext::default()).await.unwrap();
        assert_eq!(anonymous.accessor_id, ANONYMOUS_TOKEN_ID);

        let err = dispatcher
            .token_self(&RequestContext::new("unknown-secret"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_translate_token_rules_and_upgrade() {
        let dispatcher = dispatcher();
        let ctx = RequestContext::default();
        let legacy = dispatcher
            .write_token(
                &ctx,
                None,
                TokenWriteRequest {
                    rules: r#"service "" { policy = "write" }"#.to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let translated = dispatcher
            .translate_token_rules(&ctx, &legacy.accessor_id)
            .await
            .unwrap();
        assert_eq!(translated, "service_prefix \"\" {\n  policy = \"write\"\n}\n");

        let upgraded = dispatcher
            .upgrade_token(&ctx, &legacy.accessor_id, TokenWriteRequest::default())
            .await
            .unwrap();
        assert!(upgraded.rules.is_empty());

        let err = dispatcher
            .translate_token_rules(&ctx, &legacy.accessor_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AclError::NoLegacyRules));
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = dispatcher
            .upgrade_token(&ctx, &legacy.accessor_id, TokenWriteRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AclError::NoLegacyRules));
    }

    #[tokio::test]
    async fn test_clone_token() {
        let dispatcher = dispatcher();
        let ctx = RequestContext::default();
        let source = dispatcher
            .write_token(&ctx, None, TokenWriteRequest::default())
            .await
            .unwrap();

        let clone = dispatcher
            .clone_token(
                &ctx,
                &source.accessor_id,
                TokenCloneRequest {
                    description: "copy".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(clone.description, "copy");

        let err = dispatcher
            .clone_token(&ctx, "missing", TokenCloneRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    /// Wraps the memory store and records the credential of every mutation
    struct RecordingStore {
        inner: MemoryAclStore,
        seen: Mutex<Vec<String>>,
    }

    impl RecordingStore {
        fn record(&self, credential: &str) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(credential.to_string());
            }
        }
    }

    #[async_trait]
    impl AclStore for RecordingStore {
        async fn list_tokens(&self, dc: &str) -> Result<Vec<Token>, StoreError> {
            self.inner.list_tokens(dc).await
        }
        async fn list_policies(&self, dc: &str) -> Result<Vec<Policy>, StoreError> {
            self.inner.list_policies(dc).await
        }
        async fn read_token(&self, dc: &str, id: &str, t: TokenIdType) -> Result<Option<Token>, StoreError> {
            self.inner.read_token(dc, id, t).await
        }
        async fn read_policy(&self, dc: &str, id: &str, t: PolicyIdType) -> Result<Option<Policy>, StoreError> {
            self.inner.read_policy(dc, id, t).await
        }
        async fn upsert_token(&self, dc: &str, token: Token, credential: &str) -> Result<Token, StoreError> {
            self.record(credential);
            self.inner.upsert_token(dc, token, credential).await
        }
        async fn upsert_policy(&self, dc: &str, policy: Policy, credential: &str) -> Result<Policy, StoreError> {
            self.record(credential);
            self.inner.upsert_policy(dc, policy, credential).await
        }
        async fn delete_token(&self, dc: &str, id: &str, credential: &str) -> Result<(), StoreError> {
            self.record(credential);
            self.inner.delete_token(dc, id, credential).await
        }
        async fn delete_policy(&self, dc: &str, id: &str, credential: &str) -> Result<(), StoreError> {
            self.record(credential);
            self.inner.delete_policy(dc, id, credential).await
        }
        async fn bootstrap(&self, dc: &str) -> Result<Token, StoreError> {
            self.inner.bootstrap(dc).await
        }
        async fn clone_token(&self, dc: &str, id: &str, d: Option<String>, credential: &str) -> Result<Token, StoreError> {
            self.record(credential);
            self.inner.clone_token(dc, id, d, credential).await
        }
        async fn upgrade_token(&self, dc: &str, token: Token, credential: &str) -> Result<Token, StoreError> {
            self.record(credential);
            self.inner.upgrade_token(dc, token, credential).await
        }
        async fn replication_status(&self, dc: &str) -> Result<ReplicationStatus, StoreError> {
            self.inner.replication_status(dc).await
        }
    }

    #[tokio::test]
    async fn test_credential_reaches_store_unchanged() {
        let store = Arc::new(RecordingStore {
            inner: MemoryAclStore::new("dc1"),
            seen: Mutex::new(Vec::new()),
        });
        let dispatcher = AclDispatcher::new(DispatcherConfig::default(), store.clone());
        let ctx = RequestContext::new("s3cr3t");

        let token = dispatcher
            .write_token(&ctx, None, TokenWriteRequest::default())
            .await
            .unwrap();
        dispatcher
            .write_policy(&ctx, None, PolicyIdType::Id, policy_request("p"))
            .await
            .unwrap();
        dispatcher.delete_token(&ctx, &token.accessor_id).await.unwrap();

        // rejected before reaching the store
        let err = dispatcher
            .write_token(
                &ctx,
                Some("abcd"),
                TokenWriteRequest {
                    accessor_id: "efgh".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let seen = store.seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["s3cr3t", "s3cr3t", "s3cr3t"]);
    }

    #[tokio::test]
    async fn test_request_datacenter_overrides_default() {
        let dispatcher = dispatcher();
        let ctx = RequestContext::default().with_datacenter("dc2");
        let err = dispatcher.list_policies(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operational);

        let ctx = RequestContext::default().with_datacenter("");
        assert!(dispatcher.list_policies(&ctx).await.is_ok());
    }
}
