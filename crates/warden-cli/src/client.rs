//! HTTP implementation of the ACL store
//!
//! `HttpAclStore` drives a remote Warden server through its `/v1/acl` API so the
//! resolution and reconciliation logic of `warden-acl` runs unchanged on the client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;
use warden_acl::model::ReplicationStatus;
use warden_acl::{
    AclStore, Policy, PolicyIdType, StoreError, Token, TokenCloneRequest, TokenIdType,
};

use crate::error::ClientError;

pub const TOKEN_HEADER: &str = "X-Consul-Token";
pub const DEFAULT_HTTP_ADDR: &str = "http://127.0.0.1:8500";

/// Connection settings of the HTTP client
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    /// Base URL of the server (e.g. "http://127.0.0.1:8500")
    pub address: String,
    /// Token sent when a call carries no credential of its own
    pub token: String,
    /// Connection timeout in milliseconds (default: 5000)
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds (default: 30000)
    pub read_timeout_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_HTTP_ADDR.to_string(),
            token: String::new(),
            connect_timeout_ms: 5000,
            read_timeout_ms: 30000,
        }
    }
}

impl HttpClientConfig {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = token.to_string();
        self
    }

    pub fn with_timeouts(mut self, connect_ms: u64, read_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.read_timeout_ms = read_ms;
        self
    }
}

pub struct HttpAclStore {
    client: Client,
    config: HttpClientConfig,
}

impl HttpAclStore {
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.config.address.trim_end_matches('/'), path)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        datacenter: &str,
        credential: &str,
    ) -> RequestBuilder {
        let mut builder = self.client.request(method, self.build_url(path));

        let token = if credential.is_empty() {
            self.config.token.as_str()
        } else {
            credential
        };
        if !token.is_empty() {
            builder = builder.header(TOKEN_HEADER, token);
        }
        if !datacenter.is_empty() {
            builder = builder.query(&[("dc", datacenter)]);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await?;
            Ok(serde_json::from_slice(&body)?)
        } else {
            let body = response.text().await.unwrap_or_default();
            debug!("ACL request failed with status {}: {}", status, body.trim());
            Err(ClientError::RequestFailed {
                status: status.as_u16(),
                body: body.trim().to_string(),
            })
        }
    }

    /// Like `send`, with a 404 meaning "no such record"
    async fn send_optional<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<Option<T>, ClientError> {
        match self.send(builder).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.status() == Some(404) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl AclStore for HttpAclStore {
    async fn list_tokens(&self, datacenter: &str) -> Result<Vec<Token>, StoreError> {
        let builder = self.request(Method::GET, "/v1/acl/tokens", datacenter, "");
        Ok(self.send(builder).await?)
    }

    async fn list_policies(&self, datacenter: &str) -> Result<Vec<Policy>, StoreError> {
        let builder = self.request(Method::GET, "/v1/acl/policies", datacenter, "");
        Ok(self.send(builder).await?)
    }

    async fn read_token(
        &self,
        datacenter: &str,
        id: &str,
        id_type: TokenIdType,
    ) -> Result<Option<Token>, StoreError> {
        let builder = match id_type {
            TokenIdType::Accessor => self.request(
                Method::GET,
                &format!("/v1/acl/token/{}", id),
                datacenter,
                "",
            ),
            // A secret is only accepted as the caller's own credential
            TokenIdType::Secret => self.request(Method::GET, "/v1/acl/token/self", datacenter, id),
        };
        Ok(self.send_optional(builder).await?)
    }

    async fn read_policy(
        &self,
        datacenter: &str,
        id: &str,
        id_type: PolicyIdType,
    ) -> Result<Option<Policy>, StoreError> {
        let mut builder = self.request(
            Method::GET,
            &format!("/v1/acl/policy/{}", id),
            datacenter,
            "",
        );
        if id_type == PolicyIdType::Name {
            builder = builder.query(&[("idType", id_type.as_str())]);
        }
        Ok(self.send_optional(builder).await?)
    }

    async fn upsert_token(
        &self,
        datacenter: &str,
        token: Token,
        credential: &str,
    ) -> Result<Token, StoreError> {
        if !token.accessor_id.is_empty() {
            let builder = self
                .request(
                    Method::PUT,
                    &format!("/v1/acl/token/{}", token.accessor_id),
                    datacenter,
                    credential,
                )
                .json(&token);
            match self.send(builder).await {
                Err(err) if err.status() == Some(404) => {
                    debug!(accessor_id = %token.accessor_id, "Token unknown to server, creating it");
                }
                result => return Ok(result?),
            }
        }

        let builder = self
            .request(Method::PUT, "/v1/acl/token", datacenter, credential)
            .json(&token);
        Ok(self.send(builder).await?)
    }

    async fn upsert_policy(
        &self,
        datacenter: &str,
        policy: Policy,
        credential: &str,
    ) -> Result<Policy, StoreError> {
        let path = if policy.id.is_empty() {
            "/v1/acl/policy".to_string()
        } else {
            format!("/v1/acl/policy/{}", policy.id)
        };
        let builder = self
            .request(Method::PUT, &path, datacenter, credential)
            .json(&policy);
        Ok(self.send(builder).await?)
    }

    async fn delete_token(
        &self,
        datacenter: &str,
        accessor_id: &str,
        credential: &str,
    ) -> Result<(), StoreError> {
        let builder = self.request(
            Method::DELETE,
            &format!("/v1/acl/token/{}", accessor_id),
            datacenter,
            credential,
        );
        self.send::<bool>(builder).await?;
        Ok(())
    }

    async fn delete_policy(
        &self,
        datacenter: &str,
        policy_id: &str,
        credential: &str,
    ) -> Result<(), StoreError> {
        let builder = self.request(
            Method::DELETE,
            &format!("/v1/acl/policy/{}", policy_id),
            datacenter,
            credential,
        );
        self.send::<bool>(builder).await?;
        Ok(())
    }

    async fn bootstrap(&self, datacenter: &str) -> Result<Token, StoreError> {
        let builder = self.request(Method::PUT, "/v1/acl/bootstrap", datacenter, "");
        Ok(self.send(builder).await?)
    }

    async fn clone_token(
        &self,
        datacenter: &str,
        accessor_id: &str,
        description: Option<String>,
        credential: &str,
    ) -> Result<Token, StoreError> {
        let body = TokenCloneRequest {
            description: description.unwrap_or_default(),
        };
        let builder = self
            .request(
                Method::PUT,
                &format!("/v1/acl/token/clone/{}", accessor_id),
                datacenter,
                credential,
            )
            .json(&body);
        Ok(self.send(builder).await?)
    }

    async fn upgrade_token(
        &self,
        datacenter: &str,
        token: Token,
        credential: &str,
    ) -> Result<Token, StoreError> {
        let builder = self.request(
            Method::PUT,
            &format!("/v1/acl/token/upgrade/{}", token.accessor_id),
            datacenter,
            credential,
        );
        Ok(self.send(builder).await?)
    }

    async fn replication_status(&self, datacenter: &str) -> Result<ReplicationStatus, StoreError> {
        let builder = self.request(Method::GET, "/v1/acl/replication", datacenter, "");
        Ok(self.send(builder).await?)
    }
}
