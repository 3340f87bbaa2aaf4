// ACL store contract
// The replicated token/policy store is an external collaborator; everything in this
// crate reaches it through this trait.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Policy, PolicyIdType, ReplicationStatus, Token, TokenIdType};

/// Read/write access to the token and policy records of a datacenter.
///
/// Implementations must be linearizable; in particular `bootstrap` must create the
/// bootstrap marker and the management token in one conditional write and fail with
/// [`StoreError::BootstrapNotAllowed`] once the marker exists.
#[async_trait]
pub trait AclStore: Send + Sync {
    async fn list_tokens(&self, datacenter: &str) -> Result<Vec<Token>, StoreError>;

    async fn list_policies(&self, datacenter: &str) -> Result<Vec<Policy>, StoreError>;

    async fn read_token(
        &self,
        datacenter: &str,
        id: &str,
        id_type: TokenIdType,
    ) -> Result<Option<Token>, StoreError>;

    async fn read_policy(
        &self,
        datacenter: &str,
        id: &str,
        id_type: PolicyIdType,
    ) -> Result<Option<Policy>, StoreError>;

    /// Create the token when its accessor ID is empty or unknown, update it otherwise
    async fn upsert_token(
        &self,
        datacenter: &str,
        token: Token,
        credential: &str,
    ) -> Result<Token, StoreError>;

    async fn upsert_policy(
        &self,
        datacenter: &str,
        policy: Policy,
        credential: &str,
    ) -> Result<Policy, StoreError>;

    async fn delete_token(
        &self,
        datacenter: &str,
        accessor_id: &str,
        credential: &str,
    ) -> Result<(), StoreError>;

    async fn delete_policy(
        &self,
        datacenter: &str,
        policy_id: &str,
        credential: &str,
    ) -> Result<(), StoreError>;

    async fn bootstrap(&self, datacenter: &str) -> Result<Token, StoreError>;

    /// Copy a token's links and locality into a new token with fresh identifiers
    async fn clone_token(
        &self,
        datacenter: &str,
        accessor_id: &str,
        description: Option<String>,
        credential: &str,
    ) -> Result<Token, StoreError>;

    /// Convert a legacy token's embedded rules into a linked policy
    async fn upgrade_token(
        &self,
        datacenter: &str,
        token: Token,
        credential: &str,
    ) -> Result<Token, StoreError>;

    async fn replication_status(&self, datacenter: &str) -> Result<ReplicationStatus, StoreError>;
}
