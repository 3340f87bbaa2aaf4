// `warden acl token update`

use clap::Args;
use tracing::info;
use warden_acl::{
    AclError, AclStore, LinkMode, Token, TokenIdType, reconcile_policy_links, resolve_policy_id,
    resolve_token_id,
};

use crate::error::CommandError;

#[derive(Args, Clone, Debug, Default)]
pub struct TokenUpdateArgs {
    /// Accessor ID of the token to update, or any unique prefix of it
    #[arg(long = "id", default_value = "")]
    pub id: String,

    /// Description written to the token; omitting it clears the description
    #[arg(long = "description", default_value = "")]
    pub description: String,

    /// Policy to link by ID, or any unique prefix of it (repeatable)
    #[arg(long = "policy-id")]
    pub policy_ids: Vec<String>,

    /// Policy to link by name (repeatable)
    #[arg(long = "policy-name")]
    pub policy_names: Vec<String>,

    /// Add the given policies to the existing links instead of replacing them
    #[arg(long = "merge-policies")]
    pub merge_policies: bool,
}

/// Resolve, reconcile and write a token's policy links.
///
/// Every identifier is resolved before the token is written, so a failed resolution leaves
/// the token untouched.
pub async fn token_update(
    store: &dyn AclStore,
    datacenter: &str,
    credential: &str,
    args: &TokenUpdateArgs,
) -> Result<Token, CommandError> {
    if args.id.is_empty() {
        return Err(CommandError::MissingTokenId);
    }

    let id = resolve_token_id(store, datacenter, &args.id)
        .await
        .map_err(CommandError::ResolveToken)?;

    let mut token = store
        .read_token(datacenter, &id, TokenIdType::Accessor)
        .await
        .map_err(|err| CommandError::ReadToken(err.into()))?
        .ok_or_else(|| CommandError::ReadToken(AclError::not_found("ACL not found")))?;

    let mut policy_ids = Vec::with_capacity(args.policy_ids.len());
    for partial in &args.policy_ids {
        let policy_id = resolve_policy_id(store, datacenter, partial)
            .await
            .map_err(|source| CommandError::ResolvePolicy {
                id: partial.clone(),
                source,
            })?;
        policy_ids.push(policy_id);
    }

    token.policies = reconcile_policy_links(
        &token.policies,
        &args.policy_names,
        &policy_ids,
        LinkMode::from_merge_flag(args.merge_policies),
    );
    token.description = args.description.clone();

    let token = store
        .upsert_token(datacenter, token, credential)
        .await
        .map_err(|err| CommandError::UpdateToken {
            id: id.clone(),
            source: err.into(),
        })?;

    info!(accessor_id = %token.accessor_id, links = token.policies.len(), "Token updated");
    Ok(token)
}
