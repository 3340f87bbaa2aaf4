// Unique-prefix identifier resolution
// Operators refer to tokens and policies by any unambiguous leading substring of
// their ID. An exact match always wins over prefix matches.

use crate::error::AclError;
use crate::model::{
    ANONYMOUS_TOKEN_ID, ANONYMOUS_TOKEN_NAME, GLOBAL_MANAGEMENT_POLICY_ID,
    GLOBAL_MANAGEMENT_POLICY_NAME,
};
use crate::store::AclStore;

/// Resolve `partial` against `candidates`.
///
/// `kind` names the identifier in error messages ("token", "policy").
pub fn resolve_prefix<I, S>(kind: &'static str, partial: &str, candidates: I) -> Result<String, AclError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if partial.is_empty() {
        return Err(AclError::bad_request(format!("Missing {} ID", kind)));
    }

    let mut matches: Vec<String> = Vec::new();
    for candidate in candidates {
        let candidate = candidate.as_ref();
        if candidate == partial {
            return Ok(candidate.to_string());
        }
        if candidate.starts_with(partial) && !matches.iter().any(|m| m == candidate) {
            matches.push(candidate.to_string());
        }
    }

    match matches.len() {
        0 => Err(AclError::not_found(format!(
            "No such {} ID with prefix: {}",
            kind, partial
        ))),
        1 => Ok(matches.remove(0)),
        _ => {
            matches.sort();
            Err(AclError::AmbiguousIdentifier {
                kind,
                prefix: partial.to_string(),
                matches,
            })
        }
    }
}

/// Resolve a partial token accessor ID. `anonymous` names the builtin anonymous token.
pub async fn resolve_token_id(
    store: &dyn AclStore,
    datacenter: &str,
    partial: &str,
) -> Result<String, AclError> {
    if partial == ANONYMOUS_TOKEN_NAME {
        return Ok(ANONYMOUS_TOKEN_ID.to_string());
    }

    let tokens = store.list_tokens(datacenter).await?;
    resolve_prefix(
        "token",
        partial,
        tokens.iter().map(|token| token.accessor_id.as_str()),
    )
}

/// Resolve a partial policy ID. `global-management` names the builtin management policy.
pub async fn resolve_policy_id(
    store: &dyn AclStore,
    datacenter: &str,
    partial: &str,
) -> Result<String, AclError> {
    if partial == GLOBAL_MANAGEMENT_POLICY_NAME {
        return Ok(GLOBAL_MANAGEMENT_POLICY_ID.to_string());
    }

    let policies = store.list_policies(datacenter).await?;
    resolve_prefix(
        "policy",
        partial,
        policies.iter().map(|policy| policy.id.as_str()),
    )
}
