// `warden acl translate-rules`

use std::io::Read;
use std::path::Path;

use clap::Args;
use warden_acl::{AclError, AclStore, TokenIdType, resolve_token_id, translate_legacy_rules};

use crate::error::CommandError;

#[derive(Args, Clone, Debug, Default)]
pub struct TranslateArgs {
    /// File holding the legacy rules, `-` (or nothing) for stdin
    pub file: Option<String>,

    /// Translate the embedded rules of this legacy token instead (accessor ID or unique prefix)
    #[arg(long = "token-accessor", conflicts_with = "file")]
    pub token_accessor: Option<String>,
}

/// Load the legacy rule text named by `file`
pub fn read_rules(file: Option<&str>, stdin: &mut dyn Read) -> Result<String, CommandError> {
    let mut rules = String::new();
    match file {
        None | Some("-") => {
            stdin
                .read_to_string(&mut rules)
                .map_err(CommandError::ReadRules)?;
        }
        Some(path) => {
            rules = std::fs::read_to_string(Path::new(path)).map_err(CommandError::ReadRules)?;
        }
    }
    Ok(rules)
}

pub fn translate_rules(rules: &str) -> Result<String, CommandError> {
    translate_legacy_rules(rules).map_err(CommandError::Translate)
}

/// Translate the rules embedded in a legacy token
pub async fn translate_token_rules(
    store: &dyn AclStore,
    datacenter: &str,
    partial: &str,
) -> Result<String, CommandError> {
    let id = resolve_token_id(store, datacenter, partial)
        .await
        .map_err(CommandError::ResolveToken)?;
    let token = store
        .read_token(datacenter, &id, TokenIdType::Accessor)
        .await
        .map_err(|err| CommandError::ReadToken(err.into()))?
        .ok_or_else(|| CommandError::ReadToken(AclError::not_found("ACL not found")))?;

    if token.rules.is_empty() {
        return Err(CommandError::TranslateToken(AclError::NoLegacyRules));
    }
    translate_legacy_rules(&token.rules).map_err(CommandError::Translate)
}
