// In-process ACL store
// Single-datacenter store backed by concurrent maps. Serves the standalone server and
// the tests of everything built on `AclStore`.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::StoreError;
use crate::model::{
    ANONYMOUS_TOKEN_ID, GLOBAL_MANAGEMENT_POLICY_ID, GLOBAL_MANAGEMENT_POLICY_NAME,
    GLOBAL_MANAGEMENT_RULES, Policy, PolicyIdType, PolicyLink, ReplicationStatus, Syntax, Token,
    TokenIdType,
};
use crate::rules::translate_legacy_rules;
use crate::store::AclStore;

const ANONYMOUS_SECRET: &str = "anonymous";
const BOOTSTRAP_MARKER: &str = "bootstrap";

pub struct MemoryAclStore {
    datacenter: String,
    // accessor ID -> token
    tokens: DashMap<String, Token>,
    // secret ID -> accessor ID
    secrets: DashMap<String, String>,
    // secrets of deleted tokens, never handed out again
    retired_secrets: DashMap<String, ()>,
    policies: DashMap<String, Policy>,
    // policy name -> policy ID, claimed through `entry` before a policy is stored
    policy_names: DashMap<String, String>,
    // bootstrap marker -> raft-style index it was set at
    meta: DashMap<&'static str, u64>,
    index: AtomicU64,
}

impl MemoryAclStore {
    /// Create a store seeded with the builtin management policy and anonymous token
    pub fn new(datacenter: impl Into<String>) -> Self {
        let store = Self {
            datacenter: datacenter.into(),
            tokens: DashMap::new(),
            secrets: DashMap::new(),
            retired_secrets: DashMap::new(),
            policies: DashMap::new(),
            policy_names: DashMap::new(),
            meta: DashMap::new(),
            index: AtomicU64::new(0),
        };

        store.ensure_management_policy();

        let index = store.next_index();
        store.secrets.insert(
            ANONYMOUS_SECRET.to_string(),
            ANONYMOUS_TOKEN_ID.to_string(),
        );
        store.tokens.insert(
            ANONYMOUS_TOKEN_ID.to_string(),
            Token {
                accessor_id: ANONYMOUS_TOKEN_ID.to_string(),
                secret_id: ANONYMOUS_SECRET.to_string(),
                description: "Anonymous Token".to_string(),
                create_time: Some(Utc::now()),
                create_index: index,
                modify_index: index,
                ..Default::default()
            },
        );

        store
    }

    pub fn datacenter(&self) -> &str {
        &self.datacenter
    }

    fn next_index(&self) -> u64 {
        self.index.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn check_datacenter(&self, datacenter: &str) -> Result<(), StoreError> {
        if datacenter.is_empty() || datacenter == self.datacenter {
            Ok(())
        } else {
            Err(StoreError::Rejected("No path to datacenter".to_string()))
        }
    }

    fn ensure_management_policy(&self) {
        if let Entry::Vacant(entry) = self.policies.entry(GLOBAL_MANAGEMENT_POLICY_ID.to_string()) {
            self.policy_names.insert(
                GLOBAL_MANAGEMENT_POLICY_NAME.to_string(),
                GLOBAL_MANAGEMENT_POLICY_ID.to_string(),
            );
            let index = self.next_index();
            entry.insert(Policy {
                id: GLOBAL_MANAGEMENT_POLICY_ID.to_string(),
                name: GLOBAL_MANAGEMENT_POLICY_NAME.to_string(),
                description: "Builtin Policy that grants unlimited access".to_string(),
                rules: GLOBAL_MANAGEMENT_RULES.to_string(),
                syntax: Syntax::Current,
                datacenters: Vec::new(),
                create_index: index,
                modify_index: index,
            });
        }
    }

    fn policy_id_by_name(&self, name: &str) -> Option<String> {
        self.policy_names.get(name).map(|entry| entry.value().clone())
    }

    /// Claim `name` for the policy `id`; fails when another policy holds it
    fn claim_policy_name(&self, name: &str, id: &str) -> Result<(), StoreError> {
        match self.policy_names.entry(name.to_string()) {
            Entry::Occupied(entry) if entry.get() != id => Err(StoreError::Rejected(format!(
                "Invalid Policy: A Policy with Name {:?} already exists",
                name
            ))),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(id.to_string());
                Ok(())
            }
        }
    }

    fn release_policy_name(&self, name: &str, id: &str) {
        self.policy_names.remove_if(name, |_, owner| owner == id);
    }

    fn remove_policy(&self, id: &str) -> Option<Policy> {
        let (_, policy) = self.policies.remove(id)?;
        self.release_policy_name(&policy.name, id);
        Some(policy)
    }

    /// Check every link and fill in the ID of name-only links whose policy exists
    fn resolve_links(&self, links: Vec<PolicyLink>) -> Result<Vec<PolicyLink>, StoreError> {
        links
            .into_iter()
            .map(|mut link| {
                if link.is_empty() {
                    return Err(StoreError::Rejected(
                        "Policy link must have an ID or Name".to_string(),
                    ));
                }
                if !link.id.is_empty() {
                    let policy = self.policies.get(&link.id).ok_or_else(|| {
                        StoreError::Rejected(format!("No such ACL policy with ID: {}", link.id))
                    })?;
                    if link.name.is_empty() {
                        link.name = policy.name.clone();
                    }
                } else if let Some(id) = self.policy_id_by_name(&link.name) {
                    link.id = id;
                }
                Ok(link)
            })
            .collect()
    }

    fn secret_available(&self, secret: &str) -> bool {
        !self.secrets.contains_key(secret) && !self.retired_secrets.contains_key(secret)
    }

    fn fresh_secret(&self) -> String {
        loop {
            let secret = uuid::Uuid::new_v4().to_string();
            if self.secret_available(&secret) {
                return secret;
            }
        }
    }

    fn fresh_accessor(&self) -> String {
        loop {
            let accessor = uuid::Uuid::new_v4().to_string();
            if !self.tokens.contains_key(&accessor) {
                return accessor;
            }
        }
    }

    fn insert_new_token(&self, mut token: Token) -> Result<Token, StoreError> {
        if token.accessor_id.is_empty() {
            token.accessor_id = self.fresh_accessor();
        }
        if token.secret_id.is_empty() {
            token.secret_id = self.fresh_secret();
        }

        // secret entry is held until the token lands, so two creates cannot share a secret
        let secret = match self.secrets.entry(token.secret_id.clone()) {
            Entry::Vacant(entry) if !self.retired_secrets.contains_key(&token.secret_id) => entry,
            _ => {
                return Err(StoreError::Rejected(
                    "Invalid Token: SecretID is already in use".to_string(),
                ));
            }
        };

        let index = self.next_index();
        token.create_time.get_or_insert_with(Utc::now);
        token.create_index = index;
        token.modify_index = index;

        match self.tokens.entry(token.accessor_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Rejected(
                "Invalid Token: AccessorID is already in use".to_string(),
            )),
            Entry::Vacant(entry) => {
                secret.insert(token.accessor_id.clone());
                entry.insert(token.clone());
                Ok(token)
            }
        }
    }
}

impl Default for MemoryAclStore {
    fn default() -> Self {
        Self::new(crate::model::DEFAULT_DATACENTER)
    }
}

#[async_trait]
impl AclStore for MemoryAclStore {
    async fn list_tokens(&self, datacenter: &str) -> Result<Vec<Token>, StoreError> {
        self.check_datacenter(datacenter)?;
        let mut tokens: Vec<Token> = self.tokens.iter().map(|entry| entry.value().clone()).collect();
        tokens.sort_by_key(|token| token.create_index);
        Ok(tokens)
    }

    async fn list_policies(&self, datacenter: &str) -> Result<Vec<Policy>, StoreError> {
        self.check_datacenter(datacenter)?;
        let mut policies: Vec<Policy> =
            self.policies.iter().map(|entry| entry.value().clone()).collect();
        policies.sort_by_key(|policy| policy.create_index);
        Ok(policies)
    }

    async fn read_token(
        &self,
        datacenter: &str,
        id: &str,
        id_type: TokenIdType,
    ) -> Result<Option<Token>, StoreError> {
        self.check_datacenter(datacenter)?;
        let accessor = match id_type {
            TokenIdType::Accessor => id.to_string(),
            TokenIdType::Secret => match self.secrets.get(id) {
                Some(accessor) => accessor.clone(),
                None => return Ok(None),
            },
        };
        Ok(self.tokens.get(&accessor).map(|entry| entry.value().clone()))
    }

    async fn read_policy(
        &self,
        datacenter: &str,
        id: &str,
        id_type: PolicyIdType,
    ) -> Result<Option<Policy>, StoreError> {
        self.check_datacenter(datacenter)?;
        let policy = match id_type {
            PolicyIdType::Id => self.policies.get(id).map(|entry| entry.value().clone()),
            PolicyIdType::Name => self
                .policy_id_by_name(id)
                .and_then(|policy_id| self.policies.get(&policy_id))
                .map(|entry| entry.value().clone()),
        };
        Ok(policy)
    }

    async fn upsert_token(
        &self,
        datacenter: &str,
        mut token: Token,
        _credential: &str,
    ) -> Result<Token, StoreError> {
        self.check_datacenter(datacenter)?;
        token.policies = self.resolve_links(token.policies)?;

        if token.accessor_id.is_empty() || !self.tokens.contains_key(&token.accessor_id) {
            return self.insert_new_token(token);
        }

        let mut existing = self
            .tokens
            .get_mut(&token.accessor_id)
            .ok_or_else(|| StoreError::NotFound("Token not found".to_string()))?;

        if !token.secret_id.is_empty() && token.secret_id != existing.secret_id {
            return Err(StoreError::Rejected(
                "Changing a token's SecretID is not permitted".to_string(),
            ));
        }
        if token.local != existing.local {
            return Err(StoreError::Rejected(format!(
                "Cannot toggle local mode of {}",
                token.accessor_id
            )));
        }

        existing.description = token.description;
        existing.policies = token.policies;
        existing.rules = token.rules;
        existing.modify_index = self.next_index();
        Ok(existing.clone())
    }

    async fn upsert_policy(
        &self,
        datacenter: &str,
        mut policy: Policy,
        _credential: &str,
    ) -> Result<Policy, StoreError> {
        self.check_datacenter(datacenter)?;

        if policy.id.is_empty() {
            policy.id = uuid::Uuid::new_v4().to_string();
            self.claim_policy_name(&policy.name, &policy.id)?;
            let index = self.next_index();
            policy.create_index = index;
            policy.modify_index = index;
            self.policies.insert(policy.id.clone(), policy.clone());
            return Ok(policy);
        }

        {
            let existing = self.policies.get(&policy.id).ok_or_else(|| {
                StoreError::NotFound(format!("Cannot find policy {}", policy.id))
            })?;
            if existing.is_builtin()
                && (policy.rules != existing.rules || policy.name != existing.name)
            {
                return Err(StoreError::Rejected(
                    "Changing the rules or name of the builtin global-management policy is not permitted"
                        .to_string(),
                ));
            }
        }

        self.claim_policy_name(&policy.name, &policy.id)?;
        let Some(mut existing) = self.policies.get_mut(&policy.id) else {
            self.release_policy_name(&policy.name, &policy.id);
            return Err(StoreError::NotFound(format!(
                "Cannot find policy {}",
                policy.id
            )));
        };

        let previous_name = std::mem::replace(&mut existing.name, policy.name);
        existing.description = policy.description;
        existing.rules = policy.rules;
        existing.syntax = policy.syntax;
        existing.datacenters = policy.datacenters;
        existing.modify_index = self.next_index();
        let updated = existing.clone();
        drop(existing);

        if previous_name != updated.name {
            self.release_policy_name(&previous_name, &updated.id);
        }
        Ok(updated)
    }

    async fn delete_token(
        &self,
        datacenter: &str,
        accessor_id: &str,
        _credential: &str,
    ) -> Result<(), StoreError> {
        self.check_datacenter(datacenter)?;
        if accessor_id == ANONYMOUS_TOKEN_ID {
            return Err(StoreError::Rejected(
                "Deletion of the builtin anonymous token is not permitted".to_string(),
            ));
        }
        if let Some((_, token)) = self.tokens.remove(accessor_id) {
            self.secrets.remove(&token.secret_id);
            self.retired_secrets.insert(token.secret_id, ());
        }
        Ok(())
    }

    async fn delete_policy(
        &self,
        datacenter: &str,
        policy_id: &str,
        _credential: &str,
    ) -> Result<(), StoreError> {
        self.check_datacenter(datacenter)?;
        if policy_id == GLOBAL_MANAGEMENT_POLICY_ID {
            return Err(StoreError::Rejected(
                "Deletion of the builtin global-management policy is not permitted".to_string(),
            ));
        }
        if self.remove_policy(policy_id).is_some() {
            for mut token in self.tokens.iter_mut() {
                token.policies.retain(|link| link.id != policy_id);
            }
        }
        Ok(())
    }

    async fn bootstrap(&self, datacenter: &str) -> Result<Token, StoreError> {
        self.check_datacenter(datacenter)?;

        // The entry guard is held until the token is stored, so a concurrent caller
        // either sees no marker and waits, or sees the finished marker.
        match self.meta.entry(BOOTSTRAP_MARKER) {
            Entry::Occupied(entry) => Err(StoreError::BootstrapNotAllowed {
                reset_index: *entry.get(),
            }),
            Entry::Vacant(entry) => {
                self.ensure_management_policy();
                let token = self.insert_new_token(Token {
                    description: "Bootstrap Token (Global Management)".to_string(),
                    policies: vec![PolicyLink {
                        id: GLOBAL_MANAGEMENT_POLICY_ID.to_string(),
                        name: GLOBAL_MANAGEMENT_POLICY_NAME.to_string(),
                    }],
                    ..Default::default()
                })?;
                entry.insert(token.create_index);
                Ok(token)
            }
        }
    }

    async fn clone_token(
        &self,
        datacenter: &str,
        accessor_id: &str,
        description: Option<String>,
        _credential: &str,
    ) -> Result<Token, StoreError> {
        self.check_datacenter(datacenter)?;
        let source = self
            .tokens
            .get(accessor_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound("Cannot find token to clone".to_string()))?;

        self.insert_new_token(Token {
            description: description.unwrap_or_else(|| format!("Clone of {}", source.description)),
            policies: source.policies,
            local: source.local,
            rules: source.rules,
            ..Default::default()
        })
    }

    async fn upgrade_token(
        &self,
        datacenter: &str,
        token: Token,
        credential: &str,
    ) -> Result<Token, StoreError> {
        self.check_datacenter(datacenter)?;
        let current = self
            .tokens
            .get(&token.accessor_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound("Token not found".to_string()))?;
        if current.rules.is_empty() {
            return Err(StoreError::Rejected(format!(
                "Token {} is not a legacy token",
                current.accessor_id
            )));
        }

        let translated = translate_legacy_rules(&current.rules)
            .map_err(|e| StoreError::Rejected(format!("Failed to parse legacy rules: {}", e)))?;
        let policy = self
            .upsert_policy(
                datacenter,
                Policy {
                    name: format!("legacy-token-{}", current.accessor_id),
                    description: format!("Upgraded rules of token {}", current.accessor_id),
                    rules: translated,
                    syntax: Syntax::Current,
                    ..Default::default()
                },
                credential,
            )
            .await?;

        let mut policies = current.policies;
        policies.push(PolicyLink {
            id: policy.id.clone(),
            name: policy.name.clone(),
        });

        let upgraded = self
            .upsert_token(
                datacenter,
                Token {
                    accessor_id: current.accessor_id,
                    secret_id: current.secret_id,
                    description: if token.description.is_empty() {
                        current.description
                    } else {
                        token.description
                    },
                    policies,
                    local: current.local,
                    rules: String::new(),
                    ..Default::default()
                },
                credential,
            )
            .await;

        // a failed upgrade leaves no policy behind
        if upgraded.is_err() {
            self.remove_policy(&policy.id);
        }
        upgraded
    }

    async fn replication_status(&self, datacenter: &str) -> Result<ReplicationStatus, StoreError> {
        self.check_datacenter(datacenter)?;
        Ok(ReplicationStatus {
            enabled: false,
            running: false,
            source_datacenter: self.datacenter.clone(),
            replication_type: String::new(),
            replicated_index: 0,
            replicated_role_index: 0,
            replicated_token_index: 0,
            last_success: None,
            last_error: None,
        })
    }
}
