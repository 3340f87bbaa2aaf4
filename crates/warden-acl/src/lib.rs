//! Warden ACL core
//!
//! Identity and policy resolution for the ACL subsystem:
//! - `resolver`: unique-prefix resolution of token accessor IDs and policy IDs
//! - `reconcile`: merge/replace computation of a token's policy links
//! - `bootstrap`: the cluster-wide, exactly-once ACL bootstrap
//! - `rules`: legacy rule translation and current-dialect parsing
//! - `dispatch`: validation and normalization of token/policy requests
//! - `store`: the store contract, plus `memory` for an in-process implementation

pub mod bootstrap;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod model;
pub mod reconcile;
pub mod resolver;
pub mod rules;
pub mod store;

pub use dispatch::{
    AclDispatcher, AclOperation, CrudResource, CrudVerb, DispatcherConfig, PolicyWriteRequest,
    RequestContext, TokenCloneRequest, TokenWriteRequest,
};
pub use error::{AclError, ErrorKind, StoreError};
pub use memory::MemoryAclStore;
pub use model::{Policy, PolicyIdType, PolicyLink, Syntax, Token, TokenIdType};
pub use reconcile::{LinkMode, reconcile_policy_links};
pub use resolver::{resolve_policy_id, resolve_prefix, resolve_token_id};
pub use rules::{PolicyRules, translate_legacy_rules};
pub use store::AclStore;
