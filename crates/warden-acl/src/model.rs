// ACL record shapes
// These match the JSON wire schema used by the HTTP API and the store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AclError;

/// ID of the builtin management policy
pub const GLOBAL_MANAGEMENT_POLICY_ID: &str = "00000000-0000-0000-0000-000000000001";
pub const GLOBAL_MANAGEMENT_POLICY_NAME: &str = "global-management";

/// Accessor ID of the builtin anonymous token
pub const ANONYMOUS_TOKEN_ID: &str = "00000000-0000-0000-0000-000000000002";
pub const ANONYMOUS_TOKEN_NAME: &str = "anonymous";

pub const DEFAULT_DATACENTER: &str = "dc1";

/// Rules granted by the builtin management policy
pub const GLOBAL_MANAGEMENT_RULES: &str = r#"acl = "write"
agent_prefix "" {
  policy = "write"
}
event_prefix "" {
  policy = "write"
}
key_prefix "" {
  policy = "write"
}
keyring = "write"
node_prefix "" {
  policy = "write"
}
operator = "write"
query_prefix "" {
  policy = "write"
}
service_prefix "" {
  policy = "write"
  intentions = "write"
}
session_prefix "" {
  policy = "write"
}
"#;

/// Reference from a token to a policy, by ID or by Name
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyLink {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl PolicyLink {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.name.is_empty()
    }
}

/// Rule dialect of a policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Syntax {
    Legacy,
    #[default]
    Current,
}

/// ACL token record
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Token {
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
    /// Embedded rules of a legacy token, empty otherwise
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rules: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

impl Token {
    /// List representation, without the secret and legacy rules
    pub fn stub(&self) -> TokenListStub {
        TokenListStub {
            accessor_id: self.accessor_id.clone(),
            description: self.description.clone(),
            policies: self.policies.clone(),
            local: self.local,
            legacy: !self.rules.is_empty(),
            create_time: self.create_time,
            create_index: self.create_index,
            modify_index: self.modify_index,
        }
    }

    pub fn links_policy(&self, policy_id: &str) -> bool {
        self.policies.iter().any(|link| link.id == policy_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TokenListStub {
    #[serde(rename = "AccessorID")]
    pub accessor_id: String,
    pub description: String,
    pub policies: Vec<PolicyLink>,
    pub local: bool,
    pub legacy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    pub create_index: u64,
    pub modify_index: u64,
}

/// ACL policy record
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Policy {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: String,
    #[serde(default)]
    pub syntax: Syntax,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datacenters: Vec<String>,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

impl Policy {
    pub fn stub(&self) -> PolicyListStub {
        PolicyListStub {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            datacenters: self.datacenters.clone(),
            create_index: self.create_index,
            modify_index: self.modify_index,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.id == GLOBAL_MANAGEMENT_POLICY_ID
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyListStub {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datacenters: Vec<String>,
    pub create_index: u64,
    pub modify_index: u64,
}

/// ACL replication status of a datacenter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplicationStatus {
    pub enabled: bool,
    pub running: bool,
    pub source_datacenter: String,
    pub replication_type: String,
    pub replicated_index: u64,
    pub replicated_role_index: u64,
    pub replicated_token_index: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<DateTime<Utc>>,
}

/// Which token identifier a lookup is keyed by
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenIdType {
    Accessor,
    Secret,
}

/// Which policy identifier a lookup is keyed by
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolicyIdType {
    #[default]
    Id,
    Name,
}

impl PolicyIdType {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyIdType::Id => "id",
            PolicyIdType::Name => "name",
        }
    }
}

impl std::fmt::Display for PolicyIdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PolicyIdType {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(PolicyIdType::Id),
            "name" => Ok(PolicyIdType::Name),
            _ => Err(AclError::BadRequest(
                "Invalid value for idType parameter".to_string(),
            )),
        }
    }
}
