// `warden acl bootstrap`

use warden_acl::{AclStore, Token};

use crate::error::CommandError;

pub async fn bootstrap(store: &dyn AclStore, datacenter: &str) -> Result<Token, CommandError> {
    warden_acl::bootstrap::bootstrap(store, datacenter)
        .await
        .map_err(CommandError::Bootstrap)
}
