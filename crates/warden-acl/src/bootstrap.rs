// ACL bootstrap guard
// Exactly-once initialization is the store's conditional write; this layer only
// classifies the outcome and keeps secrets out of the logs.

use crate::error::AclError;
use crate::model::Token;
use crate::store::AclStore;

/// Create the initial management token of the cluster.
///
/// Succeeds for the first caller only. Every later call fails with
/// [`AclError::BootstrapAlreadyDone`], however the store reports it.
pub async fn bootstrap(store: &dyn AclStore, datacenter: &str) -> Result<Token, AclError> {
    match store.bootstrap(datacenter).await.map_err(AclError::from) {
        Ok(token) => {
            tracing::info!(
                datacenter = %datacenter,
                accessor_id = %token.accessor_id,
                "ACL bootstrap completed"
            );
            Ok(token)
        }
        Err(e @ AclError::BootstrapAlreadyDone(_)) => {
            tracing::warn!(datacenter = %datacenter, "Rejected ACL bootstrap: {}", e);
            Err(e)
        }
        Err(e) => {
            tracing::error!(datacenter = %datacenter, "ACL bootstrap failed: {}", e);
            Err(e)
        }
    }
}
