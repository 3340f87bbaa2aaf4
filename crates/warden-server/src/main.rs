use std::sync::Arc;

use warden_acl::{AclDispatcher, MemoryAclStore};
use warden_server::{Configuration, http, logging};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;
    let _logging_guard = logging::init_logging(&configuration.logging_config())?;

    let dispatcher_config = configuration.dispatcher_config();
    let store = Arc::new(MemoryAclStore::new(dispatcher_config.datacenter.clone()));
    let dispatcher = Arc::new(AclDispatcher::new(dispatcher_config, store));

    let address = configuration.server_address();
    let port = configuration.server_port();
    tracing::info!(
        address = %address,
        port,
        datacenter = %dispatcher.config().datacenter,
        acl_enabled = dispatcher.config().acl_enabled,
        "Starting Warden ACL server"
    );

    http::acl_server(dispatcher, address, port)?.await?;

    tracing::info!("Warden ACL server stopped");
    Ok(())
}
