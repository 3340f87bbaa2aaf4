//! HTTP server setup

use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, middleware::Logger, web};
use warden_acl::AclDispatcher;

use crate::route::acl_routes;

/// Creates and binds the ACL HTTP server
pub fn acl_server(
    dispatcher: Arc<AclDispatcher>,
    address: String,
    port: u16,
) -> Result<Server, std::io::Error> {
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(dispatcher.clone()))
            .service(acl_routes())
    })
    .bind((address, port))?
    .run())
}
