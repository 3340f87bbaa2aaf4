use actix_web::web;

use crate::acl;

/// Configure the ACL API routes
pub fn acl_routes() -> actix_web::Scope {
    web::scope("/v1/acl")
        .route("/bootstrap", web::put().to(acl::bootstrap))
        .route("/bootstrap", web::post().to(acl::bootstrap))
        .route("/replication", web::get().to(acl::replication_status))
        .route("/rules/translate", web::post().to(acl::translate_rules))
        .route(
            "/rules/translate/{token_id}",
            web::get().to(acl::translate_token_rules),
        )
        .route("/policies", web::get().to(acl::list_policies))
        .route("/policy", web::put().to(acl::create_policy))
        // verb dispatch happens in the handler so unsupported methods get a 405
        .route("/policy/{id}", web::route().to(acl::policy_crud))
        .route("/tokens", web::get().to(acl::list_tokens))
        .route("/token", web::put().to(acl::create_token))
        .route("/token/self", web::get().to(acl::token_self))
        .route("/token/clone/{id}", web::put().to(acl::clone_token))
        .route("/token/clone/{id}", web::post().to(acl::clone_token))
        .route("/token/upgrade/{id}", web::put().to(acl::upgrade_token))
        .route("/token/{id}", web::route().to(acl::token_crud))
}
