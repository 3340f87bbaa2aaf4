//! Warden HTTP server
//!
//! Serves the ACL API under `/v1/acl` on top of [`warden_acl::AclDispatcher`].

pub mod acl;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod route;

pub use config::Configuration;
pub use error::ApiError;
pub use route::acl_routes;
