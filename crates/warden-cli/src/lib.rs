//! Warden ACL command line client
//!
//! - `client`: `AclStore` implementation over the server's `/v1/acl` HTTP API
//! - `command`: the `warden acl ...` command tree
//! - `config`: connection options shared by all commands

pub mod client;
pub mod command;
pub mod config;
pub mod error;

pub use client::{HttpAclStore, HttpClientConfig};
pub use command::{Cli, run};
pub use error::{ClientError, CommandError};

use tracing_subscriber::EnvFilter;

/// Log to stderr at `warn`, or at whatever `RUST_LOG` asks for
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
