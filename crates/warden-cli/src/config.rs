// Connection options shared by every command

use clap::Args;

use crate::client::{DEFAULT_HTTP_ADDR, HttpClientConfig};

#[derive(Args, Clone, Debug)]
pub struct HttpOptions {
    /// Address of the Warden HTTP API
    #[arg(long = "http-addr", env = "WARDEN_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR, global = true)]
    pub http_addr: String,

    /// ACL token used for the request
    #[arg(
        long = "token",
        env = "WARDEN_HTTP_TOKEN",
        default_value = "",
        hide_env_values = true,
        global = true
    )]
    pub token: String,

    /// Datacenter to query, the agent's own when empty
    #[arg(long = "datacenter", env = "WARDEN_DATACENTER", default_value = "", global = true)]
    pub datacenter: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            token: String::new(),
            datacenter: String::new(),
        }
    }
}

impl HttpOptions {
    pub fn client_config(&self) -> HttpClientConfig {
        HttpClientConfig::new(&self.http_addr).with_token(&self.token)
    }
}
