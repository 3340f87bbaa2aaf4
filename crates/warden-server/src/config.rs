//! Configuration management for the Warden server
//!
//! Sources, lowest precedence first: built-in defaults, the YAML file
//! (`conf/application.yml` unless `--config` says otherwise, optional), `WARDEN_`
//! environment variables (`WARDEN_ACL__ENABLED=false`), command-line flags.

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use warden_acl::DispatcherConfig;
use warden_acl::model::DEFAULT_DATACENTER;

use crate::logging::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8500;

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "warden-server", version, about = "Warden ACL server")]
pub struct Cli {
    /// Configuration file, skipped when absent
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,
    #[arg(long = "address")]
    pub address: Option<String>,
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
    #[arg(long = "datacenter")]
    pub datacenter: Option<String>,
    #[arg(long = "acl-enabled")]
    pub acl_enabled: Option<bool>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load using the process's command line
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(Cli::parse())
    }

    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.address", DEFAULT_SERVER_ADDRESS)?
            .set_default("server.port", i64::from(DEFAULT_SERVER_PORT))?
            .set_default("acl.enabled", true)?
            .set_default("acl.datacenter", DEFAULT_DATACENTER)?
            .set_default("log.level", "info")?
            .set_default("log.console", true)?
            .set_default("log.file", false)?;

        if !cli.config_file.is_empty() {
            builder = builder.add_source(File::with_name(&cli.config_file).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix("WARDEN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(v) = cli.address {
            builder = builder.set_override("server.address", v)?;
        }
        if let Some(v) = cli.port {
            builder = builder.set_override("server.port", i64::from(v))?;
        }
        if let Some(v) = cli.datacenter {
            builder = builder.set_override("acl.datacenter", v)?;
        }
        if let Some(v) = cli.acl_enabled {
            builder = builder.set_override("acl.enabled", v)?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string("server.address")
            .unwrap_or_else(|_| DEFAULT_SERVER_ADDRESS.to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int("server.port")
            .ok()
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    // ========================================================================
    // ACL Configuration
    // ========================================================================

    pub fn acl_enabled(&self) -> bool {
        self.config.get_bool("acl.enabled").unwrap_or(true)
    }

    pub fn datacenter(&self) -> String {
        self.config
            .get_string("acl.datacenter")
            .ok()
            .filter(|dc| !dc.is_empty())
            .unwrap_or_else(|| DEFAULT_DATACENTER.to_string())
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            acl_enabled: self.acl_enabled(),
            datacenter: self.datacenter(),
        }
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string("log.dir").ok(),
            self.config.get_bool("log.console").unwrap_or(true),
            self.config.get_bool("log.file").unwrap_or(false),
            &self
                .config
                .get_string("log.level")
                .unwrap_or_else(|_| "info".to_string()),
        )
    }
}
