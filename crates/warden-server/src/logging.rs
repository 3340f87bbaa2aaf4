//! File-based logging for the Warden server.
//!
//! | Log File    | Component                  | Target Prefixes                       |
//! |-------------|----------------------------|---------------------------------------|
//! | warden.log  | Root logger (everything)   | (all)                                 |
//! | acl.log     | ACL resolution and writes  | warden_acl, warden_server::acl        |
//! | access.log  | HTTP access log            | actix_web::middleware::logger         |
//!
//! Log files go to `~/warden/logs` unless `log.dir` says otherwise.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

pub const ROOT_LOG_FILE: &str = "warden.log";

struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "acl.log",
        targets: &["warden_acl", "warden_server::acl"],
    },
    ComponentLogDef {
        file_name: "access.log",
        targets: &["actix_web::middleware::logger"],
    },
];

#[derive(Debug, Clone, Copy)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/warden/logs", home))
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub console_level: Level,
    pub file_logging: bool,
    pub file_level: Level,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            console_level: Level::INFO,
            file_logging: false,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Build from application configuration values; an unknown level falls back to `info`
    pub fn from_config(
        log_dir: Option<String>,
        console_output: bool,
        file_logging: bool,
        level: &str,
    ) -> Self {
        let level = level.parse().unwrap_or(Level::INFO);
        Self {
            log_dir: log_dir.map(PathBuf::from).unwrap_or_else(default_log_dir),
            console_output,
            console_level: level,
            file_logging,
            file_level: level,
            rotation: LogRotation::Daily,
        }
    }
}

/// Keeps the non-blocking file writers alive; buffered output is flushed on drop
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// `RUST_LOG` when set, the configured level otherwise
fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}

fn component_targets(component: &ComponentLogDef) -> Targets {
    component
        .targets
        .iter()
        .fold(Targets::new(), |targets, target| {
            targets.with_target(*target, LevelFilter::TRACE)
        })
}

fn rolling_writer(
    config: &LoggingConfig,
    file_name: &str,
    guards: &mut Vec<WorkerGuard>,
) -> NonBlocking {
    let appender = RollingFileAppender::new(config.rotation.into(), &config.log_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    guards.push(guard);
    writer
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level of the console and root file layers.
/// Component files capture every event of their targets.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.console_output {
        layers.push(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_filter(level_filter(config.console_level))
                .boxed(),
        );
    }

    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;

        let root = rolling_writer(config, ROOT_LOG_FILE, &mut guards);
        layers.push(
            fmt::layer()
                .with_writer(root)
                .with_ansi(false)
                .with_thread_names(true)
                .with_filter(level_filter(config.file_level))
                .boxed(),
        );

        for component in COMPONENT_LOGS {
            let writer = rolling_writer(config, component.file_name, &mut guards);
            layers.push(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(component_targets(component))
                    .boxed(),
            );
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            components = COMPONENT_LOGS.len(),
            "Writing logs to {}",
            ROOT_LOG_FILE
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}
