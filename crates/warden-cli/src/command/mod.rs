//! Command tree of the `warden` binary
//!
//! ```text
//! warden acl token update --id ID [--description D] [--policy-id ID]... [--policy-name N]... [--merge-policies]
//! warden acl bootstrap
//! warden acl translate-rules [FILE|-] [--token-accessor ID]
//! ```
//!
//! Every command exits 0 on success and 1 on failure, after printing one line on stderr.

pub mod bootstrap;
pub mod token_update;
pub mod translate;

use std::fmt::Write as _;
use std::io::Write;

use clap::{Parser, Subcommand};
use warden_acl::Token;

use crate::client::HttpAclStore;
use crate::config::HttpOptions;
use crate::error::CommandError;

pub use token_update::TokenUpdateArgs;
pub use translate::TranslateArgs;

#[derive(Debug, Parser)]
#[command(name = "warden", version, about = "Manage Warden ACL tokens and policies")]
pub struct Cli {
    #[command(flatten)]
    pub http: HttpOptions,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interact with the ACL system
    #[command(subcommand)]
    Acl(AclCommand),
}

#[derive(Debug, Subcommand)]
pub enum AclCommand {
    /// Manage ACL tokens
    #[command(subcommand)]
    Token(TokenCommand),
    /// Bootstrap the ACL system and print the management token
    Bootstrap,
    /// Translate legacy rules into the current syntax
    TranslateRules(TranslateArgs),
}

#[derive(Debug, Subcommand)]
pub enum TokenCommand {
    /// Update an existing token
    Update(TokenUpdateArgs),
}

/// Run a parsed command line and return the process exit code
pub async fn run(cli: Cli) -> i32 {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match execute(&cli, &mut out).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::debug!("Command failed: {:?}", err);
            eprintln!("{}", err);
            1
        }
    }
}

async fn execute(cli: &Cli, out: &mut dyn Write) -> Result<(), CommandError> {
    let Command::Acl(command) = &cli.command;

    // Rule text translation needs no agent
    if let AclCommand::TranslateRules(args) = command
        && args.token_accessor.is_none()
    {
        let rules = translate::read_rules(args.file.as_deref(), &mut std::io::stdin())?;
        write!(out, "{}", translate::translate_rules(&rules)?)?;
        return Ok(());
    }

    let store = HttpAclStore::new(cli.http.client_config()).map_err(CommandError::Connect)?;
    let datacenter = cli.http.datacenter.as_str();

    match command {
        AclCommand::Token(TokenCommand::Update(args)) => {
            let token =
                token_update::token_update(&store, datacenter, &cli.http.token, args).await?;
            writeln!(out, "Token updated successfully.")?;
            write!(out, "{}", format_token(&token))?;
        }
        AclCommand::Bootstrap => {
            let token = bootstrap::bootstrap(&store, datacenter).await?;
            write!(out, "{}", format_token(&token))?;
        }
        AclCommand::TranslateRules(args) => {
            let partial = args.token_accessor.as_deref().unwrap_or_default();
            let rules = translate::translate_token_rules(&store, datacenter, partial).await?;
            write!(out, "{}", rules)?;
        }
    }
    Ok(())
}

/// Human readable rendering of a token
pub fn format_token(token: &Token) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "AccessorID:   {}", token.accessor_id);
    let _ = writeln!(text, "SecretID:     {}", token.secret_id);
    let _ = writeln!(text, "Description:  {}", token.description);
    let _ = writeln!(text, "Local:        {}", token.local);
    if let Some(create_time) = token.create_time {
        let _ = writeln!(text, "Create Time:  {}", create_time);
    }
    if !token.policies.is_empty() {
        let _ = writeln!(text, "Policies:");
        for link in &token.policies {
            let _ = writeln!(text, "   {} - {}", link.id, link.name);
        }
    }
    if !token.rules.is_empty() {
        let _ = writeln!(text, "Rules:");
        let _ = writeln!(text, "{}", token.rules.trim_end());
    }
    text
}
