//! Grantforge CLI
//!
//! Command-line interface for provisioning consumers and exercising the
//! grant flows against an in-memory store.
//!
//! # Usage
//!
//! ```bash
//! # Register a new consumer
//! grantforge consumer new --domain client.example.com
//!
//! # Check a consumer secret
//! grantforge consumer verify --key 6e591afe5374410b \
//!     --encryption-key 58af94d5c748d8365eb6bf24abde23ef --secret <hex>
//!
//! # Show the effective configuration
//! grantforge config show
//!
//! # Run every grant flow once
//! grantforge walkthrough --permissions read,write --user alice
//! ```

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grantforge_core::{
    AccessTokenPair, Consumer, ConsumerCredentials, ConsumerPrivileges, GrantEngine,
    MemoryTokenStore, Permissions, UserId,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{GrantforgeConfig, load_config};

#[derive(Parser)]
#[command(name = "grantforge")]
#[command(about = "OAuth token issuance for the raibid-labs ecosystem")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage consumers
    Consumer {
        #[command(subcommand)]
        action: ConsumerCommand,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// Run the authorization-code, refresh and client-credentials flows
    Walkthrough {
        /// Permissions to grant (comma-separated)
        #[arg(short, long, default_value = "read")]
        permissions: String,

        /// User granting the permissions
        #[arg(short, long, default_value = "demo-user")]
        user: String,
    },
}

#[derive(Subcommand)]
enum ConsumerCommand {
    /// Generate credentials for a new consumer
    New {
        /// Redirect domain registered for the consumer
        #[arg(short, long)]
        domain: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check a consumer secret against its key
    Verify {
        /// Consumer key
        #[arg(short, long)]
        key: String,

        /// Encryption key (32 hex characters)
        #[arg(short, long)]
        encryption_key: String,

        /// Secret to check
        #[arg(short, long)]
        secret: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Consumer { action } => match action {
            ConsumerCommand::New { domain, format } => new_consumer(&domain, &format),
            ConsumerCommand::Verify {
                key,
                encryption_key,
                secret,
            } => verify_consumer(&key, &encryption_key, &secret),
        },
        Commands::Config { action } => match action {
            ConfigCommand::Show => show_config(&config),
        },
        Commands::Walkthrough { permissions, user } => {
            walkthrough(&config, &permissions, &user).await
        }
    }
}

fn init_logging(config: &GrantforgeConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { config.log_level.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn new_consumer(domain: &str, format: &str) -> Result<()> {
    let credentials = ConsumerCredentials::generate().context("Failed to generate credentials")?;
    info!("Generated credentials for consumer {}", credentials.key);

    match format {
        "json" => {
            let output = serde_json::json!({
                "key": credentials.key.as_str(),
                "domain": domain,
                "encryption_key": credentials.encryption_key.to_hex(),
                "secret": credentials.secret.expose(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!("Consumer for {}", domain);
            println!("  Key:            {}", credentials.key);
            println!("  Encryption key: {}", credentials.encryption_key.to_hex());
            println!("  Secret:         {}", credentials.secret.expose());
            println!();
            println!("Store the key and encryption key; hand the secret to the consumer.");
        }
    }
    Ok(())
}

fn verify_consumer(key: &str, encryption_key: &str, secret: &str) -> Result<()> {
    let consumer = Consumer::from_hex_key(key, "", encryption_key, ConsumerPrivileges::none())
        .context("Invalid encryption key")?;

    println!("{}", verification_message(&consumer, secret));
    Ok(())
}

fn verification_message(consumer: &Consumer, secret: &str) -> String {
    if consumer.verify_secret(secret) {
        format!("Secret is valid for consumer {}", consumer.key())
    } else {
        format!("Secret is NOT valid for consumer {}", consumer.key())
    }
}

fn show_config(config: &GrantforgeConfig) -> Result<()> {
    println!("# {}", config.config_path.display());
    print!("{}", toml::to_string_pretty(config).context("Failed to render config")?);
    Ok(())
}

async fn walkthrough(config: &GrantforgeConfig, permissions: &str, user: &str) -> Result<()> {
    let engine = GrantEngine::new(MemoryTokenStore::new(config.lifetimes));
    let permissions = Permissions::new(permissions);
    let user = UserId::new(user);

    let (server, server_secret) = ConsumerCredentials::generate()?
        .into_consumer("auth.localhost", ConsumerPrivileges::all());
    let (client, client_secret) = ConsumerCredentials::generate()?
        .into_consumer("client.localhost", ConsumerPrivileges::none());
    println!("Registered authorization server {}", server.key());
    println!("Registered client {}", client.key());

    server
        .authenticate_authorization_server(server_secret.expose())
        .context("Authorization server failed to authenticate")?;

    println!();
    println!("== Authorization code grant ==");
    let code = engine
        .issue_authorization_token(&client, &permissions, &user)
        .await?;
    println!("Issued authorization token {}", abbreviate(&code.value));

    let pair = engine
        .exchange_authorization_token(&client, client_secret.expose(), &code)
        .await?
        .into_result()
        .context("Authorization code exchange was rejected")?;
    print_pair("Exchanged for", &pair);

    let replay = engine
        .exchange_authorization_token(&client, client_secret.expose(), &code)
        .await?;
    match replay.rejection() {
        Some(rejection) => println!("Second exchange rejected: {}", rejection),
        None => anyhow::bail!("Authorization token was exchanged twice"),
    }

    println!();
    println!("== Refresh grant ==");
    let mut current = pair;
    for round in 1..=2 {
        let next = engine
            .refresh_access_token(&client, client_secret.expose(), &current.refresh_token)
            .await?
            .into_result()
            .with_context(|| format!("Refresh {} was rejected", round))?;
        print_pair(&format!("Refresh {} issued", round), &next);

        let stale = engine
            .resolve_access_token(&current.access_token.value)
            .await?;
        println!(
            "  previous access token {}",
            if stale.is_some() { "still valid" } else { "invalidated" }
        );
        current = next;
    }

    println!();
    println!("== Client credentials grant ==");
    let denied = engine
        .issue_client_credentials_token(&client, client_secret.expose(), &user, &permissions)
        .await?;
    if let Some(rejection) = denied.rejection() {
        println!("Client without privilege rejected: {}", rejection);
    }
    let direct = engine
        .issue_client_credentials_token(&server, server_secret.expose(), &user, &permissions)
        .await?
        .into_result()
        .context("Client credentials grant was rejected")?;
    print_pair("Authorization server issued", &direct);

    info!("Walkthrough stored {} tokens", engine.store().len());
    Ok(())
}

fn print_pair(label: &str, pair: &AccessTokenPair) {
    println!(
        "{}: access {} (expires {}), refresh {} (expires {})",
        label,
        abbreviate(&pair.access_token.value),
        pair.access_token.expires_at.to_rfc3339(),
        abbreviate(&pair.refresh_token.value),
        pair.refresh_token.expires_at.to_rfc3339(),
    );
}

/// First characters of a token value, enough to tell tokens apart.
fn abbreviate(value: &str) -> String {
    let prefix: String = value.chars().take(12).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_consumer_new() {
        let cli = Cli::try_parse_from([
            "grantforge",
            "consumer",
            "new",
            "--domain",
            "example.com",
            "--format",
            "json",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Consumer {
                action: ConsumerCommand::New { ref domain, ref format }
            } if domain == "example.com" && format == "json"
        ));
    }

    #[test]
    fn test_cli_walkthrough_defaults() {
        let cli = Cli::try_parse_from(["grantforge", "-v", "walkthrough"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Walkthrough { ref permissions, ref user }
                if permissions == "read" && user == "demo-user"
        ));
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("0123456789abcdef"), "0123456789ab...");
        assert_eq!(abbreviate("abc"), "abc...");
    }

    #[test]
    fn test_verify_reports_without_failing() {
        let (consumer, secret) = ConsumerCredentials::generate()
            .unwrap()
            .into_consumer("", ConsumerPrivileges::none());
        let key = consumer.key().to_string();
        let encryption_key = consumer.encryption_key().to_hex();

        assert!(verify_consumer(&key, &encryption_key, secret.expose()).is_ok());
        assert!(verify_consumer(&key, &encryption_key, "not-a-secret").is_ok());
        assert!(verify_consumer(&key, "short", secret.expose()).is_err());

        assert!(verification_message(&consumer, secret.expose()).contains("is valid"));
        assert!(verification_message(&consumer, "deadbeef").contains("NOT valid"));
    }

    #[tokio::test]
    async fn test_walkthrough_runs() {
        walkthrough(&GrantforgeConfig::default(), "read,write", "alice")
            .await
            .unwrap();
    }
}
