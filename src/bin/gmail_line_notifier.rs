use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gmail_line_notifier::auth::credential::{Credential, ScopeCheck, now_epoch};
use gmail_line_notifier::auth::oauth::{ClientSecrets, DEFAULT_REDIRECT_URI};
use gmail_line_notifier::auth::{self, token_file};
use gmail_line_notifier::config::{Settings, process_env};
use gmail_line_notifier::runner;

#[derive(Parser)]
#[command(name = "gmail_line_notifier")]
#[command(about = "Forward labelled Gmail messages to LINE, alert Slack on failure", long_about = None)]
struct Cli {
    /// Optional TOML file with non-secret settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Check Gmail once and forward the newest unread message (default)
    Run,

    /// Post a workflow failure alert to Slack
    ReportFailure,

    /// Authorize Gmail access in the browser and print GOOGLE_OAUTH_TOKEN
    SetupOauth {
        /// OAuth client secrets JSON (path or inline)
        #[arg(long)]
        credentials: String,

        #[arg(long, default_value = DEFAULT_REDIRECT_URI)]
        redirect_uri: String,
    },

    /// Show validity, expiry and scopes of a stored credential
    CheckToken {
        /// Base64 credential to inspect instead of the local token file
        #[arg(long)]
        token: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match cli.cmd.unwrap_or(Command::Run) {
        Command::Run => {
            runner::run(&process_env, &settings)?;
            Ok(())
        }

        Command::ReportFailure => {
            runner::report_workflow_failure(&process_env, &settings);
            Ok(())
        }

        Command::SetupOauth {
            credentials,
            redirect_uri,
        } => {
            let secrets = ClientSecrets::parse(&credentials)?;
            let credential = auth::authorize(&secrets, &redirect_uri, now_epoch())?;

            let path = token_file::token_path()?;
            token_file::save(&path, &credential)?;
            println!("OAuth setup completed successfully!");
            println!("Saved credential to {}", path.display());
            println!("Add this value to your CI secrets as 'GOOGLE_OAUTH_TOKEN':");
            println!("{}", credential.encode()?);
            Ok(())
        }

        Command::CheckToken { token } => {
            let credential = match token {
                Some(encoded) => Credential::decode(&encoded)?,
                None => {
                    let path = token_file::token_path()?;
                    match token_file::load(&path)? {
                        Some(c) => c,
                        None => {
                            println!("Token file {} not found", path.display());
                            return Ok(());
                        }
                    }
                }
            };
            print_token_report(&credential);
            Ok(())
        }
    }
}

fn print_token_report(credential: &Credential) {
    println!("Token is valid: {}", credential.is_valid());
    match credential.expires_at_epoch {
        Some(exp) => println!("Token expiry: {exp} (in {}s)", exp - now_epoch()),
        None => println!("Token expiry: none"),
    }
    println!("Token scopes: {:?}", credential.scopes);

    match credential.scope_check() {
        ScopeCheck::Modify => println!("✅ Token has gmail.modify scope - can mark emails as read"),
        ScopeCheck::ReadOnly => {
            println!("❌ Token only has gmail.readonly scope - cannot mark emails as read");
            println!("\nRegenerate the token with gmail.modify scope:");
            println!("1. Run: gmail_line_notifier setup-oauth --credentials <client_secret.json>");
            println!("2. Update GOOGLE_OAUTH_TOKEN in your CI secrets with the new value");
        }
        ScopeCheck::Unknown => println!("⚠️  Unknown scopes: {:?}", credential.scopes),
    }
}
