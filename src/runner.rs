//! One scheduled run: check Gmail, forward at most one message to LINE,
//! mark it read, report the outcome.

use log::{error, info, warn};
use std::fmt;

use crate::auth;
use crate::config::{self, Config, Lookup, Settings, SlackConfig};
use crate::domain::message::EmailContent;
use crate::error::Result;
use crate::mail::extract::extract;
use crate::mail::gmail_client::GmailClient;
use crate::notify::line::LineNotifier;
use crate::notify::slack::SlackNotifier;
use crate::status::{RunStatus, StatusSink};

pub const SANDBOX_PREFIX: &str = "[SANDBOX] ";

/// Last state the run reached. Reported in the failure alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Configured,
    Checked,
    NoMail,
    Notified,
    MarkedRead,
    Reported,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Init => "while loading configuration and credentials",
            Stage::Configured => "while checking Gmail",
            Stage::Checked => "while forwarding the message to LINE",
            Stage::NoMail | Stage::MarkedRead => "while writing the run status",
            Stage::Notified => "after the LINE notification was sent",
            Stage::Reported => "after the run was reported",
        })
    }
}

/// Run the job. On failure the `failed` status is written and a Slack alert
/// is attempted before the original error is returned.
pub fn run(env: Lookup, settings: &Settings) -> Result<RunStatus> {
    let mut stage = Stage::Init;
    match execute(env, settings, &mut stage) {
        Ok(status) => Ok(status),
        Err(err) => {
            error!("Error in main process ({stage}): {err}");
            handle_failure(env, settings, stage, &err.to_string());
            Err(err)
        }
    }
}

fn execute(env: Lookup, settings: &Settings, stage: &mut Stage) -> Result<RunStatus> {
    let config = Config::load(env, settings)?;
    info!("{}", config.mode_display());

    let credential = auth::resolve(&config.google)?;
    let gmail = GmailClient::with_base_url(&credential.access_token, &config.gmail_api_base)?;
    let line = LineNotifier::new(&config.line)?;
    let sink = StatusSink::new(&config.status_path);
    *stage = Stage::Configured;

    info!("Checking for unread emails with label '{}'", config.label);
    let found = gmail.find_unread(&config.label, &config.user_id)?;
    *stage = Stage::Checked;

    let status = match found {
        None => {
            *stage = Stage::NoMail;
            info!("No new emails to process");
            RunStatus::no_emails(config.sandbox_mode)
        }
        Some(message) => {
            let email = prepare(extract(&message)?, &config);
            line.send(&email)?;
            *stage = Stage::Notified;

            gmail.mark_read(&email.id, &config.user_id);
            *stage = Stage::MarkedRead;
            RunStatus::success(config.sandbox_mode)
        }
    };

    sink.write(status)?;
    *stage = Stage::Reported;
    info!("status={status}");
    Ok(status)
}

fn prepare(email: EmailContent, config: &Config) -> EmailContent {
    if config.sandbox_mode {
        email.with_subject_prefix(SANDBOX_PREFIX)
    } else {
        email
    }
}

/// Best effort throughout: nothing here may mask the original error.
fn handle_failure(env: Lookup, settings: &Settings, stage: Stage, message: &str) {
    let (sink, status, slack) = match Config::load(env, settings) {
        Ok(config) => (
            StatusSink::new(&config.status_path),
            RunStatus::failed(config.sandbox_mode),
            Some(config.slack),
        ),
        Err(e) => {
            warn!("Configuration unavailable while reporting failure: {e}");
            let slack = SlackConfig::from_env(env, config::is_sandbox(env), settings).ok();
            (
                StatusSink::new(config::status_path(env)),
                RunStatus::Failed,
                slack,
            )
        }
    };

    if let Err(e) = sink.write(status) {
        error!("Could not write status to {}: {e}", sink.path().display());
    }

    send_alert(slack, &format!("Run failed {stage}.\n```{message}```"));
}

fn send_alert(slack: Option<SlackConfig>, message: &str) {
    let Some(cfg) = slack else {
        warn!("Slack configuration unavailable; skipping failure alert");
        return;
    };
    match SlackNotifier::new(&cfg) {
        Ok(notifier) => {
            notifier.send_alert(message);
        }
        Err(e) => error!("Could not create Slack client: {e}"),
    }
}

pub fn workflow_run_url(env: Lookup) -> String {
    let repo = env("GITHUB_REPOSITORY").unwrap_or_default();
    let run_id = env("GITHUB_RUN_ID").unwrap_or_default();
    format!("https://github.com/{repo}/actions/runs/{run_id}")
}

/// Standalone alert for a failed CI workflow, sent from a `failure()` step.
/// Missing Slack configuration is logged, not an error.
pub fn report_workflow_failure(env: Lookup, settings: &Settings) -> bool {
    let cfg = match SlackConfig::from_env(env, config::is_sandbox(env), settings) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Slack configuration error: {e}");
            return false;
        }
    };
    let message = format!(
        "Workflow failed: {}\nPlease check the logs for details.",
        workflow_run_url(env)
    );
    match SlackNotifier::new(&cfg) {
        Ok(notifier) => notifier.send_alert(&message),
        Err(e) => {
            error!("Could not create Slack client: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn workflow_url_uses_repository_and_run_id() {
        let vars: HashMap<&str, String> = [
            ("GITHUB_REPOSITORY", "owner/parcels".to_string()),
            ("GITHUB_RUN_ID", "12345".to_string()),
        ]
        .into_iter()
        .collect();
        let env = |k: &str| vars.get(k).cloned();
        assert_eq!(
            workflow_run_url(&env),
            "https://github.com/owner/parcels/actions/runs/12345"
        );
    }

    #[test]
    fn report_without_slack_config_is_not_an_error() {
        let env = |_: &str| -> Option<String> { None };
        assert!(!report_workflow_failure(&env, &Settings::default()));
    }

    #[test]
    fn stage_descriptions_are_human_readable() {
        assert_eq!(Stage::Configured.to_string(), "while checking Gmail");
        assert_eq!(
            Stage::Init.to_string(),
            "while loading configuration and credentials"
        );
    }
}
