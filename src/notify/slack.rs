use log::{error, info};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::SlackConfig;
use crate::error::{NotifierError, Result};
use crate::http;

const SERVICE: &str = "slack";
pub const ALERT_HEADLINE: &str = "⚠️ Gmail to LINE Notification Failed";

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    mrkdwn: bool,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Failure alerts to a Slack channel via `chat.postMessage`.
///
/// Called from failure handlers, so it never returns an error.
pub struct SlackNotifier {
    http: Client,
    base_url: String,
    bot_token: String,
    channel_id: String,
}

impl SlackNotifier {
    pub fn new(cfg: &SlackConfig) -> Result<Self> {
        Ok(Self {
            http: http::client()?,
            base_url: http::trim_base(&cfg.api_base),
            bot_token: cfg.bot_token.clone(),
            channel_id: cfg.channel_id.clone(),
        })
    }

    pub fn format_alert(message: &str) -> String {
        format!("{ALERT_HEADLINE}\n\n{message}")
    }

    /// Returns whether Slack accepted the message.
    pub fn send_alert(&self, message: &str) -> bool {
        match self.post(&Self::format_alert(message)) {
            Ok(PostMessageResponse { ok: true, .. }) => {
                info!("Slack notification sent successfully");
                true
            }
            Ok(PostMessageResponse { error, .. }) => {
                error!(
                    "Failed to send Slack notification: {}",
                    error.as_deref().unwrap_or("unknown error")
                );
                false
            }
            Err(e) => {
                error!("Failed to send Slack notification: {e}");
                false
            }
        }
    }

    // The HTTP status is not checked: Slack reports failures in the body.
    fn post(&self, text: &str) -> Result<PostMessageResponse> {
        let resp = self
            .http
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.bot_token)
            .json(&PostMessageRequest {
                channel: &self.channel_id,
                text,
                mrkdwn: true,
            })
            .send()
            .map_err(|e| NotifierError::transport(SERVICE, e))?;
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| NotifierError::transport(SERVICE, e))?;
        serde_json::from_str(&body).map_err(|e| {
            NotifierError::Decode(format!("unexpected Slack response (HTTP {status}): {e}"))
        })
    }
}
