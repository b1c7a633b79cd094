use log::info;
use reqwest::blocking::Client;
use serde::Serialize;

use crate::config::LineConfig;
use crate::domain::message::EmailContent;
use crate::error::{NotifierError, Result};
use crate::http;

const SERVICE: &str = "line";

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

/// Pushes forwarded emails to one LINE user or group.
pub struct LineNotifier {
    http: Client,
    base_url: String,
    channel_access_token: String,
    user_id: String,
    title: String,
}

impl LineNotifier {
    pub fn new(cfg: &LineConfig) -> Result<Self> {
        Ok(Self {
            http: http::client()?,
            base_url: http::trim_base(&cfg.api_base),
            channel_access_token: cfg.channel_access_token.clone(),
            user_id: cfg.user_id.clone(),
            title: cfg.title.clone(),
        })
    }

    pub fn format_message(&self, email: &EmailContent) -> String {
        format!(
            "📧 {}\n\n件名: {}\n差出人: {}\n\n本文:\n{}",
            self.title, email.subject, email.from, email.body
        )
    }

    /// Any non-2xx answer is fatal for the run. No retry.
    pub fn send(&self, email: &EmailContent) -> Result<()> {
        let text = self.format_message(email);
        let req = PushRequest {
            to: &self.user_id,
            messages: [TextMessage {
                kind: "text",
                text: &text,
            }],
        };

        let resp = self
            .http
            .post(format!("{}/v2/bot/message/push", self.base_url))
            .bearer_auth(&self.channel_access_token)
            .json(&req)
            .send()
            .map_err(|e| NotifierError::transport(SERVICE, e))?;
        http::ensure_success(SERVICE, resp)?;

        info!("LINE notification sent successfully for email: {}", email.id);
        Ok(())
    }
}
