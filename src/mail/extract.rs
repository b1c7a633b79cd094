//! Projection of a Gmail message onto the fields we forward.
//!
//! No I/O. Base64 problems degrade to empty text; a `text/plain` part
//! without inline data is a malformed message and fails the run.

use log::warn;

use crate::domain::message::{
    EmailContent, MessagePart, NO_BODY_CONTENT, NO_SUBJECT, RawMessage, UNKNOWN_SENDER,
};
use crate::error::{NotifierError, Result};
use crate::mail::decoders::{decode_body_data, truncate_chars};

pub const BODY_LIMIT: usize = 500;
pub const PLAIN_TEXT: &str = "text/plain";

pub fn extract(message: &RawMessage) -> Result<EmailContent> {
    let payload = &message.payload;
    let subject = payload.header("Subject").unwrap_or(NO_SUBJECT);
    let from = payload.header("From").unwrap_or(UNKNOWN_SENDER);

    let body = truncate_chars(&extract_body(payload)?, BODY_LIMIT);

    Ok(EmailContent {
        id: message.id.clone(),
        subject: subject.to_string(),
        from: from.to_string(),
        body: if body.is_empty() {
            NO_BODY_CONTENT.to_string()
        } else {
            body
        },
    })
}

/// Plain-text parts concatenated in order, or the single top-level blob
/// when there are no parts. Trimmed, not truncated.
pub fn extract_body(payload: &MessagePart) -> Result<String> {
    let body = match &payload.parts {
        Some(parts) => {
            let mut body = String::new();
            for part in parts.iter().filter(|p| p.mime_type == PLAIN_TEXT) {
                let data = part.data().ok_or_else(|| missing_data(part))?;
                body.push_str(&decode_or_empty(data, &part.mime_type));
            }
            body
        }
        None => payload
            .data()
            .map(|data| decode_or_empty(data, &payload.mime_type))
            .unwrap_or_default(),
    };
    Ok(body.trim().to_string())
}

fn missing_data(part: &MessagePart) -> NotifierError {
    match part.body.as_ref().and_then(|b| b.attachment_id.as_deref()) {
        Some(id) => NotifierError::Malformed(format!(
            "{} part has no inline data (stored as attachment {id})",
            part.mime_type
        )),
        None => NotifierError::Malformed(format!("{} part has no body data", part.mime_type)),
    }
}

fn decode_or_empty(data: &str, mime_type: &str) -> String {
    match decode_body_data(data) {
        Ok(text) => text,
        Err(e) => {
            warn!("skipping undecodable {mime_type} body: {e}");
            String::new()
        }
    }
}
