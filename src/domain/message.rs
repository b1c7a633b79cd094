use serde::{Deserialize, Serialize};

pub type MessageId = String;

pub const NO_SUBJECT: &str = "No Subject";
pub const UNKNOWN_SENDER: &str = "Unknown Sender";
pub const NO_BODY_CONTENT: &str = "No body content";

/// A message as returned by Gmail `users.messages.get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: MessageId,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    pub payload: MessagePart,
}

/// The payload tree. The top level and every MIME part share this shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<MessageBody>,
    /// `None` when the API sent no `parts` key at all.
    #[serde(default)]
    pub parts: Option<Vec<MessagePart>>,
}

impl MessagePart {
    /// First header with exactly this name, in document order.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }

    /// Base64url body blob, if this part carries one inline.
    pub fn data(&self) -> Option<&str> {
        self.body.as_ref().and_then(|b| b.data.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    #[serde(default)]
    pub data: Option<String>,
    /// Set instead of `data` when Gmail stores the body separately.
    #[serde(default)]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// What gets forwarded: the normalized projection of a [`RawMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailContent {
    pub id: MessageId,
    pub subject: String,
    pub from: String,
    pub body: String,
}

impl EmailContent {
    pub fn with_subject_prefix(mut self, prefix: &str) -> Self {
        self.subject = format!("{prefix}{}", self.subject);
        self
    }
}
