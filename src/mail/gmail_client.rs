use log::{debug, error, info};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::GMAIL_API_BASE;
use crate::domain::message::{MessageId, RawMessage};
use crate::error::{NotifierError, Result};
use crate::http;

const SERVICE: &str = "gmail";
const UNREAD_LABEL: &str = "UNREAD";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    result_size_estimate: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: MessageId,
}

/// Thin blocking wrapper over the three Gmail endpoints the job uses.
pub struct GmailClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl GmailClient {
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(access_token, GMAIL_API_BASE)
    }

    pub fn with_base_url(access_token: impl Into<String>, base_url: &str) -> Result<Self> {
        Ok(Self {
            http: http::client()?,
            base_url: http::trim_base(base_url),
            access_token: access_token.into(),
        })
    }

    pub fn unread_query(label: &str) -> String {
        format!("label:\"{label}\" is:unread")
    }

    fn messages_url(&self, user_id: &str) -> String {
        format!("{}/users/{}/messages", self.base_url, user_id)
    }

    /// The most recent unread message under `label`, if any.
    ///
    /// Only one result is requested; there is no pagination.
    pub fn find_unread(&self, label: &str, user_id: &str) -> Result<Option<RawMessage>> {
        let query = Self::unread_query(label);
        debug!("listing messages with q={query}");

        let resp = self
            .http
            .get(self.messages_url(user_id))
            .bearer_auth(&self.access_token)
            .query(&[("q", query.as_str()), ("maxResults", "1")])
            .send()
            .map_err(|e| NotifierError::transport(SERVICE, e))?;
        let text = http::ensure_success(SERVICE, resp)?
            .text()
            .map_err(|e| NotifierError::transport(SERVICE, e))?;
        let list: ListMessagesResponse = serde_json::from_str(&text)?;
        debug!("list estimate: {:?}", list.result_size_estimate);

        let Some(first) = list.messages.into_iter().next() else {
            info!("No unread emails with '{label}' label found.");
            return Ok(None);
        };

        self.fetch(&first.id, user_id).map(Some)
    }

    pub fn fetch(&self, id: &str, user_id: &str) -> Result<RawMessage> {
        let url = format!("{}/{}", self.messages_url(user_id), id);
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()
            .map_err(|e| NotifierError::transport(SERVICE, e))?;
        let text = http::ensure_success(SERVICE, resp)?
            .text()
            .map_err(|e| NotifierError::transport(SERVICE, e))?;
        let message: RawMessage = serde_json::from_str(&text)?;
        info!("Fetched email {}", message.id);
        Ok(message)
    }

    /// Clear the unread marker. Failures are logged and swallowed: the
    /// notification has already gone out by the time this runs.
    pub fn mark_read(&self, id: &str, user_id: &str) {
        match self.remove_unread_label(id, user_id) {
            Ok(()) => info!("Email {id} marked as read"),
            Err(e) => error!("Error marking email as read: {e}"),
        }
    }

    fn remove_unread_label(&self, id: &str, user_id: &str) -> Result<()> {
        let url = format!("{}/{}/modify", self.messages_url(user_id), id);
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "removeLabelIds": [UNREAD_LABEL] }))
            .send()
            .map_err(|e| NotifierError::transport(SERVICE, e))?;
        http::ensure_success(SERVICE, resp)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    const LABEL: &str = "Family/お荷物滞留お知らせメール";

    fn list_query() -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), GmailClient::unread_query(LABEL)),
            Matcher::UrlEncoded("maxResults".into(), "1".into()),
        ])
    }

    #[test]
    fn query_quotes_the_label() {
        assert_eq!(
            GmailClient::unread_query("Family/Parcels"),
            "label:\"Family/Parcels\" is:unread"
        );
    }

    #[test]
    fn empty_list_means_no_message() {
        let mut server = mockito::Server::new();
        let list = server
            .mock("GET", "/users/me/messages")
            .match_query(list_query())
            .match_header("authorization", "Bearer gmail-token")
            .with_header("content-type", "application/json")
            .with_body(json!({"resultSizeEstimate": 0}).to_string())
            .create();
        let get = server
            .mock("GET", Matcher::Regex(r"^/users/me/messages/.+".into()))
            .expect(0)
            .create();

        let client = GmailClient::with_base_url("gmail-token", &server.url()).unwrap();
        let found = client.find_unread(LABEL, "me").unwrap();

        assert!(found.is_none());
        list.assert();
        get.assert();
    }

    #[test]
    fn explicit_empty_array_means_no_message() {
        let mut server = mockito::Server::new();
        let _list = server
            .mock("GET", "/users/me/messages")
            .match_query(list_query())
            .with_body(json!({"messages": []}).to_string())
            .create();

        let client = GmailClient::with_base_url("gmail-token", &server.url()).unwrap();
        assert!(client.find_unread(LABEL, "me").unwrap().is_none());
    }

    #[test]
    fn first_listed_message_is_fetched() {
        let mut server = mockito::Server::new();
        let _list = server
            .mock("GET", "/users/me/messages")
            .match_query(list_query())
            .with_body(
                json!({"messages": [{"id": "abc123", "threadId": "t1"}, {"id": "zzz"}]})
                    .to_string(),
            )
            .create();
        let get = server
            .mock("GET", "/users/me/messages/abc123")
            .match_query(Matcher::UrlEncoded("format".into(), "full".into()))
            .match_header("authorization", "Bearer gmail-token")
            .with_body(
                json!({
                    "id": "abc123",
                    "labelIds": ["UNREAD", "Label_1"],
                    "payload": {
                        "mimeType": "text/plain",
                        "headers": [{"name": "Subject", "value": "hello"}],
                        "body": {"data": "aGk="}
                    }
                })
                .to_string(),
            )
            .create();

        let client = GmailClient::with_base_url("gmail-token", &server.url()).unwrap();
        let message = client.find_unread(LABEL, "me").unwrap().unwrap();

        assert_eq!(message.id, "abc123");
        assert_eq!(message.payload.header("Subject"), Some("hello"));
        get.assert();
    }

    #[test]
    fn unauthorized_list_is_an_auth_error() {
        let mut server = mockito::Server::new();
        let _list = server
            .mock("GET", "/users/me/messages")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#)
            .create();

        let client = GmailClient::with_base_url("stale", &server.url()).unwrap();
        let err = client.find_unread(LABEL, "me").unwrap_err();
        assert!(err.is_auth(), "{err}");
    }

    #[test]
    fn server_error_on_fetch_propagates() {
        let mut server = mockito::Server::new();
        let _list = server
            .mock("GET", "/users/me/messages")
            .match_query(Matcher::Any)
            .with_body(json!({"messages": [{"id": "abc123"}]}).to_string())
            .create();
        let _get = server
            .mock("GET", "/users/me/messages/abc123")
            .match_query(Matcher::Any)
            .with_status(503)
            .create();

        let client = GmailClient::with_base_url("gmail-token", &server.url()).unwrap();
        let err = client.find_unread(LABEL, "me").unwrap_err();
        assert!(matches!(err, NotifierError::Transport { service: "gmail", .. }));
    }

    #[test]
    fn message_without_mime_type_is_rejected() {
        let mut server = mockito::Server::new();
        let _get = server
            .mock("GET", "/users/me/messages/abc123")
            .match_query(Matcher::Any)
            .with_body(json!({"id": "abc123", "payload": {"headers": []}}).to_string())
            .create();

        let client = GmailClient::with_base_url("gmail-token", &server.url()).unwrap();
        let err = client.fetch("abc123", "me").unwrap_err();
        assert!(matches!(err, NotifierError::Json(_)), "{err}");
    }

    #[test]
    fn mark_read_removes_unread_label() {
        let mut server = mockito::Server::new();
        let modify = server
            .mock("POST", "/users/me/messages/abc123/modify")
            .match_header("authorization", "Bearer gmail-token")
            .match_body(Matcher::Json(json!({"removeLabelIds": ["UNREAD"]})))
            .with_body(json!({"id": "abc123", "labelIds": []}).to_string())
            .create();

        let client = GmailClient::with_base_url("gmail-token", &server.url()).unwrap();
        client.mark_read("abc123", "me");
        modify.assert();
    }

    #[test]
    fn mark_read_failure_is_swallowed() {
        let mut server = mockito::Server::new();
        let modify = server
            .mock("POST", "/users/me/messages/abc123/modify")
            .with_status(403)
            .with_body("insufficient scope")
            .create();

        let client = GmailClient::with_base_url("gmail-token", &server.url()).unwrap();
        client.mark_read("abc123", "me");
        modify.assert();
    }
}
