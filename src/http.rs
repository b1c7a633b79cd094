use reqwest::blocking::{Client, Response};
use std::time::Duration;

use crate::error::{NotifierError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking client shared by the Gmail, LINE and Slack wrappers.
pub(crate) fn client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| NotifierError::transport("http", e))
}

/// Pass 2xx responses through; turn anything else into an error carrying the body.
pub(crate) fn ensure_success(service: &'static str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(NotifierError::from_status(service, status, body.trim()))
}

pub(crate) fn trim_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
