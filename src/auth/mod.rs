//! Gmail credential acquisition.
//!
//! Scheduled runs use the pre-issued record from `GOOGLE_OAUTH_TOKEN` as is.
//! Local runs with `GOOGLE_OAUTH_CREDENTIALS` use the cached token file,
//! refreshing or re-authorizing interactively when needed.

pub mod credential;
pub mod oauth;
pub mod token_file;

use log::info;
use std::path::Path;

use crate::auth::credential::{Credential, GMAIL_MODIFY_SCOPE, now_epoch};
use crate::auth::oauth::{ClientSecrets, DEFAULT_REDIRECT_URI};
use crate::config::GoogleConfig;
use crate::error::{NotifierError, Result};

pub fn resolve(google: &GoogleConfig) -> Result<Credential> {
    if let Some(encoded) = &google.oauth_token {
        return pre_issued(encoded, now_epoch());
    }

    let raw = google.oauth_credentials.as_deref().ok_or_else(|| {
        NotifierError::Config(
            "GOOGLE_OAUTH_CREDENTIALS is required for initial authentication".into(),
        )
    })?;
    let secrets = ClientSecrets::parse(raw)?;
    interactive(&secrets, &token_file::token_path()?)
}

/// Decode and check a pre-issued credential. No refresh on this path.
pub fn pre_issued(encoded: &str, now: i64) -> Result<Credential> {
    let credential = Credential::decode(encoded)?;
    if !credential.is_valid_at(now) {
        return Err(NotifierError::Auth(
            "GOOGLE_OAUTH_TOKEN has expired; regenerate it with `setup-oauth`".into(),
        ));
    }
    Ok(credential)
}

/// Cached credential if still valid, else refresh, else the browser flow.
pub fn interactive(secrets: &ClientSecrets, path: &Path) -> Result<Credential> {
    let now = now_epoch();
    let cached = token_file::load(path)?;

    if let Some(c) = &cached
        && c.is_valid_at(now)
    {
        info!("Using cached Gmail credential from {}", path.display());
        return Ok(c.clone());
    }

    let credential = match cached {
        Some(Credential {
            refresh_token: Some(rt),
            scopes,
            ..
        }) => {
            info!("Cached credential expired; refreshing");
            let requested: Vec<&str> = scopes.iter().map(String::as_str).collect();
            let mut fresh = oauth::refresh_access_token(secrets, &rt)?.into_credential(&requested, now);
            // Google usually omits the refresh token on refresh responses.
            if fresh.refresh_token.is_none() {
                fresh.refresh_token = Some(rt);
            }
            fresh
        }
        _ => {
            info!("No usable credential; starting interactive authorization");
            authorize(secrets, DEFAULT_REDIRECT_URI, now)?
        }
    };

    token_file::save(path, &credential)?;
    Ok(credential)
}

/// Run the browser flow for the `gmail.modify` scope.
pub fn authorize(secrets: &ClientSecrets, redirect_uri: &str, now: i64) -> Result<Credential> {
    let tokens = oauth::perform_pkce_flow(secrets, redirect_uri, GMAIL_MODIFY_SCOPE)?;
    Ok(tokens.into_credential(&[GMAIL_MODIFY_SCOPE], now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn pre_issued_token_is_accepted_while_valid() {
        let c = Credential::new("tok", None, Some(10_000), vec![GMAIL_MODIFY_SCOPE.into()]);
        let encoded = c.encode().unwrap();
        assert_eq!(pre_issued(&encoded, 5_000).unwrap(), c);
    }

    #[test]
    fn expired_pre_issued_token_is_an_auth_error() {
        let c = Credential::new("tok", Some("rt".into()), Some(10_000), vec![]);
        let encoded = c.encode().unwrap();
        let err = pre_issued(&encoded, 20_000).unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn resolve_prefers_pre_issued_token() {
        let c = Credential::new("tok", None, None, vec![]);
        let google = GoogleConfig {
            oauth_token: Some(c.encode().unwrap()),
            oauth_credentials: Some("/not/read.json".into()),
        };
        assert_eq!(resolve(&google).unwrap().access_token, "tok");
    }

    #[test]
    fn interactive_uses_valid_cached_credential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let cached = Credential::new("cached", None, None, vec![GMAIL_MODIFY_SCOPE.into()]);
        token_file::save(&path, &cached).unwrap();

        let secrets = ClientSecrets::from_json(r#"{"installed": {"client_id": "id"}}"#).unwrap();
        assert_eq!(interactive(&secrets, &path).unwrap(), cached);
    }

    fn secrets_for(server: &mockito::ServerGuard) -> ClientSecrets {
        ClientSecrets {
            client_id: "client-id".into(),
            client_secret: Some("client-secret".into()),
            auth_uri: format!("{}/auth", server.url()),
            token_uri: format!("{}/token", server.url()),
        }
    }

    #[test]
    fn expired_cached_credential_is_refreshed_and_saved() {
        let mut server = mockito::Server::new();
        let token = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "rt".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"new","expires_in":3600,"token_type":"Bearer"}"#)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let expired = Credential::new("old", Some("rt".into()), Some(1), vec![GMAIL_MODIFY_SCOPE.into()]);
        token_file::save(&path, &expired).unwrap();

        let fresh = interactive(&secrets_for(&server), &path).unwrap();

        assert_eq!(fresh.access_token, "new");
        assert_eq!(fresh.refresh_token.as_deref(), Some("rt"));
        assert_eq!(fresh.scopes, vec![GMAIL_MODIFY_SCOPE.to_string()]);
        assert!(fresh.is_valid());
        assert_eq!(token_file::load(&path).unwrap(), Some(fresh));
        token.assert();
    }

    #[test]
    fn rotated_refresh_token_replaces_the_old_one() {
        let mut server = mockito::Server::new();
        let _token = server
            .mock("POST", "/token")
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"new","refresh_token":"rt2","expires_in":3600,"token_type":"Bearer"}"#,
            )
            .create();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        token_file::save(&path, &Credential::new("old", Some("rt".into()), Some(1), vec![])).unwrap();

        let fresh = interactive(&secrets_for(&server), &path).unwrap();
        assert_eq!(fresh.refresh_token.as_deref(), Some("rt2"));
    }

    #[test]
    fn rejected_refresh_is_an_auth_error_and_keeps_the_file() {
        let mut server = mockito::Server::new();
        let _token = server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let expired = Credential::new("old", Some("rt".into()), Some(1), vec![]);
        token_file::save(&path, &expired).unwrap();

        let err = interactive(&secrets_for(&server), &path).unwrap_err();
        assert!(err.is_auth(), "{err}");
        assert_eq!(token_file::load(&path).unwrap(), Some(expired));
    }
}
