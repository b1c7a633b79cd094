//! Versioned Gmail credential record.
//!
//! Stored as JSON in the local token file, and as base64(JSON) in the
//! `GOOGLE_OAUTH_TOKEN` secret used by scheduled runs.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{NotifierError, Result};

pub const CREDENTIAL_VERSION: u32 = 1;

pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Treat tokens this close to expiry as already expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub version: u32,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Epoch seconds. `None` means the issuer gave no expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_epoch: Option<i64>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// What the granted scopes allow the job to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeCheck {
    /// Can list, read and mark messages read.
    Modify,
    /// Can read but marking read will fail.
    ReadOnly,
    Unknown,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at_epoch: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            version: CREDENTIAL_VERSION,
            access_token: access_token.into(),
            refresh_token,
            expires_at_epoch,
            scopes,
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at_epoch, Some(exp) if now >= exp - EXPIRY_MARGIN_SECS)
    }

    pub fn is_valid_at(&self, now: i64) -> bool {
        !self.access_token.is_empty() && !self.is_expired_at(now)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_epoch())
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn scope_check(&self) -> ScopeCheck {
        if self.has_scope(GMAIL_MODIFY_SCOPE) || self.has_scope("https://mail.google.com/") {
            ScopeCheck::Modify
        } else if self.has_scope(GMAIL_READONLY_SCOPE) {
            ScopeCheck::ReadOnly
        } else {
            ScopeCheck::Unknown
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let cred: Self = serde_json::from_str(s)
            .map_err(|e| NotifierError::Auth(format!("malformed credential record: {e}")))?;
        if cred.version != CREDENTIAL_VERSION {
            return Err(NotifierError::Auth(format!(
                "unsupported credential version {} (expected {CREDENTIAL_VERSION})",
                cred.version
            )));
        }
        Ok(cred)
    }

    /// The single-line form stored in `GOOGLE_OAUTH_TOKEN`.
    pub fn encode(&self) -> Result<String> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| NotifierError::Auth(format!("GOOGLE_OAUTH_TOKEN is not base64: {e}")))?;
        let json = String::from_utf8(bytes)
            .map_err(|_| NotifierError::Auth("GOOGLE_OAUTH_TOKEN is not a JSON record".into()))?;
        Self::from_json(&json)
    }
}

/// Show the first 4 characters of a secret, mask the rest.
pub fn mask_token(token: &str) -> String {
    match token.char_indices().nth(4) {
        Some((idx, _)) => format!("{}***", &token[..idx]),
        None => "***".to_string(),
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("version", &self.version)
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(mask_token))
            .field("expires_at_epoch", &self.expires_at_epoch)
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credential {
        Credential::new(
            "ya29.access",
            Some("1//refresh".into()),
            Some(1_700_000_000),
            vec![GMAIL_MODIFY_SCOPE.into()],
        )
    }

    #[test]
    fn encode_decode_preserves_record() {
        let c = sample();
        let encoded = c.encode().unwrap();
        assert!(!encoded.contains('\n'));
        assert_eq!(Credential::decode(&encoded).unwrap(), c);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let json = r#"{"version": 7, "access_token": "x", "scopes": []}"#;
        let err = Credential::from_json(json).unwrap_err();
        assert!(err.is_auth());
        assert!(err.to_string().contains("version 7"));
    }

    #[test]
    fn garbage_token_is_an_auth_error() {
        assert!(Credential::decode("!!!").unwrap_err().is_auth());
        let not_json = STANDARD.encode("pickle bytes");
        assert!(Credential::decode(&not_json).unwrap_err().is_auth());
    }

    #[test]
    fn expiry_uses_safety_margin() {
        let c = sample();
        assert!(c.is_valid_at(1_700_000_000 - 120));
        assert!(!c.is_valid_at(1_700_000_000 - 30));
        assert!(c.is_expired_at(1_700_000_001));
    }

    #[test]
    fn missing_expiry_never_expires() {
        let c = Credential::new("tok", None, None, vec![]);
        assert!(c.is_valid_at(i64::MAX));
        let empty = Credential::new("", None, None, vec![]);
        assert!(!empty.is_valid_at(0));
    }

    #[test]
    fn scope_check_distinguishes_modify_and_readonly() {
        assert_eq!(sample().scope_check(), ScopeCheck::Modify);
        let ro = Credential::new("t", None, None, vec![GMAIL_READONLY_SCOPE.into()]);
        assert_eq!(ro.scope_check(), ScopeCheck::ReadOnly);
        let none = Credential::new("t", None, None, vec!["openid".into()]);
        assert_eq!(none.scope_check(), ScopeCheck::Unknown);
    }

    #[test]
    fn debug_output_masks_secrets() {
        let out = format!("{:?}", sample());
        assert!(out.contains("ya29***"));
        assert!(!out.contains("ya29.access"));
        assert!(!out.contains("1//refresh"));
        assert_eq!(mask_token("abc"), "***");
    }
}
