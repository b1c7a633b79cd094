use log::{info, warn};
use oauth2::TokenResponse;
use oauth2::basic::BasicClient;
use oauth2::reqwest::http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, Scope, TokenUrl,
};
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tiny_http::{Response, Server};
use url::Url;

use crate::auth::credential::Credential;
use crate::error::{NotifierError, Result};

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8080/callback";

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// OAuth client registration, as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Accepts inline JSON or a path to a JSON file.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.starts_with('{') {
            return Self::from_json(raw);
        }
        let s = fs::read_to_string(raw).map_err(|e| {
            NotifierError::Config(format!("cannot read OAuth client secrets {raw}: {e}"))
        })?;
        Self::from_json(&s)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json)
            .map_err(|e| NotifierError::Config(format!("invalid OAuth client secrets: {e}")))?;
        file.installed.or(file.web).ok_or_else(|| {
            NotifierError::Config(
                "OAuth client secrets must contain an \"installed\" or \"web\" section".into(),
            )
        })
    }

    fn client(&self) -> Result<BasicClient> {
        let bad_url = |e: url::ParseError| NotifierError::Config(format!("invalid OAuth URL: {e}"));
        Ok(BasicClient::new(
            ClientId::new(self.client_id.clone()),
            self.client_secret.clone().map(ClientSecret::new),
            AuthUrl::new(self.auth_uri.clone()).map_err(bad_url)?,
            Some(TokenUrl::new(self.token_uri.clone()).map_err(bad_url)?),
        ))
    }
}

/// Tokens returned by the oauth flow (in-memory)
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub scopes: Option<Vec<String>>,
}

impl Tokens {
    fn from_response<T: TokenResponse<oauth2::basic::BasicTokenType>>(token: &T) -> Self {
        Self {
            access_token: token.access_token().secret().to_string(),
            refresh_token: token.refresh_token().map(|r| r.secret().to_string()),
            expires_in: token.expires_in().map(|d| d.as_secs()),
            scopes: token
                .scopes()
                .map(|s| s.iter().map(|scope| scope.as_str().to_string()).collect()),
        }
    }

    /// Build a credential record; `requested` fills in when the server omits scopes.
    pub fn into_credential(self, requested: &[&str], now: i64) -> Credential {
        let scopes = self
            .scopes
            .unwrap_or_else(|| requested.iter().map(|s| s.to_string()).collect());
        Credential::new(
            self.access_token,
            self.refresh_token,
            self.expires_in.map(|s| now + s as i64),
            scopes,
        )
    }
}

/// Exchange a refresh token for a new access token.
pub fn refresh_access_token(secrets: &ClientSecrets, refresh_token: &str) -> Result<Tokens> {
    let rt = RefreshToken::new(refresh_token.to_string());
    let token = secrets
        .client()?
        .exchange_refresh_token(&rt)
        .request(http_client)
        .map_err(|e| NotifierError::Auth(format!("token refresh failed: {e}")))?;
    Ok(Tokens::from_response(&token))
}

/// Authorization Code + PKCE flow. Opens the system browser and captures
/// the code on a loopback listener bound to `redirect_uri`.
pub fn perform_pkce_flow(secrets: &ClientSecrets, redirect_uri: &str, scope: &str) -> Result<Tokens> {
    let redirect = Url::parse(redirect_uri)
        .map_err(|e| NotifierError::Config(format!("invalid redirect_uri '{redirect_uri}': {e}")))?;
    let host = redirect
        .host_str()
        .ok_or_else(|| NotifierError::Config(format!("redirect_uri missing host: {redirect_uri}")))?
        .to_string();
    let port = redirect.port_or_known_default().ok_or_else(|| {
        NotifierError::Config(format!("redirect_uri missing/unknown port: {redirect_uri}"))
    })?;

    let bind_ip: IpAddr = match host.as_str() {
        "localhost" | "127.0.0.1" => IpAddr::V4(Ipv4Addr::LOCALHOST),
        other => other.parse::<IpAddr>().map_err(|_| {
            NotifierError::Config(format!(
                "redirect_uri host must be localhost/127.0.0.1 or an IP: {other}"
            ))
        })?,
    };
    let bind_addr = SocketAddr::new(bind_ip, port);

    // Listen before opening the browser so the redirect cannot race us.
    let server = Server::http(bind_addr).map_err(|e| {
        NotifierError::Config(format!("failed to bind OAuth callback server on {bind_addr}: {e}"))
    })?;

    let oauth_client = secrets.client()?.set_redirect_uri(
        RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| NotifierError::Config(format!("invalid redirect_uri: {e}")))?,
    );

    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
    let (auth_url, csrf_token) = oauth_client
        .authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new(scope.to_string()))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(pkce_challenge)
        .url();

    println!("Open this URL in your browser:\n{auth_url}");
    if let Err(e) = open::that(auth_url.as_str()) {
        warn!("could not open browser automatically: {e}");
    }

    let code = wait_for_code(&server, &host, port, csrf_token.secret())?;

    let token = oauth_client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(pkce_verifier)
        .request(http_client)
        .map_err(|e| NotifierError::Auth(format!("token exchange failed: {e}")))?;

    info!("Authorization completed");
    Ok(Tokens::from_response(&token))
}

fn wait_for_code(server: &Server, host: &str, port: u16, expected_state: &str) -> Result<String> {
    let wait_until = Instant::now() + CALLBACK_TIMEOUT;

    while Instant::now() < wait_until {
        let Ok(Some(request)) = server.recv_timeout(Duration::from_millis(500)) else {
            continue;
        };

        // request.url() is only path+query, e.g. "/callback?code=...&state=..."
        let full = format!("http://{}:{}{}", host, port, request.url());
        let Ok(parsed) = Url::parse(&full) else {
            let _ = request.respond(Response::from_string("Bad redirect"));
            continue;
        };

        let mut code = None;
        let mut state = None;
        for (k, v) in parsed.query_pairs() {
            match k.as_ref() {
                "code" => code = Some(v.into_owned()),
                "state" => state = Some(v.into_owned()),
                _ => {}
            }
        }

        match code {
            Some(code) if state.as_deref() == Some(expected_state) => {
                let _ = request.respond(Response::from_string(
                    "Authorization received. You can close this tab.",
                ));
                return Ok(code);
            }
            Some(_) => {
                let _ = request.respond(Response::from_string("State mismatch; ignoring."));
            }
            None => {
                let _ = request.respond(Response::from_string(
                    "No code found in redirect. You can close this tab.",
                ));
            }
        }
    }

    Err(NotifierError::Auth("no authorization code received within timeout".into()))
}
