//! Session types and server URL handling.

use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Settings key holding the normalized server base URL.
pub const SERVER_URL_KEY: &str = "server_url";

/// Settings key holding the signed-in username.
pub const USERNAME_KEY: &str = "username";

/// Secure store key holding the session token.
pub const SERVER_TOKEN_KEY: &str = "server_token";

/// Path of the login endpoint, relative to the base URL.
pub const LOGIN_PATH: &str = "api/user/login";

/// Signed-in session as persisted on the device.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Normalized base URL, always ending with `/`
    pub server_url: Url,
    pub username: String,
    token: String,
}

impl Session {
    pub fn new(server_url: Url, username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server_url,
            username: username.into(),
            token: token.into(),
        }
    }

    /// Bearer token for API requests.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Resolves an API path against the server URL.
    ///
    /// Relative paths (`api/user/login`) resolve below the base URL, while
    /// absolute paths (`/api/media/count`) resolve against the host.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.server_url
            .join(path)
            .map_err(|e| AuthError::InvalidServerUrl {
                url: self.server_url.to_string(),
                reason: e.to_string(),
            })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("server_url", &self.server_url.as_str())
            .field("username", &self.username)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Parses a user-entered server address and appends a trailing `/` so that
/// relative endpoint paths resolve below it.
pub fn normalize_base_url(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AuthError::InvalidServerUrl {
            url: input.to_string(),
            reason: "server URL is empty".to_string(),
        });
    }

    let mut url = Url::parse(trimmed).map_err(|e| AuthError::InvalidServerUrl {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AuthError::InvalidServerUrl {
            url: trimmed.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Server envelope for the login call; `data` carries the token.
#[derive(Deserialize)]
pub(crate) struct LoginEnvelope {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

impl LoginEnvelope {
    pub fn into_token(self) -> std::result::Result<String, (i32, String)> {
        match (self.code, self.data) {
            (200, Some(token)) if !token.trim().is_empty() => Ok(token),
            (200, _) => Err((200, "Server returned an empty token".to_string())),
            (code, _) => Err((
                code,
                self.message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_appends_trailing_slash() {
        let url = normalize_base_url("http://192.168.1.5:8080").unwrap();
        assert_eq!(url.as_str(), "http://192.168.1.5:8080/");

        let url = normalize_base_url(" https://nas.local/filenest ").unwrap();
        assert_eq!(url.as_str(), "https://nas.local/filenest/");

        let url = normalize_base_url("https://nas.local/filenest/?x=1").unwrap();
        assert_eq!(url.as_str(), "https://nas.local/filenest/");
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_base_url("").is_err());
        assert!(normalize_base_url("nas.local").is_err());
        assert!(normalize_base_url("ftp://nas.local").is_err());
    }

    #[test]
    fn test_endpoint_join_semantics() {
        let session = Session::new(
            normalize_base_url("https://nas.local/filenest").unwrap(),
            "alex",
            "t0k",
        );

        assert_eq!(
            session.endpoint(LOGIN_PATH).unwrap().as_str(),
            "https://nas.local/filenest/api/user/login"
        );
        assert_eq!(
            session.endpoint("/api/media/count").unwrap().as_str(),
            "https://nas.local/api/media/count"
        );
    }

    #[test]
    fn test_session_debug_hides_token() {
        let session = Session::new(normalize_base_url("http://h").unwrap(), "alex", "secret");
        let debug = format!("{:?}", session);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("alex"));
    }

    #[test]
    fn test_login_envelope() {
        let ok: LoginEnvelope =
            serde_json::from_str(r#"{"code":200,"message":"ok","data":"abc"}"#).unwrap();
        assert_eq!(ok.into_token().unwrap(), "abc");

        let denied: LoginEnvelope =
            serde_json::from_str(r#"{"code":401,"message":"Bad password"}"#).unwrap();
        assert_eq!(denied.into_token().unwrap_err(), (401, "Bad password".to_string()));

        let bare: LoginEnvelope = serde_json::from_str(r#"{"code":500}"#).unwrap();
        assert_eq!(bare.into_token().unwrap_err().1, "Unknown error");
    }
}
