//! # Session Manager
//!
//! Signs the device into a self-hosted media server and keeps the resulting
//! session on disk.
//!
//! ## Overview
//!
//! `SessionManager` posts the user's credentials to `api/user/login`, stores
//! the returned token in the platform `SecureStore` and the server URL and
//! username in the `SettingsStore`. Every state change is announced on the
//! core event bus.
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::SessionManager;
//!
//! let manager = SessionManager::new(http_client, settings, secure_store, event_bus);
//! let session = manager.login("http://nas.local:8080", "alex", "hunter2").await?;
//! assert!(manager.is_logged_in().await?);
//! manager.logout().await?;
//! ```

use crate::error::{AuthError, Result};
use crate::token_store::TokenStore;
use crate::types::{
    normalize_base_url, LoginEnvelope, LoginRequest, Session, LOGIN_PATH, SERVER_URL_KEY,
    USERNAME_KEY,
};
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::storage::{SecureStore, SettingsStore};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Timeout for the login request.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the persisted server session.
pub struct SessionManager {
    http_client: Arc<dyn HttpClient>,
    settings: Arc<dyn SettingsStore>,
    token_store: TokenStore,
    event_bus: EventBus,
}

impl SessionManager {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        settings: Arc<dyn SettingsStore>,
        secure_store: Arc<dyn SecureStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            http_client,
            settings,
            token_store: TokenStore::new(secure_store),
            event_bus,
        }
    }

    /// Logs into the server and persists the session.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidServerUrl`] if `server_url` cannot be parsed
    /// - [`AuthError::LoginRejected`] with the server message for a non-200 envelope
    /// - [`AuthError::Bridge`] when the server cannot be reached
    /// - storage errors when the session cannot be persisted
    #[instrument(skip(self, password), fields(server_url = %server_url, username = %username))]
    pub async fn login(&self, server_url: &str, username: &str, password: &str) -> Result<Session> {
        let base_url = normalize_base_url(server_url)?;

        let token = match self.request_token(&base_url, username, password).await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "Login failed");
                let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::LoginFailed {
                    server_url: base_url.to_string(),
                    message: err.to_string(),
                }));
                return Err(err);
            }
        };

        self.persist(&base_url, username, &token).await?;

        info!("Signed in");
        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedIn {
            username: username.to_string(),
            server_url: base_url.to_string(),
        }));

        Ok(Session::new(base_url, username, token))
    }

    async fn request_token(&self, base_url: &Url, username: &str, password: &str) -> Result<String> {
        let endpoint = base_url
            .join(LOGIN_PATH)
            .map_err(|e| AuthError::InvalidServerUrl {
                url: base_url.to_string(),
                reason: e.to_string(),
            })?;

        let request = HttpRequest::new(HttpMethod::Post, endpoint.as_str())
            .json(&LoginRequest { username, password })?
            .timeout(LOGIN_TIMEOUT);

        let response = self.http_client.execute(request).await?;
        debug!(status = response.status, "Login response received");

        let envelope: LoginEnvelope = match response.json() {
            Ok(envelope) => envelope,
            Err(_) if !response.is_success() => {
                return Err(AuthError::LoginRejected(format!(
                    "HTTP {}",
                    response.status
                )))
            }
            Err(e) => return Err(AuthError::InvalidResponse(e.to_string())),
        };

        envelope
            .into_token()
            .map_err(|(_, message)| AuthError::LoginRejected(message))
    }

    async fn persist(&self, base_url: &Url, username: &str, token: &str) -> Result<()> {
        self.settings
            .set_string(SERVER_URL_KEY, base_url.as_str())
            .await
            .map_err(settings_error)?;
        self.settings
            .set_string(USERNAME_KEY, username)
            .await
            .map_err(settings_error)?;
        self.token_store.store_token(token).await
    }

    /// Clears the server URL, username and token.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let username = self.username().await?;

        self.token_store.delete_token().await?;
        self.settings
            .delete(SERVER_URL_KEY)
            .await
            .map_err(settings_error)?;
        self.settings
            .delete(USERNAME_KEY)
            .await
            .map_err(settings_error)?;

        info!("Signed out");
        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::SignedOut { username }));
        Ok(())
    }

    /// The persisted session, if the device is signed in.
    pub async fn current_session(&self) -> Result<Option<Session>> {
        let Some(token) = self.token_store.retrieve_token().await? else {
            return Ok(None);
        };
        let Some(server_url) = self.server_url().await? else {
            warn!("Token present without a server URL");
            return Ok(None);
        };
        let username = self.username().await?.unwrap_or_default();

        Ok(Some(Session::new(server_url, username, token)))
    }

    /// Like [`current_session`](Self::current_session) but fails when signed out.
    pub async fn require_session(&self) -> Result<Session> {
        self.current_session()
            .await?
            .ok_or(AuthError::NotAuthenticated)
    }

    /// True when a non-blank token is stored.
    pub async fn is_logged_in(&self) -> Result<bool> {
        self.token_store.has_token().await
    }

    pub async fn server_url(&self) -> Result<Option<Url>> {
        let stored = self
            .settings
            .get_string(SERVER_URL_KEY)
            .await
            .map_err(settings_error)?;
        match stored.filter(|s| !s.trim().is_empty()) {
            Some(raw) => normalize_base_url(&raw).map(Some),
            None => Ok(None),
        }
    }

    pub async fn username(&self) -> Result<Option<String>> {
        let stored = self
            .settings
            .get_string(USERNAME_KEY)
            .await
            .map_err(settings_error)?;
        Ok(stored.filter(|s| !s.is_empty()))
    }
}

fn settings_error(err: BridgeError) -> AuthError {
    AuthError::Settings(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SERVER_TOKEN_KEY;
    use bridge_desktop::SqliteSettingsStore;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::HttpResponse;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    mock! {
        HttpClient {}

        #[async_trait::async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<bridge_traits::http::HttpResponse>;
            async fn download_stream(&self, request: HttpRequest) -> BridgeResult<Box<dyn tokio::io::AsyncRead + Send + Unpin>>;
        }
    }

    #[derive(Default)]
    struct MemorySecureStore {
        storage: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait::async_trait]
    impl SecureStore for MemorySecureStore {
        async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
            self.storage
                .lock()
                .await
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(self.storage.lock().await.get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
            self.storage.lock().await.remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(self.storage.lock().await.keys().cloned().collect())
        }

        async fn clear_all(&self) -> BridgeResult<()> {
            self.storage.lock().await.clear();
            Ok(())
        }
    }

    fn json_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    struct Fixture {
        manager: SessionManager,
        settings: Arc<SqliteSettingsStore>,
        secure: Arc<MemorySecureStore>,
        events: tokio::sync::broadcast::Receiver<CoreEvent>,
    }

    async fn fixture(http: MockHttpClient) -> Fixture {
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let secure = Arc::new(MemorySecureStore::default());
        let bus = EventBus::new(16);
        let events = bus.subscribe();
        let manager = SessionManager::new(Arc::new(http), settings.clone(), secure.clone(), bus);
        Fixture {
            manager,
            settings,
            secure,
            events,
        }
    }

    #[tokio::test]
    async fn test_login_persists_session() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body_bytes().unwrap()).unwrap();
                req.method == HttpMethod::Post
                    && req.url == "http://nas.local:8080/api/user/login"
                    && body == serde_json::json!({"username": "alex", "password": "pw"})
            })
            .times(1)
            .returning(|_| Ok(json_response(200, r#"{"code":200,"message":"ok","data":"tok-1"}"#)));

        let mut fx = fixture(http).await;
        let session = fx
            .manager
            .login("http://nas.local:8080", "alex", "pw")
            .await
            .unwrap();

        assert_eq!(session.server_url.as_str(), "http://nas.local:8080/");
        assert_eq!(session.token(), "tok-1");
        assert!(fx.manager.is_logged_in().await.unwrap());
        assert_eq!(
            fx.settings.get_string(SERVER_URL_KEY).await.unwrap().as_deref(),
            Some("http://nas.local:8080/")
        );
        assert_eq!(
            fx.secure.get_secret(SERVER_TOKEN_KEY).await.unwrap(),
            Some(b"tok-1".to_vec())
        );

        match fx.events.recv().await.unwrap() {
            CoreEvent::Auth(AuthEvent::SignedIn { username, server_url }) => {
                assert_eq!(username, "alex");
                assert_eq!(server_url, "http://nas.local:8080/");
            }
            other => panic!("unexpected event {:?}", other),
        }

        let restored = fx.manager.current_session().await.unwrap().unwrap();
        assert_eq!(restored, session);
    }

    #[tokio::test]
    async fn test_login_rejected_uses_server_message() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Ok(json_response(200, r#"{"code":401,"message":"Bad credentials"}"#)));

        let mut fx = fixture(http).await;
        let err = fx
            .manager
            .login("http://nas.local", "alex", "wrong")
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::LoginRejected(ref m) if m == "Bad credentials"));
        assert!(!fx.manager.is_logged_in().await.unwrap());
        assert!(matches!(
            fx.events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::LoginFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_login_rejected_without_message() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Ok(json_response(200, r#"{"code":500}"#)));

        let fx = fixture(http).await;
        let err = fx.manager.login("http://nas.local", "a", "b").await.unwrap_err();
        assert!(matches!(err, AuthError::LoginRejected(ref m) if m == "Unknown error"));
    }

    #[tokio::test]
    async fn test_login_network_failure() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Err(BridgeError::Network("connection refused".to_string())));

        let fx = fixture(http).await;
        let err = fx.manager.login("http://nas.local", "a", "b").await.unwrap_err();
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_login_invalid_url_skips_request() {
        let http = MockHttpClient::new();
        let fx = fixture(http).await;
        assert!(matches!(
            fx.manager.login("not a url", "a", "b").await,
            Err(AuthError::InvalidServerUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .returning(|_| Ok(json_response(200, r#"{"code":200,"data":"tok"}"#)));

        let mut fx = fixture(http).await;
        fx.manager.login("http://nas.local", "alex", "pw").await.unwrap();
        let _ = fx.events.recv().await;

        fx.manager.logout().await.unwrap();

        assert!(!fx.manager.is_logged_in().await.unwrap());
        assert!(fx.manager.current_session().await.unwrap().is_none());
        assert!(fx.manager.server_url().await.unwrap().is_none());
        assert!(fx.manager.username().await.unwrap().is_none());
        assert!(matches!(
            fx.manager.require_session().await,
            Err(AuthError::NotAuthenticated)
        ));

        match fx.events.recv().await.unwrap() {
            CoreEvent::Auth(AuthEvent::SignedOut { username }) => {
                assert_eq!(username.as_deref(), Some("alex"))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
