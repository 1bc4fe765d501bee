//! Session store: who is signed in, and the auth token that goes with it.
//!
//! Sign-in goes to the remote auth endpoints first. A 4xx answer is a real
//! rejection and is reported as such; an unreachable server or a 5xx falls
//! back to the local account directory so the client keeps working offline.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use super::board::BoardStore;
use super::cache::{CacheKey, PersistedCache, read_snapshot, write_snapshot};
use super::ids::local_id;
use super::models::{AuthOutcome, Identity};
use super::normalize::AuthResponse;
use super::notifications::NotificationStore;
use crate::errors::TransportError;
use crate::transport::Transport;

const DEMO_PASSWORD: &str = "123456";
const INVALID_CREDENTIALS: &str = "Invalid email or password";
const EMAIL_TAKEN: &str = "Email already registered";

/// Shared pointer to the signed-in identity. Cloning shares the slot.
#[derive(Clone, Default)]
pub struct CurrentSession(Arc<RwLock<Option<Identity>>>);

impl CurrentSession {
    pub fn get(&self) -> Option<Identity> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn id(&self) -> Option<String> {
        self.0
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|identity| identity.id.clone())
    }

    pub fn set(&self, identity: Identity) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = Some(identity);
    }

    pub fn clear(&self) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// One entry of the local account directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Hex SHA-256 of the password. Absent for accounts only ever seen
    /// through the remote store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_digest: Option<String>,
}

impl Account {
    fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    fn accepts(&self, email: &str, password: &str) -> bool {
        self.email == email
            && self.password_digest.as_deref() == Some(password_digest(password).as_str())
    }
}

pub fn password_digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn seed_accounts() -> Vec<Account> {
    [("u1", "Alice", "alice@example.com"), ("u2", "Bob", "bob@example.com")]
        .into_iter()
        .map(|(id, name, email)| Account {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            password_digest: Some(password_digest(DEMO_PASSWORD)),
        })
        .collect()
}

/// How a remote auth attempt ended.
enum RemoteAuth {
    Accepted(AuthResponse),
    Rejected(String),
    Unavailable,
}

pub struct SessionStore {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn PersistedCache>,
    session: CurrentSession,
    accounts: RwLock<Vec<Account>>,
    boards: Arc<BoardStore>,
    notifications: Arc<NotificationStore>,
    refresh_interval: Duration,
}

impl SessionStore {
    /// Loads the account directory (seeding it on first use) and resumes
    /// the persisted session, if any.
    pub fn load(
        transport: Arc<dyn Transport>,
        cache: Arc<dyn PersistedCache>,
        session: CurrentSession,
        boards: Arc<BoardStore>,
        notifications: Arc<NotificationStore>,
        refresh_interval: Duration,
    ) -> Self {
        let accounts = match read_snapshot::<Vec<Account>>(cache.as_ref(), CacheKey::Users) {
            Some(accounts) => accounts,
            None => {
                let seeded = seed_accounts();
                write_snapshot(cache.as_ref(), CacheKey::Users, &seeded);
                seeded
            }
        };

        let store = Self {
            transport,
            cache,
            session,
            accounts: RwLock::new(accounts),
            boards,
            notifications,
            refresh_interval,
        };
        store.resume();
        store
    }

    fn accounts(&self) -> RwLockReadGuard<'_, Vec<Account>> {
        self.accounts.read().unwrap_or_else(|e| e.into_inner())
    }

    fn accounts_mut(&self) -> RwLockWriteGuard<'_, Vec<Account>> {
        self.accounts.write().unwrap_or_else(|e| e.into_inner())
    }

    fn resume(&self) {
        let current = match self.cache.get(CacheKey::CurrentUserId) {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read current user");
                None
            }
        };
        let Some(user_id) = current else {
            return;
        };
        match self.accounts().iter().find(|a| a.id == user_id) {
            Some(account) => {
                tracing::debug!(user = %user_id, "resumed session");
                self.session.set(account.identity());
            }
            None => tracing::warn!(user = %user_id, "cached session refers to unknown user"),
        }
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.session.get()
    }

    pub fn all_users(&self) -> Vec<Identity> {
        self.accounts().iter().map(Account::identity).collect()
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthOutcome {
        let body = json!({ "email": email, "password": password });
        match self.remote_auth("/api/auth/login", body).await {
            RemoteAuth::Accepted(response) => self.accept(response, password),
            RemoteAuth::Rejected(message) => AuthOutcome::failed(message),
            RemoteAuth::Unavailable => {
                let account = self
                    .accounts()
                    .iter()
                    .find(|a| a.accepts(email, password))
                    .cloned();
                match account {
                    Some(account) => {
                        self.begin(account.identity(), None);
                        AuthOutcome::success()
                    }
                    None => AuthOutcome::failed(INVALID_CREDENTIALS),
                }
            }
        }
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> AuthOutcome {
        let body = json!({ "name": name, "email": email, "password": password });
        match self.remote_auth("/api/auth/register", body).await {
            RemoteAuth::Accepted(response) => self.accept(response, password),
            RemoteAuth::Rejected(message) => AuthOutcome::failed(message),
            RemoteAuth::Unavailable => {
                if self.accounts().iter().any(|a| a.email == email) {
                    return AuthOutcome::failed(EMAIL_TAKEN);
                }
                let account = Account {
                    id: local_id("u"),
                    name: name.to_string(),
                    email: email.to_string(),
                    password_digest: Some(password_digest(password)),
                };
                let identity = account.identity();
                self.remember(account);
                self.begin(identity, None);
                AuthOutcome::success()
            }
        }
    }

    async fn remote_auth(&self, path: &str, body: serde_json::Value) -> RemoteAuth {
        let value = match self.transport.post(path, body).await {
            Ok(value) => value,
            Err(e) if e.is_rejection() => return RemoteAuth::Rejected(e.message().to_string()),
            Err(e) => {
                tracing::warn!(path, error = %e, "auth endpoint unavailable, using local accounts");
                return RemoteAuth::Unavailable;
            }
        };
        match serde_json::from_value::<AuthResponse>(value) {
            Ok(response) => RemoteAuth::Accepted(response),
            Err(e) => {
                let err = TransportError::Decode {
                    path: path.to_string(),
                    message: e.to_string(),
                };
                tracing::warn!(error = %err, "unexpected auth response, using local accounts");
                RemoteAuth::Unavailable
            }
        }
    }

    fn accept(&self, response: AuthResponse, password: &str) -> AuthOutcome {
        let identity = response.user.into_identity();
        self.remember(Account {
            id: identity.id.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            password_digest: Some(password_digest(password)),
        });
        self.begin(identity, Some(&response.token));
        AuthOutcome::success()
    }

    /// Inserts or replaces the directory entry with the same id, or failing
    /// that the same email.
    fn remember(&self, account: Account) {
        let mut accounts = self.accounts_mut();
        accounts.retain(|a| a.id != account.id && a.email != account.email);
        accounts.push(account);
        write_snapshot(self.cache.as_ref(), CacheKey::Users, &*accounts);
    }

    fn begin(&self, identity: Identity, token: Option<&str>) {
        let token_result = match token {
            Some(token) => self.cache.set(CacheKey::Token, token),
            None => self.cache.remove(CacheKey::Token),
        };
        if let Err(e) = token_result {
            tracing::warn!(error = %e, "failed to store auth token");
        }
        if let Err(e) = self.cache.set(CacheKey::CurrentUserId, &identity.id) {
            tracing::warn!(error = %e, "failed to store current user");
        }
        tracing::info!(user = %identity.id, "signed in");
        self.session.set(identity);
        self.start_sync();
    }

    /// Starts both refresh loops. Already-running loops are left alone.
    pub fn start_sync(&self) {
        self.boards.start_auto_refresh(self.refresh_interval);
        self.notifications
            .start_auto_refresh(self.refresh_interval);
    }

    /// Stops both refresh loops, then drops everything the session owned.
    pub fn logout(&self) {
        self.boards.stop_auto_refresh();
        self.notifications.stop_auto_refresh();
        self.boards.reset();
        self.notifications.reset();

        for key in [CacheKey::Token, CacheKey::CurrentUserId] {
            if let Err(e) = self.cache.remove(key) {
                tracing::warn!(key = key.as_str(), error = %e, "failed to clear session key");
            }
        }
        if let Some(id) = self.session.id() {
            tracing::info!(user = %id, "signed out");
        }
        self.session.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::cache::MemoryCache;
    use crate::store::scheduler::LifecycleSignals;
    use crate::store::test_support::MockTransport;
    use crate::transport::HttpMethod;

    struct Fixture {
        transport: Arc<MockTransport>,
        cache: Arc<MemoryCache>,
        boards: Arc<BoardStore>,
        notifications: Arc<NotificationStore>,
        sessions: SessionStore,
    }

    fn fixture_with_cache(transport: MockTransport, cache: Arc<MemoryCache>) -> Fixture {
        let transport = Arc::new(transport);
        let signals = LifecycleSignals::new();
        let session = CurrentSession::default();
        let notifications = Arc::new(NotificationStore::load(
            transport.clone(),
            cache.clone(),
            signals.clone(),
        ));
        let boards = Arc::new(BoardStore::load(
            transport.clone(),
            cache.clone(),
            notifications.clone(),
            session.clone(),
            signals,
        ));
        let sessions = SessionStore::load(
            transport.clone(),
            cache.clone(),
            session,
            boards.clone(),
            notifications.clone(),
            Duration::from_secs(3600),
        );
        Fixture {
            transport,
            cache,
            boards,
            notifications,
            sessions,
        }
    }

    fn fixture(transport: MockTransport) -> Fixture {
        fixture_with_cache(transport, Arc::new(MemoryCache::new()))
    }

    #[test]
    fn test_directory_is_seeded_with_demo_accounts() {
        let f = fixture(MockTransport::offline());
        let users = f.sessions.all_users();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].email, "alice@example.com");
        assert_eq!(users[1].name, "Bob");

        let raw = f.cache.get(CacheKey::Users).unwrap().unwrap();
        assert!(!raw.contains("123456"));
        assert!(raw.contains(&password_digest("123456")));
    }

    #[test]
    fn test_password_digest_is_sha256_hex() {
        assert_eq!(
            password_digest("123456"),
            "8d969eef6ecad3c29a3a629280e686cf0c3f5d5a86aff3ca12020c923adc6c92"
        );
    }

    #[tokio::test]
    async fn test_offline_login_uses_local_directory() {
        let f = fixture(MockTransport::offline());
        assert_eq!(
            f.sessions.login("alice@example.com", "wrong").await,
            AuthOutcome::failed("Invalid email or password")
        );
        assert!(f.sessions.current_user().is_none());

        assert!(f.sessions.login("alice@example.com", "123456").await.ok);
        assert_eq!(f.sessions.current_user().unwrap().id, "u1");
        assert_eq!(
            f.cache.get(CacheKey::CurrentUserId).unwrap().as_deref(),
            Some("u1")
        );
        assert!(f.boards.auto_refresh_active());
        assert!(f.notifications.auto_refresh_active());
    }

    #[tokio::test]
    async fn test_remote_login_stores_token_and_identity() {
        let transport = MockTransport::online();
        transport.respond(
            HttpMethod::Post,
            "/api/auth/login",
            json!({ "token": "tok-1", "user": { "id": 7, "name": "Carol", "email": "carol@example.com" } }),
        );
        transport.respond(HttpMethod::Get, "/api/boards", json!([]));
        transport.respond(HttpMethod::Get, "/api/notifications", json!([]));
        let f = fixture(transport);

        assert!(f.sessions.login("carol@example.com", "pw").await.ok);
        assert_eq!(f.sessions.current_user().unwrap().id, "7");
        assert_eq!(f.cache.get(CacheKey::Token).unwrap().as_deref(), Some("tok-1"));
        assert!(f.sessions.all_users().iter().any(|u| u.email == "carol@example.com"));
    }

    #[tokio::test]
    async fn test_rejected_login_surfaces_server_message() {
        let transport = MockTransport::online();
        transport.fail(HttpMethod::Post, "/api/auth/login", 401, "Bad credentials");
        let f = fixture(transport);

        let outcome = f.sessions.login("alice@example.com", "123456").await;
        assert_eq!(outcome, AuthOutcome::failed("Bad credentials"));
        assert!(f.sessions.current_user().is_none());
        assert!(!f.boards.auto_refresh_active());
    }

    #[tokio::test]
    async fn test_server_error_falls_back_to_local_login() {
        let transport = MockTransport::online();
        transport.fail(HttpMethod::Post, "/api/auth/login", 503, "Maintenance");
        let f = fixture(transport);

        assert!(f.sessions.login("bob@example.com", "123456").await.ok);
        assert_eq!(f.sessions.current_user().unwrap().id, "u2");
    }

    #[tokio::test]
    async fn test_offline_register_rejects_duplicate_email() {
        let f = fixture(MockTransport::offline());
        let outcome = f.sessions.register("Al", "alice@example.com", "x").await;
        assert_eq!(outcome, AuthOutcome::failed("Email already registered"));
    }

    #[tokio::test]
    async fn test_offline_register_creates_account_and_signs_in() {
        let f = fixture(MockTransport::offline());
        assert!(f.sessions.register("Dana", "dana@example.com", "pw").await.ok);

        let me = f.sessions.current_user().unwrap();
        assert!(me.id.starts_with('u'));
        assert_eq!(f.sessions.all_users().len(), 3);

        f.sessions.logout();
        assert!(f.sessions.login("dana@example.com", "pw").await.ok);
    }

    #[tokio::test]
    async fn test_logout_stops_refresh_and_clears_state() {
        let f = fixture(MockTransport::offline());
        f.sessions.login("alice@example.com", "123456").await;
        f.boards.create_board("Private", "u1").await;
        f.notifications.push("u1", "hello");
        f.cache.set(CacheKey::Token, "tok").unwrap();

        f.sessions.logout();
        assert!(!f.boards.auto_refresh_active());
        assert!(!f.notifications.auto_refresh_active());
        assert!(f.boards.boards().is_empty());
        assert!(f.notifications.notifications().is_empty());
        assert!(f.sessions.current_user().is_none());
        for key in [
            CacheKey::Token,
            CacheKey::CurrentUserId,
            CacheKey::Boards,
            CacheKey::Notifications,
        ] {
            assert!(f.cache.get(key).unwrap().is_none(), "{} not cleared", key.as_str());
        }
    }

    #[tokio::test]
    async fn test_next_login_sees_nothing_from_previous_session() {
        let f = fixture(MockTransport::offline());
        f.sessions.login("alice@example.com", "123456").await;
        f.boards.create_board("Alice only", "u1").await;
        f.sessions.logout();

        f.sessions.login("bob@example.com", "123456").await;
        assert!(f.boards.boards().is_empty());
        assert!(f.boards.boards_for_user("u2").is_empty());
    }

    #[tokio::test]
    async fn test_session_resumes_from_cache() {
        let cache = Arc::new(MemoryCache::new());
        {
            let f = fixture_with_cache(MockTransport::offline(), cache.clone());
            f.sessions.login("bob@example.com", "123456").await;
        }
        let f = fixture_with_cache(MockTransport::offline(), cache);
        assert_eq!(f.sessions.current_user().unwrap().name, "Bob");
        assert!(f.transport.calls().is_empty());
    }
}
