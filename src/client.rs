//! Wiring of the three domain stores over one transport and one cache.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::store::{
    BoardStore, CurrentSession, LifecycleSignal, LifecycleSignals, NotificationStore,
    PersistedCache, SessionStore, SqliteCache,
};
use crate::transport::{HttpTransport, TracingObserver, Transport};

/// Result of a one-shot [`BoardSync::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub boards: bool,
    pub notifications: bool,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.boards && self.notifications
    }
}

/// The client-side state of one user on one device.
pub struct BoardSync {
    pub signals: LifecycleSignals,
    pub boards: Arc<BoardStore>,
    pub notifications: Arc<NotificationStore>,
    pub session: SessionStore,
}

impl BoardSync {
    /// Opens the SQLite cache and HTTP transport described by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        let cache: Arc<dyn PersistedCache> = Arc::new(
            SqliteCache::new(&config.cache_path).with_context(|| {
                format!("Failed to open cache at {}", config.cache_path.display())
            })?,
        );
        let mut transport =
            HttpTransport::new(&config.api_base, cache.clone(), config.request_timeout)?;
        if config.debug_http {
            transport = transport.with_observer(Arc::new(TracingObserver));
        }
        Ok(Self::assemble(
            Arc::new(transport),
            cache,
            config.refresh_interval,
        ))
    }

    /// Builds the stores over an arbitrary transport and cache.
    pub fn assemble(
        transport: Arc<dyn Transport>,
        cache: Arc<dyn PersistedCache>,
        refresh_interval: Duration,
    ) -> Self {
        let signals = LifecycleSignals::new();
        let current = CurrentSession::default();
        let notifications = Arc::new(NotificationStore::load(
            transport.clone(),
            cache.clone(),
            signals.clone(),
        ));
        let boards = Arc::new(BoardStore::load(
            transport.clone(),
            cache.clone(),
            notifications.clone(),
            current.clone(),
            signals.clone(),
        ));
        let session = SessionStore::load(
            transport,
            cache,
            current,
            boards.clone(),
            notifications.clone(),
            refresh_interval,
        );
        Self {
            signals,
            boards,
            notifications,
            session,
        }
    }

    /// Fetches both collections once.
    pub async fn sync(&self) -> SyncReport {
        let (boards, notifications) =
            tokio::join!(self.boards.fetch_remote(), self.notifications.fetch());
        SyncReport {
            boards,
            notifications,
        }
    }

    /// Forwards a host lifecycle event to every running refresh loop.
    pub fn signal(&self, signal: LifecycleSignal) -> usize {
        self.signals.emit(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCache;
    use crate::store::test_support::MockTransport;
    use crate::transport::HttpMethod;
    use serde_json::json;

    #[tokio::test]
    async fn test_sync_reports_each_collection() {
        let transport = Arc::new(MockTransport::online());
        transport.respond(HttpMethod::Get, "/api/boards", json!([]));
        let sync = BoardSync::assemble(
            transport.clone(),
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
        );

        let report = sync.sync().await;
        assert!(report.boards);
        assert!(!report.notifications);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_focus_signal_refreshes_running_stores() {
        let transport = Arc::new(MockTransport::online());
        transport.respond(HttpMethod::Get, "/api/boards", json!([]));
        transport.respond(HttpMethod::Get, "/api/notifications", json!([]));
        transport.fail(HttpMethod::Post, "/api/auth/login", 503, "Maintenance");
        let sync = BoardSync::assemble(
            transport.clone(),
            Arc::new(MemoryCache::new()),
            Duration::from_secs(3600),
        );

        assert!(sync.session.login("alice@example.com", "123456").await.ok);
        tokio::time::sleep(Duration::from_millis(40)).await;
        let before = transport.count(HttpMethod::Get, "/api/boards");

        assert_eq!(sync.signal(LifecycleSignal::FocusGained), 2);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(transport.count(HttpMethod::Get, "/api/boards"), before + 1);

        sync.session.logout();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(sync.signal(LifecycleSignal::FocusGained), 0);
    }

    #[test]
    fn test_open_creates_sqlite_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            api_base: "http://127.0.0.1:9".into(),
            request_timeout: Duration::from_secs(1),
            refresh_interval: Duration::from_secs(30),
            cache_path: dir.path().join("cache.db"),
            debug_http: true,
        };
        let sync = BoardSync::open(&config).unwrap();
        assert_eq!(sync.session.all_users().len(), 2);
        assert!(config.cache_path.exists());
    }
}
