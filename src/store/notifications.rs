//! Notification store: per-user inbox entries mirrored from the remote store.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::cache::{CacheKey, PersistedCache, read_snapshot, write_snapshot};
use super::fallback::{FallbackChain, RemoteCall, Resolution};
use super::flight::{Epoch, SingleFlight};
use super::ids::{local_id, now_millis};
use super::models::{Notification, NotificationKind};
use super::normalize::{RemoteNotification, normalize_notifications};
use super::scheduler::{LifecycleSignals, Refresh, RefreshScheduler, RefreshToken};
use crate::transport::Transport;

const NOTIFICATIONS_PATH: &str = "/api/notifications";

pub struct NotificationStore {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn PersistedCache>,
    items: RwLock<Vec<Notification>>,
    flight: SingleFlight,
    epoch: Epoch,
    scheduler: RefreshScheduler,
}

impl NotificationStore {
    /// Builds the store from the cached snapshot, or empty when there is none.
    pub fn load(
        transport: Arc<dyn Transport>,
        cache: Arc<dyn PersistedCache>,
        signals: LifecycleSignals,
    ) -> Self {
        let items: Vec<Notification> =
            read_snapshot(cache.as_ref(), CacheKey::Notifications).unwrap_or_default();
        tracing::debug!(count = items.len(), "loaded cached notifications");
        Self {
            transport,
            cache,
            items: RwLock::new(items),
            flight: SingleFlight::new(),
            epoch: Epoch::default(),
            scheduler: RefreshScheduler::new(signals),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Notification>> {
        self.items.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Notification>> {
        self.items.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies `edit` to the mirror and persists, unless a reset happened
    /// after `epoch` was captured.
    fn commit(&self, epoch: u64, edit: impl FnOnce(&mut Vec<Notification>)) -> bool {
        let mut items = self.write();
        if !self.epoch.is_current(epoch) {
            tracing::debug!("dropping notification update from a previous session");
            return false;
        }
        edit(&mut items);
        write_snapshot(self.cache.as_ref(), CacheKey::Notifications, &*items);
        true
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.read().clone()
    }

    pub fn all_for_user(&self, user_id: &str) -> Vec<Notification> {
        self.read()
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn unread_for_user(&self, user_id: &str) -> Vec<Notification> {
        self.read()
            .iter()
            .filter(|n| n.user_id == user_id && !n.read)
            .cloned()
            .collect()
    }

    pub fn unread_count(&self, user_id: &str) -> usize {
        self.read()
            .iter()
            .filter(|n| n.user_id == user_id && !n.read)
            .count()
    }

    /// Replaces the collection with the remote list. Returns `false` when
    /// the fetch failed or was joined onto one already in flight.
    pub async fn fetch(&self) -> bool {
        self.flight
            .join_or_run(self.fetch_now())
            .await
            .unwrap_or(false)
    }

    async fn refetch_after_write(&self) -> bool {
        self.flight.run_after(self.fetch_now()).await
    }

    async fn fetch_now(&self) -> bool {
        let epoch = self.epoch.current();
        let remote = match self.transport.get(NOTIFICATIONS_PATH).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(store = "notifications", error = %e, "fetch failed");
                return false;
            }
        };
        let remote: Vec<RemoteNotification> = match serde_json::from_value(remote) {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(store = "notifications", error = %e, "unexpected fetch response");
                return false;
            }
        };
        let fresh = normalize_notifications(remote);
        self.commit(epoch, |items| *items = fresh)
    }

    /// Inserts an unread entry at the front and persists. Never touches the
    /// network.
    pub fn push(&self, user_id: &str, message: &str) -> Notification {
        self.push_entry(user_id, message, None, None)
    }

    pub fn push_entry(
        &self,
        user_id: &str,
        message: &str,
        kind: Option<NotificationKind>,
        board_id: Option<&str>,
    ) -> Notification {
        let entry = Notification {
            id: local_id("n"),
            user_id: user_id.to_string(),
            message: message.to_string(),
            created_at: now_millis(),
            read: false,
            kind: kind.map(|k| k.as_str().to_string()),
            board_id: board_id.map(str::to_string),
        };
        let mut items = self.write();
        items.insert(0, entry.clone());
        write_snapshot(self.cache.as_ref(), CacheKey::Notifications, &*items);
        entry
    }

    /// Delivers a notification through the remote store, or pushes it
    /// locally when the remote refuses or cannot be reached.
    pub async fn notify(
        &self,
        user_id: &str,
        message: &str,
        kind: NotificationKind,
        board_id: Option<&str>,
    ) -> Resolution<()> {
        let epoch = self.epoch.current();
        let resolution = FallbackChain::new("notify")
            .then(RemoteCall::post(
                NOTIFICATIONS_PATH,
                json!({
                    "userId": user_id,
                    "message": message,
                    "type": kind.as_str(),
                    "boardId": board_id,
                }),
            ))
            .run(self.transport.as_ref())
            .await;
        if resolution == Resolution::Local && self.epoch.is_current(epoch) {
            self.push_entry(user_id, message, Some(kind), board_id);
        }
        resolution
    }

    /// Marks every entry of `user_id` read.
    pub async fn mark_all_read(&self, user_id: &str) {
        let epoch = self.epoch.current();
        let body = json!({ "userId": user_id });
        let resolution = FallbackChain::new("mark_all_read")
            .then(RemoteCall::put("/api/notifications/read-all", body.clone()))
            .then(RemoteCall::post("/api/notifications/mark-all-read", body))
            .run(self.transport.as_ref())
            .await;
        match resolution {
            Resolution::Remote(()) => {
                self.refetch_after_write().await;
            }
            Resolution::Local => {
                self.commit(epoch, |items| {
                    items
                        .iter_mut()
                        .filter(|n| n.user_id == user_id)
                        .for_each(|n| n.read = true);
                });
            }
        }
    }

    /// Drops every entry and the cached snapshot. Work suspended across the
    /// reset discards its result.
    pub fn reset(&self) {
        let mut items = self.write();
        self.epoch.advance();
        items.clear();
        if let Err(e) = self.cache.remove(CacheKey::Notifications) {
            tracing::warn!(error = %e, "failed to clear cached notifications");
        }
    }

    pub fn start_auto_refresh(self: &Arc<Self>, interval: Duration) -> Option<RefreshToken> {
        let target: Weak<Self> = Arc::downgrade(self);
        self.scheduler.start(target, interval)
    }

    pub fn stop_auto_refresh(&self) -> bool {
        self.scheduler.stop()
    }

    pub fn auto_refresh_active(&self) -> bool {
        self.scheduler.is_active()
    }
}

#[async_trait]
impl Refresh for NotificationStore {
    fn label(&self) -> &'static str {
        "notifications"
    }

    async fn refresh(&self) {
        self.fetch().await;
    }
}
