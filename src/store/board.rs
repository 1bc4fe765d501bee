//! Board store: boards, their columns and tasks.
//!
//! Every mutation walks a [`FallbackChain`] of remote endpoint shapes. When
//! one accepts the write the store re-fetches the full board list so the
//! mirror reflects server truth; when all of them fail the same change is
//! applied to the mirror. Either way the affected members are notified.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::cache::{CacheKey, PersistedCache, read_snapshot, write_snapshot};
use super::fallback::{FallbackChain, RemoteCall, Resolution};
use super::flight::{Epoch, SingleFlight};
use super::ids::{local_id, next_stamp};
use super::models::{Board, Column, NotificationKind};
use super::normalize::{CreatedResponse, RemoteBoard, normalize_boards};
use super::notifications::NotificationStore;
use super::scheduler::{LifecycleSignals, Refresh, RefreshScheduler, RefreshToken};
use super::session::CurrentSession;
use crate::transport::Transport;

const BOARDS_PATH: &str = "/api/boards";

/// Titles and id suffixes of the columns every new board starts with.
const DEFAULT_COLUMNS: [(&str, &str); 3] =
    [("todo", "To Do"), ("doing", "Doing"), ("done", "Done")];

pub struct BoardStore {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn PersistedCache>,
    notifications: Arc<NotificationStore>,
    session: CurrentSession,
    boards: RwLock<Vec<Board>>,
    flight: SingleFlight,
    epoch: Epoch,
    scheduler: RefreshScheduler,
}

impl BoardStore {
    /// Builds the store from the cached snapshot, or empty when there is none.
    pub fn load(
        transport: Arc<dyn Transport>,
        cache: Arc<dyn PersistedCache>,
        notifications: Arc<NotificationStore>,
        session: CurrentSession,
        signals: LifecycleSignals,
    ) -> Self {
        let mut boards: Vec<Board> =
            read_snapshot(cache.as_ref(), CacheKey::Boards).unwrap_or_default();
        for board in &mut boards {
            if !board.is_consistent() {
                tracing::warn!(board = %board.id, "repairing inconsistent cached board");
                board.repair();
            }
        }
        tracing::debug!(count = boards.len(), "loaded cached boards");
        Self {
            transport,
            cache,
            notifications,
            session,
            boards: RwLock::new(boards),
            flight: SingleFlight::new(),
            epoch: Epoch::default(),
            scheduler: RefreshScheduler::new(signals),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Board>> {
        self.boards.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Board>> {
        self.boards.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies `edit` to the whole list and persists, unless a reset
    /// happened after `epoch` was captured.
    fn commit<R>(&self, epoch: u64, edit: impl FnOnce(&mut Vec<Board>) -> R) -> Option<R> {
        let mut boards = self.write();
        if !self.epoch.is_current(epoch) {
            tracing::debug!("dropping board update from a previous session");
            return None;
        }
        let result = edit(&mut boards);
        write_snapshot(self.cache.as_ref(), CacheKey::Boards, &*boards);
        Some(result)
    }

    /// Applies `edit` to one board. Nothing is persisted when the board is
    /// unknown or the edit reports no change.
    fn edit_board(
        &self,
        epoch: u64,
        board_id: &str,
        edit: impl FnOnce(&mut Board) -> bool,
    ) -> bool {
        let mut boards = self.write();
        if !self.epoch.is_current(epoch) {
            tracing::debug!(board = board_id, "dropping local edit from a previous session");
            return false;
        }
        let Some(board) = boards.iter_mut().find(|b| b.id == board_id) else {
            tracing::debug!(board = board_id, "local edit on unknown board ignored");
            return false;
        };
        if !edit(board) {
            return false;
        }
        write_snapshot(self.cache.as_ref(), CacheKey::Boards, &*boards);
        true
    }

    pub fn boards(&self) -> Vec<Board> {
        self.read().clone()
    }

    pub fn board_by_id(&self, board_id: &str) -> Option<Board> {
        self.read().iter().find(|b| b.id == board_id).cloned()
    }

    /// Boards `user_id` owns or is a member of.
    pub fn boards_for_user(&self, user_id: &str) -> Vec<Board> {
        self.read()
            .iter()
            .filter(|b| b.is_visible_to(user_id))
            .cloned()
            .collect()
    }

    /// Replaces the board list with the normalized remote list. Returns
    /// `false` when the fetch failed or was joined onto one in flight.
    pub async fn fetch_remote(&self) -> bool {
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
        let remote = match self.transport.get(BOARDS_PATH).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(store = "boards", error = %e, "fetch failed");
                return false;
            }
        };
        let remote: Vec<RemoteBoard> = match serde_json::from_value(remote) {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(store = "boards", error = %e, "unexpected fetch response");
                return false;
            }
        };
        self.commit(epoch, |boards| {
            let fresh = normalize_boards(remote, &boards[..]);
            tracing::debug!(count = fresh.len(), "boards refreshed");
            *boards = fresh;
        })
        .is_some()
    }

    /// Runs `chain`, then either re-fetches or applies `local` to the board.
    async fn mutate(
        &self,
        chain: FallbackChain,
        board_id: &str,
        local: impl FnOnce(&mut Board) -> bool,
    ) -> Resolution<()> {
        self.mutate_applied(chain, board_id, local).await.0
    }

    /// Like [`Self::mutate`], also reporting whether the change took effect:
    /// always for a remote write, otherwise only when `local` applied.
    async fn mutate_applied(
        &self,
        chain: FallbackChain,
        board_id: &str,
        local: impl FnOnce(&mut Board) -> bool,
    ) -> (Resolution<()>, bool) {
        let epoch = self.epoch.current();
        let resolution = chain.run(self.transport.as_ref()).await;
        let applied = match resolution {
            Resolution::Remote(()) => {
                self.refetch_after_write().await;
                true
            }
            Resolution::Local => self.edit_board(epoch, board_id, local),
        };
        (resolution, applied)
    }

    /// Notifies the board's audience, minus whoever is signed in.
    async fn fan_out(&self, board: &Board, message: String, kind: NotificationKind) {
        let actor = self.session.id();
        for user_id in board.audience(actor.as_deref()) {
            self.notify(&user_id, &message, kind, &board.id).await;
        }
    }

    async fn notify(&self, user_id: &str, message: &str, kind: NotificationKind, board_id: &str) {
        self.notifications
            .notify(user_id, message, kind, Some(board_id))
            .await;
    }

    /// Creates a board and returns its id. Offline boards get the three
    /// default columns.
    pub async fn create_board(&self, name: &str, owner_id: &str) -> String {
        let epoch = self.epoch.current();
        let resolution = FallbackChain::new("create_board")
            .then(RemoteCall::post(
                BOARDS_PATH,
                json!({ "name": name, "ownerId": owner_id }),
            ))
            .run_as::<CreatedResponse>(self.transport.as_ref())
            .await;

        match resolution {
            Resolution::Remote(created) => {
                self.refetch_after_write().await;
                created.id.into_string()
            }
            Resolution::Local => {
                let stamp = next_stamp();
                let board = Board {
                    id: format!("b{stamp}"),
                    name: name.to_string(),
                    owner_id: owner_id.to_string(),
                    member_ids: Default::default(),
                    columns: DEFAULT_COLUMNS
                        .iter()
                        .map(|(suffix, title)| Column::new(format!("c{stamp}-{suffix}"), *title))
                        .collect(),
                    tasks: Default::default(),
                };
                let id = board.id.clone();
                self.commit(epoch, |boards| boards.push(board));
                id
            }
        }
    }

    pub async fn rename_board(&self, board_id: &str, name: &str) -> Resolution<()> {
        let before = self.board_by_id(board_id);
        let body = json!({ "name": name });
        let chain = FallbackChain::new("rename_board")
            .then(RemoteCall::put(format!("/api/boards/{board_id}"), body.clone()))
            .then(RemoteCall::post(format!("/api/boards/{board_id}/rename"), body));
        let (resolution, applied) = self
            .mutate_applied(chain, board_id, |board| {
                board.name = name.to_string();
                true
            })
            .await;

        if applied && let Some(board) = before {
            let message = format!("Board \"{}\" was renamed to \"{}\"", board.name, name);
            self.fan_out(&board, message, NotificationKind::BoardRenamed)
                .await;
        }
        resolution
    }

    pub async fn delete_board(&self, board_id: &str) -> Resolution<()> {
        let epoch = self.epoch.current();
        let resolution = FallbackChain::new("delete_board")
            .then(RemoteCall::delete(format!("/api/boards/{board_id}")))
            .run(self.transport.as_ref())
            .await;
        match resolution {
            Resolution::Remote(()) => {
                self.refetch_after_write().await;
            }
            Resolution::Local => {
                self.commit(epoch, |boards| boards.retain(|b| b.id != board_id));
            }
        }
        resolution
    }

    /// Adds `user_id` as a member. The invitee hears about it unless they
    /// already belonged to the board.
    pub async fn invite_member(&self, board_id: &str, user_id: &str) -> Resolution<()> {
        let before = self.board_by_id(board_id);
        let body = json!({ "userId": user_id });
        let chain = FallbackChain::new("invite_member")
            .then(RemoteCall::post(format!("/api/boards/{board_id}/members"), body.clone()))
            .then(RemoteCall::post(format!("/api/boards/{board_id}/invite"), body));
        let (resolution, applied) = self
            .mutate_applied(chain, board_id, |board| board.invite(user_id))
            .await;

        let actor = self.session.id();
        if applied
            && let Some(board) = before
            && !board.is_visible_to(user_id)
            && actor.as_deref() != Some(user_id)
        {
            let message = format!("You were added to board \"{}\"", board.name);
            self.notify(user_id, &message, NotificationKind::MemberInvited, &board.id)
                .await;
        }
        resolution
    }

    /// Invites by email address. Only the remote store can resolve an
    /// address, so there is no offline counterpart.
    pub async fn invite_member_by_email(&self, board_id: &str, email: &str) -> Resolution<()> {
        let body = json!({ "email": email });
        let chain = FallbackChain::new("invite_member_by_email")
            .then(RemoteCall::post(
                format!("/api/boards/{board_id}/members/by-email"),
                body.clone(),
            ))
            .then(RemoteCall::post(format!("/api/boards/{board_id}/invite"), body));
        self.mutate(chain, board_id, |_| false).await
    }

    pub async fn add_column(&self, board_id: &str, title: &str) -> Resolution<()> {
        let before = self.board_by_id(board_id);
        let chain = FallbackChain::new("add_column")
            .then(RemoteCall::post(
                format!("/api/boards/{board_id}/columns"),
                json!({ "title": title }),
            ))
            .then(RemoteCall::post(
                "/api/columns",
                json!({ "boardId": board_id, "title": title }),
            ));
        let (resolution, applied) = self
            .mutate_applied(chain, board_id, |board| board.add_column(local_id("c"), title))
            .await;

        if applied && let Some(board) = before {
            let message = format!("Column \"{}\" was added to \"{}\"", title, board.name);
            self.fan_out(&board, message, NotificationKind::ColumnAdded)
                .await;
        }
        resolution
    }

    pub async fn rename_column(
        &self,
        board_id: &str,
        column_id: &str,
        title: &str,
    ) -> Resolution<()> {
        let body = json!({ "title": title });
        let chain = FallbackChain::new("rename_column")
            .then(RemoteCall::put(
                format!("/api/boards/{board_id}/columns/{column_id}"),
                body.clone(),
            ))
            .then(RemoteCall::put(format!("/api/columns/{column_id}"), body));
        self.mutate(chain, board_id, |board| board.rename_column(column_id, title))
            .await
    }

    pub async fn delete_column(&self, board_id: &str, column_id: &str) -> Resolution<()> {
        let chain = FallbackChain::new("delete_column")
            .then(RemoteCall::delete(format!(
                "/api/boards/{board_id}/columns/{column_id}"
            )))
            .then(RemoteCall::delete(format!("/api/columns/{column_id}")));
        self.mutate(chain, board_id, |board| board.delete_column(column_id))
            .await
    }

    pub async fn reorder_columns(&self, board_id: &str, order: &[String]) -> Resolution<()> {
        let body = json!({ "columnIds": order });
        let chain = FallbackChain::new("reorder_columns")
            .then(RemoteCall::put(
                format!("/api/boards/{board_id}/columns/order"),
                body.clone(),
            ))
            .then(RemoteCall::post(
                format!("/api/boards/{board_id}/columns/reorder"),
                body,
            ));
        self.mutate(chain, board_id, |board| board.reorder_columns(order))
            .await
    }

    /// Creates a task at the end of a column and returns its id. Offline,
    /// nothing is created when the board or column is unknown.
    pub async fn create_task(
        &self,
        board_id: &str,
        column_id: &str,
        title: &str,
    ) -> Option<String> {
        let epoch = self.epoch.current();
        let before = self.board_by_id(board_id);
        let resolution = FallbackChain::new("create_task")
            .then(RemoteCall::post(
                format!("/api/boards/{board_id}/columns/{column_id}/tasks"),
                json!({ "title": title }),
            ))
            .then(RemoteCall::post(
                "/api/tasks",
                json!({ "boardId": board_id, "columnId": column_id, "title": title }),
            ))
            .run_as::<CreatedResponse>(self.transport.as_ref())
            .await;

        let created = match resolution {
            Resolution::Remote(created) => {
                self.refetch_after_write().await;
                Some(created.id.into_string())
            }
            Resolution::Local => {
                let task_id = local_id("t");
                self.edit_board(epoch, board_id, |board| {
                    board.create_task(column_id, task_id.clone(), title)
                })
                .then_some(task_id)
            }
        };

        if created.is_some()
            && let Some(board) = before
        {
            let message = format!("Task \"{}\" was created in \"{}\"", title, board.name);
            self.fan_out(&board, message, NotificationKind::TaskCreated)
                .await;
        }
        created
    }

    fn task_chain(
        operation: &'static str,
        board_id: &str,
        task_id: &str,
        body: serde_json::Value,
    ) -> FallbackChain {
        FallbackChain::new(operation)
            .then(RemoteCall::put(
                format!("/api/boards/{board_id}/tasks/{task_id}"),
                body.clone(),
            ))
            .then(RemoteCall::put(format!("/api/tasks/{task_id}"), body))
    }

    pub async fn rename_task(&self, board_id: &str, task_id: &str, title: &str) -> Resolution<()> {
        let chain = Self::task_chain("rename_task", board_id, task_id, json!({ "title": title }));
        self.mutate(chain, board_id, |board| board.rename_task(task_id, title))
            .await
    }

    pub async fn set_task_description(
        &self,
        board_id: &str,
        task_id: &str,
        description: Option<&str>,
    ) -> Resolution<()> {
        let chain = Self::task_chain(
            "set_task_description",
            board_id,
            task_id,
            json!({ "description": description }),
        );
        self.mutate(chain, board_id, |board| {
            board.set_task_description(task_id, description)
        })
        .await
    }

    pub async fn delete_task(&self, board_id: &str, task_id: &str) -> Resolution<()> {
        let chain = FallbackChain::new("delete_task")
            .then(RemoteCall::delete(format!(
                "/api/boards/{board_id}/tasks/{task_id}"
            )))
            .then(RemoteCall::delete(format!("/api/tasks/{task_id}")));
        self.mutate(chain, board_id, |board| board.delete_task(task_id))
            .await
    }

    /// Moves a task to `to_column_id` at `index`; an absent or out-of-range
    /// index appends.
    pub async fn move_task(
        &self,
        board_id: &str,
        task_id: &str,
        from_column_id: &str,
        to_column_id: &str,
        index: Option<usize>,
    ) -> Resolution<()> {
        let before = self.board_by_id(board_id);
        let body = json!({
            "fromColumnId": from_column_id,
            "toColumnId": to_column_id,
            "index": index,
        });
        let mut compat = body.clone();
        compat["boardId"] = json!(board_id);
        let chain = FallbackChain::new("move_task")
            .then(RemoteCall::put(
                format!("/api/boards/{board_id}/tasks/{task_id}/move"),
                body,
            ))
            .then(RemoteCall::post(format!("/api/tasks/{task_id}/move"), compat));
        let (resolution, applied) = self
            .mutate_applied(chain, board_id, |board| {
                board.move_task(task_id, from_column_id, to_column_id, index)
            })
            .await;

        if applied
            && let Some(board) = before
            && let Some(task) = board.tasks.get(task_id)
            && let Some(column) = board.column(to_column_id)
        {
            let message = format!(
                "Task \"{}\" was moved to \"{}\" in \"{}\"",
                task.title, column.title, board.name
            );
            self.fan_out(&board, message, NotificationKind::TaskMoved)
                .await;
        }
        resolution
    }

    pub async fn set_task_tags(
        &self,
        board_id: &str,
        task_id: &str,
        tags: &[String],
    ) -> Resolution<()> {
        let body = json!({ "tags": tags });
        let chain = FallbackChain::new("set_task_tags")
            .then(RemoteCall::put(
                format!("/api/boards/{board_id}/tasks/{task_id}/tags"),
                body.clone(),
            ))
            .then(RemoteCall::put(format!("/api/tasks/{task_id}"), body));
        self.mutate(chain, board_id, |board| board.set_task_tags(task_id, tags))
            .await
    }

    pub async fn set_task_assignees(
        &self,
        board_id: &str,
        task_id: &str,
        assignee_ids: &[String],
    ) -> Resolution<()> {
        let body = json!({ "assigneeIds": assignee_ids });
        let chain = FallbackChain::new("set_task_assignees")
            .then(RemoteCall::put(
                format!("/api/boards/{board_id}/tasks/{task_id}/assignees"),
                body.clone(),
            ))
            .then(RemoteCall::put(format!("/api/tasks/{task_id}"), body));
        self.mutate(chain, board_id, |board| {
            board.set_task_assignees(task_id, assignee_ids)
        })
        .await
    }

    pub async fn reorder_tasks(
        &self,
        board_id: &str,
        column_id: &str,
        order: &[String],
    ) -> Resolution<()> {
        let body = json!({ "taskIds": order });
        let chain = FallbackChain::new("reorder_tasks")
            .then(RemoteCall::put(
                format!("/api/boards/{board_id}/columns/{column_id}/tasks/order"),
                body.clone(),
            ))
            .then(RemoteCall::post(
                format!("/api/boards/{board_id}/columns/{column_id}/reorder"),
                body,
            ));
        self.mutate(chain, board_id, |board| board.reorder_tasks(column_id, order))
            .await
    }

    /// Drops every board and the cached snapshot. Work suspended across the
    /// reset discards its result.
    pub fn reset(&self) {
        let mut boards = self.write();
        self.epoch.advance();
        boards.clear();
        if let Err(e) = self.cache.remove(CacheKey::Boards) {
            tracing::warn!(error = %e, "failed to clear cached boards");
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
impl Refresh for BoardStore {
    fn label(&self) -> &'static str {
        "boards"
    }

    async fn refresh(&self) {
        self.fetch_remote().await;
    }
}
