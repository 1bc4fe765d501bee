//! Remote wire shapes and their normalization into the local model.
//!
//! Servers are loose about shapes: ids may be strings or numbers, member and
//! assignee lists may hold bare ids or identity objects, timestamps may be
//! epoch millis or RFC 3339 strings. Everything here accepts all of those and
//! produces the canonical types from `models`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::DateTime;
use serde::Deserialize;

use super::models::{Board, Column, Identity, Notification, Task};

/// An id as the server spells it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Text(String),
    Number(i64),
}

impl RemoteId {
    pub fn into_string(self) -> String {
        match self {
            RemoteId::Text(s) => s,
            RemoteId::Number(n) => n.to_string(),
        }
    }
}

/// A reference to an identity: bare id or an object carrying one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdRef {
    Bare(RemoteId),
    Object { id: RemoteId },
}

impl IdRef {
    pub fn into_id(self) -> String {
        match self {
            IdRef::Bare(id) | IdRef::Object { id } => id.into_string(),
        }
    }
}

fn project_ids(refs: Vec<IdRef>) -> BTreeSet<String> {
    refs.into_iter()
        .map(IdRef::into_id)
        .filter(|id| !id.is_empty())
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTask {
    #[serde(default)]
    pub id: Option<RemoteId>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub assignees: Option<Vec<IdRef>>,
    #[serde(default)]
    pub assignee_ids: Option<Vec<IdRef>>,
}

impl RemoteTask {
    /// Converts to a local task, using `fallback_id` when the payload
    /// carries none. Returns `None` for an empty id.
    fn into_task(self, fallback_id: Option<&str>) -> Option<Task> {
        let id = self
            .id
            .map(RemoteId::into_string)
            .or_else(|| fallback_id.map(str::to_string))
            .filter(|id| !id.is_empty())?;
        let assignees = self.assignees.or(self.assignee_ids).unwrap_or_default();
        Some(Task {
            id,
            title: self.title,
            description: self.description,
            tags: self.tags.into_iter().collect(),
            assignee_ids: project_ids(assignees),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteColumn {
    pub id: RemoteId,
    #[serde(default, alias = "name")]
    pub title: String,
    #[serde(default)]
    pub tasks: Vec<RemoteTask>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBoard {
    pub id: RemoteId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<RemoteId>,
    #[serde(default)]
    pub owner: Option<IdRef>,
    #[serde(default)]
    pub members: Option<Vec<IdRef>>,
    #[serde(default)]
    pub member_ids: Option<Vec<IdRef>>,
    #[serde(default)]
    pub columns: Option<Vec<RemoteColumn>>,
    #[serde(default)]
    pub tasks: Option<BTreeMap<String, RemoteTask>>,
}

/// Builds the new board list from a full remote listing.
///
/// The result replaces the local list outright; `previous` is consulted only
/// to keep the column structure of boards whose payload carried none.
pub fn normalize_boards(remote: Vec<RemoteBoard>, previous: &[Board]) -> Vec<Board> {
    remote
        .into_iter()
        .map(|board| normalize_board(board, previous))
        .collect()
}

fn normalize_board(remote: RemoteBoard, previous: &[Board]) -> Board {
    let id = remote.id.into_string();
    let owner_id = remote
        .owner_id
        .map(RemoteId::into_string)
        .or_else(|| remote.owner.map(IdRef::into_id))
        .unwrap_or_default();
    let member_ids = project_ids(
        remote
            .members
            .or(remote.member_ids)
            .unwrap_or_default(),
    );

    let mut tasks = BTreeMap::new();
    let mut nested_ids = BTreeSet::new();
    let columns = match remote.columns {
        Some(remote_columns) => remote_columns
            .into_iter()
            .map(|column| {
                let mut task_ids = Vec::new();
                for remote_task in column.tasks {
                    if let Some(task) = remote_task.into_task(None) {
                        task_ids.push(task.id.clone());
                        nested_ids.insert(task.id.clone());
                        tasks.insert(task.id.clone(), task);
                    }
                }
                Column {
                    id: column.id.into_string(),
                    title: column.title,
                    task_ids,
                }
            })
            .collect(),
        None => match previous.iter().find(|b| b.id == id) {
            Some(prior) => {
                for task_id in prior.columns.iter().flat_map(|c| c.task_ids.iter()) {
                    if let Some(task) = prior.tasks.get(task_id) {
                        tasks.insert(task_id.clone(), task.clone());
                    }
                }
                prior.columns.clone()
            }
            None => Vec::new(),
        },
    };

    // Tasks that came nested in columns win over the board-level map; the
    // map still supersedes whatever was carried over from local state.
    if let Some(flat) = remote.tasks {
        for (key, remote_task) in flat {
            let Some(task) = remote_task.into_task(Some(&key)) else {
                continue;
            };
            if nested_ids.contains(&task.id) {
                continue;
            }
            tasks.insert(task.id.clone(), task);
        }
    }

    let mut board = Board {
        id,
        name: remote.name,
        owner_id,
        member_ids,
        columns,
        tasks,
    };
    board.repair();
    board
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RemoteTimestamp {
    Millis(i64),
    Text(String),
}

impl RemoteTimestamp {
    pub fn to_millis(&self) -> i64 {
        match self {
            RemoteTimestamp::Millis(ms) => *ms,
            RemoteTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.timestamp_millis())
                .or_else(|_| text.trim().parse::<i64>())
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNotification {
    pub id: RemoteId,
    pub user_id: RemoteId,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub created_at: Option<RemoteTimestamp>,
    #[serde(default)]
    pub read: bool,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub board_id: Option<RemoteId>,
}

/// Newest first. Ties keep no particular order.
pub fn normalize_notifications(remote: Vec<RemoteNotification>) -> Vec<Notification> {
    let mut items: Vec<Notification> = remote
        .into_iter()
        .map(|n| Notification {
            id: n.id.into_string(),
            user_id: n.user_id.into_string(),
            message: n.message,
            created_at: n.created_at.map(|t| t.to_millis()).unwrap_or(0),
            read: n.read,
            kind: n.kind,
            board_id: n.board_id.map(RemoteId::into_string),
        })
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteIdentity {
    pub id: RemoteId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl RemoteIdentity {
    pub fn into_identity(self) -> Identity {
        Identity {
            id: self.id.into_string(),
            name: self.name,
            email: self.email,
        }
    }
}

/// Body of a successful login or registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: RemoteIdentity,
}

/// Minimal body of a create call; anything without an id is a failure.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedResponse {
    pub id: RemoteId,
}
