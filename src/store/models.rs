use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A signed-in (or signable) person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub assignee_ids: BTreeSet<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            tags: BTreeSet::new(),
            assignee_ids: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub task_ids: Vec<String>,
}

impl Column {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            task_ids: Vec::new(),
        }
    }
}

/// One kanban board. Columns reference tasks by id; the board owns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub member_ids: BTreeSet<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub tasks: BTreeMap<String, Task>,
}

impl Board {
    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn column_mut(&mut self, column_id: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.id == column_id)
    }

    /// Column currently holding `task_id`, if any.
    pub fn column_of(&self, task_id: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.task_ids.iter().any(|id| id == task_id))
    }

    pub fn is_visible_to(&self, user_id: &str) -> bool {
        self.owner_id == user_id || self.member_ids.contains(user_id)
    }

    /// Everyone who should hear about a change: owner plus members,
    /// minus the identity that made it.
    pub fn audience(&self, actor_id: Option<&str>) -> Vec<String> {
        let mut recipients: BTreeSet<&str> = self.member_ids.iter().map(String::as_str).collect();
        if !self.owner_id.is_empty() {
            recipients.insert(self.owner_id.as_str());
        }
        recipients
            .into_iter()
            .filter(|id| Some(*id) != actor_id)
            .map(str::to_string)
            .collect()
    }

    /// True when every column reference resolves to a task and no task
    /// sits in two columns.
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        self.columns.iter().flat_map(|c| c.task_ids.iter()).all(|id| {
            self.tasks.contains_key(id) && seen.insert(id.as_str())
        })
    }

    /// Drops dangling column references and duplicate placements
    /// (first occurrence wins).
    pub fn repair(&mut self) {
        let mut seen = HashSet::new();
        let tasks = &self.tasks;
        for column in &mut self.columns {
            column
                .task_ids
                .retain(|id| tasks.contains_key(id) && seen.insert(id.clone()));
        }
    }
}

/// Kinds of notifications synthesized by board mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    BoardRenamed,
    ColumnAdded,
    TaskCreated,
    TaskMoved,
    MemberInvited,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BoardRenamed => "board_renamed",
            Self::ColumnAdded => "column_added",
            Self::TaskCreated => "task_created",
            Self::TaskMoved => "task_moved",
            Self::MemberInvited => "member_invited",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "board_renamed" => Ok(Self::BoardRenamed),
            "column_added" => Ok(Self::ColumnAdded),
            "task_created" => Ok(Self::TaskCreated),
            "task_moved" => Ok(Self::TaskMoved),
            "member_invited" => Ok(Self::MemberInvited),
            _ => Err(format!("Invalid notification type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    #[serde(default)]
    pub read: bool,
    /// Free-form on the wire; locally created entries use `NotificationKind`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
}

/// Result of a login or registration attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AuthOutcome {
    pub fn success() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}
